//! Domain data types for the sync engine.

pub mod conflict;
pub mod crm;
pub mod report;
pub mod sync;

pub use conflict::*;
pub use crm::*;
pub use report::*;
pub use sync::*;
