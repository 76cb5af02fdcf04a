//! CRM synchronization engine: ports, orchestrator, matcher, conflicts.

pub mod conflicts;
pub mod matcher;
pub mod ports;
pub mod service;

pub use service::CrmSyncService;
