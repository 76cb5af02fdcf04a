//! # FieldLink Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for persistence and CRM vendors
//! - The sync orchestrator service
//! - The similarity matcher and conflict detector
//!
//! ## Architecture Principles
//! - Only depends on `fieldlink-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod sync;

// Re-export specific items to avoid ambiguity
pub use sync::conflicts::detect_conflicts;
pub use sync::matcher::{calculate_similarity, SimilarityInput};
pub use sync::ports::{
    AdapterRegistry, ConflictRepository, CrmAdapter, MappingRepository, ReportRepository,
    SyncConfigRepository, SyncHistoryRepository, SyncUnitOfWork,
};
pub use sync::CrmSyncService;
