//! SQLite repositories implementing the core persistence ports.

pub mod conflict_repository;
pub mod manager;
pub mod mapping_repository;
pub mod report_repository;
pub mod sync_config_repository;
pub mod sync_history_repository;
pub mod unit_of_work;

pub use conflict_repository::SqliteConflictRepository;
pub use mapping_repository::SqliteMappingRepository;
pub use report_repository::SqliteReportRepository;
pub use sync_config_repository::SqliteSyncConfigRepository;
pub use sync_history_repository::SqliteSyncHistoryRepository;
pub use unit_of_work::SqliteSyncUnitOfWork;
