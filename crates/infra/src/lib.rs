//! Infrastructure layer: SQLite persistence and configuration loading.
//!
//! Everything here implements the port traits defined in `fieldlink-core`
//! against a pooled SQLite database. Blocking SQL always runs on the tokio
//! blocking pool so async callers never stall an executor thread.

pub mod config;
pub mod database;

pub use database::manager::DbManager;
pub use database::{
    SqliteConflictRepository, SqliteMappingRepository, SqliteReportRepository,
    SqliteSyncConfigRepository, SqliteSyncHistoryRepository, SqliteSyncUnitOfWork,
};
