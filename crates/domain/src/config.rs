//! Application configuration structures.
//!
//! Populated by the infra config loader from environment variables or a
//! TOML/JSON file. These are process-level settings; per-user CRM sync
//! preferences live in [`crate::types::CrmSyncConfig`].

use serde::{Deserialize, Serialize};

use crate::constants::BATCH_SYNC_LIMIT;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// SQLite database file path.
    pub path: String,
    /// Connection pool size.
    pub pool_size: u32,
}

/// Sync engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on reports per batch sync run.
    pub batch_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { batch_limit: BATCH_SYNC_LIMIT }
    }
}
