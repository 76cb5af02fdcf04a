//! Configuration loader.
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `FIELDLINK_DB_PATH`: Database file path
//! - `FIELDLINK_DB_POOL_SIZE`: Connection pool size
//! - `FIELDLINK_BATCH_LIMIT`: Reports per batch sync run (optional)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.toml` or `./config.json` (current working directory)
//! 2. `./fieldlink.toml` or `./fieldlink.json` (current working directory)
//! 3. `../config.toml` or `../config.json` (parent directory)

use std::path::{Path, PathBuf};

use fieldlink_domain::{Config, DatabaseConfig, EngineConfig, FieldLinkError, Result};

/// Load configuration with automatic fallback strategy.
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "environment incomplete, trying config file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables.
///
/// `FIELDLINK_DB_PATH` and `FIELDLINK_DB_POOL_SIZE` are required;
/// `FIELDLINK_BATCH_LIMIT` defaults when absent.
pub fn load_from_env() -> Result<Config> {
    let path = env_var("FIELDLINK_DB_PATH")?;
    let pool_size = env_var("FIELDLINK_DB_POOL_SIZE").and_then(|s| {
        s.parse::<u32>()
            .map_err(|e| FieldLinkError::Config(format!("invalid pool size: {e}")))
    })?;

    let mut engine = EngineConfig::default();
    if let Ok(limit) = std::env::var("FIELDLINK_BATCH_LIMIT") {
        engine.batch_limit = limit
            .parse::<usize>()
            .map_err(|e| FieldLinkError::Config(format!("invalid batch limit: {e}")))?;
    }

    Ok(Config { database: DatabaseConfig { path, pool_size }, engine })
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes the locations listed in the module docs.
/// The format is detected by file extension; anything that is not `.json`
/// parses as TOML.
pub fn load_from_file(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => probe_config_paths().ok_or_else(|| {
            FieldLinkError::Config("no configuration file found in probed locations".into())
        })?,
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        FieldLinkError::Config(format!("cannot read config file {}: {e}", path.display()))
    })?;

    let config = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&contents).map_err(|e| {
            FieldLinkError::Config(format!("invalid JSON in {}: {e}", path.display()))
        })?
    } else {
        toml::from_str(&contents).map_err(|e| {
            FieldLinkError::Config(format!("invalid TOML in {}: {e}", path.display()))
        })?
    };

    tracing::info!(path = %path.display(), "configuration loaded from file");
    Ok(config)
}

fn probe_config_paths() -> Option<PathBuf> {
    const CANDIDATES: [&str; 6] = [
        "config.toml",
        "config.json",
        "fieldlink.toml",
        "fieldlink.json",
        "../config.toml",
        "../config.json",
    ];
    CANDIDATES.iter().map(PathBuf::from).find(|p| p.is_file())
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| FieldLinkError::Config(format!("missing environment variable: {name}")))
}
