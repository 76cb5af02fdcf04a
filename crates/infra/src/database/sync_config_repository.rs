//! Per-user sync configuration repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fieldlink_core::sync::ports::SyncConfigRepository;
use fieldlink_domain::{CrmSyncConfig, CrmSyncConfigUpdate, CrmType, FieldLinkError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};
use super::report_repository::parse_column;

/// SQLite-backed sync config repository.
pub struct SqliteSyncConfigRepository {
    db: Arc<DbManager>,
}

impl SqliteSyncConfigRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncConfigRepository for SqliteSyncConfigRepository {
    async fn get_or_create(&self, user_id: &str, crm_type: CrmType) -> Result<CrmSyncConfig> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<CrmSyncConfig> {
            let conn = db.get_connection()?;
            if let Some(config) = query_config(&conn, &user_id, crm_type)? {
                return Ok(config);
            }

            // INSERT OR IGNORE keeps a concurrent first read from failing on
            // the unique (user_id, crm_type) constraint.
            let defaults = CrmSyncConfig::defaults(&user_id, crm_type, Utc::now().timestamp());
            conn.execute(
                "INSERT OR IGNORE INTO crm_sync_config
                     (user_id, crm_type, auto_sync_enabled, sync_frequency, sync_time,
                      conflict_resolution, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    defaults.user_id,
                    defaults.crm_type.as_str(),
                    defaults.auto_sync_enabled,
                    defaults.sync_frequency.as_str(),
                    defaults.sync_time,
                    defaults.conflict_resolution.as_str(),
                    defaults.created_at,
                    defaults.updated_at,
                ],
            )
            .map_err(map_sql_error)?;

            query_config(&conn, &user_id, crm_type)?.ok_or_else(|| {
                FieldLinkError::Database(format!(
                    "sync config missing after insert for {user_id}/{crm_type}"
                ))
            })
        })
        .await
        .map_err(map_join_error)?
    }

    async fn update(
        &self,
        user_id: &str,
        crm_type: CrmType,
        update: &CrmSyncConfigUpdate,
    ) -> Result<CrmSyncConfig> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let update = update.clone();

        task::spawn_blocking(move || -> Result<CrmSyncConfig> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE crm_sync_config
                     SET auto_sync_enabled = ?3, sync_frequency = ?4, sync_time = ?5,
                         conflict_resolution = ?6, updated_at = ?7
                     WHERE user_id = ?1 AND crm_type = ?2",
                    params![
                        user_id,
                        crm_type.as_str(),
                        update.auto_sync_enabled,
                        update.sync_frequency.as_str(),
                        update.sync_time,
                        update.conflict_resolution.as_str(),
                        Utc::now().timestamp(),
                    ],
                )
                .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(FieldLinkError::NotFound(format!(
                    "sync config not found for {user_id}/{crm_type}"
                )));
            }
            query_config(&conn, &user_id, crm_type)?.ok_or_else(|| {
                FieldLinkError::Database(format!(
                    "sync config missing after update for {user_id}/{crm_type}"
                ))
            })
        })
        .await
        .map_err(map_join_error)?
    }
}

fn query_config(
    conn: &Connection,
    user_id: &str,
    crm_type: CrmType,
) -> Result<Option<CrmSyncConfig>> {
    conn.query_row(
        "SELECT user_id, crm_type, auto_sync_enabled, sync_frequency, sync_time,
                conflict_resolution, created_at, updated_at
         FROM crm_sync_config
         WHERE user_id = ?1 AND crm_type = ?2",
        params![user_id, crm_type.as_str()],
        map_config_row,
    )
    .optional()
    .map_err(map_sql_error)
}

fn map_config_row(row: &Row<'_>) -> rusqlite::Result<CrmSyncConfig> {
    let crm_type: String = row.get(1)?;
    let sync_frequency: String = row.get(3)?;
    let conflict_resolution: String = row.get(5)?;
    Ok(CrmSyncConfig {
        user_id: row.get(0)?,
        crm_type: parse_column(1, &crm_type)?,
        auto_sync_enabled: row.get(2)?,
        sync_frequency: parse_column(3, &sync_frequency)?,
        sync_time: row.get(4)?,
        conflict_resolution: parse_column(5, &conflict_resolution)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
