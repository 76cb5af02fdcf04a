//! Resolved-conflict audit repository implementation.
//!
//! Reads only; writes go through the unit of work so resolutions and slot
//! overwrites commit together.

use std::sync::Arc;

use async_trait::async_trait;
use fieldlink_core::sync::ports::ConflictRepository;
use fieldlink_domain::{ConflictRecord, ConflictResolution, Result};
use rusqlite::{params, Connection, Row};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};
use super::report_repository::parse_column;

/// SQLite-backed conflict audit repository.
pub struct SqliteConflictRepository {
    db: Arc<DbManager>,
}

impl SqliteConflictRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConflictRepository for SqliteConflictRepository {
    async fn list_for_report(&self, report_id: &str) -> Result<Vec<ConflictRecord>> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<ConflictRecord>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, report_id, field_name, report_value, crm_value,
                            resolution, resolved_value, resolved_by, resolved_at
                     FROM crm_sync_conflicts
                     WHERE report_id = ?1
                     ORDER BY id ASC",
                )
                .map_err(map_sql_error)?;
            let records = stmt
                .query_map(params![report_id], map_conflict_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<ConflictRecord>>>()
                .map_err(map_sql_error)?;
            Ok(records)
        })
        .await
        .map_err(map_join_error)?
    }
}

pub(crate) fn insert_resolution(
    conn: &Connection,
    report_id: &str,
    resolution: &ConflictResolution,
    resolved_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO crm_sync_conflicts
             (report_id, field_name, report_value, crm_value, resolution,
              resolved_value, resolved_by, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            report_id,
            resolution.field_name,
            resolution.report_value,
            resolution.crm_value,
            resolution.resolution.as_str(),
            resolution.resolved_value,
            resolution.resolved_by,
            resolved_at,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn map_conflict_row(row: &Row<'_>) -> rusqlite::Result<ConflictRecord> {
    let resolution: String = row.get(5)?;
    Ok(ConflictRecord {
        id: row.get(0)?,
        report_id: row.get(1)?,
        field_name: row.get(2)?,
        report_value: row.get(3)?,
        crm_value: row.get(4)?,
        resolution: parse_column(5, &resolution)?,
        resolved_value: row.get(6)?,
        resolved_by: row.get(7)?,
        resolved_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use fieldlink_domain::ResolutionChoice;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn records_come_back_in_insertion_order() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("conflicts.db");

        let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        manager.run_migrations().expect("migrations run");
        let repo = SqliteConflictRepository::new(manager.clone());

        let conn = manager.get_connection().expect("connection acquired");
        for (field, choice) in [("customer", ResolutionChoice::UseCrm), ("budget", ResolutionChoice::UseReport)] {
            insert_resolution(
                &conn,
                "r-1",
                &ConflictResolution {
                    field_name: field.to_string(),
                    report_value: Some("a".to_string()),
                    crm_value: Some("b".to_string()),
                    resolution: choice,
                    resolved_value: None,
                    resolved_by: "u-1".to_string(),
                },
                1_750_000_000,
            )
            .expect("insert ok");
        }

        let records = repo.list_for_report("r-1").await.expect("list ok");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field_name, "customer");
        assert_eq!(records[0].resolution, ResolutionChoice::UseCrm);
        assert_eq!(records[1].field_name, "budget");
        assert!(repo.list_for_report("r-2").await.expect("list ok").is_empty());
    }
}
