//! Sync history repository implementation.
//!
//! The audit trail is append-only: rows open as `processing` and close
//! exactly once, to `completed` or `failed`. Closing a row that is not open
//! is a `NotFound`, which also catches double closes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fieldlink_core::sync::ports::SyncHistoryRepository;
use fieldlink_domain::{FieldLinkError, Result, SyncAttempt, SyncHistory};
use rusqlite::{params, Connection, Row};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};
use super::report_repository::parse_column;

/// SQLite-backed sync history repository.
pub struct SqliteSyncHistoryRepository {
    db: Arc<DbManager>,
}

impl SqliteSyncHistoryRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncHistoryRepository for SqliteSyncHistoryRepository {
    async fn open(&self, attempt: &SyncAttempt) -> Result<i64> {
        let db = Arc::clone(&self.db);
        let attempt = attempt.clone();

        task::spawn_blocking(move || -> Result<i64> {
            let conn = db.get_connection()?;
            open_attempt(&conn, &attempt, Utc::now().timestamp())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_completed(&self, history_id: i64, result_json: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let result_json = result_json.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            complete_attempt(&conn, history_id, &result_json, Utc::now().timestamp())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_failed(&self, history_id: i64, error: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let error = error.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE crm_sync_history
                     SET status = 'failed', error_message = ?2, completed_at = ?3
                     WHERE id = ?1 AND status = 'processing'",
                    params![history_id, error, Utc::now().timestamp()],
                )
                .map_err(map_sql_error)?;
            require_open_row(changed, history_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn record_failure(&self, attempt: &SyncAttempt, error: &str) -> Result<i64> {
        let db = Arc::clone(&self.db);
        let attempt = attempt.clone();
        let error = error.to_string();

        task::spawn_blocking(move || -> Result<i64> {
            let conn = db.get_connection()?;
            let now = Utc::now().timestamp();
            conn.execute(
                "INSERT INTO crm_sync_history
                     (report_id, crm_type, sync_type, direction, payload_json,
                      status, error_message, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'failed', ?6, ?7, ?7)",
                params![
                    attempt.report_id,
                    attempt.crm_type.as_str(),
                    attempt.sync_type.as_str(),
                    attempt.direction.as_str(),
                    attempt.payload_json,
                    error,
                    now,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_for_report(&self, report_id: &str, limit: usize) -> Result<Vec<SyncHistory>> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<SyncHistory>> {
            let conn = db.get_connection()?;
            let sql = format!(
                "SELECT {HISTORY_COLUMNS} FROM crm_sync_history
                 WHERE report_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![report_id, limit as i64], map_history_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<SyncHistory>>>()
                .map_err(map_sql_error)?;
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn require_open_row(changed: usize, history_id: i64) -> Result<()> {
    if changed == 0 {
        return Err(FieldLinkError::NotFound(format!(
            "open sync history row not found: {history_id}"
        )));
    }
    Ok(())
}

// ============================================================================
// SQL operations (synchronous, shared with the unit of work)
// ============================================================================

const HISTORY_COLUMNS: &str = "id, report_id, crm_type, sync_type, direction, payload_json,
                               status, result_json, error_message, created_at, completed_at";

pub(crate) fn open_attempt(conn: &Connection, attempt: &SyncAttempt, now: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO crm_sync_history
             (report_id, crm_type, sync_type, direction, payload_json, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'processing', ?6)",
        params![
            attempt.report_id,
            attempt.crm_type.as_str(),
            attempt.sync_type.as_str(),
            attempt.direction.as_str(),
            attempt.payload_json,
            now,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn complete_attempt(
    conn: &Connection,
    history_id: i64,
    result_json: &str,
    now: i64,
) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE crm_sync_history
             SET status = 'completed', result_json = ?2, completed_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![history_id, result_json, now],
        )
        .map_err(map_sql_error)?;
    require_open_row(changed, history_id)
}

fn map_history_row(row: &Row<'_>) -> rusqlite::Result<SyncHistory> {
    let crm_type: String = row.get(2)?;
    let sync_type: String = row.get(3)?;
    let direction: String = row.get(4)?;
    let status: String = row.get(6)?;
    Ok(SyncHistory {
        id: row.get(0)?,
        report_id: row.get(1)?,
        crm_type: parse_column(2, &crm_type)?,
        sync_type: parse_column(3, &sync_type)?,
        direction: parse_column(4, &direction)?,
        payload_json: row.get(5)?,
        status: parse_column(6, &status)?,
        result_json: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use fieldlink_domain::{AttemptStatus, CrmType, SyncDirection, SyncType};
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteSyncHistoryRepository, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("history.db");

        let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        manager.run_migrations().expect("migrations run");

        let repo = SqliteSyncHistoryRepository::new(manager.clone());
        (repo, manager, temp_dir)
    }

    fn sample_attempt(report_id: &str) -> SyncAttempt {
        SyncAttempt {
            report_id: report_id.to_string(),
            crm_type: CrmType::Salesforce,
            sync_type: SyncType::Create,
            direction: SyncDirection::ToCrm,
            payload_json: Some(r#"{"customer":"Acme Corp"}"#.to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_then_complete_closes_the_row_once() {
        let (repo, _manager, _dir) = setup().await;

        let id = repo.open(&sample_attempt("r-1")).await.expect("open ok");
        repo.mark_completed(id, r#"{"opportunity_id":"O1"}"#).await.expect("complete ok");

        let rows = repo.list_for_report("r-1", 10).await.expect("list ok");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttemptStatus::Completed);
        assert!(rows[0].completed_at.is_some());

        // Already closed: a second close must not rewrite the row.
        let err = repo.mark_failed(id, "boom").await.expect_err("row no longer open");
        assert!(matches!(err, FieldLinkError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_failure_writes_a_closed_failed_row() {
        let (repo, _manager, _dir) = setup().await;

        let id = repo.record_failure(&sample_attempt("r-1"), "INVALID_FIELD").await.expect("ok");
        assert!(id > 0);

        let rows = repo.list_for_report("r-1", 10).await.expect("list ok");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttemptStatus::Failed);
        assert_eq!(rows[0].error_message.as_deref(), Some("INVALID_FIELD"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_returns_newest_first_and_respects_limit() {
        let (repo, _manager, _dir) = setup().await;

        for i in 0..3 {
            let id = repo.open(&sample_attempt("r-1")).await.expect("open ok");
            repo.mark_completed(id, &format!(r#"{{"n":{i}}}"#)).await.expect("complete ok");
        }
        repo.open(&sample_attempt("r-2")).await.expect("other report");

        let rows = repo.list_for_report("r-1", 2).await.expect("list ok");
        assert_eq!(rows.len(), 2);
        assert!(rows[0].id > rows[1].id);
        assert!(rows.iter().all(|r| r.report_id == "r-1"));
    }
}
