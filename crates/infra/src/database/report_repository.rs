//! Report repository implementation.
//!
//! The sync engine does not own the report lifecycle; it loads the full
//! aggregate (slots and Q&A answers included) and flips the CRM-linkage and
//! sync-state columns.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use fieldlink_core::sync::ports::ReportRepository;
use fieldlink_domain::{
    CrmType, FieldLinkError, Report, ReportAnswer, ReportSyncStatus, Result,
};
use rusqlite::{params, Connection, Row};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// SQLite-backed report repository.
pub struct SqliteReportRepository {
    db: Arc<DbManager>,
}

impl SqliteReportRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn get_report(&self, report_id: &str) -> Result<Option<Report>> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();

        task::spawn_blocking(move || -> Result<Option<Report>> {
            let conn = db.get_connection()?;
            load_report(&conn, &report_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        let db = Arc::clone(&self.db);
        let report = report.clone();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            insert_report_tx(&tx, &report)?;
            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_batch_candidates(
        &self,
        user_id: &str,
        crm_type: CrmType,
        limit: usize,
    ) -> Result<Vec<Report>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<Report>> {
            let conn = db.get_connection()?;
            query_batch_candidates(&conn, &user_id, crm_type, limit)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_synced(&self, report_id: &str, synced_at: i64) -> Result<()> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE reports
                     SET sync_status = 'synced', sync_error = NULL,
                         last_sync_date = ?2, updated_at = ?2
                     WHERE id = ?1",
                    params![report_id, synced_at],
                )
                .map_err(map_sql_error)?;
            require_row(changed, &report_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_sync_failed(&self, report_id: &str, error: &str, failed_at: i64) -> Result<()> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();
        let error = error.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE reports
                     SET sync_status = 'failed', sync_error = ?2, updated_at = ?3
                     WHERE id = ?1",
                    params![report_id, error, failed_at],
                )
                .map_err(map_sql_error)?;
            require_row(changed, &report_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn clear_crm_link(&self, report_id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE reports SET crm_linked = 0, crm_type = NULL WHERE id = ?1",
                    params![report_id],
                )
                .map_err(map_sql_error)?;
            require_row(changed, &report_id)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn require_row(changed: usize, report_id: &str) -> Result<()> {
    if changed == 0 {
        return Err(FieldLinkError::NotFound(format!("report not found: {report_id}")));
    }
    Ok(())
}

// ============================================================================
// SQL operations (synchronous, shared with the unit of work)
// ============================================================================

const REPORT_COLUMNS: &str = "id, user_id, report_date, mode, crm_linked, crm_type,
                              sync_status, sync_error, last_sync_date, created_at, updated_at";

pub(crate) fn load_report(conn: &Connection, report_id: &str) -> Result<Option<Report>> {
    let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1");
    let report = match conn.query_row(&sql, params![report_id], map_report_row) {
        Ok(report) => report,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(err) => return Err(map_sql_error(err)),
    };
    Ok(Some(hydrate_report(conn, report)?))
}

pub(crate) fn insert_report_tx(conn: &Connection, report: &Report) -> Result<()> {
    conn.execute(
        "INSERT INTO reports (id, user_id, report_date, mode, crm_linked, crm_type,
                              sync_status, sync_error, last_sync_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            report.id,
            report.user_id,
            report.report_date,
            report.mode,
            report.crm_linked,
            report.crm_type.map(|t| t.as_str()),
            report.sync_status.as_str(),
            report.sync_error,
            report.last_sync_date,
            report.created_at,
            report.updated_at,
        ],
    )
    .map_err(map_sql_error)?;

    for (name, value) in &report.slots {
        upsert_slot(conn, &report.id, name, value)?;
    }
    for (position, answer) in report.answers.iter().enumerate() {
        conn.execute(
            "INSERT INTO report_answers (report_id, position, question, answer)
             VALUES (?1, ?2, ?3, ?4)",
            params![report.id, position as i64, answer.question, answer.answer],
        )
        .map_err(map_sql_error)?;
    }
    Ok(())
}

pub(crate) fn upsert_slot(
    conn: &Connection,
    report_id: &str,
    name: &str,
    value: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO report_slots (report_id, name, value) VALUES (?1, ?2, ?3)
         ON CONFLICT (report_id, name) DO UPDATE SET value = excluded.value",
        params![report_id, name, value],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn query_batch_candidates(
    conn: &Connection,
    user_id: &str,
    crm_type: CrmType,
    limit: usize,
) -> Result<Vec<Report>> {
    // Explicit crm_type wins; the legacy mode column is only consulted for
    // rows that never had crm_type stored.
    let sql = format!(
        "SELECT {REPORT_COLUMNS} FROM reports
         WHERE user_id = ?1
           AND sync_status IN ('pending', 'failed')
           AND (crm_type = ?2 OR (crm_type IS NULL AND mode = ?2))
         ORDER BY created_at ASC
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
    let rows = stmt
        .query_map(params![user_id, crm_type.as_str(), limit as i64], map_report_row)
        .map_err(map_sql_error)?
        .collect::<rusqlite::Result<Vec<Report>>>()
        .map_err(map_sql_error)?;

    rows.into_iter().map(|report| hydrate_report(conn, report)).collect()
}

fn hydrate_report(conn: &Connection, mut report: Report) -> Result<Report> {
    let mut slots = BTreeMap::new();
    let mut stmt = conn
        .prepare("SELECT name, value FROM report_slots WHERE report_id = ?1")
        .map_err(map_sql_error)?;
    let entries = stmt
        .query_map(params![report.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(map_sql_error)?;
    for entry in entries {
        let (name, value) = entry.map_err(map_sql_error)?;
        slots.insert(name, value);
    }
    report.slots = slots;

    let mut stmt = conn
        .prepare(
            "SELECT question, answer FROM report_answers
             WHERE report_id = ?1 ORDER BY position ASC",
        )
        .map_err(map_sql_error)?;
    report.answers = stmt
        .query_map(params![report.id], |row| {
            Ok(ReportAnswer { question: row.get(0)?, answer: row.get(1)? })
        })
        .map_err(map_sql_error)?
        .collect::<rusqlite::Result<Vec<ReportAnswer>>>()
        .map_err(map_sql_error)?;

    Ok(report)
}

fn map_report_row(row: &Row<'_>) -> rusqlite::Result<Report> {
    let crm_type: Option<String> = row.get(5)?;
    let sync_status: String = row.get(6)?;
    Ok(Report {
        id: row.get(0)?,
        user_id: row.get(1)?,
        report_date: row.get(2)?,
        mode: row.get(3)?,
        slots: BTreeMap::new(),
        answers: Vec::new(),
        crm_linked: row.get(4)?,
        crm_type: crm_type.map(|t| parse_column(5, &t)).transpose()?,
        sync_status: parse_column(6, &sync_status)?,
        sync_error: row.get(7)?,
        last_sync_date: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Parse a stored enum column, surfacing bad values as conversion errors.
pub(crate) fn parse_column<T>(index: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = FieldLinkError>,
{
    value.parse().map_err(|err: FieldLinkError| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteReportRepository, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("reports.db");

        let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        manager.run_migrations().expect("migrations run");

        let repo = SqliteReportRepository::new(manager.clone());
        (repo, manager, temp_dir)
    }

    fn sample_report(id: &str, user_id: &str, created_at: i64) -> Report {
        let mut slots = BTreeMap::new();
        slots.insert("customer".to_string(), "Acme Corp".to_string());
        slots.insert("project".to_string(), "Cloud Migration".to_string());
        Report {
            id: id.to_string(),
            user_id: user_id.to_string(),
            report_date: "2025-06-01".to_string(),
            mode: Some("salesforce".to_string()),
            slots,
            answers: vec![ReportAnswer {
                question: "Who did you meet?".to_string(),
                answer: "Procurement lead".to_string(),
            }],
            crm_linked: false,
            crm_type: None,
            sync_status: ReportSyncStatus::Pending,
            sync_error: None,
            last_sync_date: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_and_load_round_trips_the_aggregate() {
        let (repo, _manager, _dir) = setup().await;

        let report = sample_report("r-1", "u-1", 1_750_000_000);
        repo.insert_report(&report).await.expect("insert ok");

        let loaded = repo.get_report("r-1").await.expect("query ok").expect("report found");
        assert_eq!(loaded, report);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_report_returns_none() {
        let (repo, _manager, _dir) = setup().await;
        assert!(repo.get_report("ghost").await.expect("query ok").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_candidates_filter_by_user_status_and_crm() {
        let (repo, _manager, _dir) = setup().await;

        repo.insert_report(&sample_report("r-1", "u-1", 100)).await.expect("insert r-1");

        let mut explicit = sample_report("r-2", "u-1", 50);
        explicit.mode = None;
        explicit.crm_type = Some(CrmType::Salesforce);
        repo.insert_report(&explicit).await.expect("insert r-2");

        let mut synced = sample_report("r-3", "u-1", 10);
        synced.sync_status = ReportSyncStatus::Synced;
        repo.insert_report(&synced).await.expect("insert r-3");

        let mut other_user = sample_report("r-4", "u-2", 20);
        other_user.user_id = "u-2".to_string();
        repo.insert_report(&other_user).await.expect("insert r-4");

        let mut dynamics = sample_report("r-5", "u-1", 30);
        dynamics.mode = Some("dynamics365".to_string());
        repo.insert_report(&dynamics).await.expect("insert r-5");

        let candidates = repo
            .find_batch_candidates("u-1", CrmType::Salesforce, 50)
            .await
            .expect("query ok");

        // Oldest first: r-2 (explicit crm_type) before r-1 (legacy mode).
        let ids: Vec<&str> = candidates.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r-2", "r-1"]);
        // Slots came back hydrated for the append path.
        assert_eq!(candidates[0].slots.get("customer").map(String::as_str), Some("Acme Corp"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_synced_clears_the_stored_error() {
        let (repo, _manager, _dir) = setup().await;
        repo.insert_report(&sample_report("r-1", "u-1", 100)).await.expect("insert ok");

        repo.mark_sync_failed("r-1", "INVALID_FIELD", 200).await.expect("mark failed");
        let failed = repo.get_report("r-1").await.expect("query ok").expect("found");
        assert_eq!(failed.sync_status, ReportSyncStatus::Failed);
        assert_eq!(failed.sync_error.as_deref(), Some("INVALID_FIELD"));

        repo.mark_synced("r-1", 300).await.expect("mark synced");
        let synced = repo.get_report("r-1").await.expect("query ok").expect("found");
        assert_eq!(synced.sync_status, ReportSyncStatus::Synced);
        assert_eq!(synced.sync_error, None);
        assert_eq!(synced.last_sync_date, Some(300));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn state_updates_on_missing_report_are_not_found() {
        let (repo, _manager, _dir) = setup().await;

        let err = repo.mark_synced("ghost", 1).await.expect_err("missing report");
        assert!(matches!(err, FieldLinkError::NotFound(_)));
        let err = repo.clear_crm_link("ghost").await.expect_err("missing report");
        assert!(matches!(err, FieldLinkError::NotFound(_)));
    }
}
