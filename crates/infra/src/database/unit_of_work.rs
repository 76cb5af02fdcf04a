//! Transactional unit of work for multi-table sync writes.
//!
//! Each port method is exactly one SQLite transaction built from the same
//! synchronous SQL helpers the repositories use. The orchestrator's failure
//! path never comes through here; failed history rows are written through
//! the history repository so they commit independently of the rollback.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fieldlink_core::sync::ports::SyncUnitOfWork;
use fieldlink_domain::{
    ConflictResolution, CrmMapping, CrmReference, CrmType, FieldLinkError, MappingOrigin,
    ResolutionChoice, Result,
};
use rusqlite::{params, Connection};
use tokio::task;

use super::conflict_repository::insert_resolution;
use super::manager::{map_join_error, map_sql_error, DbManager};
use super::mapping_repository::upsert_mapping;
use super::report_repository::upsert_slot;
use super::sync_history_repository::complete_attempt;

/// SQLite-backed sync unit of work.
pub struct SqliteSyncUnitOfWork {
    db: Arc<DbManager>,
}

impl SqliteSyncUnitOfWork {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncUnitOfWork for SqliteSyncUnitOfWork {
    async fn commit_create(
        &self,
        report_id: &str,
        crm_type: CrmType,
        origin: MappingOrigin,
        reference: &CrmReference,
        history_id: i64,
        result_json: &str,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();
        let reference = reference.clone();
        let result_json = result_json.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let now = Utc::now().timestamp();
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;

            upsert_mapping(
                &tx,
                &CrmMapping {
                    report_id: report_id.clone(),
                    crm_type,
                    crm_account_id: reference.account_id.clone(),
                    crm_account_name: Some(reference.account_name.clone()),
                    crm_opportunity_id: reference.opportunity_id.clone(),
                    crm_opportunity_name: Some(reference.opportunity_name.clone()),
                    crm_activity_id: reference.activity_id.clone(),
                    origin,
                    priority: 1,
                    created_at: now,
                    updated_at: now,
                },
            )?;
            mark_report_linked(&tx, &report_id, crm_type, now, true)?;
            upsert_slot(&tx, &report_id, crm_type.opportunity_slot(), &reference.opportunity_id)?;
            upsert_slot(&tx, &report_id, crm_type.account_slot(), &reference.account_id)?;
            complete_attempt(&tx, history_id, &result_json, now)?;

            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn commit_link(&self, mapping: &CrmMapping) -> Result<()> {
        let db = Arc::clone(&self.db);
        let mapping = mapping.clone();

        task::spawn_blocking(move || -> Result<()> {
            let now = Utc::now().timestamp();
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;

            upsert_mapping(&tx, &mapping)?;
            mark_report_linked(&tx, &mapping.report_id, mapping.crm_type, now, false)?;
            upsert_slot(
                &tx,
                &mapping.report_id,
                mapping.crm_type.opportunity_slot(),
                &mapping.crm_opportunity_id,
            )?;
            upsert_slot(
                &tx,
                &mapping.report_id,
                mapping.crm_type.account_slot(),
                &mapping.crm_account_id,
            )?;

            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn commit_resolutions(
        &self,
        report_id: &str,
        resolutions: &[ConflictResolution],
        resolved_at: i64,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();
        let resolutions = resolutions.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;

            for resolution in &resolutions {
                insert_resolution(&tx, &report_id, resolution, resolved_at)?;
                if resolution.resolution == ResolutionChoice::UseCrm {
                    if let Some(value) = &resolution.resolved_value {
                        upsert_slot(&tx, &report_id, &resolution.field_name, value)?;
                    }
                }
            }

            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

/// Flip the report's linkage columns. A create also marks the report synced;
/// a plain link leaves sync state alone.
fn mark_report_linked(
    conn: &Connection,
    report_id: &str,
    crm_type: CrmType,
    now: i64,
    synced: bool,
) -> Result<()> {
    let sql = if synced {
        "UPDATE reports
         SET crm_linked = 1, crm_type = ?2, sync_status = 'synced', sync_error = NULL,
             last_sync_date = ?3, updated_at = ?3
         WHERE id = ?1"
    } else {
        "UPDATE reports
         SET crm_linked = 1, crm_type = ?2, updated_at = ?3
         WHERE id = ?1"
    };
    let changed = conn
        .execute(sql, params![report_id, crm_type.as_str(), now])
        .map_err(map_sql_error)?;
    if changed == 0 {
        return Err(FieldLinkError::NotFound(format!("report not found: {report_id}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use fieldlink_core::sync::ports::{
        MappingRepository, ReportRepository, SyncHistoryRepository,
    };
    use fieldlink_domain::{
        AttemptStatus, Report, ReportSyncStatus, SyncAttempt, SyncDirection, SyncType,
    };
    use tempfile::TempDir;

    use super::*;
    use crate::database::{
        SqliteMappingRepository, SqliteReportRepository, SqliteSyncHistoryRepository,
    };

    struct Fixture {
        uow: SqliteSyncUnitOfWork,
        reports: SqliteReportRepository,
        mappings: SqliteMappingRepository,
        history: SqliteSyncHistoryRepository,
        _dir: TempDir,
    }

    async fn setup() -> Fixture {
        let dir = TempDir::new().expect("temp dir created");
        let db_path = dir.path().join("uow.db");

        let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        manager.run_migrations().expect("migrations run");

        Fixture {
            uow: SqliteSyncUnitOfWork::new(manager.clone()),
            reports: SqliteReportRepository::new(manager.clone()),
            mappings: SqliteMappingRepository::new(manager.clone()),
            history: SqliteSyncHistoryRepository::new(manager),
            _dir: dir,
        }
    }

    fn pending_report(id: &str) -> Report {
        Report {
            id: id.to_string(),
            user_id: "u-1".to_string(),
            report_date: "2025-06-01".to_string(),
            mode: None,
            slots: Default::default(),
            answers: vec![],
            crm_linked: false,
            crm_type: None,
            sync_status: ReportSyncStatus::Pending,
            sync_error: None,
            last_sync_date: None,
            created_at: 1_750_000_000,
            updated_at: 1_750_000_000,
        }
    }

    fn reference() -> CrmReference {
        CrmReference {
            account_id: "A1".to_string(),
            account_name: "Acme Corp".to_string(),
            opportunity_id: "O1".to_string(),
            opportunity_name: "Cloud Migration".to_string(),
            activity_id: Some("T1".to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commit_create_applies_all_writes_together() {
        let f = setup().await;
        f.reports.insert_report(&pending_report("r-1")).await.expect("seeded");
        let history_id = f
            .history
            .open(&SyncAttempt {
                report_id: "r-1".to_string(),
                crm_type: CrmType::Salesforce,
                sync_type: SyncType::Create,
                direction: SyncDirection::ToCrm,
                payload_json: None,
            })
            .await
            .expect("attempt opened");

        f.uow
            .commit_create(
                "r-1",
                CrmType::Salesforce,
                MappingOrigin::Manual,
                &reference(),
                history_id,
                r#"{"opportunity_id":"O1"}"#,
            )
            .await
            .expect("commit ok");

        let report = f.reports.get_report("r-1").await.expect("query ok").expect("found");
        assert!(report.crm_linked);
        assert_eq!(report.crm_type, Some(CrmType::Salesforce));
        assert_eq!(report.sync_status, ReportSyncStatus::Synced);
        assert_eq!(
            report.slots.get("salesforce_opportunity_id").map(String::as_str),
            Some("O1")
        );
        assert_eq!(report.slots.get("salesforce_account_id").map(String::as_str), Some("A1"));

        let mapping = f
            .mappings
            .find("r-1", CrmType::Salesforce)
            .await
            .expect("query ok")
            .expect("mapping exists");
        assert_eq!(mapping.crm_opportunity_id, "O1");

        let rows = f.history.list_for_report("r-1", 10).await.expect("list ok");
        assert_eq!(rows[0].status, AttemptStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commit_create_rolls_back_everything_when_one_write_fails() {
        let f = setup().await;
        f.reports.insert_report(&pending_report("r-1")).await.expect("seeded");

        // No open history row: the final write fails and the earlier
        // mapping/report writes must roll back with it.
        let err = f
            .uow
            .commit_create("r-1", CrmType::Salesforce, MappingOrigin::Manual, &reference(), 999, "{}")
            .await
            .expect_err("closed history row");
        assert!(matches!(err, FieldLinkError::NotFound(_)));

        let report = f.reports.get_report("r-1").await.expect("query ok").expect("found");
        assert!(!report.crm_linked);
        assert_eq!(report.sync_status, ReportSyncStatus::Pending);
        assert!(f
            .mappings
            .find("r-1", CrmType::Salesforce)
            .await
            .expect("query ok")
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commit_link_does_not_touch_sync_state() {
        let f = setup().await;
        f.reports.insert_report(&pending_report("r-1")).await.expect("seeded");

        let now = 1_750_000_100;
        f.uow
            .commit_link(&CrmMapping {
                report_id: "r-1".to_string(),
                crm_type: CrmType::Dynamics365,
                crm_account_id: "acc-1".to_string(),
                crm_account_name: None,
                crm_opportunity_id: "opp-1".to_string(),
                crm_opportunity_name: None,
                crm_activity_id: None,
                origin: MappingOrigin::Manual,
                priority: 1,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("link ok");

        let report = f.reports.get_report("r-1").await.expect("query ok").expect("found");
        assert!(report.crm_linked);
        assert_eq!(report.crm_type, Some(CrmType::Dynamics365));
        assert_eq!(report.sync_status, ReportSyncStatus::Pending);
        assert_eq!(
            report.slots.get("dynamics365_opportunity_id").map(String::as_str),
            Some("opp-1")
        );
        assert_eq!(report.slots.get("dynamics365_account_id").map(String::as_str), Some("acc-1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commit_resolutions_overwrites_slots_for_use_crm_only() {
        let f = setup().await;
        let mut report = pending_report("r-1");
        report.slots.insert("customer".to_string(), "Acme Corp".to_string());
        report.slots.insert("project".to_string(), "Cloud Migration".to_string());
        f.reports.insert_report(&report).await.expect("seeded");

        f.uow
            .commit_resolutions(
                "r-1",
                &[
                    ConflictResolution {
                        field_name: "customer".to_string(),
                        report_value: Some("Acme Corp".to_string()),
                        crm_value: Some("Acme Holdings".to_string()),
                        resolution: ResolutionChoice::UseCrm,
                        resolved_value: Some("Acme Holdings".to_string()),
                        resolved_by: "u-1".to_string(),
                    },
                    ConflictResolution {
                        field_name: "project".to_string(),
                        report_value: Some("Cloud Migration".to_string()),
                        crm_value: Some("Phase 2".to_string()),
                        resolution: ResolutionChoice::UseReport,
                        resolved_value: None,
                        resolved_by: "u-1".to_string(),
                    },
                ],
                1_750_000_200,
            )
            .await
            .expect("resolutions ok");

        let report = f.reports.get_report("r-1").await.expect("query ok").expect("found");
        assert_eq!(report.slots.get("customer").map(String::as_str), Some("Acme Holdings"));
        assert_eq!(report.slots.get("project").map(String::as_str), Some("Cloud Migration"));
    }
}
