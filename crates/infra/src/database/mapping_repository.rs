//! CRM mapping repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use fieldlink_core::sync::ports::MappingRepository;
use fieldlink_domain::{CrmMapping, CrmType, Result};
use rusqlite::{params, Connection, Row};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};
use super::report_repository::parse_column;

/// SQLite-backed mapping repository.
pub struct SqliteMappingRepository {
    db: Arc<DbManager>,
}

impl SqliteMappingRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MappingRepository for SqliteMappingRepository {
    async fn upsert(&self, mapping: &CrmMapping) -> Result<()> {
        let db = Arc::clone(&self.db);
        let mapping = mapping.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            upsert_mapping(&conn, &mapping)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find(&self, report_id: &str, crm_type: CrmType) -> Result<Option<CrmMapping>> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();

        task::spawn_blocking(move || -> Result<Option<CrmMapping>> {
            let conn = db.get_connection()?;
            find_mapping(&conn, &report_id, crm_type)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_for_report(&self, report_id: &str) -> Result<Vec<CrmMapping>> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<CrmMapping>> {
            let conn = db.get_connection()?;
            let sql = format!(
                "SELECT {MAPPING_COLUMNS} FROM crm_mappings
                 WHERE report_id = ?1
                 ORDER BY priority DESC, crm_type ASC"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let mappings = stmt
                .query_map(params![report_id], map_mapping_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<CrmMapping>>>()
                .map_err(map_sql_error)?;
            Ok(mappings)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn delete(&self, report_id: &str, crm_type: CrmType) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let report_id = report_id.to_string();

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            let removed = conn
                .execute(
                    "DELETE FROM crm_mappings WHERE report_id = ?1 AND crm_type = ?2",
                    params![report_id, crm_type.as_str()],
                )
                .map_err(map_sql_error)?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// SQL operations (synchronous, shared with the unit of work)
// ============================================================================

const MAPPING_COLUMNS: &str = "report_id, crm_type, crm_account_id, crm_account_name,
                               crm_opportunity_id, crm_opportunity_name, crm_activity_id,
                               mapping_type, priority, created_at, updated_at";

pub(crate) fn upsert_mapping(conn: &Connection, mapping: &CrmMapping) -> Result<()> {
    conn.execute(
        "INSERT INTO crm_mappings (report_id, crm_type, crm_account_id, crm_account_name,
                                   crm_opportunity_id, crm_opportunity_name, crm_activity_id,
                                   mapping_type, priority, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT (report_id, crm_type) DO UPDATE SET
             crm_account_id = excluded.crm_account_id,
             crm_account_name = excluded.crm_account_name,
             crm_opportunity_id = excluded.crm_opportunity_id,
             crm_opportunity_name = excluded.crm_opportunity_name,
             crm_activity_id = excluded.crm_activity_id,
             mapping_type = excluded.mapping_type,
             priority = excluded.priority,
             updated_at = excluded.updated_at",
        params![
            mapping.report_id,
            mapping.crm_type.as_str(),
            mapping.crm_account_id,
            mapping.crm_account_name,
            mapping.crm_opportunity_id,
            mapping.crm_opportunity_name,
            mapping.crm_activity_id,
            mapping.origin.as_str(),
            mapping.priority,
            mapping.created_at,
            mapping.updated_at,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

pub(crate) fn find_mapping(
    conn: &Connection,
    report_id: &str,
    crm_type: CrmType,
) -> Result<Option<CrmMapping>> {
    let sql = format!(
        "SELECT {MAPPING_COLUMNS} FROM crm_mappings WHERE report_id = ?1 AND crm_type = ?2"
    );
    match conn.query_row(&sql, params![report_id, crm_type.as_str()], map_mapping_row) {
        Ok(mapping) => Ok(Some(mapping)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(err) => Err(map_sql_error(err)),
    }
}

fn map_mapping_row(row: &Row<'_>) -> rusqlite::Result<CrmMapping> {
    let crm_type: String = row.get(1)?;
    let origin: String = row.get(7)?;
    Ok(CrmMapping {
        report_id: row.get(0)?,
        crm_type: parse_column(1, &crm_type)?,
        crm_account_id: row.get(2)?,
        crm_account_name: row.get(3)?,
        crm_opportunity_id: row.get(4)?,
        crm_opportunity_name: row.get(5)?,
        crm_activity_id: row.get(6)?,
        origin: parse_column(7, &origin)?,
        priority: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use fieldlink_domain::MappingOrigin;
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteMappingRepository, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("mappings.db");

        let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        manager.run_migrations().expect("migrations run");

        let repo = SqliteMappingRepository::new(manager.clone());
        seed_report(&manager, "r-1");
        (repo, manager, temp_dir)
    }

    // crm_mappings carries a foreign key to reports.
    fn seed_report(manager: &Arc<DbManager>, id: &str) {
        let conn = manager.get_connection().expect("connection acquired");
        conn.execute(
            "INSERT INTO reports (id, user_id, report_date, created_at, updated_at)
             VALUES (?1, 'u-1', '2025-06-01', 0, 0)",
            params![id],
        )
        .expect("report seeded");
    }

    fn sample_mapping(report_id: &str, crm_type: CrmType, opportunity_id: &str) -> CrmMapping {
        CrmMapping {
            report_id: report_id.to_string(),
            crm_type,
            crm_account_id: "A1".to_string(),
            crm_account_name: Some("Acme Corp".to_string()),
            crm_opportunity_id: opportunity_id.to_string(),
            crm_opportunity_name: Some("Cloud Migration".to_string()),
            crm_activity_id: None,
            origin: MappingOrigin::Manual,
            priority: 1,
            created_at: 1_750_000_000,
            updated_at: 1_750_000_000,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_then_find_round_trips() {
        let (repo, _manager, _dir) = setup().await;

        let mapping = sample_mapping("r-1", CrmType::Salesforce, "O1");
        repo.upsert(&mapping).await.expect("upsert ok");

        let found = repo
            .find("r-1", CrmType::Salesforce)
            .await
            .expect("query ok")
            .expect("mapping found");
        assert_eq!(found, mapping);
        assert!(repo.find("r-1", CrmType::Dynamics365).await.expect("query ok").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_upsert_replaces_instead_of_duplicating() {
        let (repo, _manager, _dir) = setup().await;

        repo.upsert(&sample_mapping("r-1", CrmType::Salesforce, "O1")).await.expect("first");
        repo.upsert(&sample_mapping("r-1", CrmType::Salesforce, "O2")).await.expect("second");

        let mappings = repo.list_for_report("r-1").await.expect("list ok");
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].crm_opportunity_id, "O2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_orders_primary_mapping_first() {
        let (repo, _manager, _dir) = setup().await;

        let mut secondary = sample_mapping("r-1", CrmType::Dynamics365, "opp-1");
        secondary.priority = 0;
        repo.upsert(&secondary).await.expect("secondary");
        repo.upsert(&sample_mapping("r-1", CrmType::Salesforce, "O1")).await.expect("primary");

        let mappings = repo.list_for_report("r-1").await.expect("list ok");
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].crm_type, CrmType::Salesforce);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_reports_whether_a_mapping_existed() {
        let (repo, _manager, _dir) = setup().await;

        repo.upsert(&sample_mapping("r-1", CrmType::Salesforce, "O1")).await.expect("upsert ok");
        assert!(repo.delete("r-1", CrmType::Salesforce).await.expect("delete ok"));
        assert!(!repo.delete("r-1", CrmType::Salesforce).await.expect("second delete ok"));
    }
}
