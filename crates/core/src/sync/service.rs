//! Sync orchestrator: the one component that coordinates adapters,
//! persistence and the audit trail.
//!
//! Every public operation is request-scoped: it runs to completion within
//! the caller's task, acquires its database transaction through the
//! [`SyncUnitOfWork`] port and releases it before returning. The engine
//! imposes no timeout of its own; adapter and database clients own their
//! deadlines.
//!
//! Failure logging uses two separately committed units of work: the history
//! row opens (and closes as failed) outside the transaction that carries the
//! mapping/report writes, so the audit record survives a rollback.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use fieldlink_domain::constants::{BATCH_SYNC_LIMIT, MAX_ERROR_MESSAGE_LEN};
use fieldlink_domain::{
    AppendOutcome, BatchError, BatchOutcome, ConflictRecord, ConflictResolution, CrmLinkRequest,
    CrmMapping, CrmReference, CrmSearchResults, CrmSyncConfig, CrmSyncConfigUpdate, CrmType,
    DuplicateCandidate, DuplicateQuery, FieldConflict, FieldLinkError, MappingOrigin, NoteDraft,
    Report, Result, SyncAttempt, SyncDirection, SyncHistory, SyncType,
};
use tracing::{info, warn};

use crate::sync::conflicts;
use crate::sync::matcher::{calculate_similarity, SimilarityInput};
use crate::sync::ports::{
    AdapterRegistry, ConflictRepository, MappingRepository, ReportRepository,
    SyncConfigRepository, SyncHistoryRepository, SyncUnitOfWork,
};

/// Top-level CRM synchronization service.
pub struct CrmSyncService {
    adapters: AdapterRegistry,
    reports: Arc<dyn ReportRepository>,
    mappings: Arc<dyn MappingRepository>,
    history: Arc<dyn SyncHistoryRepository>,
    configs: Arc<dyn SyncConfigRepository>,
    conflicts: Arc<dyn ConflictRepository>,
    uow: Arc<dyn SyncUnitOfWork>,
    batch_limit: usize,
}

impl CrmSyncService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapters: AdapterRegistry,
        reports: Arc<dyn ReportRepository>,
        mappings: Arc<dyn MappingRepository>,
        history: Arc<dyn SyncHistoryRepository>,
        configs: Arc<dyn SyncConfigRepository>,
        conflicts: Arc<dyn ConflictRepository>,
        uow: Arc<dyn SyncUnitOfWork>,
    ) -> Self {
        Self {
            adapters,
            reports,
            mappings,
            history,
            configs,
            conflicts,
            uow,
            batch_limit: BATCH_SYNC_LIMIT,
        }
    }

    /// Override the batch fetch bound (defaults to 50).
    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit.min(BATCH_SYNC_LIMIT).max(1);
        self
    }

    /// Project a report into a fresh CRM account/opportunity/activity graph.
    ///
    /// On success the mapping upsert, report linkage flags, vendor
    /// foreign-id slots and history completion commit in one transaction.
    /// On any failure nothing of that survives, but a durable failed
    /// history row does.
    pub async fn create_in_crm(
        &self,
        report_id: &str,
        crm_type: CrmType,
        user_id: &str,
    ) -> Result<CrmReference> {
        let adapter = self.adapters.get(crm_type)?;
        let report = self.load_report(report_id).await?;

        let attempt = SyncAttempt {
            report_id: report_id.to_string(),
            crm_type,
            sync_type: SyncType::Create,
            direction: SyncDirection::ToCrm,
            payload_json: Some(snapshot_json(&report)?),
        };
        let history_id = self.open_attempt(&attempt).await?;

        match adapter.create_in_crm(user_id, &report).await {
            Ok(reference) => {
                let result_json = to_json(&reference)?;
                match self
                    .uow
                    .commit_create(
                        report_id,
                        crm_type,
                        MappingOrigin::Manual,
                        &reference,
                        history_id,
                        &result_json,
                    )
                    .await
                {
                    Ok(()) => {
                        info!(
                            report_id,
                            crm = %crm_type,
                            opportunity_id = %reference.opportunity_id,
                            "report created in CRM"
                        );
                        Ok(reference)
                    }
                    Err(err) => {
                        warn!(report_id, crm = %crm_type, error = %err, "CRM create commit failed");
                        self.close_attempt_failed(history_id, &err).await;
                        Err(err)
                    }
                }
            }
            Err(err) => {
                warn!(report_id, crm = %crm_type, error = %err, "CRM create failed");
                self.close_attempt_failed(history_id, &err).await;
                Err(err)
            }
        }
    }

    /// Append the report as a note on its already-linked opportunity.
    ///
    /// Failure is recorded on the report itself (`sync_status=failed`,
    /// `sync_error`); there is no rollback on this path, so retrying is
    /// always safe locally. The remote note write is at-least-once across
    /// retries.
    pub async fn append_to_crm(&self, report_id: &str, user_id: &str) -> Result<AppendOutcome> {
        let report = self.load_report(report_id).await?;

        // Stored crm_type is the selector; slot sniffing is a migration
        // compatibility shim for rows that predate the column.
        let crm_type = report
            .crm_type
            .or_else(|| report.sniff_crm_type())
            .ok_or_else(|| no_opportunity_linked(report_id))?;

        let opportunity_id = match report.linked_opportunity_id(crm_type) {
            Some(id) => id.to_string(),
            None => self
                .mappings
                .find(report_id, crm_type)
                .await?
                .map(|mapping| mapping.crm_opportunity_id)
                .ok_or_else(|| no_opportunity_linked(report_id))?,
        };
        let adapter = self.adapters.get(crm_type)?;

        let attempt = SyncAttempt {
            report_id: report_id.to_string(),
            crm_type,
            sync_type: SyncType::Append,
            direction: SyncDirection::ToCrm,
            payload_json: Some(snapshot_json(&report)?),
        };
        let history_id = self.open_attempt(&attempt).await?;

        let note = NoteDraft {
            title: format!("Visit report {}", report.report_date),
            body: adapter.format_report(&report),
        };

        match adapter.add_note_to_opportunity(user_id, &opportunity_id, &note).await {
            Ok(note_ref) => {
                let outcome = AppendOutcome { crm_type, opportunity_id, note_id: note_ref.id };
                if let Err(err) = self.reports.mark_synced(report_id, Utc::now().timestamp()).await
                {
                    self.close_attempt_failed(history_id, &err).await;
                    return Err(err);
                }
                self.history.mark_completed(history_id, &to_json(&outcome)?).await?;
                info!(report_id, crm = %crm_type, note_id = %outcome.note_id, "report appended to CRM");
                Ok(outcome)
            }
            Err(err) => {
                warn!(report_id, crm = %crm_type, error = %err, "CRM append failed");
                let failed_at = Utc::now().timestamp();
                if let Err(mark_err) = self
                    .reports
                    .mark_sync_failed(report_id, &truncate_error(err.detail()), failed_at)
                    .await
                {
                    warn!(report_id, error = %mark_err, "failed to mark report sync failure");
                }
                self.close_attempt_failed(history_id, &err).await;
                Err(err)
            }
        }
    }

    /// Associate a report with an existing remote opportunity.
    ///
    /// Purely local bookkeeping after a prior search; re-linking the same
    /// CRM replaces the previous mapping instead of duplicating it.
    pub async fn link_to_crm(
        &self,
        report_id: &str,
        link: &CrmLinkRequest,
        user_id: &str,
    ) -> Result<()> {
        let _ = self.load_report(report_id).await?;

        let now = Utc::now().timestamp();
        let mapping = CrmMapping {
            report_id: report_id.to_string(),
            crm_type: link.crm_type,
            crm_account_id: link.account_id.clone(),
            crm_account_name: link.account_name.clone(),
            crm_opportunity_id: link.opportunity_id.clone(),
            crm_opportunity_name: link.opportunity_name.clone(),
            crm_activity_id: None,
            origin: MappingOrigin::Manual,
            priority: 1,
            created_at: now,
            updated_at: now,
        };
        self.uow.commit_link(&mapping).await?;

        info!(
            report_id,
            user_id,
            crm = %link.crm_type,
            opportunity_id = %link.opportunity_id,
            "report linked to existing CRM opportunity"
        );
        Ok(())
    }

    /// Remove the mapping for one CRM; clears the report's linkage flags
    /// when the last mapping goes away. Returns whether a mapping existed.
    pub async fn unlink_from_crm(&self, report_id: &str, crm_type: CrmType) -> Result<bool> {
        let removed = self.mappings.delete(report_id, crm_type).await?;
        if removed && self.mappings.list_for_report(report_id).await?.is_empty() {
            self.reports.clear_crm_link(report_id).await?;
        }
        if removed {
            info!(report_id, crm = %crm_type, "report unlinked from CRM");
        }
        Ok(removed)
    }

    /// Pass-through search against one vendor. No local state is touched;
    /// term validation belongs to the API boundary above this engine.
    pub async fn search_crm_records(
        &self,
        term: &str,
        crm_type: CrmType,
        user_id: &str,
    ) -> Result<CrmSearchResults> {
        let adapter = self.adapters.get(crm_type)?;
        let accounts = adapter.search_accounts(user_id, term).await?;
        let opportunities = adapter.search_opportunities(user_id, term, None).await?;
        Ok(CrmSearchResults { accounts, opportunities })
    }

    /// Score possible remote duplicates for a not-yet-synced report.
    ///
    /// Two remote searches, then the account × opportunity cross-product
    /// filtered to pairs where the opportunity belongs to the account,
    /// scored and sorted by descending confidence. Writes nothing.
    pub async fn check_duplicates(
        &self,
        query: &DuplicateQuery,
        crm_type: CrmType,
        user_id: &str,
    ) -> Result<Vec<DuplicateCandidate>> {
        let adapter = self.adapters.get(crm_type)?;

        let accounts = match trimmed(query.customer.as_deref()) {
            Some(customer) => adapter.search_accounts(user_id, customer).await?,
            None => Vec::new(),
        };
        let opportunities = match trimmed(query.project.as_deref()) {
            Some(project) => adapter.search_opportunities(user_id, project, None).await?,
            None => Vec::new(),
        };

        let input = SimilarityInput {
            customer: trimmed(query.customer.as_deref()),
            project: trimmed(query.project.as_deref()),
            budget: query.budget.as_deref().and_then(|b| adapter.parse_amount(b)),
        };

        let mut candidates = Vec::new();
        for account in &accounts {
            for opportunity in &opportunities {
                if opportunity.account_id.as_deref() != Some(account.id.as_str()) {
                    continue;
                }
                candidates.push(DuplicateCandidate {
                    confidence: calculate_similarity(&input, account, opportunity),
                    account: account.clone(),
                    opportunity: opportunity.clone(),
                    crm_type,
                });
            }
        }
        candidates.sort_by(|a, b| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(candidates)
    }

    /// Reprocess the user's pending/failed reports against one CRM.
    ///
    /// Strictly sequential; a per-report failure is attributed in the
    /// outcome and never aborts the batch. Only the candidate-selection
    /// query itself can fail the whole call.
    pub async fn batch_sync(&self, user_id: &str, crm_type: CrmType) -> Result<BatchOutcome> {
        let candidates =
            self.reports.find_batch_candidates(user_id, crm_type, self.batch_limit).await?;

        let mut outcome = BatchOutcome { total: candidates.len(), ..BatchOutcome::default() };
        for report in candidates {
            let result = match self.mappings.find(&report.id, crm_type).await {
                Ok(Some(_)) => self.append_to_crm(&report.id, user_id).await.map(|_| ()),
                Ok(None) => self.create_in_crm(&report.id, crm_type, user_id).await.map(|_| ()),
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => outcome.success += 1,
                Err(err) => {
                    outcome.failed += 1;
                    outcome.errors.push(BatchError {
                        report_id: report.id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            user_id,
            crm = %crm_type,
            total = outcome.total,
            success = outcome.success,
            failed = outcome.failed,
            "batch sync finished"
        );
        Ok(outcome)
    }

    /// Read-only field-by-field diff between report slots and CRM values.
    pub async fn detect_conflicts(
        &self,
        report_id: &str,
        crm_values: &BTreeMap<String, String>,
    ) -> Result<Vec<FieldConflict>> {
        let report = self.load_report(report_id).await?;
        Ok(conflicts::detect_conflicts(&report.slots, crm_values))
    }

    /// Persist conflict decisions; `use_crm` resolutions overwrite the
    /// report slot. All resolutions commit in one transaction.
    pub async fn resolve_conflicts(
        &self,
        report_id: &str,
        resolutions: &[ConflictResolution],
    ) -> Result<()> {
        let _ = self.load_report(report_id).await?;
        if resolutions.is_empty() {
            return Ok(());
        }
        self.uow.commit_resolutions(report_id, resolutions, Utc::now().timestamp()).await?;
        info!(report_id, count = resolutions.len(), "conflicts resolved");
        Ok(())
    }

    /// Read-or-create-default per (user, CRM) sync preferences.
    pub async fn get_sync_config(&self, user_id: &str, crm_type: CrmType) -> Result<CrmSyncConfig> {
        self.configs.get_or_create(user_id, crm_type).await
    }

    /// Full overwrite of the mutable sync preference fields; the row must
    /// already exist (callers go through the getter first).
    pub async fn update_sync_config(
        &self,
        user_id: &str,
        crm_type: CrmType,
        update: &CrmSyncConfigUpdate,
    ) -> Result<CrmSyncConfig> {
        self.configs.update(user_id, crm_type, update).await
    }

    /// Recent audit rows for a report.
    pub async fn sync_history(&self, report_id: &str, limit: usize) -> Result<Vec<SyncHistory>> {
        self.history.list_for_report(report_id, limit).await
    }

    /// Resolved-conflict audit records for a report.
    pub async fn resolved_conflicts(&self, report_id: &str) -> Result<Vec<ConflictRecord>> {
        self.conflicts.list_for_report(report_id).await
    }

    async fn load_report(&self, report_id: &str) -> Result<Report> {
        self.reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| FieldLinkError::NotFound(format!("report not found: {report_id}")))
    }

    /// Open the audit row in its own committed write; if even that fails,
    /// fall back to a single open-and-closed failure record.
    async fn open_attempt(&self, attempt: &SyncAttempt) -> Result<i64> {
        match self.history.open(attempt).await {
            Ok(id) => Ok(id),
            Err(err) => {
                if let Err(log_err) = self.history.record_failure(attempt, err.detail()).await {
                    warn!(
                        report_id = %attempt.report_id,
                        error = %log_err,
                        "failed to record sync attempt failure"
                    );
                }
                Err(err)
            }
        }
    }

    /// Best effort: the audit write must never mask the original error.
    async fn close_attempt_failed(&self, history_id: i64, err: &FieldLinkError) {
        if let Err(log_err) =
            self.history.mark_failed(history_id, &truncate_error(err.detail())).await
        {
            warn!(history_id, error = %log_err, "failed to close sync attempt as failed");
        }
    }
}

fn no_opportunity_linked(report_id: &str) -> FieldLinkError {
    FieldLinkError::NotFound(format!("no CRM opportunity linked for report {report_id}"))
}

fn snapshot_json(report: &Report) -> Result<String> {
    serde_json::to_string(report)
        .map_err(|e| FieldLinkError::Internal(format!("failed to serialize report snapshot: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| FieldLinkError::Internal(format!("failed to serialize sync result: {e}")))
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_MESSAGE_LEN {
        return message.to_string();
    }
    let mut truncated =
        message.chars().take(MAX_ERROR_MESSAGE_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}
