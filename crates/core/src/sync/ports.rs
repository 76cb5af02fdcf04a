//! Port interfaces for sync operations

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fieldlink_domain::{
    AccountDraft, ActivityDraft, ConflictRecord, ConflictResolution, CrmAccount, CrmActivityRef,
    CrmMapping, CrmNoteRef, CrmOpportunity, CrmReference, CrmSyncConfig, CrmSyncConfigUpdate,
    CrmType, FieldLinkError, MappingOrigin, NoteDraft, OpportunityDraft, Report, Result,
    SyncAttempt, SyncHistory,
};

/// Vendor CRM adapter contract.
///
/// One implementation per CRM vendor (Salesforce, Dynamics 365). The adapter
/// owns all vendor-specific concerns: HTTP calls, auth, field-name casing and
/// value parsing. Any remote failure must surface as
/// [`FieldLinkError::Adapter`] carrying the vendor message verbatim so the
/// orchestrator can persist it into the audit trail.
#[async_trait]
pub trait CrmAdapter: Send + Sync {
    /// Which vendor this adapter talks to.
    fn kind(&self) -> CrmType;

    /// Find an account by name or create it if absent.
    async fn find_or_create_account(
        &self,
        user_id: &str,
        draft: &AccountDraft,
    ) -> Result<CrmAccount>;

    /// Create an opportunity under an existing account.
    async fn create_opportunity(
        &self,
        user_id: &str,
        draft: &OpportunityDraft,
    ) -> Result<CrmOpportunity>;

    /// Create an activity attached to an opportunity.
    async fn create_activity(
        &self,
        user_id: &str,
        draft: &ActivityDraft,
    ) -> Result<CrmActivityRef>;

    /// Append a note to an existing opportunity.
    ///
    /// Not idempotent across retries unless the vendor API supports
    /// idempotency keys; callers get at-least-once semantics on the remote
    /// side.
    async fn add_note_to_opportunity(
        &self,
        user_id: &str,
        opportunity_id: &str,
        note: &NoteDraft,
    ) -> Result<CrmNoteRef>;

    /// Search accounts by free text.
    async fn search_accounts(&self, user_id: &str, term: &str) -> Result<Vec<CrmAccount>>;

    /// Search opportunities by free text, optionally scoped to an account.
    async fn search_opportunities(
        &self,
        user_id: &str,
        term: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<CrmOpportunity>>;

    /// Parse a vendor/locale-specific amount string ("¥1,000,000").
    fn parse_amount(&self, text: &str) -> Option<f64>;

    /// Parse a free-form schedule phrase into an ISO date, if possible.
    fn parse_schedule_date(&self, text: &str) -> Option<String>;

    /// Render the report as a human-readable description blob.
    fn format_report(&self, report: &Report) -> String;

    /// Project a report into a fresh account/opportunity/activity graph.
    ///
    /// Provided composition over the granular operations; vendors only
    /// override this when they can create the whole graph in one call.
    async fn create_in_crm(&self, user_id: &str, report: &Report) -> Result<CrmReference> {
        let customer = report.slot("customer").ok_or_else(|| {
            FieldLinkError::InvalidInput(format!(
                "report {} has no customer to create a CRM account from",
                report.id
            ))
        })?;

        let account = self
            .find_or_create_account(
                user_id,
                &AccountDraft {
                    name: customer.to_string(),
                    industry: report.slot("industry").map(str::to_string),
                },
            )
            .await?;

        let description = self.format_report(report);
        let opportunity_name = report
            .slot("project")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{customer} {}", report.report_date));

        let opportunity = self
            .create_opportunity(
                user_id,
                &OpportunityDraft {
                    name: opportunity_name,
                    account_id: account.id.clone(),
                    amount: report.slot("budget").and_then(|b| self.parse_amount(b)),
                    close_date: report.slot("schedule").and_then(|s| self.parse_schedule_date(s)),
                    description: Some(description.clone()),
                },
            )
            .await?;

        let activity = self
            .create_activity(
                user_id,
                &ActivityDraft {
                    subject: format!("Visit report {}", report.report_date),
                    description: Some(description),
                    activity_date: Some(report.report_date.clone()),
                    opportunity_id: opportunity.id.clone(),
                },
            )
            .await?;

        Ok(CrmReference {
            account_id: account.id,
            account_name: account.name,
            opportunity_id: opportunity.id,
            opportunity_name: opportunity.name,
            activity_id: Some(activity.id),
        })
    }
}

/// Registry of vendor adapters keyed by CRM type.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<CrmType, Arc<dyn CrmAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own [`CrmAdapter::kind`].
    pub fn register(&mut self, adapter: Arc<dyn CrmAdapter>) -> &mut Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    /// Look up the adapter for a CRM type.
    pub fn get(&self, crm_type: CrmType) -> Result<Arc<dyn CrmAdapter>> {
        self.adapters.get(&crm_type).cloned().ok_or_else(|| {
            FieldLinkError::Config(format!("no adapter registered for CRM type: {crm_type}"))
        })
    }
}

/// Trait for reading reports and updating their CRM-linkage fields.
///
/// The wider reporting product owns the rest of the report lifecycle; the
/// sync engine only reads the aggregate and flips linkage/sync state.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Load the full report aggregate (slots and Q&A answers included).
    async fn get_report(&self, report_id: &str) -> Result<Option<Report>>;

    /// Insert a full report aggregate.
    async fn insert_report(&self, report: &Report) -> Result<()>;

    /// Reports eligible for batch sync: owned by the user, status pending or
    /// failed, targeting the given CRM (explicit `crm_type`, or the legacy
    /// `mode` column when `crm_type` was never stored), oldest first.
    async fn find_batch_candidates(
        &self,
        user_id: &str,
        crm_type: CrmType,
        limit: usize,
    ) -> Result<Vec<Report>>;

    /// Mark a report synced and clear any stored sync error.
    async fn mark_synced(&self, report_id: &str, synced_at: i64) -> Result<()>;

    /// Record an append/batch failure on the report itself.
    async fn mark_sync_failed(&self, report_id: &str, error: &str, failed_at: i64) -> Result<()>;

    /// Drop the CRM linkage flags after the last mapping is removed.
    async fn clear_crm_link(&self, report_id: &str) -> Result<()>;
}

/// Trait for managing report↔CRM mappings.
#[async_trait]
pub trait MappingRepository: Send + Sync {
    /// Insert or replace the mapping for its (report, CRM type) pair.
    async fn upsert(&self, mapping: &CrmMapping) -> Result<()>;

    /// Mapping for one (report, CRM type) pair, if any.
    async fn find(&self, report_id: &str, crm_type: CrmType) -> Result<Option<CrmMapping>>;

    /// All mappings for a report, primary (highest priority) first.
    async fn list_for_report(&self, report_id: &str) -> Result<Vec<CrmMapping>>;

    /// Explicit unlink; returns whether a mapping existed.
    async fn delete(&self, report_id: &str, crm_type: CrmType) -> Result<bool>;
}

/// Trait for the append-only sync audit trail.
#[async_trait]
pub trait SyncHistoryRepository: Send + Sync {
    /// Open a new attempt row with status `processing`; returns its id.
    async fn open(&self, attempt: &SyncAttempt) -> Result<i64>;

    /// Close an open attempt as completed with its result payload.
    async fn mark_completed(&self, history_id: i64, result_json: &str) -> Result<()>;

    /// Close an open attempt as failed with the error message.
    async fn mark_failed(&self, history_id: i64, error: &str) -> Result<()>;

    /// Record an attempt that failed before its row could be opened.
    async fn record_failure(&self, attempt: &SyncAttempt, error: &str) -> Result<i64>;

    /// Most recent attempts for a report.
    async fn list_for_report(&self, report_id: &str, limit: usize) -> Result<Vec<SyncHistory>>;
}

/// Trait for per (user, CRM type) sync preferences.
#[async_trait]
pub trait SyncConfigRepository: Send + Sync {
    /// Read the stored config, lazily inserting system defaults on first
    /// read. A second call never inserts again.
    async fn get_or_create(&self, user_id: &str, crm_type: CrmType) -> Result<CrmSyncConfig>;

    /// Full overwrite of the mutable fields. Update, not upsert: fails with
    /// `NotFound` when no row exists for the pair.
    async fn update(
        &self,
        user_id: &str,
        crm_type: CrmType,
        update: &CrmSyncConfigUpdate,
    ) -> Result<CrmSyncConfig>;
}

/// Trait for reading resolved-conflict audit records.
#[async_trait]
pub trait ConflictRepository: Send + Sync {
    async fn list_for_report(&self, report_id: &str) -> Result<Vec<ConflictRecord>>;
}

/// Transaction boundary for multi-table sync writes.
///
/// Each method is one database transaction: every write commits or none do.
/// The sync-history failure record is deliberately NOT part of these
/// transactions; the orchestrator writes it through
/// [`SyncHistoryRepository`] in a separately committed unit so the audit
/// trail survives a rollback.
#[async_trait]
pub trait SyncUnitOfWork: Send + Sync {
    /// Local side effects of a successful CRM create: mapping upsert, report
    /// linkage flags, vendor foreign-id slots, and completion of the open
    /// history row.
    async fn commit_create(
        &self,
        report_id: &str,
        crm_type: CrmType,
        origin: MappingOrigin,
        reference: &CrmReference,
        history_id: i64,
        result_json: &str,
    ) -> Result<()>;

    /// Local side effects of linking to an existing remote opportunity:
    /// mapping upsert, report linkage flags, vendor foreign-id slots.
    async fn commit_link(&self, mapping: &CrmMapping) -> Result<()>;

    /// Persist conflict resolutions and, for `use_crm` decisions, overwrite
    /// the named report slot with the resolved value. All or nothing.
    async fn commit_resolutions(
        &self,
        report_id: &str,
        resolutions: &[ConflictResolution],
        resolved_at: i64,
    ) -> Result<()>;
}
