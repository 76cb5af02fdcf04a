//! Normalized CRM-side shapes exchanged with vendor adapters.
//!
//! Vendor field-name translation (Salesforce PascalCase, Dynamics 365
//! lowercase) is entirely the adapter's responsibility; everything here is
//! already normalized.

use serde::{Deserialize, Serialize};

use crate::types::report::CrmType;

/// A remote CRM account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmAccount {
    pub id: String,
    pub name: String,
    pub industry: Option<String>,
}

/// A remote CRM opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmOpportunity {
    pub id: String,
    pub name: String,
    /// Reference to the owning account, when the vendor returns one.
    pub account_id: Option<String>,
    pub amount: Option<f64>,
    pub close_date: Option<String>,
    pub stage: Option<String>,
}

/// The object graph created on the CRM side for one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmReference {
    pub account_id: String,
    pub account_name: String,
    pub opportunity_id: String,
    pub opportunity_name: String,
    pub activity_id: Option<String>,
}

/// Input for account find-or-create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDraft {
    pub name: String,
    pub industry: Option<String>,
}

/// Input for opportunity creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityDraft {
    pub name: String,
    pub account_id: String,
    pub amount: Option<f64>,
    pub close_date: Option<String>,
    pub description: Option<String>,
}

/// Input for activity creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDraft {
    pub subject: String,
    pub description: Option<String>,
    pub activity_date: Option<String>,
    pub opportunity_id: String,
}

/// Input for appending a note to an opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub body: String,
}

/// Remote activity handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmActivityRef {
    pub id: String,
}

/// Remote note handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmNoteRef {
    pub id: String,
}

/// Combined account/opportunity search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmSearchResults {
    pub accounts: Vec<CrmAccount>,
    pub opportunities: Vec<CrmOpportunity>,
}

/// User-chosen remote objects to associate with a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmLinkRequest {
    pub crm_type: CrmType,
    pub account_id: String,
    pub account_name: Option<String>,
    pub opportunity_id: String,
    pub opportunity_name: Option<String>,
}

/// Report-side fields used for duplicate checking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateQuery {
    pub customer: Option<String>,
    pub project: Option<String>,
    /// Raw budget text; parsed by the vendor adapter.
    pub budget: Option<String>,
}

/// One scored duplicate candidate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    /// Similarity confidence in `[0, 100]`.
    pub confidence: f64,
    pub account: CrmAccount,
    pub opportunity: CrmOpportunity,
    pub crm_type: CrmType,
}

/// Result of appending a visit note to an existing opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub crm_type: CrmType,
    pub opportunity_id: String,
    pub note_id: String,
}

/// Per-report failure inside a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub report_id: String,
    pub error: String,
}

/// Accounting for one batch sync run; `total == success + failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
}
