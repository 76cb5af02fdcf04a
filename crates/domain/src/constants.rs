//! Domain constants shared by the sync engine.

/// Maximum number of reports a single batch sync run may process.
///
/// Bounds batch runtime; the selection query never fetches more than this.
pub const BATCH_SYNC_LIMIT: usize = 50;

/// Report slot fields compared against CRM values during conflict detection.
pub const CONFLICT_FIELDS: [&str; 7] =
    ["customer", "project", "budget", "schedule", "participants", "location", "next_action"];

/// Slot key holding the Salesforce opportunity foreign id.
pub const SLOT_SALESFORCE_OPPORTUNITY_ID: &str = "salesforce_opportunity_id";

/// Slot key holding the Salesforce account foreign id.
pub const SLOT_SALESFORCE_ACCOUNT_ID: &str = "salesforce_account_id";

/// Slot key holding the Dynamics 365 opportunity foreign id.
pub const SLOT_DYNAMICS365_OPPORTUNITY_ID: &str = "dynamics365_opportunity_id";

/// Slot key holding the Dynamics 365 account foreign id.
pub const SLOT_DYNAMICS365_ACCOUNT_ID: &str = "dynamics365_account_id";

/// Maximum length of an error message persisted to sync history rows.
pub const MAX_ERROR_MESSAGE_LEN: usize = 1024;
