//! Mapping, history and per-user sync configuration records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FieldLinkError;
use crate::types::report::CrmType;

/// How a report↔CRM mapping came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingOrigin {
    Manual,
    Automatic,
}

impl MappingOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
        }
    }
}

impl FromStr for MappingOrigin {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "automatic" => Ok(Self::Automatic),
            other => {
                Err(FieldLinkError::InvalidInput(format!("unknown mapping origin: {other}")))
            }
        }
    }
}

/// Association between one report and one remote CRM object graph.
///
/// At most one mapping exists per (report, CRM type) pair; `priority > 0`
/// marks the primary mapping when a report links to more than one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmMapping {
    pub report_id: String,
    pub crm_type: CrmType,
    pub crm_account_id: String,
    pub crm_account_name: Option<String>,
    pub crm_opportunity_id: String,
    pub crm_opportunity_name: Option<String>,
    pub crm_activity_id: Option<String>,
    pub origin: MappingOrigin,
    pub priority: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Kind of synchronization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Create,
    Append,
    Update,
    Link,
    Sync,
}

impl SyncType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Append => "append",
            Self::Update => "update",
            Self::Link => "link",
            Self::Sync => "sync",
        }
    }
}

impl FromStr for SyncType {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "append" => Ok(Self::Append),
            "update" => Ok(Self::Update),
            "link" => Ok(Self::Link),
            "sync" => Ok(Self::Sync),
            other => Err(FieldLinkError::InvalidInput(format!("unknown sync type: {other}"))),
        }
    }
}

/// Direction of a synchronization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    ToCrm,
    FromCrm,
}

impl SyncDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToCrm => "to_crm",
            Self::FromCrm => "from_crm",
        }
    }
}

impl FromStr for SyncDirection {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_crm" => Ok(Self::ToCrm),
            "from_crm" => Ok(Self::FromCrm),
            other => {
                Err(FieldLinkError::InvalidInput(format!("unknown sync direction: {other}")))
            }
        }
    }
}

/// Status of a sync history row.
///
/// Transitions only `Processing → Completed` or `Processing → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Processing,
    Completed,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for AttemptStatus {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => {
                Err(FieldLinkError::InvalidInput(format!("unknown attempt status: {other}")))
            }
        }
    }
}

/// Data needed to open a new sync history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAttempt {
    pub report_id: String,
    pub crm_type: CrmType,
    pub sync_type: SyncType,
    pub direction: SyncDirection,
    /// Serialized snapshot of the data sent/received.
    pub payload_json: Option<String>,
}

/// One immutable audit row per synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistory {
    pub id: i64,
    pub report_id: String,
    pub crm_type: CrmType,
    pub sync_type: SyncType,
    pub direction: SyncDirection,
    pub payload_json: Option<String>,
    pub status: AttemptStatus,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// How often automatic sync should run for a user/CRM pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFrequency {
    Realtime,
    Hourly,
    Daily,
    Weekly,
}

impl SyncFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

impl FromStr for SyncFrequency {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "realtime" => Ok(Self::Realtime),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => {
                Err(FieldLinkError::InvalidInput(format!("unknown sync frequency: {other}")))
            }
        }
    }
}

/// Default conflict handling for automatic sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    Manual,
    CrmPriority,
    ReportPriority,
    Newest,
}

impl ConflictPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::CrmPriority => "crm_priority",
            Self::ReportPriority => "report_priority",
            Self::Newest => "newest",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "crm_priority" => Ok(Self::CrmPriority),
            "report_priority" => Ok(Self::ReportPriority),
            "newest" => Ok(Self::Newest),
            other => {
                Err(FieldLinkError::InvalidInput(format!("unknown conflict policy: {other}")))
            }
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per (user, CRM type) automatic-sync preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmSyncConfig {
    pub user_id: String,
    pub crm_type: CrmType,
    pub auto_sync_enabled: bool,
    pub sync_frequency: SyncFrequency,
    /// Clock time for daily/weekly schedules, e.g. `"03:30"`.
    pub sync_time: Option<String>,
    pub conflict_resolution: ConflictPolicy,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CrmSyncConfig {
    /// System defaults used when a (user, CRM) pair has no stored row yet.
    pub fn defaults(user_id: &str, crm_type: CrmType, now: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
            crm_type,
            auto_sync_enabled: false,
            sync_frequency: SyncFrequency::Daily,
            sync_time: None,
            conflict_resolution: ConflictPolicy::Manual,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Full overwrite of the four mutable sync-config fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmSyncConfigUpdate {
    pub auto_sync_enabled: bool,
    pub sync_frequency: SyncFrequency,
    pub sync_time: Option<String>,
    pub conflict_resolution: ConflictPolicy,
}
