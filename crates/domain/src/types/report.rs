//! Visit report aggregate and CRM linkage state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    SLOT_DYNAMICS365_ACCOUNT_ID, SLOT_DYNAMICS365_OPPORTUNITY_ID, SLOT_SALESFORCE_ACCOUNT_ID,
    SLOT_SALESFORCE_OPPORTUNITY_ID,
};
use crate::errors::FieldLinkError;

/// Supported CRM vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrmType {
    Salesforce,
    Dynamics365,
}

impl CrmType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Salesforce => "salesforce",
            Self::Dynamics365 => "dynamics365",
        }
    }

    /// Slot key that carries this vendor's opportunity foreign id.
    pub fn opportunity_slot(self) -> &'static str {
        match self {
            Self::Salesforce => SLOT_SALESFORCE_OPPORTUNITY_ID,
            Self::Dynamics365 => SLOT_DYNAMICS365_OPPORTUNITY_ID,
        }
    }

    /// Slot key that carries this vendor's account foreign id.
    pub fn account_slot(self) -> &'static str {
        match self {
            Self::Salesforce => SLOT_SALESFORCE_ACCOUNT_ID,
            Self::Dynamics365 => SLOT_DYNAMICS365_ACCOUNT_ID,
        }
    }
}

impl fmt::Display for CrmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrmType {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "salesforce" => Ok(Self::Salesforce),
            "dynamics365" => Ok(Self::Dynamics365),
            other => {
                Err(FieldLinkError::InvalidInput(format!("unsupported CRM type: {other}")))
            }
        }
    }
}

/// Synchronization state of a report against its target CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSyncStatus {
    Pending,
    Synced,
    Failed,
}

impl ReportSyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for ReportSyncStatus {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => {
                Err(FieldLinkError::InvalidInput(format!("unknown sync status: {other}")))
            }
        }
    }
}

/// One question/answer pair captured during the visit hearing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAnswer {
    pub question: String,
    pub answer: String,
}

/// A field-sales visit report.
///
/// The sync engine only reads report content and mutates the CRM linkage
/// fields (`crm_linked`, `crm_type`, `sync_status`, `sync_error`,
/// `last_sync_date`) plus vendor foreign-id slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub user_id: String,
    /// ISO date of the customer visit.
    pub report_date: String,
    /// Legacy CRM selector column; consulted only when `crm_type` is unset.
    pub mode: Option<String>,
    /// Free-form key/value slots (customer, project, budget, ...).
    pub slots: BTreeMap<String, String>,
    pub answers: Vec<ReportAnswer>,
    pub crm_linked: bool,
    pub crm_type: Option<CrmType>,
    pub sync_status: ReportSyncStatus,
    pub sync_error: Option<String>,
    pub last_sync_date: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Report {
    /// Slot value, with empty strings treated as absent.
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    /// The vendor opportunity foreign id for the given CRM, if linked.
    pub fn linked_opportunity_id(&self, crm_type: CrmType) -> Option<&str> {
        self.slot(crm_type.opportunity_slot())
    }

    /// Infer the target CRM from whichever vendor opportunity slot is set.
    ///
    /// Compatibility shim for rows written before `crm_type` was stored
    /// explicitly; Salesforce wins when both slots are populated.
    pub fn sniff_crm_type(&self) -> Option<CrmType> {
        if self.slot(SLOT_SALESFORCE_OPPORTUNITY_ID).is_some() {
            Some(CrmType::Salesforce)
        } else if self.slot(SLOT_DYNAMICS365_OPPORTUNITY_ID).is_some() {
            Some(CrmType::Dynamics365)
        } else {
            None
        }
    }
}
