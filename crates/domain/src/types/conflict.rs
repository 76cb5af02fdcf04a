//! Field-level divergence between report slots and CRM values.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FieldLinkError;

/// One detected divergence: both sides non-empty and unequal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field_name: String,
    pub report_value: String,
    pub crm_value: String,
}

/// Which side wins a resolved conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    UseCrm,
    UseReport,
    Manual,
}

impl ResolutionChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UseCrm => "use_crm",
            Self::UseReport => "use_report",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for ResolutionChoice {
    type Err = FieldLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "use_crm" => Ok(Self::UseCrm),
            "use_report" => Ok(Self::UseReport),
            "manual" => Ok(Self::Manual),
            other => {
                Err(FieldLinkError::InvalidInput(format!("unknown resolution choice: {other}")))
            }
        }
    }
}

/// Caller-supplied decision for one conflicting field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub field_name: String,
    pub report_value: Option<String>,
    pub crm_value: Option<String>,
    pub resolution: ResolutionChoice,
    pub resolved_value: Option<String>,
    pub resolved_by: String,
}

/// Persisted, immutable record of a resolved conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: i64,
    pub report_id: String,
    pub field_name: String,
    pub report_value: Option<String>,
    pub crm_value: Option<String>,
    pub resolution: ResolutionChoice,
    pub resolved_value: Option<String>,
    pub resolved_by: String,
    pub resolved_at: i64,
}
