//! Field-by-field divergence detection between report slots and CRM values.

use std::collections::BTreeMap;

use fieldlink_domain::constants::CONFLICT_FIELDS;
use fieldlink_domain::FieldConflict;

/// Compare the fixed conflict field set between report slots and CRM values.
///
/// A field conflicts only when both sides carry a non-empty value and the
/// values are not equal (exact string comparison after trimming). A field
/// absent or blank on either side is missing data, not a conflict.
pub fn detect_conflicts(
    slots: &BTreeMap<String, String>,
    crm_values: &BTreeMap<String, String>,
) -> Vec<FieldConflict> {
    CONFLICT_FIELDS
        .iter()
        .filter_map(|field| {
            let report_value = present(slots.get(*field))?;
            let crm_value = present(crm_values.get(*field))?;
            if report_value == crm_value {
                return None;
            }
            Some(FieldConflict {
                field_name: (*field).to_string(),
                report_value: report_value.to_string(),
                crm_value: crm_value.to_string(),
            })
        })
        .collect()
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}
