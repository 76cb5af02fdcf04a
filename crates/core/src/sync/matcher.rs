//! Similarity scoring between report fields and CRM candidate pairs.
//!
//! Weighted additive scheme: customer↔account name up to 10 points,
//! project↔opportunity name up to 10, budget↔amount up to 5. The score is
//! normalized against the categories that were actually comparable, so a
//! missing budget shrinks the denominator instead of dragging the score
//! down.

use fieldlink_domain::{CrmAccount, CrmOpportunity};

const NAME_EXACT: f64 = 10.0;
const NAME_PARTIAL: f64 = 5.0;
const BUDGET_CLOSE: f64 = 5.0;
const BUDGET_NEAR: f64 = 3.0;

/// Report-side comparison fields for duplicate scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityInput<'a> {
    pub customer: Option<&'a str>,
    pub project: Option<&'a str>,
    pub budget: Option<f64>,
}

/// Score how well a candidate account/opportunity pair matches a report.
///
/// Deterministic and side-effect free; always returns a value in
/// `[0.0, 100.0]`. Returns 0 when no category was comparable at all.
pub fn calculate_similarity(
    input: &SimilarityInput<'_>,
    account: &CrmAccount,
    opportunity: &CrmOpportunity,
) -> f64 {
    let mut earned = 0.0;
    let mut applicable = 0.0;

    if let (Some(customer), Some(account_name)) =
        (non_empty(input.customer), non_empty(Some(account.name.as_str())))
    {
        applicable += NAME_EXACT;
        earned += name_score(customer, account_name);
    }

    if let (Some(project), Some(opportunity_name)) =
        (non_empty(input.project), non_empty(Some(opportunity.name.as_str())))
    {
        applicable += NAME_EXACT;
        earned += name_score(project, opportunity_name);
    }

    if let (Some(budget), Some(amount)) = (input.budget, opportunity.amount) {
        applicable += BUDGET_CLOSE;
        earned += budget_score(budget, amount);
    }

    if applicable == 0.0 {
        return 0.0;
    }

    (earned / applicable) * 100.0
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Exact case-insensitive match scores full points, substring either way
/// scores half, anything else zero.
fn name_score(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a == b {
        NAME_EXACT
    } else if a.contains(&b) || b.contains(&a) {
        NAME_PARTIAL
    } else {
        0.0
    }
}

/// Relative difference within 10% scores 5, within 30% scores 3.
fn budget_score(budget: f64, amount: f64) -> f64 {
    let scale = budget.abs().max(amount.abs());
    if scale == 0.0 {
        // Both zero: identical values.
        return BUDGET_CLOSE;
    }
    let relative = (budget - amount).abs() / scale;
    if relative <= 0.10 {
        BUDGET_CLOSE
    } else if relative <= 0.30 {
        BUDGET_NEAR
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    fn account(name: &str) -> CrmAccount {
        CrmAccount { id: "A1".into(), name: name.into(), industry: None }
    }

    fn opportunity(name: &str, amount: Option<f64>) -> CrmOpportunity {
        CrmOpportunity {
            id: "O1".into(),
            name: name.into(),
            account_id: Some("A1".into()),
            amount,
            close_date: None,
            stage: None,
        }
    }

    #[test]
    fn exact_names_without_budget_score_exactly_100() {
        let input = SimilarityInput {
            customer: Some("Acme Corp"),
            project: Some("Cloud Migration"),
            budget: None,
        };
        let score =
            calculate_similarity(&input, &account("acme corp"), &opportunity("CLOUD MIGRATION", None));
        assert_eq!(score, 100.0);
    }

    #[test]
    fn exact_names_and_close_budget_score_100() {
        // Scenario: ¥1,000,000 budget against a 1,000,000 amount.
        let input = SimilarityInput {
            customer: Some("Acme Corp"),
            project: Some("Cloud Migration"),
            budget: Some(1_000_000.0),
        };
        let score = calculate_similarity(
            &input,
            &account("Acme Corp"),
            &opportunity("Cloud Migration", Some(1_000_000.0)),
        );
        assert_eq!(score, 100.0);
    }

    #[test]
    fn substring_match_scores_half_points() {
        let input = SimilarityInput { customer: Some("Acme"), project: None, budget: None };
        let score = calculate_similarity(&input, &account("Acme Corp"), &opportunity("x", None));
        // Only the customer category applies: 5 of 10.
        assert_eq!(score, 50.0);
    }

    #[test]
    fn budget_within_thirty_percent_scores_three_of_five() {
        let input = SimilarityInput {
            customer: Some("Acme Corp"),
            project: Some("Cloud Migration"),
            budget: Some(1_250_000.0),
        };
        let score = calculate_similarity(
            &input,
            &account("Acme Corp"),
            &opportunity("Cloud Migration", Some(1_000_000.0)),
        );
        // (10 + 10 + 3) / 25 * 100
        assert_eq!(score, 92.0);
    }

    #[test]
    fn far_budget_scores_zero_in_its_category() {
        let input = SimilarityInput { customer: None, project: None, budget: Some(10.0) };
        let score =
            calculate_similarity(&input, &account("a"), &opportunity("b", Some(1_000_000.0)));
        assert_eq!(score, 0.0);
    }

    #[test]
    fn no_applicable_category_scores_zero() {
        let input = SimilarityInput::default();
        let score = calculate_similarity(&input, &account("Acme"), &opportunity("Deal", Some(1.0)));
        assert_eq!(score, 0.0);
    }

    #[test]
    fn blank_strings_are_not_comparable() {
        let input = SimilarityInput { customer: Some("   "), project: None, budget: None };
        let score = calculate_similarity(&input, &account("Acme"), &opportunity("Deal", None));
        assert_eq!(score, 0.0);
    }

    #[test]
    fn zero_budget_on_both_sides_counts_as_identical() {
        let input = SimilarityInput { customer: None, project: None, budget: Some(0.0) };
        let score = calculate_similarity(&input, &account("a"), &opportunity("b", Some(0.0)));
        assert_eq!(score, 100.0);
    }

    proptest! {
        #[test]
        fn score_is_always_within_bounds(
            customer in proptest::option::of("[a-zA-Z0-9 ]{0,24}"),
            project in proptest::option::of("[a-zA-Z0-9 ]{0,24}"),
            budget in proptest::option::of(-1.0e12..1.0e12_f64),
            account_name in "[a-zA-Z0-9 ]{0,24}",
            opportunity_name in "[a-zA-Z0-9 ]{0,24}",
            amount in proptest::option::of(-1.0e12..1.0e12_f64),
        ) {
            let input = SimilarityInput {
                customer: customer.as_deref(),
                project: project.as_deref(),
                budget,
            };
            let account = account(&account_name);
            let opportunity = opportunity(&opportunity_name, amount);

            let score = calculate_similarity(&input, &account, &opportunity);
            prop_assert!((0.0..=100.0).contains(&score), "score out of bounds: {score}");

            // Deterministic: identical inputs, identical score.
            let again = calculate_similarity(&input, &account, &opportunity);
            prop_assert_eq!(score, again);
        }
    }
}
