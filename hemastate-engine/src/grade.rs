//! Systemic toxicity grading at a query instant.

use chrono::{DateTime, Utc};
use hemastate_core::{ClinicalTest, Grade, KnowledgeBase, Observation};
use tracing::{debug, warn};

/// The most recent observation of `test` measured within `[from, to]`.
///
/// Ties on measurement time resolve to the earliest in input order.
pub fn latest_within(
    observations: &[Observation],
    test: ClinicalTest,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Option<&Observation> {
    observations
        .iter()
        .filter(|observation| {
            observation.is_test(test)
                && !observation.value.is_deleted()
                && from <= observation.measured_at
                && observation.measured_at <= to
        })
        .fold(None, |latest: Option<&Observation>, observation| match latest {
            Some(current) if current.measured_at >= observation.measured_at => Some(current),
            _ => Some(observation),
        })
}

/// Scores each systemic indicator (fever, chills, skin appearance, allergic
/// state) by the column its most recent valid value occupies in the systemic
/// table, and grades by the worst column found.
///
/// Returns `None` when no indicator has a matching value near `at`.
pub fn grade_at(observations: &[Observation], knowledge: &KnowledgeBase, at: DateTime<Utc>) -> Option<Grade> {
    let table = knowledge.systemic_table();
    let mut worst: Option<usize> = None;

    for indicator in ClinicalTest::SYSTEMIC {
        let validity = match knowledge.test_validity(indicator) {
            Ok(validity) => validity,
            Err(err) => {
                warn!(%indicator, %err, "skipping systemic indicator");
                continue;
            }
        };

        let (Some(from), Some(to)) = (
            at.checked_sub_signed(validity.before()),
            at.checked_add_signed(validity.after()),
        ) else {
            warn!(%indicator, %at, "grade window out of range");
            continue;
        };
        let Some(observation) = latest_within(observations, indicator, from, to) else {
            continue;
        };
        let Some(column) = table.severity_index(indicator, &observation.value) else {
            debug!(%indicator, value = %observation.value, "value not in systemic table");
            continue;
        };

        worst = Some(worst.map_or(column, |current| current.max(column)));
    }

    worst.and_then(Grade::from_column)
}
