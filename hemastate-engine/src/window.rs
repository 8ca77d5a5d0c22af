//! Validity windows around individual observations.

use hemastate_core::{ClinicalTest, KnowledgeBase, Observation, StateError, TestValidity, ValidityWindow};
use tracing::{debug, warn};

/// The `[measured_at - before, measured_at + after)` window of one observation.
///
/// Returns `None` when the window cannot be represented, which only happens
/// for measurement times at the far ends of the calendar.
pub fn build_window(observation: &Observation, validity: TestValidity) -> Option<ValidityWindow> {
    ValidityWindow::around(observation.measured_at, observation.value.clone(), validity)
}

/// Validity windows for every live observation of `test`, in input order.
/// Observations whose window falls outside the representable range are dropped.
///
/// Fails with `MissingValidityConfig` when the knowledge base has no duration for `test`.
pub fn windows_for(
    observations: &[Observation],
    test: ClinicalTest,
    knowledge: &KnowledgeBase,
) -> Result<Vec<ValidityWindow>, StateError> {
    let validity = knowledge.test_validity(test)?;
    Ok(observations
        .iter()
        .filter(|observation| observation.is_test(test))
        .filter_map(|observation| {
            if observation.value.is_deleted() {
                debug!(
                    patient = %observation.patient,
                    %test,
                    measured_at = %observation.measured_at,
                    "skipping deleted observation"
                );
                return None;
            }
            let window = build_window(observation, validity);
            if window.is_none() {
                warn!(
                    patient = %observation.patient,
                    %test,
                    measured_at = %observation.measured_at,
                    "dropping observation, validity window out of range"
                );
            }
            window
        })
        .collect())
}
