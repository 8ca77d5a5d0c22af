//! Hematological state timelines, systemic grading and treatment
//! recommendations over a patient's observation snapshot.
//!
//! Observations become validity windows, windows become raw state intervals
//! (through the range table for hemoglobin alone, or the cross table for
//! WBC x hemoglobin), and raw intervals are reconciled, gap-filled and merged
//! into an ordered list of non-overlapping [`Segment`]s. Grading and
//! recommendation work from the same snapshot at a single query instant.
//!
//! Everything here is a pure function of its inputs.

pub mod grade;
pub mod intake;
pub mod merge;
pub mod overlap;
pub mod reconcile;
pub mod recommend;
pub mod window;

use chrono::{DateTime, Utc};
use hemastate_core::{ClinicalTest, Gender, KnowledgeBase, Observation, Segment, SegmentState};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use grade::{grade_at, latest_within};
pub use intake::{
    current_observations, for_patient, observations_from_json_str, parse_observations,
    parse_timestamp, RawObservation,
};
pub use merge::{boundary_points, merge_segments, segment_at, state_at, BoundaryPoint};
pub use overlap::{find_overlapping_states, single_series_states};
pub use reconcile::{fill_gaps, resolve_conflicts};
pub use recommend::{assess, recommend, recommendation_at, Assessment};
pub use window::{build_window, windows_for};

/// A resolved `[start, end)` state interval before reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: String,
}

impl StateInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, state: &str) -> Self {
        Self {
            start,
            end,
            state: state.to_string(),
        }
    }

    pub fn to_segment(&self) -> Segment {
        Segment::new(self.start, self.end, SegmentState::Resolved(self.state.clone()))
    }
}

/// Resolve conflicts, fill gaps, merge.
pub fn build_timeline(raw: Vec<StateInterval>) -> Vec<Segment> {
    let resolved = resolve_conflicts(raw);
    merge_segments(&fill_gaps(&resolved))
}

/// Hemoglobin-only state timeline from the gender's range table.
pub fn hemoglobin_timeline(
    observations: &[Observation],
    knowledge: &KnowledgeBase,
    gender: Gender,
) -> Vec<Segment> {
    let windows = match windows_for(observations, ClinicalTest::Hemoglobin, knowledge) {
        Ok(windows) => windows,
        Err(err) => {
            warn!(%err, "hemoglobin timeline skipped");
            return Vec::new();
        }
    };

    build_timeline(single_series_states(
        &windows,
        knowledge.hemoglobin_table(gender),
    ))
}

/// Combined WBC x hemoglobin state timeline from the gender's cross table.
pub fn hematological_timeline(
    observations: &[Observation],
    knowledge: &KnowledgeBase,
    gender: Gender,
) -> Vec<Segment> {
    let windows = windows_for(observations, ClinicalTest::WhiteCellCount, knowledge).and_then(
        |wbc| Ok((wbc, windows_for(observations, ClinicalTest::Hemoglobin, knowledge)?)),
    );
    let (wbc, hemoglobin) = match windows {
        Ok(windows) => windows,
        Err(err) => {
            warn!(%err, "hematological timeline skipped");
            return Vec::new();
        }
    };

    build_timeline(find_overlapping_states(
        &wbc,
        &hemoglobin,
        knowledge.hematological_table(gender),
    ))
}

/// Both timelines of a patient, as handed to display collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientTimelines {
    pub hemoglobin: Vec<Segment>,
    pub hematological: Vec<Segment>,
}

impl PatientTimelines {
    pub fn compute(observations: &[Observation], knowledge: &KnowledgeBase, gender: Gender) -> Self {
        Self {
            hemoglobin: hemoglobin_timeline(observations, knowledge, gender),
            hematological: hematological_timeline(observations, knowledge, gender),
        }
    }

    pub fn hemoglobin_state_at(&self, at: DateTime<Utc>) -> Option<&str> {
        state_at(&self.hemoglobin, at)
    }

    pub fn hematological_state_at(&self, at: DateTime<Utc>) -> Option<&str> {
        state_at(&self.hematological, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hemastate_core::{ObservationValue, PatientKey};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 17, hour, 0, 0).unwrap()
    }

    fn observation(test: ClinicalTest, value: &str, hour: u32) -> Observation {
        Observation {
            patient: PatientKey::from("Jane Doe"),
            test_code: test.loinc().to_string(),
            value: ObservationValue::parse(value),
            measured_at: at(hour),
            updated_at: None,
        }
    }

    fn three_hour_windows() -> KnowledgeBase {
        KnowledgeBase::baseline()
            .with_test_validity(ClinicalTest::WhiteCellCount, 3.0, 3.0)
            .unwrap()
    }

    #[test]
    fn newer_data_changes_the_combined_state() {
        let observations = vec![
            observation(ClinicalTest::WhiteCellCount, "5000", 10),
            observation(ClinicalTest::WhiteCellCount, "5000", 12),
            observation(ClinicalTest::Hemoglobin, "14.1", 10),
            observation(ClinicalTest::Hemoglobin, "13.5", 12),
        ];
        let timeline = hematological_timeline(&observations, &three_hour_windows(), Gender::Female);
        assert_eq!(
            timeline,
            vec![
                Segment::new(at(7), at(11), "Polyhemia".into()),
                Segment::new(at(11), at(15), "Normal".into()),
            ]
        );
    }

    #[test]
    fn no_observations_yield_empty_timelines() {
        let timelines = PatientTimelines::compute(&[], &KnowledgeBase::baseline(), Gender::Male);
        assert!(timelines.hemoglobin.is_empty());
        assert!(timelines.hematological.is_empty());
    }

    #[test]
    fn missing_wbc_validity_skips_the_combined_timeline() {
        let knowledge = KnowledgeBase::baseline().without_test_validity(ClinicalTest::WhiteCellCount);
        let observations = vec![
            observation(ClinicalTest::WhiteCellCount, "5000", 10),
            observation(ClinicalTest::Hemoglobin, "14.1", 10),
        ];
        assert!(hematological_timeline(&observations, &knowledge, Gender::Female).is_empty());
        assert_eq!(
            hemoglobin_timeline(&observations, &knowledge, Gender::Female),
            vec![Segment::new(at(7), at(13), "Polycytemia".into())]
        );
    }
}
