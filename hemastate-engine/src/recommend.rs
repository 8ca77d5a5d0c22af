//! Treatment recommendation and the per-instant patient assessment.

use chrono::{DateTime, Utc};
use hemastate_core::{Gender, Grade, KnowledgeBase, Observation, RecommendationTable, Segment};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{grade_at, hematological_timeline, hemoglobin_timeline, merge::segment_at};

/// Looks up the advisory text for a hemoglobin segment, a hematological
/// segment and a grade. Both segments must be resolved and contain `at`.
pub fn recommend<'a>(
    table: &'a RecommendationTable,
    hemoglobin: &Segment,
    hematological: &Segment,
    grade: Grade,
    at: DateTime<Utc>,
) -> Option<&'a str> {
    if !hemoglobin.contains(at) || !hematological.contains(at) {
        return None;
    }
    let hemoglobin_state = hemoglobin.state.label()?;
    let hematological_state = hematological.state.label()?;

    let recommendation = table.find(hemoglobin_state, hematological_state, grade);
    if recommendation.is_none() {
        debug!(
            hemoglobin_state,
            hematological_state,
            grade = grade.level(),
            "no matching recommendation"
        );
    }
    recommendation
}

/// Everything known about a patient at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assessment {
    pub at: DateTime<Utc>,
    pub hemoglobin_state: Option<String>,
    pub hematological_state: Option<String>,
    pub grade: Option<Grade>,
    pub recommendation: Option<String>,
}

impl Assessment {
    pub fn is_complete(&self) -> bool {
        self.recommendation.is_some()
    }
}

pub fn assess(
    observations: &[Observation],
    knowledge: &KnowledgeBase,
    gender: Gender,
    at: DateTime<Utc>,
) -> Assessment {
    let hemoglobin = hemoglobin_timeline(observations, knowledge, gender);
    let hematological = hematological_timeline(observations, knowledge, gender);
    let grade = grade_at(observations, knowledge, at);

    let hemoglobin_segment = segment_at(&hemoglobin, at);
    let hematological_segment = segment_at(&hematological, at);

    let recommendation = match (hemoglobin_segment, hematological_segment, grade) {
        (Some(hemoglobin), Some(hematological), Some(grade)) => recommend(
            knowledge.recommendations(gender),
            hemoglobin,
            hematological,
            grade,
            at,
        )
        .map(str::to_string),
        _ => {
            debug!(
                has_hemoglobin = hemoglobin_segment.is_some(),
                has_hematological = hematological_segment.is_some(),
                has_grade = grade.is_some(),
                "recommendation inputs incomplete"
            );
            None
        }
    };

    Assessment {
        at,
        hemoglobin_state: hemoglobin_segment
            .and_then(|segment| segment.state.label())
            .map(str::to_string),
        hematological_state: hematological_segment
            .and_then(|segment| segment.state.label())
            .map(str::to_string),
        grade,
        recommendation,
    }
}

pub fn recommendation_at(
    observations: &[Observation],
    knowledge: &KnowledgeBase,
    gender: Gender,
    at: DateTime<Utc>,
) -> Option<String> {
    assess(observations, knowledge, gender, at).recommendation
}
