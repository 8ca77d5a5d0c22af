//! Converts stored observation rows into engine observations.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use hemastate_core::{Observation, ObservationValue, PatientKey, StateError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// An observation row as the record store keeps it, with textual timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawObservation {
    pub patient: String,
    #[serde(alias = "LOINC-NUM")]
    pub test_code: String,
    #[serde(alias = "Value")]
    pub value: String,
    #[serde(alias = "measurement_datetime")]
    pub measured_at: String,
    #[serde(default, alias = "update_datetime")]
    pub updated_at: Option<String>,
}

impl RawObservation {
    pub fn into_observation(self) -> Result<Observation, StateError> {
        let measured_at = parse_timestamp(&self.measured_at)?;
        let updated_at = self
            .updated_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        Ok(Observation {
            patient: PatientKey(self.patient),
            test_code: self.test_code.trim().to_string(),
            value: ObservationValue::parse(&self.value),
            measured_at,
            updated_at,
        })
    }
}

/// Parses RFC 3339, or a naive `YYYY-MM-DD HH:MM[:SS]` timestamp taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StateError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| StateError::MalformedTimestamp {
            raw: raw.to_string(),
        })
}

/// Converts rows, dropping those whose timestamps cannot be parsed.
pub fn parse_observations(rows: impl IntoIterator<Item = RawObservation>) -> Vec<Observation> {
    rows.into_iter()
        .filter_map(|row| {
            let patient = row.patient.clone();
            let test_code = row.test_code.clone();
            match row.into_observation() {
                Ok(observation) => Some(observation),
                Err(err) => {
                    warn!(%patient, %test_code, %err, "dropping observation");
                    None
                }
            }
        })
        .collect()
}

/// Reads a JSON array of stored rows.
pub fn observations_from_json_str(json: &str) -> Result<Vec<Observation>, StateError> {
    let rows: Vec<RawObservation> =
        serde_json::from_str(json).map_err(|err| StateError::Parse(err.to_string()))?;
    Ok(parse_observations(rows))
}

/// Collapses revisions to the current value of each measurement.
///
/// A measurement is keyed by patient, test code and measurement time. The
/// revision with the latest `updated_at` wins (later input wins a tie); a
/// measurement whose winning revision is the deleted sentinel disappears.
/// The result is ordered by measurement time.
pub fn current_observations(observations: &[Observation]) -> Vec<Observation> {
    let mut current: Vec<Observation> = Vec::new();
    let mut positions: HashMap<(&PatientKey, &str, DateTime<Utc>), usize> = HashMap::new();

    for observation in observations {
        let key = (
            &observation.patient,
            observation.test_code.trim(),
            observation.measured_at,
        );
        match positions.get(&key) {
            Some(&position) => {
                if observation.updated_at >= current[position].updated_at {
                    current[position] = observation.clone();
                }
            }
            None => {
                positions.insert(key, current.len());
                current.push(observation.clone());
            }
        }
    }

    current.retain(|observation| {
        let deleted = observation.value.is_deleted();
        if deleted {
            debug!(
                patient = %observation.patient,
                test_code = %observation.test_code,
                measured_at = %observation.measured_at,
                "measurement deleted by its latest revision"
            );
        }
        !deleted
    });
    current.sort_by_key(|observation| observation.measured_at);
    current
}

pub fn for_patient(observations: &[Observation], patient: &PatientKey) -> Vec<Observation> {
    observations
        .iter()
        .filter(|observation| &observation.patient == patient)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: &str, measured_at: &str, updated_at: &str) -> RawObservation {
        RawObservation {
            patient: "John Doe".to_string(),
            test_code: "30313-1".to_string(),
            value: value.to_string(),
            measured_at: measured_at.to_string(),
            updated_at: Some(updated_at.to_string()),
        }
    }

    #[test]
    fn parses_naive_and_rfc3339_timestamps() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 17, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-05-17 10:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-05-17 10:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-05-17T12:00:00+02:00").unwrap(), expected);
        assert!(matches!(
            parse_timestamp("17/05/2025"),
            Err(StateError::MalformedTimestamp { .. })
        ));
    }

    #[test]
    fn malformed_rows_are_dropped() {
        let observations = parse_observations(vec![
            row("7.5", "2025-05-17 10:00:00", "2025-05-20 10:00:00"),
            row("8.5", "yesterday", "2025-05-20 10:00:00"),
        ]);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].value, ObservationValue::Numeric(7.5));
    }

    #[test]
    fn latest_revision_wins_and_deleted_measurements_vanish() {
        let observations = parse_observations(vec![
            row("7.5", "2025-05-17 10:00:00", "2025-05-20 10:00:00"),
            row("9.5", "2025-05-17 10:00:00", "2025-05-21 10:00:00"),
            row("12.0", "2025-05-18 10:00:00", "2025-05-20 10:00:00"),
            row("DELETED", "2025-05-18 10:00:00", "2025-05-22 10:00:00"),
            row("11.0", "2025-05-16 10:00:00", "2025-05-20 10:00:00"),
        ]);

        let current = current_observations(&observations);
        let values: Vec<_> = current.iter().map(|obs| obs.value.clone()).collect();
        assert_eq!(
            values,
            vec![ObservationValue::Numeric(11.0), ObservationValue::Numeric(9.5)]
        );
    }

    #[test]
    fn only_a_deleted_latest_revision_removes_the_measurement() {
        let observations = parse_observations(vec![
            row("DELETED", "2025-05-17 10:00:00", "2025-05-20 10:00:00"),
            row("8.0", "2025-05-17 10:00:00", "2025-05-21 10:00:00"),
            row("9.0", "2025-05-18 10:00:00", "2025-05-20 10:00:00"),
            row("DELETED", "2025-05-18 10:00:00", "2025-05-21 10:00:00"),
        ]);

        let current = current_observations(&observations);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].value, ObservationValue::Numeric(8.0));
        assert_eq!(
            current[0].measured_at,
            Utc.with_ymd_and_hms(2025, 5, 17, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn filters_by_patient() {
        let mut other = row("7.5", "2025-05-17 10:00:00", "2025-05-20 10:00:00");
        other.patient = "Jane Doe".to_string();
        let observations = parse_observations(vec![
            row("7.5", "2025-05-17 10:00:00", "2025-05-20 10:00:00"),
            other,
        ]);
        let john = for_patient(&observations, &PatientKey::from_name("John", "Doe"));
        assert_eq!(john.len(), 1);
        assert!(for_patient(&observations, &PatientKey::from("Unknown Patient")).is_empty());
    }
}
