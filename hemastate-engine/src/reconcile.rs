//! Conflict resolution and gap filling over raw state intervals.

use hemastate_core::{Segment, SegmentState};

use crate::StateInterval;

/// Sorts by start (stable, so equal starts keep input order) and splits each
/// overlap with the immediately preceding result at the midpoint of the
/// overlapping region.
///
/// Only the previous result interval is considered. When three or more
/// intervals overlap at once (for example one nested inside a wider one), the
/// split points depend on input order and an earlier interval can end up
/// truncated past a later one's end, leaving a zero-length or inverted
/// interval. Segment merging drops those.
pub fn resolve_conflicts(mut intervals: Vec<StateInterval>) -> Vec<StateInterval> {
    intervals.sort_by_key(|interval| interval.start);

    let mut resolved: Vec<StateInterval> = Vec::with_capacity(intervals.len());
    for mut candidate in intervals {
        if let Some(last) = resolved.last_mut() {
            if candidate.start < last.end {
                let midpoint = last.end - (last.end - candidate.start) / 2;
                last.end = midpoint;
                candidate.start = midpoint;
            }
        }
        resolved.push(candidate);
    }
    resolved
}

/// Inserts an unresolved segment into every gap between consecutive intervals.
pub fn fill_gaps(intervals: &[StateInterval]) -> Vec<Segment> {
    let mut filled = Vec::with_capacity(intervals.len() * 2);
    for (index, interval) in intervals.iter().enumerate() {
        if let Some(previous) = index.checked_sub(1).map(|prev| &intervals[prev]) {
            if previous.end < interval.start {
                filled.push(Segment::new(
                    previous.end,
                    interval.start,
                    SegmentState::Unresolved,
                ));
            }
        }
        filled.push(interval.to_segment());
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn overlap_is_split_at_the_midpoint() {
        let resolved = resolve_conflicts(vec![
            StateInterval::new(at(11, 0), at(15, 0), "Polyhemia"),
            StateInterval::new(at(10, 0), at(14, 0), "Normal"),
        ]);
        assert_eq!(
            resolved,
            vec![
                StateInterval::new(at(10, 0), at(12, 30), "Normal"),
                StateInterval::new(at(12, 30), at(15, 0), "Polyhemia"),
            ]
        );
    }

    #[test]
    fn equal_starts_keep_input_order() {
        let resolved = resolve_conflicts(vec![
            StateInterval::new(at(10, 0), at(12, 0), "B"),
            StateInterval::new(at(10, 0), at(12, 0), "A"),
        ]);
        assert_eq!(resolved[0].state, "B");
        assert_eq!(resolved[1].state, "A");
        assert_eq!(resolved[0].end, at(11, 0));
        assert_eq!(resolved[1].start, at(11, 0));
    }

    #[test]
    fn only_the_previous_interval_is_reconciled() {
        let resolved = resolve_conflicts(vec![
            StateInterval::new(at(0, 0), at(10, 0), "wide"),
            StateInterval::new(at(1, 0), at(2, 0), "nested"),
        ]);
        assert_eq!(resolved[0].end, at(5, 30));
        assert_eq!(resolved[1].start, at(5, 30));
        assert_eq!(resolved[1].end, at(2, 0));
    }

    #[test]
    fn gaps_become_unresolved_segments() {
        let filled = fill_gaps(&[
            StateInterval::new(at(10, 0), at(11, 0), "A"),
            StateInterval::new(at(12, 0), at(13, 0), "B"),
        ]);
        assert_eq!(
            filled,
            vec![
                Segment::new(at(10, 0), at(11, 0), "A".into()),
                Segment::new(at(11, 0), at(12, 0), SegmentState::Unresolved),
                Segment::new(at(12, 0), at(13, 0), "B".into()),
            ]
        );
    }

    #[test]
    fn touching_intervals_need_no_filler() {
        let intervals = [
            StateInterval::new(at(10, 0), at(11, 0), "A"),
            StateInterval::new(at(11, 0), at(13, 0), "B"),
        ];
        assert_eq!(resolve_conflicts(intervals.to_vec()), intervals.to_vec());
        assert_eq!(fill_gaps(&intervals).len(), 2);
        assert!(fill_gaps(&[]).is_empty());
    }
}
