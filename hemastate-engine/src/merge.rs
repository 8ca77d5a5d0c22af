//! Boundary-point merging into display segments, and instant lookup.

use chrono::{DateTime, Utc};
use hemastate_core::{Segment, SegmentState};
use serde::{Deserialize, Serialize};

/// A segment edge carrying the state of the segment it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundaryPoint {
    pub time: DateTime<Utc>,
    pub state: SegmentState,
}

/// Two points per segment, one at its start and one at its end.
pub fn boundary_points(segments: &[Segment]) -> Vec<BoundaryPoint> {
    segments
        .iter()
        .flat_map(|segment| {
            [
                BoundaryPoint {
                    time: segment.start,
                    state: segment.state.clone(),
                },
                BoundaryPoint {
                    time: segment.end,
                    state: segment.state.clone(),
                },
            ]
        })
        .collect()
}

/// Walks consecutive boundary points and emits a segment for every pair with
/// equal state; a pair with differing states is a transition and emits nothing.
///
/// Output segments are non-empty, sorted, pairwise disjoint and maximal:
/// touching segments with the same state are coalesced, and any part of a
/// segment that falls before the end of what was already emitted is clipped.
pub fn merge_segments(filled: &[Segment]) -> Vec<Segment> {
    let points = boundary_points(filled);
    let mut merged: Vec<Segment> = Vec::new();

    for pair in points.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        if prev.state != curr.state {
            continue;
        }

        let start = match merged.last() {
            Some(last) => prev.time.max(last.end),
            None => prev.time,
        };
        if curr.time <= start {
            continue;
        }

        if let Some(last) = merged.last_mut() {
            if last.end == start && last.state == prev.state {
                last.end = curr.time;
                continue;
            }
        }
        merged.push(Segment::new(start, curr.time, prev.state.clone()));
    }

    merged
}

/// The first resolved segment whose closed span `[start, end]` contains `at`.
pub fn segment_at(segments: &[Segment], at: DateTime<Utc>) -> Option<&Segment> {
    segments
        .iter()
        .find(|segment| segment.state.is_resolved() && segment.contains(at))
}

pub fn state_at(segments: &[Segment], at: DateTime<Utc>) -> Option<&str> {
    segment_at(segments, at).and_then(|segment| segment.state.label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    fn seg(start: u32, end: u32, state: &str) -> Segment {
        Segment::new(at(start), at(end), state.into())
    }

    fn gap(start: u32, end: u32) -> Segment {
        Segment::new(at(start), at(end), SegmentState::Unresolved)
    }

    #[test]
    fn keeps_transitions_and_gaps() {
        let filled = vec![seg(1, 2, "A"), gap(2, 3), seg(3, 4, "A"), seg(4, 6, "B")];
        assert_eq!(merge_segments(&filled), filled);
    }

    #[test]
    fn coalesces_touching_segments_with_equal_state() {
        let filled = vec![seg(1, 2, "A"), seg(2, 3, "A"), seg(3, 5, "B")];
        assert_eq!(merge_segments(&filled), vec![seg(1, 3, "A"), seg(3, 5, "B")]);
    }

    #[test]
    fn drops_empty_and_inverted_segments() {
        let filled = vec![seg(1, 3, "A"), seg(3, 3, "B"), seg(3, 2, "C"), seg(3, 5, "D")];
        assert_eq!(merge_segments(&filled), vec![seg(1, 3, "A"), seg(3, 5, "D")]);
    }

    #[test]
    fn merging_is_idempotent() {
        let filled = vec![seg(1, 2, "A"), seg(2, 3, "A"), gap(3, 4), seg(4, 5, "B")];
        let once = merge_segments(&filled);
        assert_eq!(merge_segments(&once), once);
    }

    #[test]
    fn instant_lookup_uses_closed_spans_and_skips_gaps() {
        let segments = vec![seg(1, 2, "A"), gap(2, 3), seg(3, 4, "B")];
        assert_eq!(state_at(&segments, at(1)), Some("A"));
        assert_eq!(state_at(&segments, at(2)), Some("A"));
        assert_eq!(state_at(&segments, at(3)), Some("B"));
        assert_eq!(state_at(&segments, at(4)), Some("B"));
        assert_eq!(state_at(&segments, at(5)), None);
        assert_eq!(
            state_at(&segments, Utc.with_ymd_and_hms(2025, 1, 1, 2, 30, 0).unwrap()),
            None
        );
        assert_eq!(state_at(&[], at(1)), None);
    }
}
