//! Turns validity windows into raw state intervals.

use hemastate_core::{CrossTable, Lookup, RangeTable, ValidityWindow};
use tracing::debug;

use crate::StateInterval;

/// Pairs every row window with every column window and resolves each
/// non-empty intersection through the cross table.
///
/// Intersections whose cell cannot be resolved (non-numeric value, value
/// outside every bin) produce nothing. Quadratic in the number of windows.
pub fn find_overlapping_states(
    rows: &[ValidityWindow],
    columns: &[ValidityWindow],
    table: &CrossTable,
) -> Vec<StateInterval> {
    let mut intervals = Vec::new();

    for row in rows {
        for column in columns {
            let Some((start, end)) = row.overlap(column) else {
                continue;
            };
            let lookup = match (row.value.as_numeric(), column.value.as_numeric()) {
                (Some(row_value), Some(column_value)) => table.resolve(row_value, column_value),
                _ => Lookup::Unresolved,
            };
            match lookup {
                Lookup::State(state) => intervals.push(StateInterval::new(start, end, state)),
                Lookup::Unresolved => debug!(
                    row_value = %row.value,
                    column_value = %column.value,
                    "cross table lookup unresolved"
                ),
            }
        }
    }

    intervals
}

/// One interval per window, resolved through the range table.
pub fn single_series_states(windows: &[ValidityWindow], table: &RangeTable) -> Vec<StateInterval> {
    windows
        .iter()
        .filter_map(|window| {
            let state = window
                .value
                .as_numeric()
                .and_then(|value| table.resolve(value).state());
            if state.is_none() {
                debug!(value = %window.value, "range table lookup unresolved");
            }
            state.map(|state| StateInterval::new(window.start, window.end, state))
        })
        .collect()
}
