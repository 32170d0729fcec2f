//! Change-set coalescing
//!
//! Merges the edit operations of a run of history records into the smallest
//! set of disjoint, non-adjacent `[start, end)` spans. A streaming
//! reconstruction only needs to touch bytes inside these spans; everything
//! outside is copied through unmodified from the root content stream.

use crate::delta::EditOp;
use crate::record::HistoryRecord;

/// A coalesced span of elements touched by one or more deltas
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub start: usize,
    pub end: usize,
    /// Operations belonging to this span, in history order
    pub changes: Vec<EditOp>,
}

/// Coalesce every delta of `history` into disjoint spans, ascending by start
///
/// Ranges `[start, start + delete)` that overlap or touch are merged
/// transitively. Each record's operations are visited exactly once, and
/// within a span they are re-ordered by (record, operation) position so they
/// apply in history order.
pub fn coalesce(history: &[HistoryRecord]) -> Vec<ChangeSet> {
    let mut ops: Vec<(usize, usize, &EditOp)> = Vec::new();
    for (record_index, record) in history.iter().enumerate() {
        for (op_index, op) in record.delta.iter().enumerate() {
            ops.push((record_index, op_index, op));
        }
    }
    ops.sort_by_key(|(_, _, op)| op.start);

    let mut merged: Vec<(usize, usize, Vec<(usize, usize, &EditOp)>)> = Vec::new();
    for (record_index, op_index, op) in ops {
        match merged.last_mut() {
            Some((_, end, members)) if op.start <= *end => {
                *end = (*end).max(op.end());
                members.push((record_index, op_index, op));
            }
            _ => merged.push((op.start, op.end(), vec![(record_index, op_index, op)])),
        }
    }

    merged
        .into_iter()
        .map(|(start, end, mut members)| {
            members.sort_by_key(|&(record_index, op_index, _)| (record_index, op_index));
            ChangeSet {
                start,
                end,
                changes: members.into_iter().map(|(_, _, op)| op.clone()).collect(),
            }
        })
        .collect()
}
