//! Operation log with causal stabilization
//!
//! The log is an append-only sequence split by a stable boundary `k`:
//! `[0, k)` holds stable operations in the order they were applied,
//! `[k, len)` holds pending operations whose dependencies are not yet met.

use std::collections::HashSet;

use ledger_core::{LedgerError, LedgerResult, LogicalClock, Operation};

/// Outcome of an insertion or merge
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StabilizeReport {
    /// Operations appended to the log
    pub inserted: u32,
    /// Operations dropped because their origin timestamp was already known
    pub duplicates: u32,
    /// Operations promoted from pending to stable
    pub promoted: u32,
}

/// Ordered log of operations
#[derive(Clone, Debug, Default)]
pub struct OperationLog {
    ops: Vec<Operation>,
    /// Stable boundary
    stable_len: usize,
    /// Origin timestamps already in the log
    seen: HashSet<LogicalClock>,
}

impl OperationLog {
    pub fn new() -> Self {
        OperationLog::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn stable_len(&self) -> usize {
        self.stable_len
    }

    pub fn pending_len(&self) -> usize {
        self.ops.len() - self.stable_len
    }

    /// Stable operations, in application order
    pub fn stable(&self) -> &[Operation] {
        &self.ops[..self.stable_len]
    }

    /// Operations still waiting for dependencies
    pub fn pending(&self) -> &[Operation] {
        &self.ops[self.stable_len..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter()
    }

    /// Check whether an origin timestamp is already in the log
    pub fn contains(&self, origin_timestamp: &LogicalClock) -> bool {
        self.seen.contains(origin_timestamp)
    }

    /// Full copy of the log, stable prefix first
    pub fn snapshot(&self) -> Vec<Operation> {
        self.ops.clone()
    }

    /// Insert one locally accepted operation and stabilize
    ///
    /// A duplicate origin timestamp on this path is an integrity error.
    pub fn insert<F>(
        &mut self,
        op: Operation,
        clock: &mut LogicalClock,
        apply: F,
    ) -> LedgerResult<StabilizeReport>
    where
        F: FnMut(&Operation, &mut LogicalClock),
    {
        if !self.push_pending(op.clone()) {
            return Err(LedgerError::DuplicateOperation(op.origin_timestamp));
        }

        let promoted = self.stabilize(clock, apply);
        Ok(StabilizeReport {
            inserted: 1,
            duplicates: 0,
            promoted,
        })
    }

    /// Merge operations received from a peer, skipping known ones, and stabilize
    pub fn merge_all<I, F>(&mut self, ops: I, clock: &mut LogicalClock, apply: F) -> StabilizeReport
    where
        I: IntoIterator<Item = Operation>,
        F: FnMut(&Operation, &mut LogicalClock),
    {
        let mut report = StabilizeReport::default();

        for op in ops {
            // Stability is decided locally, never trusted from the sender
            if self.push_pending(op.with_stable(false)) {
                report.inserted += 1;
            } else {
                report.duplicates += 1;
            }
        }

        if report.inserted > 0 {
            report.promoted = self.stabilize(clock, apply);
        }
        report
    }

    fn push_pending(&mut self, op: Operation) -> bool {
        if !self.seen.insert(op.origin_timestamp.clone()) {
            return false;
        }
        self.ops.push(op);
        true
    }

    /// Promote every pending operation whose causal context `clock` dominates
    ///
    /// After each promotion the scan restarts at the boundary, since applying
    /// an operation advances the clock and may unblock earlier candidates.
    /// Returns the number of promoted operations.
    pub fn stabilize<F>(&mut self, clock: &mut LogicalClock, mut apply: F) -> u32
    where
        F: FnMut(&Operation, &mut LogicalClock),
    {
        let mut promoted = 0;

        while let Some(offset) = self.pending().iter().position(|op| op.is_ready(clock)) {
            let k = self.stable_len;
            let i = k + offset;

            // Move the ready operation to the boundary, keeping pending order intact
            self.ops[k..=i].rotate_right(1);
            self.ops[k].mark_stable();
            self.stable_len += 1;

            apply(&self.ops[k], clock);
            promoted += 1;

            tracing::debug!(op = %self.ops[k], clock = %clock, "operation stabilized");
        }

        promoted
    }
}
