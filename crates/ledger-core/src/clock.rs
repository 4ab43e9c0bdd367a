//! Logical clocks
//!
//! A logical clock maps replica identifiers to counters. It is the causal
//! ordering primitive of the ledger: a replica's clock records how many
//! operations from each origin it has applied, and every operation carries
//! the clock its client had observed when issuing it.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::ReplicaId;

/// Result of comparing two logical clocks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockOrdering {
    Equal,
    Before,
    After,
    Concurrent,
}

/// Vector clock for causal ordering (not total ordering)
///
/// Absent coordinates read as 0, so `{A:1}` and `{A:1, B:0}` are the same clock.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalClock {
    counters: BTreeMap<ReplicaId, u64>,
}

impl LogicalClock {
    pub fn new() -> Self {
        LogicalClock {
            counters: BTreeMap::new(),
        }
    }

    /// Build a clock from `(replica, counter)` pairs; later duplicates win
    pub fn from_entries<I, R>(entries: I) -> Self
    where
        I: IntoIterator<Item = (R, u64)>,
        R: Into<ReplicaId>,
    {
        LogicalClock {
            counters: entries.into_iter().map(|(r, c)| (r.into(), c)).collect(),
        }
    }

    /// Entries sorted by replica id, for the wire format
    pub fn to_entries(&self) -> Vec<(ReplicaId, u64)> {
        self.counters.iter().map(|(r, &c)| (r.clone(), c)).collect()
    }

    /// Get the counter for a replica
    #[inline]
    pub fn get(&self, replica: &str) -> u64 {
        self.counters.get(replica).copied().unwrap_or(0)
    }

    /// Set the counter for a replica
    pub fn set(&mut self, replica: impl Into<ReplicaId>, value: u64) {
        self.counters.insert(replica.into(), value);
    }

    /// Increment the counter for a replica, returning the new value
    pub fn increment(&mut self, replica: impl Into<ReplicaId>) -> u64 {
        let counter = self.counters.entry(replica.into()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Raise a single coordinate to at least `value`
    pub fn advance(&mut self, replica: impl Into<ReplicaId>, value: u64) {
        let counter = self.counters.entry(replica.into()).or_insert(0);
        *counter = (*counter).max(value);
    }

    /// Fold another clock in (element-wise max)
    pub fn merge(&mut self, other: &LogicalClock) {
        for (replica, &counter) in &other.counters {
            self.counters
                .entry(replica.clone())
                .and_modify(|c| *c = (*c).max(counter))
                .or_insert(counter);
        }
    }

    /// Element-wise max without mutating either side
    pub fn merged(&self, other: &LogicalClock) -> LogicalClock {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    /// True iff this clock has seen everything `other` has seen
    pub fn dominates(&self, other: &LogicalClock) -> bool {
        other
            .counters
            .iter()
            .all(|(replica, &counter)| self.get(replica.as_str()) >= counter)
    }

    /// Compare over the union of both key sets
    pub fn compare(&self, other: &LogicalClock) -> ClockOrdering {
        match (other.dominates(self), self.dominates(other)) {
            (true, true) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (false, false) => ClockOrdering::Concurrent,
        }
    }

    /// Check if self happens-before other
    pub fn happens_before(&self, other: &LogicalClock) -> bool {
        self.compare(other) == ClockOrdering::Before
    }

    /// Check if neither clock happens-before the other
    pub fn concurrent(&self, other: &LogicalClock) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// Iterate over stored coordinates (zero-valued entries included)
    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, u64)> {
        self.counters.iter().map(|(r, &c)| (r, c))
    }

    /// Number of stored coordinates
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// True when every coordinate reads as zero
    pub fn is_empty(&self) -> bool {
        self.counters.values().all(|&c| c == 0)
    }
}

impl PartialEq for LogicalClock {
    fn eq(&self, other: &Self) -> bool {
        self.dominates(other) && other.dominates(self)
    }
}

impl Eq for LogicalClock {}

impl Hash for LogicalClock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Zero entries are skipped to stay consistent with `eq`
        for (replica, &counter) in &self.counters {
            if counter != 0 {
                replica.hash(state);
                counter.hash(state);
            }
        }
    }
}

impl fmt::Debug for LogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.counters.iter().map(|(r, c)| (r.as_str(), c)))
            .finish()
    }
}

impl fmt::Display for LogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (replica, counter)) in self.counters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:{}", replica, counter)?;
        }
        f.write_str("}")
    }
}
