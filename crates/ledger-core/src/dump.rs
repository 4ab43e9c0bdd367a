//! Point-in-time view of a replica, returned by the admin dump

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AccountId, Balance, LogicalClock, Operation, ReplicaId};

/// Snapshot of a replica's ledger state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDump {
    pub replica: ReplicaId,
    pub active: bool,
    pub clock: LogicalClock,
    pub balances: BTreeMap<AccountId, Balance>,
    /// Full log, stable prefix first
    pub operations: Vec<Operation>,
}

impl LedgerDump {
    pub fn stable_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_stable()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.operations.len() - self.stable_count()
    }
}
