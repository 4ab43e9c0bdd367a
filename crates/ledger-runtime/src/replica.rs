//! Shared replica handle
//!
//! Every method takes the lock for the whole call, so admission, insertion,
//! stabilization and gossip ingestion never interleave on one replica.

use std::sync::Arc;

use parking_lot::Mutex;

use ledger_core::{
    AccountId, Amount, Balance, LedgerDump, LedgerError, LedgerResult, LogicalClock, OpKind,
    Operation, ReplicaId,
};
use ledger_state::{LedgerStats, ReplicaConfig, ReplicaState, StabilizeReport};

/// Cloneable, thread-safe handle to one replica
#[derive(Clone, Debug)]
pub struct Replica {
    id: ReplicaId,
    state: Arc<Mutex<ReplicaState>>,
}

impl Replica {
    pub fn new(id: impl Into<ReplicaId>, config: ReplicaConfig) -> Self {
        Self::from_state(ReplicaState::new(id, config))
    }

    pub fn from_state(state: ReplicaState) -> Self {
        Replica {
            id: state.id().clone(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    /// Run a read-only closure under the lock
    pub fn with_state<R>(&self, f: impl FnOnce(&ReplicaState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn submit(&self, kind: OpKind, context: &LogicalClock) -> LedgerResult<LogicalClock> {
        self.state.lock().submit(kind, context)
    }

    pub fn create_account(
        &self,
        account: impl Into<AccountId>,
        context: &LogicalClock,
    ) -> LedgerResult<LogicalClock> {
        self.state.lock().create_account(account, context)
    }

    pub fn delete_account(
        &self,
        account: impl Into<AccountId>,
        context: &LogicalClock,
    ) -> LedgerResult<LogicalClock> {
        self.state.lock().delete_account(account, context)
    }

    pub fn transfer(
        &self,
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: Amount,
        context: &LogicalClock,
    ) -> LedgerResult<LogicalClock> {
        self.state.lock().transfer(from, to, amount, context)
    }

    pub fn read(&self, account: &str, context: &LogicalClock) -> LedgerResult<(Balance, LogicalClock)> {
        self.state.lock().read(account, context)
    }

    pub fn activate(&self) {
        self.state.lock().activate();
    }

    pub fn deactivate(&self) {
        self.state.lock().deactivate();
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_active()
    }

    pub fn merge_remote(&self, ops: Vec<Operation>) -> StabilizeReport {
        self.state.lock().merge_remote(ops)
    }

    pub fn snapshot(&self) -> Vec<Operation> {
        self.state.lock().snapshot()
    }

    pub fn clock(&self) -> LogicalClock {
        self.state.lock().clock()
    }

    pub fn stats(&self) -> LedgerStats {
        self.state.lock().stats()
    }

    pub fn dump(&self) -> LedgerDump {
        self.state.lock().dump()
    }

    /// Dump rendered as pretty JSON
    pub fn dump_json(&self) -> LedgerResult<String> {
        serde_json::to_string_pretty(&self.dump())
            .map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_concurrent_writers_serialized() {
        let replica = Replica::new("A", ReplicaConfig::default());
        replica.create_account("u1", &LogicalClock::new()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let replica = replica.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        replica
                            .transfer("broker", "u1", 1, &LogicalClock::new())
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(replica.read("u1", &LogicalClock::new()).unwrap().0, 100);
        assert_eq!(replica.clock().get("A"), 101);
        replica.with_state(|s| assert_eq!(s.log().stable_len(), 101));
    }

    #[test]
    fn test_dump_json() {
        let replica = Replica::new("A", ReplicaConfig::default());
        replica.create_account("u1", &LogicalClock::new()).unwrap();

        let json = replica.dump_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["replica"], "A");
        assert_eq!(value["balances"]["u1"], 0);
        assert_eq!(value["clock"]["A"], 1);
        assert_eq!(value["operations"][0]["kind"]["kind"], "create_account");
    }
}
