//! Replica state - the per-process aggregate
//!
//! `ReplicaState` owns the logical clock, the operation log and the account
//! store. Every mutation goes through its methods so that admission, log
//! insertion, stabilization, balance updates and clock advancement happen as
//! one unit. Callers that share a replica between tasks wrap it in a single
//! lock.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use ledger_core::{
    AccountId, Amount, Balance, LedgerDump, LedgerError, LedgerResult, LogicalClock, OpKind,
    Operation, ReplicaId, BROKER_INITIAL_BALANCE,
};

use crate::{AccountStore, ExecOutcome, OperationLog, StabilizeReport};

/// Replica configuration
#[derive(Clone, Debug)]
pub struct ReplicaConfig {
    /// Seed balance of the broker account
    pub broker_balance: Balance,
    /// Whether the replica accepts writes on startup
    pub start_active: bool,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        ReplicaConfig {
            broker_balance: BROKER_INITIAL_BALANCE,
            start_active: true,
        }
    }
}

impl ReplicaConfig {
    pub fn with_broker_balance(mut self, balance: Balance) -> Self {
        self.broker_balance = balance;
        self
    }

    pub fn with_start_active(mut self, active: bool) -> Self {
        self.start_active = active;
        self
    }
}

/// Counters kept by a replica
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    /// Writes accepted from clients
    pub submitted: u64,
    /// Writes rejected at admission
    pub rejected: u64,
    /// Remote snapshots merged
    pub merged_batches: u64,
    /// Remote operations dropped as already known
    pub duplicates_skipped: u64,
    /// Operations promoted to stable
    pub promoted: u64,
    /// Stable transfers whose effect was skipped
    pub transfers_skipped: u64,
}

/// State of one ledger replica
#[derive(Clone, Debug)]
pub struct ReplicaState {
    id: ReplicaId,
    clock: LogicalClock,
    log: OperationLog,
    accounts: AccountStore,
    active: bool,
    stats: LedgerStats,
}

impl ReplicaState {
    /// Create a fresh replica holding only the broker account
    pub fn new(id: impl Into<ReplicaId>, config: ReplicaConfig) -> Self {
        ReplicaState {
            id: id.into(),
            clock: LogicalClock::new(),
            log: OperationLog::new(),
            accounts: AccountStore::new(config.broker_balance),
            active: config.start_active,
            stats: LedgerStats::default(),
        }
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    /// Copy of the current clock
    pub fn clock(&self) -> LogicalClock {
        self.clock.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn stats(&self) -> LedgerStats {
        self.stats
    }

    /// Admit a write issued with the caller's causal context
    ///
    /// On success the operation has been inserted and, if its dependencies are
    /// met, applied. Returns the caller's context merged with the replica clock.
    pub fn submit(&mut self, kind: OpKind, context: &LogicalClock) -> LedgerResult<LogicalClock> {
        if !self.active {
            self.stats.rejected += 1;
            return Err(LedgerError::ReadOnly);
        }

        if let Err(e) = self.accounts.validate(&kind) {
            self.stats.rejected += 1;
            debug!(replica = %self.id, op = %kind, error = %e, "write rejected");
            return Err(e);
        }

        let mut timestamp = self.clock.clone();
        timestamp.increment(self.id.clone());
        if self.log.contains(&timestamp) {
            error!(replica = %self.id, timestamp = %timestamp, "origin timestamp collision on local insert");
            return Err(LedgerError::DuplicateOperation(timestamp));
        }

        self.clock.increment(self.id.clone());
        let op = Operation::new(kind, self.id.clone(), context.clone(), timestamp);
        debug!(replica = %self.id, op = %op, "write accepted");

        let accounts = &mut self.accounts;
        let stats = &mut self.stats;
        self.log
            .insert(op, &mut self.clock, |op, clock| {
                apply_stable(accounts, stats, op, clock)
            })?;
        self.stats.submitted += 1;

        Ok(context.merged(&self.clock))
    }

    pub fn create_account(
        &mut self,
        account: impl Into<AccountId>,
        context: &LogicalClock,
    ) -> LedgerResult<LogicalClock> {
        self.submit(
            OpKind::CreateAccount {
                account: account.into(),
            },
            context,
        )
    }

    pub fn delete_account(
        &mut self,
        account: impl Into<AccountId>,
        context: &LogicalClock,
    ) -> LedgerResult<LogicalClock> {
        self.submit(
            OpKind::DeleteAccount {
                account: account.into(),
            },
            context,
        )
    }

    pub fn transfer(
        &mut self,
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: Amount,
        context: &LogicalClock,
    ) -> LedgerResult<LogicalClock> {
        self.submit(
            OpKind::Transfer {
                from: from.into(),
                to: to.into(),
                amount,
            },
            context,
        )
    }

    /// Read a balance; allowed while deactivated
    pub fn read(&self, account: &str, context: &LogicalClock) -> LedgerResult<(Balance, LogicalClock)> {
        let balance = self
            .accounts
            .balance(account)
            .ok_or_else(|| LedgerError::AccountNotFound(account.into()))?;
        Ok((balance, context.merged(&self.clock)))
    }

    pub fn activate(&mut self) {
        if !self.active {
            info!(replica = %self.id, "replica activated");
        }
        self.active = true;
    }

    /// Switch to read-only mode; log and clock are untouched
    pub fn deactivate(&mut self) {
        if self.active {
            info!(replica = %self.id, "replica deactivated");
        }
        self.active = false;
    }

    /// Merge operations received from a peer
    pub fn merge_remote(&mut self, ops: Vec<Operation>) -> StabilizeReport {
        let accounts = &mut self.accounts;
        let stats = &mut self.stats;
        let report = self.log.merge_all(ops, &mut self.clock, |op, clock| {
            apply_stable(accounts, stats, op, clock)
        });

        self.stats.merged_batches += 1;
        self.stats.duplicates_skipped += u64::from(report.duplicates);
        debug!(
            replica = %self.id,
            inserted = report.inserted,
            duplicates = report.duplicates,
            promoted = report.promoted,
            pending = self.log.pending_len(),
            "remote operations merged"
        );
        report
    }

    /// Full log, stable prefix first
    pub fn snapshot(&self) -> Vec<Operation> {
        self.log.snapshot()
    }

    pub fn dump(&self) -> LedgerDump {
        LedgerDump {
            replica: self.id.clone(),
            active: self.active,
            clock: self.clock.clone(),
            balances: self
                .accounts
                .iter()
                .map(|(account, balance)| (account.clone(), balance))
                .collect(),
            operations: self.log.snapshot(),
        }
    }
}

/// Apply callback run for every operation promoted to stable
fn apply_stable(
    accounts: &mut AccountStore,
    stats: &mut LedgerStats,
    op: &Operation,
    clock: &mut LogicalClock,
) {
    match accounts.execute(&op.kind) {
        ExecOutcome::Applied => {}
        ExecOutcome::Skipped(reason) => {
            if let OpKind::Transfer { .. } = op.kind {
                stats.transfers_skipped += 1;
                warn!(op = %op, ?reason, "stable transfer had no effect");
            } else {
                debug!(op = %op, ?reason, "stable operation had no effect");
            }
        }
    }

    clock.advance(op.origin.clone(), op.origin_seq());
    stats.promoted += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::BROKER_ACCOUNT;

    fn replica(id: &str) -> ReplicaState {
        ReplicaState::new(id, ReplicaConfig::default())
    }

    fn empty() -> LogicalClock {
        LogicalClock::new()
    }

    #[test]
    fn test_fresh_replica() {
        let mut r = replica("A");
        assert_eq!(r.accounts().len(), 1);
        assert_eq!(
            r.accounts().balance(BROKER_ACCOUNT),
            Some(BROKER_INITIAL_BALANCE)
        );

        let ctx = r.create_account("u1", &empty()).unwrap();
        let (balance, _) = r.read("u1", &ctx).unwrap();

        assert_eq!(balance, 0);
        assert_eq!(r.log().len(), 1);
        assert_eq!(ctx, LogicalClock::from_entries([("A", 1)]));
    }

    #[test]
    fn test_transfers_round_trip() {
        let mut r = replica("A");
        let ctx = r.create_account("u1", &empty()).unwrap();
        let ctx = r.transfer("broker", "u1", 10, &ctx).unwrap();
        let ctx = r.transfer("u1", "broker", 5, &ctx).unwrap();

        assert_eq!(r.read("u1", &ctx).unwrap().0, 5);
        assert_eq!(r.read("broker", &ctx).unwrap().0, BROKER_INITIAL_BALANCE - 5);
        assert_eq!(r.log().len(), 3);
        assert_eq!(r.log().stable_len(), 3);
        assert_eq!(r.stats().submitted, 3);
    }

    #[test]
    fn test_delete_non_empty_rejected() {
        let mut r = replica("A");
        let ctx = r.create_account("u1", &empty()).unwrap();
        let ctx = r.transfer("broker", "u1", 50, &ctx).unwrap();
        let before = r.dump();

        let result = r.delete_account("u1", &ctx);

        assert_eq!(
            result,
            Err(LedgerError::AccountNotEmpty {
                account: "u1".into(),
                balance: 50
            })
        );
        assert_eq!(r.dump(), before);
        assert_eq!(r.stats().rejected, 1);
    }

    #[test]
    fn test_gossip_makes_remote_op_stable() {
        let mut a = replica("A");
        let mut b = replica("B");

        let ctx = a.create_account("x", &empty()).unwrap();
        assert_eq!(a.clock(), LogicalClock::from_entries([("A", 1)]));

        let report = b.merge_remote(a.snapshot());

        assert_eq!(report.promoted, 1);
        assert_eq!(b.log().stable_len(), 1);
        assert!(b.log().stable()[0].is_stable());
        assert!(b.clock().dominates(&ctx));
        assert_eq!(b.read("x", &empty()).unwrap().0, 0);
    }

    #[test]
    fn test_repeated_snapshot_is_idempotent() {
        let mut a = replica("A");
        let mut b = replica("B");
        let ctx = a.create_account("x", &empty()).unwrap();
        a.transfer("broker", "x", 7, &ctx).unwrap();

        b.merge_remote(a.snapshot());
        let after_first = b.dump();
        let report = b.merge_remote(a.snapshot());

        assert_eq!(report.inserted, 0);
        assert_eq!(report.duplicates, 2);
        assert_eq!(b.dump(), after_first);
        assert_eq!(b.stats().duplicates_skipped, 2);
    }

    #[test]
    fn test_deactivated_rejects_writes() {
        let mut r = replica("A");
        let ctx = r.create_account("u1", &empty()).unwrap();
        r.deactivate();
        let before = r.dump();

        assert_eq!(r.create_account("u2", &ctx), Err(LedgerError::ReadOnly));
        assert_eq!(r.transfer("broker", "u1", 1, &ctx), Err(LedgerError::ReadOnly));
        assert_eq!(r.delete_account("u1", &ctx), Err(LedgerError::ReadOnly));
        assert_eq!(r.dump(), before);
        assert!(r.read("u1", &ctx).is_ok());

        r.activate();
        assert!(r.create_account("u2", &ctx).is_ok());
    }

    #[test]
    fn test_read_missing_account() {
        let r = replica("A");
        assert_eq!(
            r.read("ghost", &empty()),
            Err(LedgerError::AccountNotFound("ghost".into()))
        );
    }

    #[test]
    fn test_returned_clock_keeps_caller_context() {
        let mut r = replica("A");
        let caller = LogicalClock::from_entries([("B", 0), ("C", 0)]);
        let ctx = r.create_account("u1", &caller).unwrap();

        assert_eq!(ctx.get("A"), 1);
        assert_eq!(ctx.len(), 3);
        assert_eq!(r.clock().len(), 1);
    }

    #[test]
    fn test_submit_rejects_colliding_timestamp() {
        let mut r = replica("A");

        // A stray operation that claims A's next timestamp but can never stabilize
        let stray = Operation::new(
            OpKind::CreateAccount {
                account: "ghost".into(),
            },
            "B".into(),
            LogicalClock::from_entries([("Z", 9)]),
            LogicalClock::from_entries([("A", 1)]),
        );
        r.merge_remote(vec![stray]);

        let result = r.create_account("u1", &empty());
        assert!(matches!(result, Err(LedgerError::DuplicateOperation(_))));
        assert_eq!(r.clock(), empty());
        assert!(!r.accounts().exists("u1"));
    }

    #[test]
    fn test_concurrent_overdraft_skipped() {
        let mut a = replica("A");
        let mut b = replica("B");

        let ctx = a.create_account("u1", &empty()).unwrap();
        let ctx = a.transfer("broker", "u1", 100, &ctx).unwrap();
        b.merge_remote(a.snapshot());

        // Both replicas drain u1 concurrently
        a.transfer("u1", "broker", 100, &ctx).unwrap();
        b.transfer("u1", "broker", 100, &ctx).unwrap();

        a.merge_remote(b.snapshot());
        b.merge_remote(a.snapshot());

        for r in [&a, &b] {
            assert_eq!(r.accounts().balance("u1"), Some(0));
            assert_eq!(r.accounts().total_balance(), BROKER_INITIAL_BALANCE);
            assert_eq!(r.log().stable_len(), 4);
            assert_eq!(r.stats().transfers_skipped, 1);
        }
        assert_eq!(a.clock(), b.clock());
    }

    #[test]
    fn test_causal_dependency_across_replicas() {
        let mut a = replica("A");
        let mut b = replica("B");
        let mut c = replica("C");

        let ctx = a.create_account("u1", &empty()).unwrap();
        b.merge_remote(a.snapshot());
        b.transfer("broker", "u1", 30, &ctx).unwrap();

        // C hears about B's transfer before A's create
        c.merge_remote(b.snapshot().into_iter().rev().collect());
        let b_only: Vec<_> = b
            .snapshot()
            .into_iter()
            .filter(|op| op.origin.as_str() == "B")
            .collect();
        let mut d = replica("D");
        d.merge_remote(b_only);
        assert_eq!(d.log().pending_len(), 1);
        assert!(!d.accounts().exists("u1"));

        d.merge_remote(a.snapshot());
        assert_eq!(d.log().pending_len(), 0);
        assert_eq!(d.accounts().balance("u1"), Some(30));
        assert_eq!(c.accounts().balance("u1"), Some(30));
    }
}
