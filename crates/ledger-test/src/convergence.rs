//! End-to-end convergence suite
//!
//! Drives a seeded client workload against a chaos cluster, heals the
//! network, runs one anti-entropy round and verifies that every replica
//! ended up with the same stable log, clock and balances.
//!
//! The workload is commuting across clients: each client only touches its
//! own accounts plus the broker, the broker is seeded far above what the run
//! can drain, and only accounts that were never funded get deleted. Clients
//! write only to replicas that have already stabilized everything in their
//! context.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use ledger_core::{AccountId, Balance, LogicalClock, OpKind, ReplicaId};
use ledger_state::ReplicaState;

use crate::chaos::ChaosConfig;
use crate::cluster::{Cluster, ClusterConfig};

/// How two replicas disagree
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Divergence {
    #[error("replica {replica} still has {count} pending operations")]
    Pending { replica: ReplicaId, count: usize },

    #[error("replica {replica} clock {actual} differs from {expected}")]
    Clock {
        replica: ReplicaId,
        expected: LogicalClock,
        actual: LogicalClock,
    },

    #[error("replica {replica} stable log differs: {missing} missing, {extra} extra")]
    StableLog {
        replica: ReplicaId,
        missing: usize,
        extra: usize,
    },

    #[error("replica {replica} balances differ")]
    Balances { replica: ReplicaId },

    #[error("replica {replica} holds {actual} in total, expected {expected}")]
    Conservation {
        replica: ReplicaId,
        expected: Balance,
        actual: Balance,
    },
}

fn stable_set(replica: &ReplicaState) -> HashSet<LogicalClock> {
    replica
        .log()
        .stable()
        .iter()
        .map(|op| op.origin_timestamp.clone())
        .collect()
}

fn balances(replica: &ReplicaState) -> Vec<(AccountId, Balance)> {
    replica
        .accounts()
        .iter()
        .map(|(account, balance)| (account.clone(), balance))
        .collect()
}

/// Check that every replica agrees with the first one
///
/// Stable logs are compared as sets; concurrent operations may stabilize in
/// different orders on different replicas.
pub fn check_convergence(replicas: &[ReplicaState]) -> Result<(), Divergence> {
    for replica in replicas {
        let count = replica.log().pending_len();
        if count > 0 {
            return Err(Divergence::Pending {
                replica: replica.id().clone(),
                count,
            });
        }
    }

    let Some((first, rest)) = replicas.split_first() else {
        return Ok(());
    };
    let expected_clock = first.clock();
    let expected_log = stable_set(first);
    let expected_balances = balances(first);

    for replica in rest {
        let actual = replica.clock();
        if actual != expected_clock {
            return Err(Divergence::Clock {
                replica: replica.id().clone(),
                expected: expected_clock,
                actual,
            });
        }

        let log = stable_set(replica);
        if log != expected_log {
            return Err(Divergence::StableLog {
                replica: replica.id().clone(),
                missing: expected_log.difference(&log).count(),
                extra: log.difference(&expected_log).count(),
            });
        }

        if balances(replica) != expected_balances {
            return Err(Divergence::Balances {
                replica: replica.id().clone(),
            });
        }
    }

    Ok(())
}

/// Check that no replica created or destroyed money
pub fn check_conservation(replicas: &[ReplicaState], expected: Balance) -> Result<(), Divergence> {
    for replica in replicas {
        let actual = replica.accounts().total_balance();
        if actual != expected {
            return Err(Divergence::Conservation {
                replica: replica.id().clone(),
                expected,
                actual,
            });
        }
    }
    Ok(())
}

// ============================================================================
// WORKLOAD
// ============================================================================

/// A simulated client with its own causal context
#[derive(Clone, Debug)]
pub struct SimClient {
    pub name: String,
    pub context: LogicalClock,
    /// Accounts created by this client, with a flag set once funded
    accounts: Vec<(AccountId, bool)>,
    next_account: u32,
}

impl SimClient {
    fn new(name: String) -> Self {
        SimClient {
            name,
            context: LogicalClock::new(),
            accounts: Vec::new(),
            next_account: 0,
        }
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

/// Seeded generator of commuting client operations
pub struct Workload {
    rng: StdRng,
    clients: Vec<SimClient>,
    max_amount: i64,
}

impl Workload {
    pub fn new(clients: usize, seed: u64) -> Self {
        Workload {
            rng: StdRng::seed_from_u64(seed),
            clients: (0..clients).map(|i| SimClient::new(format!("c{}", i))).collect(),
            max_amount: 20,
        }
    }

    pub fn clients(&self) -> &[SimClient] {
        &self.clients
    }

    pub fn client(&self, index: usize) -> &SimClient {
        &self.clients[index]
    }

    pub fn pick_client(&mut self) -> usize {
        self.rng.gen_range(0..self.clients.len())
    }

    pub fn pick<T: Copy>(&mut self, choices: &[T]) -> Option<T> {
        if choices.is_empty() {
            None
        } else {
            Some(choices[self.rng.gen_range(0..choices.len())])
        }
    }

    /// Next operation for a client
    pub fn next_op(&mut self, client: usize) -> OpKind {
        let amount = self.rng.gen_range(1..=self.max_amount);
        let roll = self.rng.gen_range(0..100);
        let c = &mut self.clients[client];

        if c.accounts.is_empty() || roll < 20 {
            let account = AccountId::new(format!("{}-{}", c.name, c.next_account));
            c.next_account += 1;
            return OpKind::CreateAccount { account };
        }

        let pick = self.rng.gen_range(0..c.accounts.len());
        let (account, funded) = c.accounts[pick].clone();

        if roll < 30 && !funded {
            return OpKind::DeleteAccount { account };
        }

        if roll < 70 || !funded {
            OpKind::Transfer {
                from: AccountId::broker(),
                to: account,
                amount,
            }
        } else {
            OpKind::Transfer {
                from: account,
                to: AccountId::broker(),
                amount,
            }
        }
    }

    /// Record an accepted write and the clock it returned
    pub fn accepted(&mut self, client: usize, kind: &OpKind, clock: &LogicalClock) {
        let c = &mut self.clients[client];
        c.context.merge(clock);

        match kind {
            OpKind::CreateAccount { account } => c.accounts.push((account.clone(), false)),
            OpKind::DeleteAccount { account } => c.accounts.retain(|(a, _)| a != account),
            OpKind::Transfer { to, .. } => {
                if let Some(entry) = c.accounts.iter_mut().find(|(a, _)| a == to) {
                    entry.1 = true;
                }
            }
        }
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Configuration of one convergence run
#[derive(Debug, Clone)]
pub struct ConvergenceConfig {
    pub replicas: usize,
    pub clients: usize,
    /// Workload steps (each step is at most one write)
    pub steps: usize,
    pub chaos: ChaosConfig,
    pub seed: u64,
    pub broker_balance: Balance,
    /// Tick bound for draining links
    pub max_ticks: usize,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        ConvergenceConfig {
            replicas: 3,
            clients: 4,
            steps: 60,
            chaos: ChaosConfig::good(),
            seed: 1,
            broker_balance: 1_000_000,
            max_ticks: 5_000,
        }
    }
}

impl ConvergenceConfig {
    /// Two replicas, one client, perfect links
    pub fn minimal() -> Self {
        ConvergenceConfig {
            replicas: 2,
            clients: 1,
            steps: 10,
            chaos: ChaosConfig::perfect(),
            ..Default::default()
        }
    }

    pub fn standard() -> Self {
        Self::default()
    }

    pub fn stress() -> Self {
        ConvergenceConfig {
            replicas: 5,
            clients: 8,
            steps: 300,
            chaos: ChaosConfig::hostile(),
            ..Default::default()
        }
    }

    pub fn with_chaos(mut self, chaos: ChaosConfig) -> Self {
        self.chaos = chaos;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Outcome of a convergence run
#[derive(Debug, Clone, Default)]
pub struct ConvergenceResult {
    pub accepted: usize,
    pub rejected: usize,
    /// Steps where no replica had caught up with the chosen client
    pub deferred: usize,
    pub snapshots_merged: u64,
    pub transfers_skipped: u64,
    pub divergence: Option<Divergence>,
}

impl ConvergenceResult {
    pub fn passed(&self) -> bool {
        self.divergence.is_none()
    }
}

/// Drives a workload over a chaos cluster
pub struct ConvergenceHarness {
    config: ConvergenceConfig,
    cluster: Cluster,
    workload: Workload,
}

impl ConvergenceHarness {
    pub fn new(config: ConvergenceConfig) -> Self {
        let cluster = Cluster::new(
            ClusterConfig::default()
                .with_replicas(config.replicas)
                .with_chaos(config.chaos.clone())
                .with_seed(config.seed)
                .with_broker_balance(config.broker_balance),
        );
        let workload = Workload::new(config.clients, config.seed);

        ConvergenceHarness {
            config,
            cluster,
            workload,
        }
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn cluster_mut(&mut self) -> &mut Cluster {
        &mut self.cluster
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    /// Replicas with nothing pending whose clock covers the client's context
    fn caught_up(&self, client: usize) -> Vec<usize> {
        let context = &self.workload.client(client).context;
        self.cluster
            .replicas()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.log().pending_len() == 0 && r.clock().dominates(context))
            .map(|(i, _)| i)
            .collect()
    }

    /// Run the workload without healing the network
    pub fn run_workload(&mut self, result: &mut ConvergenceResult) {
        for _ in 0..self.config.steps {
            let client = self.workload.pick_client();
            let candidates = self.caught_up(client);

            if let Some(replica) = self.workload.pick(&candidates) {
                let kind = self.workload.next_op(client);
                let context = self.workload.client(client).context.clone();

                match self.cluster.submit(replica, kind.clone(), &context) {
                    Ok(clock) => {
                        self.workload.accepted(client, &kind, &clock);
                        result.accepted += 1;
                    }
                    Err(e) => {
                        tracing::debug!(client, replica, error = %e, "workload write rejected");
                        result.rejected += 1;
                    }
                }
            } else {
                result.deferred += 1;
            }

            self.cluster.tick();
        }
    }

    /// Workload, drain, heal, anti-entropy, verify
    pub fn run(&mut self) -> ConvergenceResult {
        let mut result = ConvergenceResult::default();

        self.run_workload(&mut result);
        self.settle();
        self.verify(&mut result);
        result
    }

    /// Drain the links, heal them and push every log once more
    pub fn settle(&mut self) {
        self.cluster.run_until_quiet(self.config.max_ticks);
        self.cluster.heal();
        if let Err(e) = self.cluster.anti_entropy_round(self.config.max_ticks) {
            tracing::warn!(error = %e, "anti-entropy round failed");
        }
    }

    pub fn verify(&self, result: &mut ConvergenceResult) {
        let replicas = self.cluster.replicas();
        result.snapshots_merged = self.cluster.stats().snapshots_merged;
        result.transfers_skipped = replicas.iter().map(|r| r.stats().transfers_skipped).sum();
        result.divergence = check_convergence(replicas)
            .and_then(|()| check_conservation(replicas, self.config.broker_balance))
            .err();
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

pub fn run_minimal() -> ConvergenceResult {
    ConvergenceHarness::new(ConvergenceConfig::minimal()).run()
}

pub fn run_with_chaos(chaos: ChaosConfig, seed: u64) -> ConvergenceResult {
    ConvergenceHarness::new(ConvergenceConfig::standard().with_chaos(chaos).with_seed(seed)).run()
}

pub fn run_stress() -> ConvergenceResult {
    ConvergenceHarness::new(ConvergenceConfig::stress()).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::BROKER_INITIAL_BALANCE;
    use proptest::prelude::*;

    #[test]
    fn test_empty_replicas_agree() {
        let replicas = vec![
            ReplicaState::new("A", Default::default()),
            ReplicaState::new("B", Default::default()),
        ];
        assert_eq!(check_convergence(&replicas), Ok(()));
        assert_eq!(check_conservation(&replicas, BROKER_INITIAL_BALANCE), Ok(()));
        assert_eq!(check_convergence(&[]), Ok(()));
    }

    #[test]
    fn test_pending_operation_is_divergence() {
        let mut b = ReplicaState::new("B", Default::default());
        let ctx = LogicalClock::from_entries([("A", 1)]);
        b.create_account("x", &ctx).unwrap();

        let replicas = vec![ReplicaState::new("A", Default::default()), b];
        assert!(matches!(
            check_convergence(&replicas),
            Err(Divergence::Pending { count: 1, .. })
        ));
    }

    #[test]
    fn test_missing_operation_is_divergence() {
        let mut a = ReplicaState::new("A", Default::default());
        a.create_account("x", &LogicalClock::new()).unwrap();

        let replicas = vec![a, ReplicaState::new("B", Default::default())];
        assert!(matches!(
            check_convergence(&replicas),
            Err(Divergence::Clock { .. })
        ));
    }

    #[test]
    fn test_workload_is_deterministic() {
        let ops = |seed| {
            let mut w = Workload::new(2, seed);
            (0..20)
                .map(|_| {
                    let c = w.pick_client();
                    let kind = w.next_op(c);
                    w.accepted(c, &kind, &LogicalClock::new());
                    kind
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(ops(5), ops(5));
    }

    #[test]
    fn test_workload_deletes_only_unfunded_accounts() {
        let mut w = Workload::new(1, 11);
        let mut funded = HashSet::new();
        for _ in 0..200 {
            let kind = w.next_op(0);
            match &kind {
                OpKind::Transfer { to, .. } if !to.is_broker() => {
                    funded.insert(to.clone());
                }
                OpKind::DeleteAccount { account } => assert!(!funded.contains(account)),
                _ => {}
            }
            w.accepted(0, &kind, &LogicalClock::new());
        }
    }

    #[test]
    fn test_minimal_run_converges() {
        let result = run_minimal();
        assert!(result.passed(), "{:?}", result.divergence);
        assert!(result.accepted > 0);
        assert_eq!(result.transfers_skipped, 0);
    }

    #[test]
    fn test_good_network_converges() {
        let result = run_with_chaos(ChaosConfig::good(), 3);
        assert!(result.passed(), "{:?}", result.divergence);
        assert!(result.accepted > 0);
    }

    #[test]
    fn test_lossy_network_converges_after_heal() {
        let result = run_with_chaos(ChaosConfig::lossy(), 17);
        assert!(result.passed(), "{:?}", result.divergence);
        assert_eq!(result.transfers_skipped, 0);
    }

    #[test]
    fn test_hostile_network_converges_after_heal() {
        let result = run_stress();
        assert!(result.passed(), "{:?}", result.divergence);
        assert!(result.accepted > 0);
    }

    #[test]
    fn test_partition_then_heal() {
        let mut harness = ConvergenceHarness::new(ConvergenceConfig::standard().with_seed(8));
        harness.cluster_mut().isolate(0);

        let mut result = ConvergenceResult::default();
        harness.run_workload(&mut result);
        harness.cluster_mut().run_until_quiet(1_000);

        // The isolated replica only saw what was written to it directly
        assert!(harness
            .cluster()
            .replica(0)
            .log()
            .iter()
            .all(|op| op.origin.as_str() == "A"));

        harness.settle();
        harness.verify(&mut result);
        assert!(result.passed(), "{:?}", result.divergence);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_commuting_workload_converges(seed in any::<u64>()) {
            let result = run_with_chaos(ChaosConfig::lossy(), seed);
            prop_assert!(result.passed(), "{:?}", result.divergence);
            prop_assert_eq!(result.transfers_skipped, 0);
        }
    }
}
