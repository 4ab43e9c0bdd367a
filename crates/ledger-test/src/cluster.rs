//! In-process replica cluster connected by chaos links
//!
//! Gossip snapshots are encoded as real `PushLedgerSnapshot` frames and pushed
//! through one `ChaosNetwork` per directed link, then decoded and merged on
//! the receiving side.

use std::collections::BTreeMap;
use std::time::Duration;

use ledger_core::{Balance, LedgerResult, LogicalClock, OpKind, ReplicaId, BROKER_INITIAL_BALANCE};
use ledger_state::{ReplicaConfig, ReplicaState};
use ledger_wire::{Frame, Request};

use crate::chaos::{ChaosConfig, ChaosNetwork, ChaosStats};
use crate::convergence::{check_convergence, Divergence};

/// Cluster configuration
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Number of replicas
    pub replicas: usize,
    /// Conditions of every link
    pub chaos: ChaosConfig,
    /// Base RNG seed; each link derives its own
    pub seed: u64,
    /// Broker seed balance on every replica
    pub broker_balance: Balance,
    /// Simulated time per tick
    pub tick: Duration,
    /// Push the log to all peers after each accepted write
    pub gossip_on_write: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            replicas: 3,
            chaos: ChaosConfig::good(),
            seed: 42,
            broker_balance: BROKER_INITIAL_BALANCE,
            tick: Duration::from_millis(10),
            gossip_on_write: true,
        }
    }
}

impl ClusterConfig {
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_chaos(mut self, chaos: ChaosConfig) -> Self {
        self.chaos = chaos;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_broker_balance(mut self, balance: Balance) -> Self {
        self.broker_balance = balance;
        self
    }

    pub fn with_gossip_on_write(mut self, enabled: bool) -> Self {
        self.gossip_on_write = enabled;
        self
    }
}

/// Cluster-wide delivery counters
#[derive(Clone, Debug, Default)]
pub struct ClusterStats {
    pub snapshots_sent: u64,
    pub snapshots_merged: u64,
    pub frames_rejected: u64,
}

/// Replicas plus the links between them
pub struct Cluster {
    config: ClusterConfig,
    replicas: Vec<ReplicaState>,
    /// Directed links keyed by (from, to); ordered so runs are reproducible
    links: BTreeMap<(usize, usize), ChaosNetwork>,
    stats: ClusterStats,
}

impl Cluster {
    pub fn new(config: ClusterConfig) -> Self {
        let replica_config = ReplicaConfig::default().with_broker_balance(config.broker_balance);
        let replicas = (0..config.replicas)
            .map(|i| ReplicaState::new(replica_name(i), replica_config.clone()))
            .collect();

        let mut links = BTreeMap::new();
        let mut seed = config.seed;
        for from in 0..config.replicas {
            for to in 0..config.replicas {
                if from != to {
                    links.insert((from, to), ChaosNetwork::new(config.chaos.clone(), seed));
                    seed = seed.wrapping_add(1);
                }
            }
        }

        Cluster {
            config,
            replicas,
            links,
            stats: ClusterStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn replica(&self, index: usize) -> &ReplicaState {
        &self.replicas[index]
    }

    pub fn replica_mut(&mut self, index: usize) -> &mut ReplicaState {
        &mut self.replicas[index]
    }

    pub fn replicas(&self) -> &[ReplicaState] {
        &self.replicas
    }

    pub fn stats(&self) -> &ClusterStats {
        &self.stats
    }

    pub fn link_stats(&self, from: usize, to: usize) -> Option<&ChaosStats> {
        self.links.get(&(from, to)).map(|l| l.stats())
    }

    /// Submit a write at one replica, gossiping on success when enabled
    pub fn submit(&mut self, index: usize, kind: OpKind, context: &LogicalClock) -> LedgerResult<LogicalClock> {
        let clock = self.replicas[index].submit(kind, context)?;
        if self.config.gossip_on_write {
            self.gossip_from(index)?;
        }
        Ok(clock)
    }

    /// Push the full log of one replica to every other replica
    pub fn gossip_from(&mut self, index: usize) -> LedgerResult<()> {
        let replica = &self.replicas[index];
        let request = Request::PushLedgerSnapshot {
            sender: replica.id().clone(),
            operations: replica.snapshot(),
        };
        let bytes = request.to_frame()?.serialize()?.to_vec();

        for to in 0..self.replicas.len() {
            if let Some(link) = self.links.get_mut(&(index, to)) {
                link.send(bytes.clone());
                self.stats.snapshots_sent += 1;
            }
        }
        Ok(())
    }

    /// Advance every link by one tick and merge what arrives; returns frames delivered
    pub fn tick(&mut self) -> usize {
        let dt = self.config.tick;
        let mut arrivals = Vec::new();
        for (&(_, to), link) in self.links.iter_mut() {
            for data in link.tick(dt) {
                arrivals.push((to, data));
            }
        }

        let delivered = arrivals.len();
        for (to, data) in arrivals {
            self.deliver(to, &data);
        }
        delivered
    }

    fn deliver(&mut self, to: usize, data: &[u8]) {
        let decoded = Frame::parse(data).and_then(|frame| Request::from_frame(&frame));
        match decoded {
            Ok(Request::PushLedgerSnapshot { operations, .. }) => {
                self.replicas[to].merge_remote(operations);
                self.stats.snapshots_merged += 1;
            }
            Ok(other) => {
                tracing::warn!(kind = ?other.kind(), "unexpected request on gossip link");
                self.stats.frames_rejected += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "undecodable gossip frame");
                self.stats.frames_rejected += 1;
            }
        }
    }

    /// Frames still in flight across all links
    pub fn in_flight(&self) -> usize {
        self.links.values().map(|l| l.in_flight()).sum()
    }

    /// Tick until no frame is in flight; returns the number of ticks taken
    pub fn run_until_quiet(&mut self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while self.in_flight() > 0 && ticks < max_ticks {
            self.tick();
            ticks += 1;
        }
        ticks
    }

    /// Every replica pushes its log once, then the links drain
    pub fn anti_entropy_round(&mut self, max_ticks: usize) -> LedgerResult<()> {
        for i in 0..self.replicas.len() {
            self.gossip_from(i)?;
        }
        self.run_until_quiet(max_ticks);
        Ok(())
    }

    /// Replace the conditions on one directed link
    pub fn set_link(&mut self, from: usize, to: usize, config: ChaosConfig) {
        if let Some(link) = self.links.get_mut(&(from, to)) {
            link.set_config(config);
        }
    }

    /// Drop everything to and from one replica
    pub fn isolate(&mut self, index: usize) {
        let cut = ChaosConfig::perfect().with_loss_rate(1.0);
        for (&(from, to), link) in self.links.iter_mut() {
            if from == index || to == index {
                link.set_config(cut.clone());
            }
        }
    }

    /// Make every link perfect
    pub fn heal(&mut self) {
        for link in self.links.values_mut() {
            link.set_config(ChaosConfig::perfect());
        }
    }

    pub fn check_convergence(&self) -> Result<(), Divergence> {
        check_convergence(&self.replicas)
    }
}

/// Replica names: A, B, C, ... then R26, R27, ...
pub fn replica_name(index: usize) -> ReplicaId {
    if index < 26 {
        ReplicaId::new(((b'A' + index as u8) as char).to_string())
    } else {
        ReplicaId::new(format!("R{}", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(account: &str) -> OpKind {
        OpKind::CreateAccount {
            account: account.into(),
        }
    }

    #[test]
    fn test_replica_names() {
        assert_eq!(replica_name(0).as_str(), "A");
        assert_eq!(replica_name(2).as_str(), "C");
        assert_eq!(replica_name(30).as_str(), "R30");
    }

    #[test]
    fn test_write_reaches_all_replicas() {
        let mut cluster = Cluster::new(ClusterConfig::default().with_chaos(ChaosConfig::perfect()));

        cluster.submit(0, create("x"), &LogicalClock::new()).unwrap();
        cluster.run_until_quiet(100);

        for replica in cluster.replicas() {
            assert!(replica.accounts().exists("x"));
            assert_eq!(replica.log().stable_len(), 1);
        }
        assert_eq!(cluster.stats().snapshots_merged, 2);
        assert!(cluster.check_convergence().is_ok());
    }

    #[test]
    fn test_isolated_replica_catches_up_after_heal() {
        let mut cluster = Cluster::new(ClusterConfig::default().with_chaos(ChaosConfig::perfect()));
        cluster.isolate(2);

        let ctx = cluster.submit(0, create("x"), &LogicalClock::new()).unwrap();
        cluster.submit(1, create("y"), &ctx).unwrap();
        cluster.run_until_quiet(100);

        assert!(!cluster.replica(2).accounts().exists("x"));
        assert!(cluster.check_convergence().is_err());

        cluster.heal();
        cluster.anti_entropy_round(100).unwrap();

        assert!(cluster.replica(2).accounts().exists("y"));
        assert!(cluster.check_convergence().is_ok());
    }

    #[test]
    fn test_lossy_links_converge_after_heal() {
        let mut cluster = Cluster::new(
            ClusterConfig::default()
                .with_replicas(4)
                .with_chaos(ChaosConfig::lossy())
                .with_seed(9),
        );

        let mut ctx = LogicalClock::new();
        for i in 0..12 {
            let name = format!("u{}", i);
            ctx = cluster.submit(i % 4, create(&name), &ctx).unwrap_or(ctx);
            cluster.tick();
        }
        cluster.run_until_quiet(1000);
        cluster.heal();
        cluster.anti_entropy_round(1000).unwrap();

        assert!(cluster.check_convergence().is_ok());
        assert_eq!(cluster.stats().frames_rejected, 0);
    }
}
