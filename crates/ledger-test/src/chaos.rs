//! Chaos network for gossip testing
//!
//! Simulates a hostile link between two replicas:
//! - Latency with uniform jitter
//! - Random and burst loss
//! - Reordering
//! - Duplication
//!
//! Every decision comes from a seeded RNG, so a run is reproducible.

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Link chaos configuration
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Base latency
    pub base_latency: Duration,
    /// Upper bound of uniform jitter added to the base latency
    pub max_jitter: Duration,
    /// Loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Probability that a loss burst starts
    pub burst_loss_prob: f64,
    /// Burst loss length range
    pub burst_length: (u32, u32),
    /// Reorder probability
    pub reorder_prob: f64,
    /// Reorder depth (max messages jumped over)
    pub reorder_depth: u32,
    /// Duplicate probability
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(20),
            max_jitter: Duration::from_millis(20),
            loss_rate: 0.01,
            burst_loss_prob: 0.01,
            burst_length: (1, 3),
            reorder_prob: 0.05,
            reorder_depth: 3,
            duplicate_prob: 0.01,
        }
    }
}

impl ChaosConfig {
    /// Reliable, in-order link
    pub fn perfect() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            reorder_prob: 0.0,
            reorder_depth: 0,
            duplicate_prob: 0.0,
        }
    }

    /// Good network conditions
    pub fn good() -> Self {
        ChaosConfig::default()
    }

    /// Lossy link with frequent reordering
    pub fn lossy() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(50),
            max_jitter: Duration::from_millis(100),
            loss_rate: 0.2,
            burst_loss_prob: 0.05,
            burst_length: (2, 5),
            reorder_prob: 0.3,
            reorder_depth: 5,
            duplicate_prob: 0.1,
        }
    }

    /// Hostile network conditions
    pub fn hostile() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(100),
            max_jitter: Duration::from_millis(400),
            loss_rate: 0.4,
            burst_loss_prob: 0.1,
            burst_length: (3, 8),
            reorder_prob: 0.5,
            reorder_depth: 10,
            duplicate_prob: 0.2,
        }
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    pub fn with_reorder(mut self, prob: f64, depth: u32) -> Self {
        self.reorder_prob = prob;
        self.reorder_depth = depth;
        self
    }

    pub fn with_duplicate_prob(mut self, prob: f64) -> Self {
        self.duplicate_prob = prob;
        self
    }

    pub fn with_latency(mut self, base: Duration, max_jitter: Duration) -> Self {
        self.base_latency = base;
        self.max_jitter = max_jitter;
        self
    }
}

/// Message in flight
#[derive(Clone, Debug)]
pub struct ChaosPacket {
    /// Encoded frame
    pub data: Vec<u8>,
    /// Scheduled delivery time (relative to start)
    pub delivery_time: Duration,
    /// Original send time
    pub send_time: Duration,
    /// Sequence number (for tracking)
    pub seq: u64,
}

/// Chaos link statistics
#[derive(Clone, Debug, Default)]
pub struct ChaosStats {
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_lost: u64,
    pub packets_reordered: u64,
    pub packets_duplicated: u64,
    pub max_latency_ms: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.packets_lost as f64 / self.packets_sent as f64
        }
    }
}

/// One-directional chaos link
pub struct ChaosNetwork {
    config: ChaosConfig,
    rng: StdRng,
    /// Packets in flight, in delivery order
    in_flight: VecDeque<ChaosPacket>,
    /// Current time
    current_time: Duration,
    /// Burst loss counter
    burst_remaining: u32,
    /// Sequence counter
    next_seq: u64,
    stats: ChaosStats,
}

impl ChaosNetwork {
    /// Create a new chaos link with seed
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        ChaosNetwork {
            config,
            rng: StdRng::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            current_time: Duration::ZERO,
            burst_remaining: 0,
            next_seq: 0,
            stats: ChaosStats::default(),
        }
    }

    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// Replace the link conditions; packets in flight are kept
    pub fn set_config(&mut self, config: ChaosConfig) {
        self.config = config;
        self.burst_remaining = 0;
    }

    fn latency(&mut self) -> Duration {
        let jitter_ms = self.config.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            self.rng.gen_range(0..=jitter_ms)
        };
        self.config.base_latency + Duration::from_millis(jitter)
    }

    /// Send a packet into the link
    pub fn send(&mut self, data: Vec<u8>) {
        self.stats.packets_sent += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.should_drop() {
            self.stats.packets_lost += 1;
            return;
        }

        let delivery_time = self.current_time + self.latency();
        let packet = ChaosPacket {
            data,
            delivery_time,
            send_time: self.current_time,
            seq,
        };

        let duplicate = self.rng.gen::<f64>() < self.config.duplicate_prob;
        let copy = duplicate.then(|| packet.clone());

        if self.rng.gen::<f64>() < self.config.reorder_prob && !self.in_flight.is_empty() {
            // Jump ahead of up to `reorder_depth` queued packets
            let depth = self.config.reorder_depth.min(self.in_flight.len() as u32);
            let pos = self.rng.gen_range(0..=depth) as usize;
            let insert_pos = self.in_flight.len().saturating_sub(pos);
            self.in_flight.insert(insert_pos, packet);
            self.stats.packets_reordered += 1;
        } else {
            self.in_flight.push_back(packet);
        }

        if let Some(mut copy) = copy {
            copy.delivery_time += self.latency();
            self.in_flight.push_back(copy);
            self.stats.packets_duplicated += 1;
        }
    }

    fn should_drop(&mut self) -> bool {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }

        if self.rng.gen::<f64>() < self.config.burst_loss_prob {
            let (min, max) = self.config.burst_length;
            self.burst_remaining = self.rng.gen_range(min..=max.max(min));
            return true;
        }

        self.rng.gen::<f64>() < self.config.loss_rate
    }

    /// Advance time and take delivered packets, in queue order
    pub fn tick(&mut self, dt: Duration) -> Vec<Vec<u8>> {
        self.current_time += dt;

        let mut delivered = Vec::new();
        while self
            .in_flight
            .front()
            .is_some_and(|p| p.delivery_time <= self.current_time)
        {
            let Some(packet) = self.in_flight.pop_front() else {
                break;
            };
            let latency = (self.current_time - packet.send_time).as_millis() as u64;

            self.stats.packets_delivered += 1;
            self.stats.max_latency_ms = self.stats.max_latency_ms.max(latency);
            delivered.push(packet.data);
        }

        delivered
    }

    /// Packets still in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(network: &mut ChaosNetwork) -> Vec<u8> {
        let mut delivered = Vec::new();
        for _ in 0..1000 {
            for p in network.tick(Duration::from_millis(10)) {
                delivered.push(p[0]);
            }
            if network.in_flight() == 0 {
                break;
            }
        }
        delivered
    }

    #[test]
    fn test_perfect_link_in_order() {
        let mut network = ChaosNetwork::new(ChaosConfig::perfect(), 1);
        for i in 0..50u8 {
            network.send(vec![i]);
        }

        let delivered = drain(&mut network);
        assert_eq!(delivered, (0..50u8).collect::<Vec<_>>());
        assert_eq!(network.stats().packets_lost, 0);
    }

    #[test]
    fn test_hostile_link_loses_and_reorders() {
        let mut network = ChaosNetwork::new(ChaosConfig::hostile(), 12345);
        for i in 0..200u8 {
            network.send(vec![i]);
        }
        drain(&mut network);

        let stats = network.stats();
        assert!(stats.loss_rate() > 0.2);
        assert!(stats.packets_reordered > 0);
        assert!(stats.packets_duplicated > 0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = |seed| {
            let mut network = ChaosNetwork::new(ChaosConfig::lossy(), seed);
            for i in 0..100u8 {
                network.send(vec![i]);
            }
            drain(&mut network)
        };

        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn test_set_config_heals_link() {
        let mut network = ChaosNetwork::new(ChaosConfig::hostile().with_loss_rate(1.0), 3);
        network.send(vec![0]);
        network.set_config(ChaosConfig::perfect());
        network.send(vec![1]);

        assert_eq!(drain(&mut network), vec![1]);
    }
}
