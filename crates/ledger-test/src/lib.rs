//! Causal Ledger Test Harness - Chaos clusters and convergence checks
//!
//! This crate provides:
//! - Seeded lossy, reordering and duplicating links
//! - An in-process replica cluster gossiping real wire frames
//! - Convergence and conservation checks over a commuting workload

pub mod chaos;
pub mod cluster;
pub mod convergence;

pub use chaos::*;
pub use cluster::*;
pub use convergence::*;
