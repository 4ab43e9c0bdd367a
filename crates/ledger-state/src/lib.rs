//! Causal ledger state engine
//!
//! This crate holds everything a single replica mutates:
//! - Account balances and the execution semantics of each operation kind
//! - The operation log with its stable/pending partition
//! - Causal stabilization (the promotion cascade)
//! - The `ReplicaState` aggregate tying log, clock and accounts together

pub mod accounts;
pub mod log;
pub mod replica;

pub use accounts::*;
pub use log::*;
pub use replica::*;
