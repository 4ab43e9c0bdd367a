//! Causal Ledger Runtime - Replica orchestration
//!
//! This crate wires a `ReplicaState` into a running replica:
//! 1. Lock the state behind a cloneable `Replica` handle
//! 2. Discover peers through a `Registry`
//! 3. Push full log snapshots to peers after each write (`ReplicationCoordinator`)
//! 4. Dispatch decoded requests (`LedgerService`)
//! 5. Serve them over TCP (`ReplicaServer`) and call them (`LedgerClient`)

pub mod client;
pub mod config;
pub mod gossip;
pub mod registry;
pub mod replica;
pub mod server;
pub mod service;
pub mod telemetry;

pub use client::*;
pub use config::*;
pub use gossip::*;
pub use registry::*;
pub use replica::*;
pub use server::*;
pub use service::*;
pub use telemetry::*;
