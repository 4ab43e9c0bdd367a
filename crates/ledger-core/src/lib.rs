//! Causal Ledger Core - Fundamental types and primitives
//!
//! This crate defines the core types shared by every replica:
//! - Identifiers (ReplicaId, AccountId)
//! - Logical clocks (vector clocks for causal ordering)
//! - Operations (account mutations tagged with causal metadata)
//! - Ledger dumps (admin view of a replica)
//! - Error taxonomy and protocol constants

pub mod id;
pub mod clock;
pub mod operation;
pub mod dump;
pub mod error;

pub use id::*;
pub use clock::*;
pub use operation::*;
pub use dump::*;
pub use error::*;

/// Account seeded at replica creation; the source of funds for initial distribution
pub const BROKER_ACCOUNT: &str = "broker";

/// Initial balance of the broker account
pub const BROKER_INITIAL_BALANCE: Balance = 1000;

/// Account balance (never negative)
pub type Balance = u64;

/// Transfer amount as requested by a client (non-positive values are rejected at admission)
pub type Amount = i64;
