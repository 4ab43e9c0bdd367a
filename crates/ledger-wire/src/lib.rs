//! Causal Ledger Wire Protocol - Binary message format
//!
//! This crate implements the wire format exchanged between clients and replicas:
//! - Frame header (8 bytes: magic, version, message kind, body length)
//! - Field codecs for strings, logical clocks and operations
//! - User, admin and replica-to-replica request/response messages

pub mod codec;
pub mod frame;
pub mod header;
pub mod message;

pub use codec::*;
pub use frame::*;
pub use header::*;
pub use message::*;
