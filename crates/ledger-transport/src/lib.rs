//! Causal Ledger Transport Layer - Framed TCP
//!
//! This crate provides:
//! - Frame read/write over any async byte stream
//! - One-shot request/response calls bounded by a timeout
//! - A listener with a background accept loop

pub mod tcp;

pub use tcp::*;
