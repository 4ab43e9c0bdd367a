//! Identity types for the causal ledger
//!
//! Replicas and accounts are named by free-form strings. The newtypes keep
//! the two namespaces apart at compile time.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Replica identity - the coordinate a replica owns in every logical clock
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        ReplicaId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Replica({})", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(s: &str) -> Self {
        ReplicaId::new(s)
    }
}

impl From<String> for ReplicaId {
    fn from(s: String) -> Self {
        ReplicaId(s)
    }
}

impl Borrow<str> for ReplicaId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Account identity - unique across the replicated ledger
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    /// The distinguished broker account
    pub fn broker() -> Self {
        AccountId::new(crate::BROKER_ACCOUNT)
    }

    #[inline]
    pub fn is_broker(&self) -> bool {
        self.0 == crate::BROKER_ACCOUNT
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        AccountId(s)
    }
}

impl Borrow<str> for AccountId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
