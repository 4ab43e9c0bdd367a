//! Operation definitions
//!
//! Operations are the account mutations replicated between replicas. Each
//! carries the causal context its client had observed, the origin timestamp
//! assigned by the accepting replica, and a stability flag.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount, LogicalClock, ReplicaId};

/// Wire discriminator for operation kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpType {
    CreateAccount = 0x01,
    DeleteAccount = 0x02,
    Transfer = 0x03,
}

impl OpType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(OpType::CreateAccount),
            0x02 => Some(OpType::DeleteAccount),
            0x03 => Some(OpType::Transfer),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// The effect an operation has on the account store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpKind {
    CreateAccount {
        account: AccountId,
    },
    DeleteAccount {
        account: AccountId,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
}

impl OpKind {
    pub fn op_type(&self) -> OpType {
        match self {
            OpKind::CreateAccount { .. } => OpType::CreateAccount,
            OpKind::DeleteAccount { .. } => OpType::DeleteAccount,
            OpKind::Transfer { .. } => OpType::Transfer,
        }
    }

    /// The primary account this operation touches (the source for transfers)
    pub fn account(&self) -> &AccountId {
        match self {
            OpKind::CreateAccount { account } | OpKind::DeleteAccount { account } => account,
            OpKind::Transfer { from, .. } => from,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::CreateAccount { account } => write!(f, "create({})", account),
            OpKind::DeleteAccount { account } => write!(f, "delete({})", account),
            OpKind::Transfer { from, to, amount } => {
                write!(f, "transfer({} -> {}, {})", from, to, amount)
            }
        }
    }
}

/// A replicated ledger operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// What the operation does
    pub kind: OpKind,
    /// Replica that first accepted the operation
    pub origin: ReplicaId,
    /// Dependencies that must be applied before this operation
    pub causal_context: LogicalClock,
    /// Origin replica's clock right after it counted this operation; unique per operation
    pub origin_timestamp: LogicalClock,
    stable: bool,
}

impl Operation {
    /// Create a new, pending operation
    pub fn new(
        kind: OpKind,
        origin: ReplicaId,
        causal_context: LogicalClock,
        origin_timestamp: LogicalClock,
    ) -> Self {
        Operation {
            kind,
            origin,
            causal_context,
            origin_timestamp,
            stable: false,
        }
    }

    /// Set the stability flag as carried on the wire
    pub fn with_stable(mut self, stable: bool) -> Self {
        self.stable = stable;
        self
    }

    #[inline]
    pub fn is_stable(&self) -> bool {
        self.stable
    }

    /// Flip the stability flag; it never reverts
    pub fn mark_stable(&mut self) {
        self.stable = true;
    }

    /// The origin's own coordinate in the origin timestamp
    #[inline]
    pub fn origin_seq(&self) -> u64 {
        self.origin_timestamp.get(self.origin.as_str())
    }

    /// True once `clock` has observed every declared dependency
    #[inline]
    pub fn is_ready(&self, clock: &LogicalClock) -> bool {
        clock.dominates(&self.causal_context)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{} ctx={} ts={}{}",
            self.kind,
            self.origin,
            self.origin_seq(),
            self.causal_context,
            self.origin_timestamp,
            if self.stable { " stable" } else { "" }
        )
    }
}
