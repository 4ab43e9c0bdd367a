//! Request and response messages
//!
//! Three request families share one frame format: user requests (each carrying
//! the client's causal context), admin requests, and replica-to-replica gossip.

use std::collections::BTreeMap;

use bytes::{BufMut, BytesMut};

use ledger_core::{
    AccountId, Amount, Balance, LedgerDump, LedgerError, LedgerResult, LogicalClock, Operation,
    ReplicaId,
};

use crate::codec::{put_clock, put_operations, put_string, WireReader};
use crate::{Frame, MessageKind};

/// Requests accepted by a replica
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    CreateAccount {
        account: AccountId,
        context: LogicalClock,
    },
    DeleteAccount {
        account: AccountId,
        context: LogicalClock,
    },
    TransferTo {
        from: AccountId,
        to: AccountId,
        amount: Amount,
        context: LogicalClock,
    },
    Balance {
        account: AccountId,
        context: LogicalClock,
    },
    Activate,
    Deactivate,
    DumpLedgerState,
    TriggerGossip,
    PushLedgerSnapshot {
        sender: ReplicaId,
        operations: Vec<Operation>,
    },
}

/// Responses returned by a replica
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Updated causal context after a write
    Clock { clock: LogicalClock },
    Balance { balance: Balance, clock: LogicalClock },
    Ack,
    LedgerState(LedgerDump),
    Gossip {
        attempted: u32,
        delivered: u32,
        failed: u32,
    },
    Error { code: u16, message: String },
}

impl Request {
    pub fn kind(&self) -> MessageKind {
        match self {
            Request::CreateAccount { .. } => MessageKind::CreateAccount,
            Request::DeleteAccount { .. } => MessageKind::DeleteAccount,
            Request::TransferTo { .. } => MessageKind::TransferTo,
            Request::Balance { .. } => MessageKind::Balance,
            Request::Activate => MessageKind::Activate,
            Request::Deactivate => MessageKind::Deactivate,
            Request::DumpLedgerState => MessageKind::DumpLedgerState,
            Request::TriggerGossip => MessageKind::TriggerGossip,
            Request::PushLedgerSnapshot { .. } => MessageKind::PushLedgerSnapshot,
        }
    }

    /// Encode into a frame
    pub fn to_frame(&self) -> LedgerResult<Frame> {
        let mut body = BytesMut::new();
        match self {
            Request::CreateAccount { account, context }
            | Request::DeleteAccount { account, context }
            | Request::Balance { account, context } => {
                put_string(&mut body, account.as_str())?;
                put_clock(&mut body, context)?;
            }
            Request::TransferTo {
                from,
                to,
                amount,
                context,
            } => {
                put_string(&mut body, from.as_str())?;
                put_string(&mut body, to.as_str())?;
                body.put_i64_le(*amount);
                put_clock(&mut body, context)?;
            }
            Request::Activate
            | Request::Deactivate
            | Request::DumpLedgerState
            | Request::TriggerGossip => {}
            Request::PushLedgerSnapshot { sender, operations } => {
                put_string(&mut body, sender.as_str())?;
                put_operations(&mut body, operations)?;
            }
        }
        Ok(Frame::new(self.kind(), body.freeze()))
    }

    /// Decode from a frame
    pub fn from_frame(frame: &Frame) -> LedgerResult<Self> {
        let mut r = WireReader::new(&frame.body);
        let request = match frame.kind {
            MessageKind::CreateAccount => Request::CreateAccount {
                account: r.read_string()?.into(),
                context: r.read_clock()?,
            },
            MessageKind::DeleteAccount => Request::DeleteAccount {
                account: r.read_string()?.into(),
                context: r.read_clock()?,
            },
            MessageKind::TransferTo => Request::TransferTo {
                from: r.read_string()?.into(),
                to: r.read_string()?.into(),
                amount: r.read_i64()?,
                context: r.read_clock()?,
            },
            MessageKind::Balance => Request::Balance {
                account: r.read_string()?.into(),
                context: r.read_clock()?,
            },
            MessageKind::Activate => Request::Activate,
            MessageKind::Deactivate => Request::Deactivate,
            MessageKind::DumpLedgerState => Request::DumpLedgerState,
            MessageKind::TriggerGossip => Request::TriggerGossip,
            MessageKind::PushLedgerSnapshot => Request::PushLedgerSnapshot {
                sender: ReplicaId::new(r.read_string()?),
                operations: r.read_operations()?,
            },
            other => return Err(LedgerError::UnknownMessageKind(other.to_byte())),
        };
        r.finish()?;
        Ok(request)
    }
}

impl Response {
    pub fn kind(&self) -> MessageKind {
        match self {
            Response::Clock { .. } => MessageKind::ClockReply,
            Response::Balance { .. } => MessageKind::BalanceReply,
            Response::Ack => MessageKind::Ack,
            Response::LedgerState(_) => MessageKind::LedgerStateReply,
            Response::Gossip { .. } => MessageKind::GossipReply,
            Response::Error { .. } => MessageKind::ErrorReply,
        }
    }

    /// Map an error to its wire representation
    pub fn from_error(err: &LedgerError) -> Self {
        Response::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Turn an error response back into an error
    pub fn into_result(self) -> LedgerResult<Response> {
        match self {
            Response::Error { code, message } => Err(LedgerError::from_code(code, message)),
            other => Ok(other),
        }
    }

    /// Encode into a frame
    pub fn to_frame(&self) -> LedgerResult<Frame> {
        let mut body = BytesMut::new();
        match self {
            Response::Clock { clock } => put_clock(&mut body, clock)?,
            Response::Balance { balance, clock } => {
                body.put_u64_le(*balance);
                put_clock(&mut body, clock)?;
            }
            Response::Ack => {}
            Response::LedgerState(dump) => {
                put_string(&mut body, dump.replica.as_str())?;
                body.put_u8(dump.active as u8);
                put_clock(&mut body, &dump.clock)?;
                body.put_u32_le(dump.balances.len() as u32);
                for (account, balance) in &dump.balances {
                    put_string(&mut body, account.as_str())?;
                    body.put_u64_le(*balance);
                }
                put_operations(&mut body, &dump.operations)?;
            }
            Response::Gossip {
                attempted,
                delivered,
                failed,
            } => {
                body.put_u32_le(*attempted);
                body.put_u32_le(*delivered);
                body.put_u32_le(*failed);
            }
            Response::Error { code, message } => {
                body.put_u16_le(*code);
                put_string(&mut body, message)?;
            }
        }
        Ok(Frame::new(self.kind(), body.freeze()))
    }

    /// Decode from a frame
    pub fn from_frame(frame: &Frame) -> LedgerResult<Self> {
        let mut r = WireReader::new(&frame.body);
        let response = match frame.kind {
            MessageKind::ClockReply => Response::Clock {
                clock: r.read_clock()?,
            },
            MessageKind::BalanceReply => Response::Balance {
                balance: r.read_u64()?,
                clock: r.read_clock()?,
            },
            MessageKind::Ack => Response::Ack,
            MessageKind::LedgerStateReply => {
                let replica = ReplicaId::new(r.read_string()?);
                let active = r.read_bool()?;
                let clock = r.read_clock()?;
                let count = r.read_u32()?;
                let mut balances = BTreeMap::new();
                for _ in 0..count {
                    let account = AccountId::new(r.read_string()?);
                    balances.insert(account, r.read_u64()?);
                }
                let operations = r.read_operations()?;
                Response::LedgerState(LedgerDump {
                    replica,
                    active,
                    clock,
                    balances,
                    operations,
                })
            }
            MessageKind::GossipReply => Response::Gossip {
                attempted: r.read_u32()?,
                delivered: r.read_u32()?,
                failed: r.read_u32()?,
            },
            MessageKind::ErrorReply => Response::Error {
                code: r.read_u16()?,
                message: r.read_string()?,
            },
            other => return Err(LedgerError::UnknownMessageKind(other.to_byte())),
        };
        r.finish()?;
        Ok(response)
    }
}
