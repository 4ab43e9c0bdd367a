//! Error types for the causal ledger

use thiserror::Error;

use crate::{AccountId, Amount, Balance, LogicalClock};

/// Core ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // Admission errors
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(AccountId),

    #[error("Account {0} is protected from deletion")]
    ProtectedAccount(AccountId),

    #[error("Account {account} is not empty: balance {balance}")]
    AccountNotEmpty { account: AccountId, balance: Balance },

    #[error("Insufficient funds in {account}: balance {balance}, requested {amount}")]
    InsufficientFunds {
        account: AccountId,
        balance: Balance,
        amount: Amount,
    },

    #[error("Transfer amount must be positive, got {0}")]
    NonPositiveAmount(Amount),

    #[error("Cannot transfer from {0} to itself")]
    SameAccount(AccountId),

    // Replica errors
    #[error("Replica is read-only")]
    ReadOnly,

    // Integrity errors
    #[error("Duplicate operation: origin timestamp {0} already in log")]
    DuplicateOperation(LogicalClock),

    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown operation kind: {0}")]
    UnknownOperationKind(u8),

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Replication and transport errors
    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Remote error {code}: {message}")]
    Remote { code: u16, message: String },
}

impl LedgerError {
    /// Stable numeric code reported to remote callers
    pub fn code(&self) -> u16 {
        match self {
            LedgerError::AccountNotFound(_) => 100,
            LedgerError::AccountAlreadyExists(_) => 101,
            LedgerError::ProtectedAccount(_) => 102,
            LedgerError::AccountNotEmpty { .. } => 103,
            LedgerError::InsufficientFunds { .. } => 104,
            LedgerError::NonPositiveAmount(_) => 105,
            LedgerError::SameAccount(_) => 106,
            LedgerError::ReadOnly => 200,
            LedgerError::DuplicateOperation(_) => 300,
            LedgerError::InvalidWireFormat(_) => 400,
            LedgerError::BufferTooShort { .. } => 401,
            LedgerError::UnknownOperationKind(_) => 402,
            LedgerError::UnknownMessageKind(_) => 403,
            LedgerError::Serialization(_) => 404,
            LedgerError::RegistryError(_) => 500,
            LedgerError::TransportError(_) => 501,
            LedgerError::ConnectionFailed(_) => 502,
            LedgerError::Timeout => 503,
            LedgerError::UnexpectedResponse(_) => 504,
            LedgerError::Remote { code, .. } => *code,
        }
    }

    /// Admission-time errors: reported synchronously, never partially applied
    pub fn is_domain(&self) -> bool {
        matches!(self.code(), 100..=299)
    }

    /// Rebuild an error received from a remote replica
    pub fn from_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            200 => LedgerError::ReadOnly,
            503 => LedgerError::Timeout,
            _ => LedgerError::Remote {
                code,
                message: message.into(),
            },
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
