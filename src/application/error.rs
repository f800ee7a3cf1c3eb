use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Units, UserId, ValidationError};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Name already taken: {0}")]
    DuplicateName(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User {0} is blocked")]
    Blocked(UserId),

    #[error("Farming too soon (next farming allowed at {next_allowed_at})")]
    FarmingTooSoon { next_allowed_at: DateTime<Utc> },

    #[error("Insufficient balance: balance {balance}, required {required}")]
    InsufficientBalance { balance: Units, required: Units },

    #[error("Operation did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] anyhow::Error),
}

/// Stable, machine-readable name of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    DuplicateName,
    NotFound,
    InvalidCredentials,
    Blocked,
    FarmingTooSoon,
    InsufficientBalance,
    DeadlineExceeded,
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::DuplicateName => "DuplicateName",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidCredentials => "InvalidCredentials",
            ErrorKind::Blocked => "Blocked",
            ErrorKind::FarmingTooSoon => "FarmingTooSoon",
            ErrorKind::InsufficientBalance => "InsufficientBalance",
            ErrorKind::DeadlineExceeded => "DeadlineExceeded",
            ErrorKind::StorageFailure => "StorageFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidInput(_) => ErrorKind::InvalidInput,
            LedgerError::DuplicateName(_) => ErrorKind::DuplicateName,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::InvalidCredentials => ErrorKind::InvalidCredentials,
            LedgerError::Blocked(_) => ErrorKind::Blocked,
            LedgerError::FarmingTooSoon { .. } => ErrorKind::FarmingTooSoon,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            LedgerError::StorageFailure(_) => ErrorKind::StorageFailure,
        }
    }

    /// Server faults are logged and shown to callers without their cause.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            LedgerError::StorageFailure(_) | LedgerError::DeadlineExceeded(_)
        )
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::InvalidInput(err.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => LedgerError::NotFound(key),
            StoreError::DuplicateName(name) => LedgerError::DuplicateName(name),
            conflict @ StoreError::VersionConflict { .. } => {
                LedgerError::StorageFailure(anyhow::Error::new(conflict))
            }
            StoreError::Storage(e) => LedgerError::StorageFailure(e),
        }
    }
}
