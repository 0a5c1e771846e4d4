//! Error types for account names, record parsing, and account storage.

use crate::AccountName;
use thiserror::Error;

/// Reasons a candidate string is not a usable account name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Zero-length name
    #[error("Account name is empty")]
    Empty,

    /// The name contains a character that could escape the accounts directory
    #[error("Account name contains forbidden character {ch:?}")]
    ForbiddenCharacter { ch: char },

    /// `.` and `..` are directory references, not names
    #[error("Account name {name:?} is reserved")]
    Reserved { name: String },
}

/// A persisted record could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct RecordParseError {
    /// 1-based line number of the offending line
    pub line: usize,
    /// What was wrong with it
    pub reason: String,
}

impl RecordParseError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur in account store operations.
///
/// `NotFound` and `Corrupt` are kept apart: a missing account is an
/// ordinary protocol branch, a corrupt one is a fault worth reporting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record exists for this account
    #[error("Account not found: {name}")]
    NotFound { name: AccountName },

    /// A record already exists for this account
    #[error("Account already exists: {name}")]
    AlreadyExists { name: AccountName },

    /// The stored record could not be parsed
    #[error("Corrupt record for {name}: {source}")]
    Corrupt {
        name: AccountName,
        source: RecordParseError,
    },

    /// Underlying storage failed
    #[error("Storage failure for {name}: {reason}")]
    Io { name: AccountName, reason: String },
}

impl StoreError {
    /// Returns the account the error refers to.
    pub fn account(&self) -> &AccountName {
        match self {
            Self::NotFound { name }
            | Self::AlreadyExists { name }
            | Self::Corrupt { name, .. }
            | Self::Io { name, .. } => name,
        }
    }
}

/// Result type for account store operations.
pub type StoreResult<T> = Result<T, StoreError>;
