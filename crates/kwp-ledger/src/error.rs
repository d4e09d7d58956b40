//! Ledger Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Order id already recorded (duplicate completion event)
    #[error("Order already recorded: {0}")]
    DuplicateOrder(String),

    /// Generated gift code collided with an existing one
    #[error("Gift code already exists: {0}")]
    DuplicateCode(String),

    /// Gift code unknown to the store
    #[error("Gift code not found: {0}")]
    NotFound(String),

    /// Gift code was already redeemed; redemption is terminal
    #[error("Gift code already redeemed: {0}")]
    AlreadyRedeemed(String),

    /// Database open/create error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Record (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// Conflicts are expected outcomes the caller handles explicitly;
    /// everything else is a storage fault.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LedgerError::DuplicateOrder(_)
                | LedgerError::DuplicateCode(_)
                | LedgerError::AlreadyRedeemed(_)
                | LedgerError::NotFound(_)
        )
    }
}
