//! Transaction-specific error types.
//!
//! Structured error handling for the transaction subsystem using
//! `thiserror`. Narrowed to the error kinds this crate's `AbstractTx`,
//! `LockManager`, and `Cursor` contract can actually raise — deadlock
//! detection, WAL, and recovery are owned by the out-of-scope storage
//! engine and surface only as an opaque `Storage` error one layer up.

use thiserror::Error;

use super::types::{LockMode, TransactionId, TransactionState};

/// Result type alias for transaction operations.
pub type TransactionResult<T> = std::result::Result<T, TransactionError>;

/// Error type for transaction and lock operations.
#[derive(Debug, Error, Clone)]
pub enum TransactionError {
    /// Lock acquisition timed out.
    #[error("lock timeout: transaction {txn_id} timed out waiting for {lock_mode} lock on '{resource}'")]
    LockTimeout {
        txn_id: TransactionId,
        resource: String,
        lock_mode: LockMode,
    },

    /// Lock conflict with another transaction.
    #[error("lock conflict: transaction {requesting_txn} cannot acquire {requested_mode} lock on '{resource}' - held by transaction {holding_txn} with {held_mode} lock")]
    LockConflict {
        requesting_txn: TransactionId,
        holding_txn: TransactionId,
        resource: String,
        requested_mode: LockMode,
        held_mode: LockMode,
    },

    /// Transaction not found.
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    /// Invalid state transition.
    #[error("transaction {txn_id} cannot transition from {from} to {to}")]
    InvalidStateTransition {
        txn_id: TransactionId,
        from: TransactionState,
        to: TransactionState,
    },

    /// Operation attempted against a closed or errored transaction.
    #[error("transaction {0} is not open")]
    NotOpen(TransactionId),

    /// Generic error with context, used by callers outside this module.
    #[error("{context}: {message}")]
    Generic { context: String, message: String },
}

impl TransactionError {
    pub fn lock_timeout(txn_id: TransactionId, resource: impl Into<String>, lock_mode: LockMode) -> Self {
        TransactionError::LockTimeout {
            txn_id,
            resource: resource.into(),
            lock_mode,
        }
    }

    pub fn lock_conflict(
        requesting_txn: TransactionId,
        holding_txn: TransactionId,
        resource: impl Into<String>,
        requested_mode: LockMode,
        held_mode: LockMode,
    ) -> Self {
        TransactionError::LockConflict {
            requesting_txn,
            holding_txn,
            resource: resource.into(),
            requested_mode,
            held_mode,
        }
    }

    pub fn not_found(txn_id: TransactionId) -> Self {
        TransactionError::TransactionNotFound(txn_id)
    }

    pub fn invalid_state(txn_id: TransactionId, from: TransactionState, to: TransactionState) -> Self {
        TransactionError::InvalidStateTransition { txn_id, from, to }
    }

    pub fn generic(context: impl Into<String>, message: impl Into<String>) -> Self {
        TransactionError::Generic {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error indicates the caller may retry.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransactionError::LockTimeout { .. } | TransactionError::LockConflict { .. }
        )
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            TransactionError::LockTimeout { txn_id, .. } => Some(*txn_id),
            TransactionError::LockConflict { requesting_txn, .. } => Some(*requesting_txn),
            TransactionError::TransactionNotFound(id) => Some(*id),
            TransactionError::InvalidStateTransition { txn_id, .. } => Some(*txn_id),
            TransactionError::NotOpen(id) => Some(*id),
            TransactionError::Generic { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_is_retriable() {
        let err = TransactionError::lock_timeout(1, "users", LockMode::Exclusive);
        assert!(err.is_retriable());
        assert_eq!(err.transaction_id(), Some(1));
    }

    #[test]
    fn not_found_is_not_retriable() {
        let err = TransactionError::not_found(42);
        assert!(!err.is_retriable());
        assert_eq!(err.to_string(), "transaction 42 not found");
    }
}
