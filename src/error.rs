//! Crate-wide error type.
//!
//! Narrowed to the error kinds the planning/execution subsystem actually
//! raises: malformed or unbindable queries, transaction-state violations,
//! opaque storage/cursor failures, rewrite-engine bugs, plus the
//! catalog/index/internal seams the external-interface stubs need.

use thiserror::Error;

use crate::transaction::TransactionError;

#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// Malformed input, unresolvable names, invalid k in kNN, ambiguous
    /// function overload resolution.
    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    /// A binding resolved to a value of the wrong type at execution time.
    #[error("query binding error: {0}")]
    QueryBinding(String),

    /// Operation against a closed/errored transaction, or a lock
    /// acquisition failure.
    #[error("transaction error: {0}")]
    Tx(#[from] TransactionError),

    /// Cursor/storage I/O failure, reported by the external `EntityTx`/
    /// `IndexTx` collaborators.
    #[error("storage error: {0}")]
    Storage(String),

    /// Rewrite rule bug, or a rewrite sequence that failed to reach a
    /// fixed point within the configured iteration cap.
    #[error("planner error: {0}")]
    Planner(String),

    /// Catalog lookup failure (unknown entity, column, or index).
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Index lookup or predicate-compatibility failure.
    #[error("index error: {0}")]
    Index(String),

    /// Serialization failure in the persisted-statistics format.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Anything else — a defect in this crate rather than a reportable
    /// user-facing condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn query_syntax(message: impl Into<String>) -> Self {
        DbError::QuerySyntax(message.into())
    }

    pub fn query_binding(message: impl Into<String>) -> Self {
        DbError::QueryBinding(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        DbError::Storage(message.into())
    }

    pub fn planner(message: impl Into<String>) -> Self {
        DbError::Planner(message.into())
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        DbError::Catalog(message.into())
    }

    pub fn index(message: impl Into<String>) -> Self {
        DbError::Index(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DbError::Internal(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}
