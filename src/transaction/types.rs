// Core transaction types.
//
// Narrower than a full ACID engine's type set: this crate plans and
// executes queries against transactions whose lifecycle and locking
// contract are owned elsewhere (the storage/lock-manager layer). What
// matters here is the state machine operators check before they act, and
// the lock mode vocabulary they request in.

use std::fmt;

/// Identifies a transaction across its lifetime. Monotonically assigned
/// by whichever component opens transactions; this crate only consumes it.
pub type TransactionId = u64;

/// Transaction lifecycle state.
///
/// ```text
/// CLEAN --(first mutation)--> DIRTY --(commit)--> CLOSED
///   |                           |
///   +---------(close)--------->+--(failing mutation)--> ERROR --(close)--> CLOSED
/// ```
///
/// `CLOSED` is the only state with no outgoing transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// No mutation has occurred yet; the transaction may still be read-only.
    Clean,
    /// At least one mutation has been applied.
    Dirty,
    /// A mutation failed; every subsequent operation must fail until close.
    Error,
    /// Terminal. No operation may run against a closed transaction.
    Closed,
}

impl TransactionState {
    /// Transactions in this state accept further operations.
    pub fn is_open(&self) -> bool {
        matches!(self, TransactionState::Clean | TransactionState::Dirty)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Closed)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Clean => "CLEAN",
            TransactionState::Dirty => "DIRTY",
            TransactionState::Error => "ERROR",
            TransactionState::Closed => "CLOSED",
        };
        write!(f, "{s}")
    }
}

/// Lock mode requested by an `EntityTx`/`IndexTx` at open time. Narrowed to
/// the two modes a caller distinguishes ("read-only scan vs. mutating
/// operator"); escalation, intent locks, and upgrade protocols live in the
/// out-of-scope lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Non-exclusive read access.
    Shared,
    /// Exclusive write access.
    Exclusive,
}

impl LockMode {
    pub fn is_compatible(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "S"),
            LockMode::Exclusive => write!(f, "X"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_and_dirty_are_open() {
        assert!(TransactionState::Clean.is_open());
        assert!(TransactionState::Dirty.is_open());
        assert!(!TransactionState::Error.is_open());
        assert!(!TransactionState::Closed.is_open());
    }

    #[test]
    fn only_closed_is_terminal() {
        assert!(TransactionState::Closed.is_terminal());
        assert!(!TransactionState::Error.is_terminal());
    }

    #[test]
    fn shared_locks_are_mutually_compatible() {
        assert!(LockMode::Shared.is_compatible(&LockMode::Shared));
        assert!(!LockMode::Shared.is_compatible(&LockMode::Exclusive));
        assert!(!LockMode::Exclusive.is_compatible(&LockMode::Exclusive));
    }
}
