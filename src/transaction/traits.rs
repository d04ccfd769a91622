// Transaction traits for extensibility.
//
// Lets the storage layer plug in its own transaction/lock manager without
// this crate depending on a concrete implementation.

use super::error::TransactionResult;
use super::types::{LockMode, TransactionId, TransactionState};

/// Lifecycle operations an `AbstractTx` needs from whatever owns the
/// transaction's actual state (the storage engine, in production; an
/// in-memory stand-in in this crate's tests).
pub trait TransactionLifecycle: Send + Sync {
    fn state(&self, txn_id: TransactionId) -> Option<TransactionState>;
    fn mark_dirty(&self, txn_id: TransactionId) -> TransactionResult<()>;
    fn mark_error(&self, txn_id: TransactionId) -> TransactionResult<()>;
    fn commit(&self, txn_id: TransactionId) -> TransactionResult<()>;
    fn close(&self, txn_id: TransactionId) -> TransactionResult<()>;
}

/// Acquire/release contract operators rely on. Deadlock resolution,
/// escalation, and wait-queue bookkeeping are the lock manager's problem,
/// not this trait's.
pub trait LockManagement: Send + Sync {
    fn acquire(
        &self,
        txn_id: TransactionId,
        resource: &str,
        mode: LockMode,
    ) -> TransactionResult<()>;

    fn release(&self, txn_id: TransactionId, resource: &str) -> TransactionResult<()>;

    fn release_all(&self, txn_id: TransactionId) -> TransactionResult<()>;
}

/// Notified on transaction lifecycle events. `AbstractTx::on_commit` /
/// `on_rollback` / `cleanup` are expressed through this trait so callers
/// can observe without owning the transaction.
pub trait TransactionEventListener: Send + Sync {
    fn on_commit(&self, txn_id: TransactionId) {
        let _ = txn_id;
    }
    fn on_rollback(&self, txn_id: TransactionId) {
        let _ = txn_id;
    }
    fn cleanup(&self, txn_id: TransactionId) {
        let _ = txn_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingListener {
        commits: AtomicU64,
    }

    impl TransactionEventListener for CountingListener {
        fn on_commit(&self, _txn_id: TransactionId) {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn default_listener_methods_are_no_ops() {
        struct Noop;
        impl TransactionEventListener for Noop {}
        let n = Noop;
        n.on_commit(1);
        n.on_rollback(1);
        n.cleanup(1);
    }

    #[test]
    fn listener_observes_commit() {
        let l = CountingListener {
            commits: AtomicU64::new(0),
        };
        l.on_commit(7);
        assert_eq!(l.commits.load(Ordering::SeqCst), 1);
    }
}
