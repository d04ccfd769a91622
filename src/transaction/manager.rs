// Transaction lifecycle: `TransactionContext`, `AbstractTx`, and the
// manager that mints transaction ids.
//
// Scoped to the `CLEAN -> DIRTY -> (COMMIT | ERROR) -> CLOSED` state
// machine rather than a full 2PL/2PC/MVCC implementation — that belongs
// to the storage engine this crate treats as an external collaborator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use super::cursor::CancellationToken;
use super::error::{TransactionError, TransactionResult};
use super::lock_manager::LockManager;
use super::traits::TransactionEventListener;
use super::types::{TransactionId, TransactionState};

/// Shared state behind a transaction. Cheap to clone via `Arc`; every
/// `Cursor` and runtime `Operator` participating in the same query holds
/// a reference to the same context rather than its own copy of the state.
pub struct TransactionContext {
    id: TransactionId,
    state: Mutex<TransactionState>,
    /// Re-entrant so the same thread can re-enter while already holding
    /// the guard (e.g. a pipeline operator calling into its parent which
    /// itself locks the context), without multiple threads racing on it.
    guard: ReentrantMutex<()>,
    listeners: RwLock<Vec<Arc<dyn TransactionEventListener>>>,
    cancellation: CancellationToken,
}

impl TransactionContext {
    fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Clean),
            guard: ReentrantMutex::new(()),
            listeners: RwLock::new(Vec::new()),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn register_listener(&self, listener: Arc<dyn TransactionEventListener>) {
        self.listeners.write().push(listener);
    }

    fn require_open(&self, state: TransactionState) -> TransactionResult<()> {
        if state.is_open() {
            Ok(())
        } else {
            Err(TransactionError::NotOpen(self.id))
        }
    }

    /// Records a mutation. `CLEAN -> DIRTY` on the first call; a no-op if
    /// already `DIRTY`. Fails if the transaction is not open.
    pub fn begin_mutation(&self) -> TransactionResult<()> {
        let _held = self.guard.lock();
        let mut state = self.state.lock();
        self.require_open(*state)?;
        if *state == TransactionState::Clean {
            tracing::debug!(txn_id = self.id, "transaction CLEAN -> DIRTY");
            *state = TransactionState::Dirty;
        }
        Ok(())
    }

    /// Moves the transaction to `ERROR` following a failing mutation.
    /// Only valid from an open state; `ERROR` is otherwise reached only
    /// through this call, never implicitly.
    pub fn fail(&self) -> TransactionResult<()> {
        let _held = self.guard.lock();
        let mut state = self.state.lock();
        self.require_open(*state)?;
        tracing::warn!(txn_id = self.id, from = %*state, "transaction -> ERROR");
        *state = TransactionState::Error;
        Ok(())
    }
}

/// Wraps a `TransactionContext` with the three operations a transaction
/// exposes to its owning operator tree: `on_commit`, `on_rollback`, `cleanup`.
pub struct AbstractTx {
    context: Arc<TransactionContext>,
}

impl AbstractTx {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<TransactionContext> {
        &self.context
    }

    pub fn id(&self) -> TransactionId {
        self.context.id()
    }

    pub fn state(&self) -> TransactionState {
        self.context.state()
    }

    /// Commits the transaction: only legal from `CLEAN`/`DIRTY`.
    pub fn on_commit(&self) -> TransactionResult<()> {
        let _held = self.context.guard.lock();
        {
            let mut state = self.context.state.lock();
            self.context.require_open(*state)?;
            *state = TransactionState::Closed;
        }
        tracing::info!(txn_id = self.id(), "transaction committed");
        for listener in self.context.listeners.read().iter() {
            listener.on_commit(self.id());
        }
        Ok(())
    }

    /// Rolls back the transaction. Legal from any non-`CLOSED` state,
    /// including `ERROR` — rollback is how an errored transaction
    /// finally reaches `CLOSED`.
    pub fn on_rollback(&self) -> TransactionResult<()> {
        let _held = self.context.guard.lock();
        {
            let mut state = self.context.state.lock();
            if state.is_terminal() {
                return Err(TransactionError::NotOpen(self.id()));
            }
            *state = TransactionState::Closed;
        }
        tracing::info!(txn_id = self.id(), "transaction rolled back");
        for listener in self.context.listeners.read().iter() {
            listener.on_rollback(self.id());
        }
        Ok(())
    }

    /// Releases any per-transaction bookkeeping. Idempotent — safe to
    /// call more than once, including after close.
    pub fn cleanup(&self) {
        for listener in self.context.listeners.read().iter() {
            listener.cleanup(self.id());
        }
    }
}

/// Mints transaction contexts and hands out the shared `LockManager`
/// operators acquire through at cursor-open time.
pub struct TransactionManager {
    next_id: AtomicU64,
    active: RwLock<HashMap<TransactionId, Arc<TransactionContext>>>,
    lock_manager: Arc<LockManager>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: RwLock::new(HashMap::new()),
            lock_manager: Arc::new(LockManager::new()),
        }
    }

    pub fn with_lock_manager(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: RwLock::new(HashMap::new()),
            lock_manager,
        }
    }

    pub fn lock_manager(&self) -> Arc<LockManager> {
        Arc::clone(&self.lock_manager)
    }

    /// Begins a new transaction, returning its `AbstractTx` handle.
    pub fn begin(&self) -> AbstractTx {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let ctx = Arc::new(TransactionContext::new(id));
        self.active.write().insert(id, Arc::clone(&ctx));
        tracing::debug!(txn_id = id, "transaction begun");
        AbstractTx::new(ctx)
    }

    pub fn context(&self, txn_id: TransactionId) -> Option<Arc<TransactionContext>> {
        self.active.read().get(&txn_id).cloned()
    }

    pub fn state(&self, txn_id: TransactionId) -> Option<TransactionState> {
        self.context(txn_id).map(|c| c.state())
    }

    pub fn forget(&self, txn_id: TransactionId) {
        self.active.write().remove(&txn_id);
        let _ = self.lock_manager.release_all(txn_id);
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::types::LockMode;

    #[test]
    fn clean_transitions_to_dirty_on_first_mutation() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        assert_eq!(tx.state(), TransactionState::Clean);
        tx.context().begin_mutation().unwrap();
        assert_eq!(tx.state(), TransactionState::Dirty);
    }

    #[test]
    fn second_mutation_is_a_no_op_transition() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tx.context().begin_mutation().unwrap();
        tx.context().begin_mutation().unwrap();
        assert_eq!(tx.state(), TransactionState::Dirty);
    }

    #[test]
    fn commit_closes_a_dirty_transaction() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tx.context().begin_mutation().unwrap();
        tx.on_commit().unwrap();
        assert_eq!(tx.state(), TransactionState::Closed);
    }

    #[test]
    fn commit_after_close_fails() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tx.on_commit().unwrap();
        assert!(tx.on_commit().is_err());
    }

    #[test]
    fn failing_mutation_moves_to_error_and_blocks_further_mutation() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tx.context().begin_mutation().unwrap();
        tx.context().fail().unwrap();
        assert_eq!(tx.state(), TransactionState::Error);
        assert!(tx.context().begin_mutation().is_err());
    }

    #[test]
    fn errored_transaction_can_still_be_rolled_back_to_closed() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tx.context().begin_mutation().unwrap();
        tx.context().fail().unwrap();
        tx.on_rollback().unwrap();
        assert_eq!(tx.state(), TransactionState::Closed);
    }

    #[test]
    fn commit_on_errored_transaction_fails() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tx.context().fail().unwrap();
        assert!(tx.on_commit().is_err());
    }

    #[test]
    fn forgetting_a_transaction_releases_its_locks() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tm.lock_manager()
            .acquire(tx.id(), "e.users", LockMode::Exclusive)
            .unwrap();
        tm.forget(tx.id());
        assert!(!tm.lock_manager().is_locked("e.users"));
    }
}
