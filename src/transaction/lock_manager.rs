// Lock management for the `EntityTx`/`IndexTx` open-time contract.
//
// Deadlock resolution and wait-queue scheduling belong to the
// (out-of-scope) production lock manager. This is the narrow stand-in
// used by this crate's tests and by `MemoryEntityTx`/`MemoryIndexTx`: a
// fail-fast table that grants compatible locks and rejects incompatible
// ones immediately rather than blocking.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::error::{TransactionError, TransactionResult};
use super::traits::LockManagement;
use super::types::{LockMode, TransactionId};

#[derive(Debug, Clone)]
struct LockTableEntry {
    holders: Vec<(TransactionId, LockMode)>,
}

impl LockTableEntry {
    fn new() -> Self {
        Self { holders: Vec::new() }
    }

    fn is_compatible(&self, requester: TransactionId, mode: &LockMode) -> bool {
        self.holders
            .iter()
            .all(|(txn_id, held)| *txn_id == requester || mode.is_compatible(held))
    }

    fn held_by(&self, txn_id: TransactionId) -> Option<LockMode> {
        self.holders
            .iter()
            .find(|(id, _)| *id == txn_id)
            .map(|(_, mode)| *mode)
    }
}

/// In-memory, fail-fast lock manager: shared locks from different
/// transactions coexist, any exclusive request conflicting with another
/// transaction's holder is rejected immediately as a `LockConflict`.
pub struct LockManager {
    table: Mutex<HashMap<String, LockTableEntry>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_locked(&self, resource: &str) -> bool {
        self.table
            .lock()
            .get(resource)
            .map(|e| !e.holders.is_empty())
            .unwrap_or(false)
    }

    pub fn lock_mode(&self, txn_id: TransactionId, resource: &str) -> Option<LockMode> {
        self.table.lock().get(resource).and_then(|e| e.held_by(txn_id))
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManagement for LockManager {
    fn acquire(&self, txn_id: TransactionId, resource: &str, mode: LockMode) -> TransactionResult<()> {
        let mut table = self.table.lock();
        let entry = table.entry(resource.to_string()).or_insert_with(LockTableEntry::new);

        if let Some(held) = entry.held_by(txn_id) {
            if held == mode || held == LockMode::Exclusive {
                return Ok(());
            }
        }

        if !entry.is_compatible(txn_id, &mode) {
            let (holding_txn, held_mode) = entry
                .holders
                .iter()
                .find(|(id, held)| *id != txn_id && !mode.is_compatible(held))
                .copied()
                .expect("incompatibility implies a conflicting holder");
            return Err(TransactionError::lock_conflict(
                txn_id,
                holding_txn,
                resource,
                mode,
                held_mode,
            ));
        }

        entry.holders.push((txn_id, mode));
        Ok(())
    }

    fn release(&self, txn_id: TransactionId, resource: &str) -> TransactionResult<()> {
        let mut table = self.table.lock();
        if let Some(entry) = table.get_mut(resource) {
            entry.holders.retain(|(id, _)| *id != txn_id);
            if entry.holders.is_empty() {
                table.remove(resource);
            }
        }
        Ok(())
    }

    fn release_all(&self, txn_id: TransactionId) -> TransactionResult<()> {
        let mut table = self.table.lock();
        table.retain(|_, entry| {
            entry.holders.retain(|(id, _)| *id != txn_id);
            !entry.holders.is_empty()
        });
        Ok(())
    }
}
