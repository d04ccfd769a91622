// Late binding: `Binding` and `BindingContext`.
//
// A per-query map from `BindingId` to a resolved value/column reference,
// mutable until execution starts and frozen thereafter. `BindingContext`
// is also the per-strand switch point the runtime operators use when
// draining an NAry merge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DbError, Result};
use crate::value::column::ColumnDef;
use crate::value::types::Value;

pub type BindingId = u64;

/// A late-bound reference. `Literal` carries its value directly;
/// `Column` resolves against the current record by column; `Function`
/// resolves by invoking a registered function against already-resolved
/// argument bindings (the function registry itself lives in
/// `crate::function`).
#[derive(Debug, Clone)]
pub enum Binding {
    Literal(Value),
    Column(ColumnDef),
    Function { name: String, arguments: Vec<BindingId> },
}

/// Generates fresh `BindingId`s and holds the mutable-until-frozen
/// binding map plus the currently active strand id.
pub struct BindingContext {
    next_id: AtomicU64,
    bindings: HashMap<BindingId, Binding>,
    frozen: bool,
    active_strand: usize,
}

impl BindingContext {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            bindings: HashMap::new(),
            frozen: false,
            active_strand: 0,
        }
    }

    pub fn bind(&mut self, binding: Binding) -> Result<BindingId> {
        if self.frozen {
            return Err(DbError::query_binding(
                "cannot bind after the binding context has been frozen",
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.bindings.insert(id, binding);
        Ok(id)
    }

    /// Replaces an existing binding. Legal only before `freeze()`.
    pub fn rebind(&mut self, id: BindingId, binding: Binding) -> Result<()> {
        if self.frozen {
            return Err(DbError::query_binding(
                "cannot rebind after the binding context has been frozen",
            ));
        }
        if !self.bindings.contains_key(&id) {
            return Err(DbError::query_binding(format!("no such binding id {id}")));
        }
        self.bindings.insert(id, binding);
        Ok(())
    }

    pub fn resolve(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(&id)
    }

    /// Execution start: no further `bind`/`rebind` calls are accepted.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Switches the active strand, used by NAry merge operators when
    /// draining from a given input.
    pub fn switch_strand(&mut self, strand_id: usize) {
        self.active_strand = strand_id;
    }

    pub fn active_strand(&self) -> usize {
        self.active_strand
    }
}

impl Default for BindingContext {
    fn default() -> Self {
        Self::new()
    }
}
