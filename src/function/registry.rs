// Process-wide function registry.
//
// A `once_cell::sync::Lazy` global, mutated by copy-on-write swap rather
// than in place: a process-wide immutable map assembled at startup,
// where additions require a versioned swap. Readers never block on a
// writer — they hold an `Arc` snapshot taken under a brief read lock and
// work against it even if a registration race replaces the map
// underneath them.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{DbError, Result};
use crate::value::Type;

use super::signature::Signature;
use super::traits::Function;

type FunctionMap = HashMap<String, Vec<Arc<dyn Function>>>;

pub struct FunctionRegistry {
    functions: RwLock<Arc<FunctionMap>>,
}

impl FunctionRegistry {
    fn new() -> Self {
        Self {
            functions: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn global() -> &'static FunctionRegistry {
        static INSTANCE: Lazy<FunctionRegistry> = Lazy::new(|| {
            let registry = FunctionRegistry::new();
            super::builtin::register_defaults(&registry);
            registry
        });
        &INSTANCE
    }

    /// Registers a function under its signature's name. Copy-on-write:
    /// builds the new map before swapping, so concurrent `resolve` calls
    /// always see a fully-formed map.
    pub fn register(&self, function: Arc<dyn Function>) {
        let key = function.signature().name.to_string();
        let mut guard = self.functions.write();
        let mut next = (**guard).clone();
        next.entry(key).or_insert_with(Vec::new).push(function);
        *guard = Arc::new(next);
        tracing::debug!(function = %guard.keys().last().cloned().unwrap_or_default(), "function registered");
    }

    /// Snapshot of the current map, safe to keep across a query's
    /// planning phase without holding any lock.
    pub fn snapshot(&self) -> Arc<FunctionMap> {
        Arc::clone(&self.functions.read())
    }

    /// Resolves the most specific overload matching `call_arguments`.
    /// Ambiguity (two equally-specific matches) is a `QuerySyntax` error.
    pub fn resolve(&self, name: &str, call_arguments: &[Type]) -> Result<Arc<dyn Function>> {
        let snapshot = self.snapshot();
        let candidates = snapshot
            .get(name)
            .ok_or_else(|| DbError::query_syntax(format!("unresolvable function name '{name}'")))?;

        let mut matches: Vec<&Arc<dyn Function>> = candidates
            .iter()
            .filter(|f| f.signature().matches(call_arguments))
            .collect();

        match matches.len() {
            0 => Err(DbError::query_syntax(format!(
                "no overload of '{name}' accepts the given argument types"
            ))),
            1 => Ok(Arc::clone(matches.remove(0))),
            _ => {
                matches.sort_by_key(|f| std::cmp::Reverse(f.signature().specificity()));
                let best = matches[0].signature().specificity();
                let tied = matches.iter().filter(|f| f.signature().specificity() == best).count();
                if tied > 1 {
                    Err(DbError::query_syntax(format!(
                        "ambiguous overload of '{name}': {tied} equally specific candidates"
                    )))
                } else {
                    Ok(Arc::clone(matches[0]))
                }
            }
        }
    }
}
