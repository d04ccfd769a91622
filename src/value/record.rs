// Records: ordered tuples keyed by `ColumnDef`, identified by a
// monotone `TupleId`.

use std::sync::atomic::{AtomicI64, Ordering};

use super::column::ColumnDef;
use super::types::Value;

/// Monotone 64-bit tuple identity.
pub type TupleId = i64;

/// Generates monotonically increasing `TupleId`s, e.g. for in-memory
/// test doubles of `EntityTx` that need to mint ids on insert.
pub struct TupleIdGenerator {
    next: AtomicI64,
}

impl TupleIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    pub fn next(&self) -> TupleId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for TupleIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// An ordered tuple. Columns and values are parallel vectors rather than
/// a map — record width is fixed at construction and lookups by position
/// dominate over lookups by name in the runtime operators.
#[derive(Debug, Clone)]
pub struct Record {
    pub tuple_id: TupleId,
    pub columns: Vec<ColumnDef>,
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(tuple_id: TupleId, columns: Vec<ColumnDef>, values: Vec<Value>) -> Self {
        debug_assert_eq!(
            columns.len(),
            values.len(),
            "record column/value arity mismatch"
        );
        Self {
            tuple_id,
            columns,
            values,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.name.simple_name() == name)
            .map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// True iff `self.columns` is a superset of `required`.
    pub fn satisfies(&self, required: &[ColumnDef]) -> bool {
        required.iter().all(|r| self.columns.contains(r))
    }

    /// Projects down to just the requested columns, preserving order.
    pub fn project(&self, columns: &[ColumnDef]) -> Option<Record> {
        let mut values = Vec::with_capacity(columns.len());
        for col in columns {
            let idx = self.columns.iter().position(|c| c == col)?;
            values.push(self.values[idx].clone());
        }
        Some(Record::new(self.tuple_id, columns.to_vec(), values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::column::Name;
    use crate::value::types::{Type, TypeKind};

    fn col(name: &str) -> ColumnDef {
        ColumnDef::new(Name::parse(name), Type::scalar(TypeKind::Int), false, false)
    }

    #[test]
    fn tuple_ids_are_monotone() {
        let gen = TupleIdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert!(b > a);
    }

    #[test]
    fn get_by_simple_name_finds_the_right_value() {
        let record = Record::new(
            1,
            vec![col("s.e.a"), col("s.e.b")],
            vec![Value::Int(1), Value::Int(2)],
        );
        assert_eq!(record.get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn satisfies_checks_superset() {
        let record = Record::new(
            1,
            vec![col("s.e.a"), col("s.e.b")],
            vec![Value::Int(1), Value::Int(2)],
        );
        assert!(record.satisfies(&[col("s.e.a")]));
        assert!(!record.satisfies(&[col("s.e.c")]));
    }

    #[test]
    fn project_keeps_only_requested_columns_in_order() {
        let record = Record::new(
            1,
            vec![col("s.e.a"), col("s.e.b")],
            vec![Value::Int(1), Value::Int(2)],
        );
        let projected = record.project(&[col("s.e.b")]).unwrap();
        assert_eq!(projected.values, vec![Value::Int(2)]);
    }
}
