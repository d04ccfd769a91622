// Storage interface (consumed).
//
// Persistent storage of columns, tuples, and indices is explicitly out
// of scope here — this crate only needs the narrow seam the
// planner/executor call through: `EntityTx::count`/`cursor`,
// `IndexTx::filter`/`filter_range`. The in-memory `MemoryEntityTx`/
// `MemoryIndexTx` below are reference test doubles, splitting "the thing
// that owns bytes" from "the thing that hands out a cursor over them",
// scaled down to what an external collaborator needs to expose.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{DbError, Result};
use crate::execution::logical::{ComparisonOperator, FilterPredicate};
use crate::transaction::{CancellationToken, Cursor, TransactionResult};
use crate::value::{ColumnDef, Name, Record, TupleId, TupleIdGenerator, Value};

/// A cursor over an entity's records, restricted to a column projection
/// at open time: `EntityTx.cursor(columns) -> Cursor<Record>`.
pub struct EntityCursor {
    rows: Vec<Record>,
    columns: Vec<ColumnDef>,
    pos: Option<usize>,
    cancellation: CancellationToken,
    closed: bool,
}

impl Cursor<Record> for EntityCursor {
    fn move_next(&mut self) -> TransactionResult<bool> {
        if self.closed || self.cancellation.is_cancelled() {
            return Ok(false);
        }
        let next = self.pos.map(|p| p + 1).unwrap_or(0);
        if next >= self.rows.len() {
            self.pos = Some(next);
            return Ok(false);
        }
        self.pos = Some(next);
        Ok(true)
    }

    fn key(&self) -> u64 {
        self.rows[self.pos.expect("move_next not called")].tuple_id as u64
    }

    fn value(&self) -> &Record {
        &self.rows[self.pos.expect("move_next not called")]
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// `EntityTx.count() -> long`; `EntityTx.cursor(columns) -> Cursor<Record>`.
pub trait EntityTx: Send + Sync {
    fn entity(&self) -> &Name;
    fn count(&self) -> Result<u64>;
    fn cursor(&self, columns: &[ColumnDef], cancellation: CancellationToken) -> Result<EntityCursor>;
    /// Deletes the row identified by `tuple_id`. Returns the number of
    /// rows actually removed (0 or 1), matching the repeated-delete
    /// "second delete removes zero rows" requirement.
    fn delete(&self, tuple_id: TupleId) -> Result<u64>;
}

/// `IndexTx.filter(Predicate) -> iterable of Record`;
/// `filterRange(Predicate, partition, partitions)` for partitioned scans.
pub trait IndexTx: Send + Sync {
    fn index(&self) -> &Name;
    fn filter(&self, predicate: &FilterPredicate, cancellation: CancellationToken) -> Result<Vec<Record>>;
    fn filter_range(
        &self,
        predicate: &FilterPredicate,
        partition: usize,
        partitions: usize,
        cancellation: CancellationToken,
    ) -> Result<Vec<Record>>;
}

pub(crate) fn compare(op: ComparisonOperator, value: &Value, literal: &Value) -> bool {
    match op {
        ComparisonOperator::Eq => value == literal,
        ComparisonOperator::Lt => value.partial_cmp(literal) == Some(std::cmp::Ordering::Less),
        ComparisonOperator::Lte => matches!(
            value.partial_cmp(literal),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        ),
        ComparisonOperator::Gt => value.partial_cmp(literal) == Some(std::cmp::Ordering::Greater),
        ComparisonOperator::Gte => matches!(
            value.partial_cmp(literal),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        ),
    }
}

/// A reference `EntityTx`: an in-memory `Vec<Record>` behind a lock,
/// standing in for the real columnar store during planning/execution
/// tests. Never used outside `#[cfg(test)]`/doctests in this crate.
pub struct MemoryEntityTx {
    entity: Name,
    rows: Arc<RwLock<Vec<Record>>>,
    ids: TupleIdGenerator,
}

impl MemoryEntityTx {
    pub fn new(entity: Name) -> Self {
        Self {
            entity,
            rows: Arc::new(RwLock::new(Vec::new())),
            ids: TupleIdGenerator::new(),
        }
    }

    pub fn insert(&self, columns: Vec<ColumnDef>, values: Vec<Value>) -> TupleId {
        let tuple_id = self.ids.next();
        self.rows.write().push(Record::new(tuple_id, columns, values));
        tuple_id
    }
}

impl EntityTx for MemoryEntityTx {
    fn entity(&self) -> &Name {
        &self.entity
    }

    fn count(&self) -> Result<u64> {
        Ok(self.rows.read().len() as u64)
    }

    fn cursor(&self, columns: &[ColumnDef], cancellation: CancellationToken) -> Result<EntityCursor> {
        let rows = self.rows.read();
        let projected: Result<Vec<Record>> = rows
            .iter()
            .map(|r| {
                r.project(columns)
                    .ok_or_else(|| DbError::storage(format!("record {} missing a required column", r.tuple_id)))
            })
            .collect();
        Ok(EntityCursor {
            rows: projected?,
            columns: columns.to_vec(),
            pos: None,
            cancellation,
            closed: false,
        })
    }

    fn delete(&self, tuple_id: TupleId) -> Result<u64> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|r| r.tuple_id != tuple_id);
        Ok((before - rows.len()) as u64)
    }
}

/// Timestamp column value stamped on a delete — real commit timestamps
/// belong to the storage engine, this is just enough to exercise
/// `DeleteLogicalOperatorNode`'s fixed `(deleted_count, timestamp)`
/// output pair.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A reference `IndexTx`: scans the backing `MemoryEntityTx` applying
/// `predicate` in memory. Real indices use structure (B-trees, IVF
/// lists, ...) to avoid the scan; only the cost hints and cursor shape
/// of that interface matter to this crate.
pub struct MemoryIndexTx {
    index: Name,
    entity: Arc<MemoryEntityTx>,
    columns: Vec<ColumnDef>,
}

impl MemoryIndexTx {
    pub fn new(index: Name, entity: Arc<MemoryEntityTx>, columns: Vec<ColumnDef>) -> Self {
        Self { index, entity, columns }
    }
}

impl IndexTx for MemoryIndexTx {
    fn index(&self) -> &Name {
        &self.index
    }

    fn filter(&self, predicate: &FilterPredicate, cancellation: CancellationToken) -> Result<Vec<Record>> {
        self.filter_range(predicate, 0, 1, cancellation)
    }

    fn filter_range(
        &self,
        predicate: &FilterPredicate,
        partition: usize,
        partitions: usize,
        cancellation: CancellationToken,
    ) -> Result<Vec<Record>> {
        let mut cursor = self.entity.cursor(&self.columns, cancellation)?;
        let mut out = Vec::new();
        let mut i = 0usize;
        while cursor.move_next()? {
            let record = cursor.value();
            if partitions > 1 && i % partitions != partition {
                i += 1;
                continue;
            }
            i += 1;
            if let Some(literal) = predicate.literal() {
                if let Some(value) = record.get(predicate.column.name.simple_name()) {
                    if compare(predicate.operator, value, literal) {
                        out.push(record.clone());
                    }
                }
            } else {
                out.push(record.clone());
            }
        }
        cursor.close();
        Ok(out)
    }
}
