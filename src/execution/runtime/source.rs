// Source operators: the nullary leaves of the operator tree, each
// wrapping exactly one external storage collaborator.

use std::sync::Arc;

use crate::error::Result;
use crate::execution::logical::FilterPredicate;
use crate::storage::{compare, now_millis, EntityTx};
use crate::transaction::{CancellationToken, Cursor, TransactionContext};
use crate::value::{ColumnDef, Name, Record, Type, TypeKind, Value};

use super::{ExecutionContext, Operator};

/// Wraps an `EntityTx::cursor`, switching the binding context to
/// this operator's strand on every emission — relevant only when this
/// scan is one input of a `MergeLimitingSort`; a lone scan always runs on
/// strand 0.
pub struct EntityScanOperator {
    columns: Vec<ColumnDef>,
    cursor: crate::storage::EntityCursor,
    cancellation: CancellationToken,
    strand: usize,
}

impl EntityScanOperator {
    pub fn open(exec: &ExecutionContext, entity: &Name, columns: Vec<ColumnDef>) -> Result<Self> {
        let tx = exec.storage.entity_tx(entity)?;
        let cancellation = exec.transaction.cancellation().clone();
        let cursor = tx.cursor(&columns, cancellation.clone())?;
        Ok(Self {
            columns,
            cursor,
            cancellation,
            strand: 0,
        })
    }

    pub fn with_strand(mut self, strand: usize) -> Self {
        self.strand = strand;
        self
    }
}

impl Operator for EntityScanOperator {
    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn next(&mut self, ctx: &mut crate::value::BindingContext) -> Result<Option<Record>> {
        if self.cancellation.is_cancelled() {
            return Ok(None);
        }
        if self.cursor.move_next()? {
            ctx.switch_strand(self.strand);
            Ok(Some(self.cursor.value().clone()))
        } else {
            Ok(None)
        }
    }

    fn close(&mut self) {
        self.cursor.close();
    }
}

/// `EntityCountPhysicalOperatorNode`'s runtime counterpart: emits a
/// single `(count: Long)` record, then exhausts.
pub struct EntityCountOperator {
    column: ColumnDef,
    count: Option<i64>,
}

impl EntityCountOperator {
    pub fn open(exec: &ExecutionContext, entity: &Name) -> Result<Self> {
        let tx = exec.storage.entity_tx(entity)?;
        let count = tx.count()? as i64;
        let column = ColumnDef::new(Name::parse("count"), Type::scalar(TypeKind::Long), false, false);
        Ok(Self {
            column,
            count: Some(count),
        })
    }
}

impl Operator for EntityCountOperator {
    fn columns(&self) -> &[ColumnDef] {
        std::slice::from_ref(&self.column)
    }

    fn next(&mut self, ctx: &mut crate::value::BindingContext) -> Result<Option<Record>> {
        match self.count.take() {
            Some(count) => {
                ctx.switch_strand(0);
                Ok(Some(Record::new(0, vec![self.column.clone()], vec![Value::Long(count)])))
            }
            None => Ok(None),
        }
    }
}

/// Wraps `IndexTx::filter_range`, materializing eagerly at open time —
/// the in-memory reference `IndexTx` has no incremental cursor of its own;
/// a real index's `filter_range` would stream instead.
pub struct IndexScanOperator {
    columns: Vec<ColumnDef>,
    rows: std::vec::IntoIter<Record>,
    strand: usize,
}

impl IndexScanOperator {
    pub fn open(
        exec: &ExecutionContext,
        index: &Name,
        columns: Vec<ColumnDef>,
        predicate: FilterPredicate,
        partition: usize,
        partitions: usize,
    ) -> Result<Self> {
        let tx = exec.storage.index_tx(index)?;
        let cancellation = exec.transaction.cancellation().clone();
        let rows = tx.filter_range(&predicate, partition, partitions, cancellation)?;
        Ok(Self {
            columns,
            rows: rows.into_iter(),
            strand: partition,
        })
    }
}

impl Operator for IndexScanOperator {
    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn next(&mut self, ctx: &mut crate::value::BindingContext) -> Result<Option<Record>> {
        ctx.switch_strand(self.strand);
        Ok(self.rows.next())
    }
}

/// Bernoulli-samples its input at `probability`, using a `SmallRng`
/// seeded from `seed` — the same seed always produces the same sample,
/// which is what makes a sampled plan reproducible across a rewrite
/// that re-splits it per strand.
pub struct EntitySampleOperator {
    input: Box<dyn Operator>,
    probability: f64,
    rng: rand::rngs::SmallRng,
}

impl EntitySampleOperator {
    pub fn new(input: Box<dyn Operator>, probability: f64, seed: u64) -> Self {
        use rand::SeedableRng;
        Self {
            input,
            probability,
            rng: rand::rngs::SmallRng::seed_from_u64(seed),
        }
    }
}

impl Operator for EntitySampleOperator {
    fn columns(&self) -> &[ColumnDef] {
        self.input.columns()
    }

    fn next(&mut self, ctx: &mut crate::value::BindingContext) -> Result<Option<Record>> {
        use rand::Rng;
        loop {
            match self.input.next(ctx)? {
                Some(record) => {
                    if self.rng.gen::<f64>() < self.probability {
                        return Ok(Some(record));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// `DeleteLogicalOperatorNode`'s runtime counterpart: on its first pull,
/// scans the entity, evaluates `predicate` (or deletes every row if
/// `None`), issues one `EntityTx::delete` per match, and emits a single
/// `(deleted_count, timestamp)` record — a second pull always returns
/// `None`, so re-pulling a spent `DeleteOperator` is safe, and a second
/// `DELETE ... WHERE id = 7` in the same transaction deletes zero rows
/// rather than erroring.
pub struct DeleteOperator {
    entity_tx: Arc<dyn EntityTx>,
    transaction: Arc<TransactionContext>,
    predicate: Option<FilterPredicate>,
    entity_columns: Vec<ColumnDef>,
    output_columns: Vec<ColumnDef>,
    done: bool,
}

impl DeleteOperator {
    pub fn open(exec: &ExecutionContext, entity: &Name, predicate: Option<FilterPredicate>) -> Result<Self> {
        let entity_tx = exec.storage.entity_tx(entity)?;
        let meta = exec.catalog.entity(entity)?;
        let deleted_count = ColumnDef::new(Name::parse("deleted_count"), Type::scalar(TypeKind::Long), false, false);
        let timestamp = ColumnDef::new(Name::parse("timestamp"), Type::scalar(TypeKind::Long), false, false);
        Ok(Self {
            entity_tx,
            transaction: Arc::clone(&exec.transaction),
            predicate,
            entity_columns: meta.columns,
            output_columns: vec![deleted_count, timestamp],
            done: false,
        })
    }
}

impl Operator for DeleteOperator {
    fn columns(&self) -> &[ColumnDef] {
        &self.output_columns
    }

    fn next(&mut self, ctx: &mut crate::value::BindingContext) -> Result<Option<Record>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        self.transaction.begin_mutation()?;

        let cancellation = self.transaction.cancellation().clone();
        let mut cursor = self.entity_tx.cursor(&self.entity_columns, cancellation)?;
        let mut matching = Vec::new();
        while cursor.move_next()? {
            let record = cursor.value();
            let keep = match &self.predicate {
                None => true,
                Some(predicate) => match predicate.literal() {
                    None => true,
                    Some(literal) => match record.get(predicate.column.name.simple_name()) {
                        Some(value) => compare(predicate.operator, value, literal),
                        None => false,
                    },
                },
            };
            if keep {
                matching.push(record.tuple_id);
            }
        }
        cursor.close();

        let mut deleted = 0i64;
        for tuple_id in matching {
            deleted += self.entity_tx.delete(tuple_id)? as i64;
        }

        ctx.switch_strand(0);
        let record = Record::new(
            0,
            self.output_columns.clone(),
            vec![Value::Long(deleted), Value::Long(now_millis())],
        );
        Ok(Some(record))
    }
}
