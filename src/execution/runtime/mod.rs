// Runtime operators: the pull-pipeline that streams typed records
// between stages.
//
// `Operator::next` is a synchronous pull — the cooperative-async-stream
// shape translates to a plain iterator since a single strand is a
// CPU-bound cursor consumer, not I/O-bound network code (no
// `async`/`.await` needed here; NAry merge parallelism below uses
// threads, not an async runtime). Every operator switches the
// `BindingContext` to its emitting strand before returning a record and
// checks the transaction's `CancellationToken` at each emission
// boundary.

pub mod merge;
pub mod pipeline;
pub mod source;

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::function::FunctionRegistry;
use crate::transaction::TransactionContext;
use crate::value::{BindingContext, ColumnDef, Record};

use super::physical::{NodeId, PhysicalNodeKind, PhysicalPlan};

/// A runtime node in the pull-pipeline. `next` returns `Ok(None)` at
/// exhaustion; once it has, a well-behaved operator keeps returning
/// `Ok(None)` rather than resuming (mirrors `Cursor`'s post-exhaustion
/// contract).
pub trait Operator: Send {
    fn columns(&self) -> &[ColumnDef];

    fn next(&mut self, ctx: &mut BindingContext) -> Result<Option<Record>>;

    /// True for a `PipelineBreaker` (sort, group) that must fully
    /// materialize its input before emitting its first record.
    fn is_breaker(&self) -> bool {
        false
    }

    fn close(&mut self) {}
}

/// Resolves a physical node's storage-facing names (`EntityScan`'s
/// entity, `IndexScan`'s index) to the external `EntityTx`/`IndexTx`
/// collaborators. A thin seam so `runtime` never depends on a
/// concrete storage engine, only on this trait.
pub trait StorageContext: Send + Sync {
    fn entity_tx(&self, name: &crate::value::Name) -> Result<Arc<dyn crate::storage::EntityTx>>;
    fn index_tx(&self, name: &crate::value::Name) -> Result<Arc<dyn crate::storage::IndexTx>>;
}

/// Everything a physical node needs to become a runtime operator:
/// storage/catalog seams, the function registry, the owning
/// transaction, and the SIMD threshold/iteration-cap parameters from
/// `EngineConfig`, as `toOperator(ctx)` needs.
pub struct ExecutionContext<'a> {
    pub storage: &'a dyn StorageContext,
    pub catalog: &'a Catalog,
    pub functions: &'a FunctionRegistry,
    pub transaction: Arc<TransactionContext>,
}

/// Lowers physical node `id` (and, recursively, its inputs) into a
/// runtime operator tree. Binds late values by resolving storage/catalog
/// handles at this point rather than at physical-plan construction
/// time.
pub fn build_operator(plan: &PhysicalPlan, id: NodeId, exec: &ExecutionContext) -> Result<Box<dyn Operator>> {
    let node = plan.node(id);
    let inputs: Result<Vec<Box<dyn Operator>>> = node
        .inputs
        .iter()
        .map(|&input| build_operator(plan, input, exec))
        .collect();
    let mut inputs = inputs?;

    let operator: Box<dyn Operator> = match &node.kind {
        PhysicalNodeKind::EntityScan { entity, columns } => {
            Box::new(source::EntityScanOperator::open(exec, entity, columns.clone())?)
        }
        PhysicalNodeKind::IndexScan {
            index,
            columns,
            predicate,
            partition,
            partitions,
        } => Box::new(source::IndexScanOperator::open(
            exec,
            index,
            columns.clone(),
            predicate.clone(),
            *partition,
            *partitions,
        )?),
        PhysicalNodeKind::EntityCount { entity } => Box::new(source::EntityCountOperator::open(exec, entity)?),
        PhysicalNodeKind::Sample { probability, seed } => {
            let input = inputs.pop().ok_or_else(|| missing_input("Sample"))?;
            Box::new(source::EntitySampleOperator::new(input, *probability, *seed))
        }
        PhysicalNodeKind::Filter { predicate } => {
            let input = inputs.pop().ok_or_else(|| missing_input("Filter"))?;
            Box::new(pipeline::FilterOperator::new(input, predicate.clone()))
        }
        PhysicalNodeKind::Function {
            name,
            arguments,
            out_column,
            vectorized,
        } => {
            let input = inputs.pop().ok_or_else(|| missing_input("Function"))?;
            Box::new(pipeline::FunctionOperator::new(
                input,
                exec.functions,
                name.clone(),
                arguments.clone(),
                out_column.clone(),
                *vectorized,
            )?)
        }
        PhysicalNodeKind::Projection { columns } => {
            let input = inputs.pop().ok_or_else(|| missing_input("Projection"))?;
            Box::new(pipeline::ProjectionOperator::new(input, columns.clone()))
        }
        PhysicalNodeKind::Sort { sort_on } => {
            let input = inputs.pop().ok_or_else(|| missing_input("Sort"))?;
            Box::new(pipeline::SortOperator::new(input, sort_on.clone()))
        }
        PhysicalNodeKind::Limit { skip, limit } => {
            let input = inputs.pop().ok_or_else(|| missing_input("Limit"))?;
            Box::new(pipeline::LimitOperator::new(input, *skip, *limit))
        }
        PhysicalNodeKind::Knn { predicate } => {
            let input = inputs.pop().ok_or_else(|| missing_input("Knn"))?;
            Box::new(pipeline::KnnOperator::new(input, predicate.clone()))
        }
        PhysicalNodeKind::Delete { entity, predicate } => {
            Box::new(source::DeleteOperator::open(exec, entity, predicate.clone())?)
        }
        PhysicalNodeKind::MergeLimitingSort { sort_on, limit } => {
            Box::new(merge::MergeLimitingHeapSortOperator::new(inputs, sort_on.clone(), *limit))
        }
    };

    Ok(operator)
}

fn missing_input(node: &str) -> crate::error::DbError {
    crate::error::DbError::internal(format!("{node} physical node built with no input operator"))
}

/// Lexicographic row comparison over `sort_on`, shared by `SortOperator`
/// and `MergeLimitingHeapSortOperator` so a single-strand sort and an
/// NAry merge agree on ordering. Missing columns or cross-type
/// comparisons (a planner bug, since `propagate` requires the sort
/// columns) fall back to `Equal` rather than panicking. Rows that tie
/// on every `sort_on` column fall back to comparing `tuple_id`, so
/// ordering stays deterministic instead of depending on insertion or
/// thread-scheduling order.
pub(crate) fn compare_rows(sort_on: &[super::logical::SortKey], a: &Record, b: &Record) -> std::cmp::Ordering {
    use super::logical::SortDirection;
    use std::cmp::Ordering;

    for key in sort_on {
        let column = key.column.name.simple_name();
        let ordering = match (a.get(column), b.get(column)) {
            (Some(av), Some(bv)) => av.partial_cmp(bv).unwrap_or(Ordering::Equal),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        };
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.tuple_id.cmp(&b.tuple_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::logical::{ComparisonOperator, FilterPredicate};
    use crate::execution::physical::PhysicalPlan;
    use crate::storage::{EntityTx, IndexTx, MemoryEntityTx};
    use crate::transaction::TransactionManager;
    use crate::value::{Name, Type, TypeKind, Value};
    use std::collections::HashMap;
    use std::sync::RwLock;

    fn col(name: &str) -> ColumnDef {
        ColumnDef::new(Name::parse(name), Type::scalar(TypeKind::Int), false, false)
    }

    struct TestStorage {
        entities: RwLock<HashMap<String, Arc<dyn EntityTx>>>,
    }

    impl StorageContext for TestStorage {
        fn entity_tx(&self, name: &Name) -> Result<Arc<dyn EntityTx>> {
            self.entities
                .read()
                .unwrap()
                .get(&name.to_string())
                .cloned()
                .ok_or_else(|| crate::error::DbError::storage(format!("unknown entity {name}")))
        }
        fn index_tx(&self, name: &Name) -> Result<Arc<dyn IndexTx>> {
            Err(crate::error::DbError::storage(format!("no index {name}")))
        }
    }

    #[test]
    fn entity_count_operator_emits_one_record() {
        let entity = Arc::new(MemoryEntityTx::new(Name::parse("s.e")));
        entity.insert(vec![col("s.e.a")], vec![Value::Int(1)]);
        entity.insert(vec![col("s.e.a")], vec![Value::Int(2)]);

        let mut entities: HashMap<String, Arc<dyn EntityTx>> = HashMap::new();
        entities.insert("s.e".to_string(), entity);
        let storage = TestStorage {
            entities: RwLock::new(entities),
        };
        let catalog = Catalog::new();
        let functions = FunctionRegistry::global();
        let tm = TransactionManager::new();
        let tx = tm.begin();
        let exec = ExecutionContext {
            storage: &storage,
            catalog: &catalog,
            functions,
            transaction: Arc::clone(tx.context()),
        };

        let mut plan = PhysicalPlan::new();
        let id = plan.push(
            PhysicalNodeKind::EntityCount {
                entity: Name::parse("s.e"),
            },
            vec![],
            vec![col("count")],
        );

        let mut op = build_operator(&plan, id, &exec).unwrap();
        let mut binding_ctx = BindingContext::new();
        let record = op.next(&mut binding_ctx).unwrap().expect("one record");
        assert_eq!(record.values[0], Value::Long(2));
        assert!(op.next(&mut binding_ctx).unwrap().is_none());
    }

    #[test]
    fn filter_then_limit_pipeline_streams_matching_rows() {
        let entity = Arc::new(MemoryEntityTx::new(Name::parse("s.e")));
        for i in 0..5 {
            entity.insert(vec![col("s.e.a")], vec![Value::Int(i)]);
        }
        let mut entities: HashMap<String, Arc<dyn EntityTx>> = HashMap::new();
        entities.insert("s.e".to_string(), entity);
        let storage = TestStorage {
            entities: RwLock::new(entities),
        };
        let catalog = Catalog::new();
        let functions = FunctionRegistry::global();
        let tm = TransactionManager::new();
        let tx = tm.begin();
        let exec = ExecutionContext {
            storage: &storage,
            catalog: &catalog,
            functions,
            transaction: Arc::clone(tx.context()),
        };

        let mut plan = PhysicalPlan::new();
        plan.set_cardinality(&Name::parse("s.e"), 5);
        let scan = plan.push(
            PhysicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![col("s.e.a")],
            },
            vec![],
            vec![col("s.e.a")],
        );
        let predicate = FilterPredicate::with_literal(col("s.e.a"), ComparisonOperator::Gt, Value::Int(1));
        let filtered = plan.push(
            PhysicalNodeKind::Filter { predicate },
            vec![scan],
            vec![col("s.e.a")],
        );
        let limited = plan.push(
            PhysicalNodeKind::Limit { skip: 0, limit: 2 },
            vec![filtered],
            vec![col("s.e.a")],
        );

        let mut op = build_operator(&plan, limited, &exec).unwrap();
        let mut binding_ctx = BindingContext::new();
        let mut seen = Vec::new();
        while let Some(record) = op.next(&mut binding_ctx).unwrap() {
            seen.push(record.values[0].clone());
        }
        assert_eq!(seen, vec![Value::Int(2), Value::Int(3)]);
    }
}
