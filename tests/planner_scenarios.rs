// End-to-end scenarios: logical plan -> rewrite-rule planning -> runtime
// operator tree, exercised against the in-memory storage/catalog test
// doubles. Each test corresponds to one of the numbered scenarios the
// rewrite engine and runtime are expected to handle correctly together,
// not just in isolation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cottontail_engine::catalog::{Catalog, EntityMeta, IndexMeta};
use cottontail_engine::execution::logical::{
    FilterPredicate, LogicalNodeKind, LogicalPlan, SortDirection, SortKey,
};
use cottontail_engine::execution::physical::PhysicalNodeKind;
use cottontail_engine::execution::runtime::{ExecutionContext, StorageContext};
use cottontail_engine::execution::EngineConfig;
use cottontail_engine::function::{DistanceKind, FunctionRegistry};
use cottontail_engine::storage::{EntityTx, IndexTx, MemoryEntityTx, MemoryIndexTx};
use cottontail_engine::transaction::TransactionManager;
use cottontail_engine::value::{BindingContext, ColumnDef, Name, Type, TypeKind, Value};
use cottontail_engine::Planner;

fn col(name: &str) -> ColumnDef {
    ColumnDef::new(Name::parse(name), Type::scalar(TypeKind::Int), false, false)
}

fn vector_col(name: &str, dim: usize) -> ColumnDef {
    ColumnDef::new(Name::parse(name), Type::vector(TypeKind::DoubleVector, dim), false, false)
}

struct TestStorage {
    entities: RwLock<HashMap<String, Arc<dyn EntityTx>>>,
    indices: RwLock<HashMap<String, Arc<dyn IndexTx>>>,
}

impl TestStorage {
    fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            indices: RwLock::new(HashMap::new()),
        }
    }

    fn register_entity(&self, name: &str, tx: Arc<dyn EntityTx>) {
        self.entities.write().unwrap().insert(name.to_string(), tx);
    }

    fn register_index(&self, name: &str, tx: Arc<dyn IndexTx>) {
        self.indices.write().unwrap().insert(name.to_string(), tx);
    }
}

impl StorageContext for TestStorage {
    fn entity_tx(&self, name: &Name) -> cottontail_engine::Result<Arc<dyn EntityTx>> {
        self.entities
            .read()
            .unwrap()
            .get(&name.to_string())
            .cloned()
            .ok_or_else(|| cottontail_engine::DbError::storage(format!("unknown entity {name}")))
    }

    fn index_tx(&self, name: &Name) -> cottontail_engine::Result<Arc<dyn IndexTx>> {
        self.indices
            .read()
            .unwrap()
            .get(&name.to_string())
            .cloned()
            .ok_or_else(|| cottontail_engine::DbError::storage(format!("unknown index {name}")))
    }
}

/// Scenario 1: a projection that reads no columns from an `EntityScan`
/// is rewritten into a direct `EntityCount`, and running the resulting
/// plan reports the right row count.
#[test]
fn count_pushdown_reports_the_right_row_count() {
    let entity = Arc::new(MemoryEntityTx::new(Name::parse("s.e")));
    for i in 0..7 {
        entity.insert(vec![col("s.e.a")], vec![Value::Int(i)]);
    }
    let storage = TestStorage::new();
    storage.register_entity("s.e", entity);

    let mut logical = LogicalPlan::new();
    let scan = logical.push_source(
        LogicalNodeKind::EntityScan {
            entity: Name::parse("s.e"),
            columns: vec![col("s.e.a")],
        },
        0,
    );
    let projection = logical.push(LogicalNodeKind::Projection { columns: vec![] }, vec![scan]);

    let catalog = Catalog::new();
    let functions = FunctionRegistry::global();
    let config = EngineConfig::default();
    let planner = Planner::new();
    let (physical, root) = planner.plan(&logical, projection, &catalog, functions, &config).unwrap();
    assert!(matches!(physical.node(root).kind, PhysicalNodeKind::EntityCount { .. }));

    let tm = TransactionManager::new();
    let tx = tm.begin();
    let exec = ExecutionContext {
        storage: &storage,
        catalog: &catalog,
        functions,
        transaction: Arc::clone(tx.context()),
    };
    let mut op = planner.build_operator(&physical, root, &exec).unwrap();
    let mut ctx = BindingContext::new();
    let record = op.next(&mut ctx).unwrap().expect("one count record");
    assert_eq!(record.values[0], Value::Long(7));
    assert!(op.next(&mut ctx).unwrap().is_none());
}

/// Scenario 2: `ORDER BY ... LIMIT k` over an unpartitioned `IndexScan`
/// is rewritten into a `MergeLimitingSort` fanned out over
/// `default_merge_fanout` partitioned strands, and still returns the
/// globally correct top-k.
#[test]
fn order_by_limit_fans_an_index_scan_into_parallel_strands() {
    let entity = Arc::new(MemoryEntityTx::new(Name::parse("s.e")));
    let mut expected: Vec<i32> = Vec::new();
    for i in 0..40 {
        let v = (40 - i) % 37;
        entity.insert(vec![col("s.e.a")], vec![Value::Int(v)]);
        expected.push(v);
    }
    expected.sort();
    expected.truncate(5);

    let index = Arc::new(MemoryIndexTx::new(Name::parse("s.e.idx_a"), Arc::clone(&entity), vec![col("s.e.a")]));
    let storage = TestStorage::new();
    storage.register_entity("s.e", entity);
    storage.register_index("s.e.idx_a", index);

    let mut logical = LogicalPlan::new();
    let scan = logical.push_source(
        LogicalNodeKind::IndexScan {
            index: Name::parse("s.e.idx_a"),
            columns: vec![col("s.e.a")],
            predicate: FilterPredicate::any(col("s.e.a")),
            partition: 0,
            partitions: 1,
        },
        0,
    );
    let sort = logical.push(
        LogicalNodeKind::Sort {
            sort_on: vec![SortKey {
                column: col("s.e.a"),
                direction: SortDirection::Asc,
            }],
        },
        vec![scan],
    );
    let limit = logical.push(LogicalNodeKind::Limit { skip: 0, limit: 5 }, vec![sort]);

    let catalog = Catalog::new();
    let functions = FunctionRegistry::global();
    let mut config = EngineConfig::default();
    config.default_merge_fanout = 4;
    let planner = Planner::new();
    let (physical, root) = planner.plan(&logical, limit, &catalog, functions, &config).unwrap();
    assert!(matches!(physical.node(root).kind, PhysicalNodeKind::MergeLimitingSort { .. }));
    assert_eq!(physical.node(root).inputs.len(), 4);

    let tm = TransactionManager::new();
    let tx = tm.begin();
    let exec = ExecutionContext {
        storage: &storage,
        catalog: &catalog,
        functions,
        transaction: Arc::clone(tx.context()),
    };
    let mut op = planner.build_operator(&physical, root, &exec).unwrap();
    let mut ctx = BindingContext::new();
    let mut seen = Vec::new();
    while let Some(record) = op.next(&mut ctx).unwrap() {
        match record.values[0] {
            Value::Int(v) => seen.push(v),
            _ => panic!("expected Int"),
        }
    }
    assert_eq!(seen, expected);
}

/// Scenarios 3/4: `SimdRule` flips a `Function` node's vectorized flag
/// once a vector argument reaches the configured threshold, and leaves
/// it alone below it, but the computed result is identical either way.
#[test]
fn simd_rule_fires_above_threshold_and_not_below() {
    let wide = vector_col("s.e.v", 512);
    let narrow = vector_col("s.e.v", 64);

    for (column, should_vectorize) in [(wide, true), (narrow, false)] {
        let entity = Arc::new(MemoryEntityTx::new(Name::parse("s.e")));
        let values: Vec<f64> = (0..column.col_type.logical_size()).map(|i| i as f64 * 0.25).collect();
        entity.insert(vec![column.clone()], vec![Value::DoubleVector(values.clone())]);
        let storage = TestStorage::new();
        storage.register_entity("s.e", entity);

        let mut logical = LogicalPlan::new();
        let scan = logical.push_source(
            LogicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![column.clone()],
            },
            0,
        );
        let sum_column = ColumnDef::new(Name::parse("s.e.sum"), Type::scalar(TypeKind::Double), false, false);
        let function = logical.push(
            LogicalNodeKind::Function {
                name: Name::parse("vector_sum"),
                arguments: vec![column.clone()],
                out_column: sum_column.clone(),
            },
            vec![scan],
        );

        let catalog = Catalog::new();
        let functions = FunctionRegistry::global();
        let mut config = EngineConfig::default();
        config.simd_dimensionality_threshold = 256;
        let planner = Planner::new();
        let (physical, root) = planner.plan(&logical, function, &catalog, functions, &config).unwrap();
        match &physical.node(root).kind {
            PhysicalNodeKind::Function { vectorized, .. } => assert_eq!(*vectorized, should_vectorize),
            other => panic!("expected a Function node, got {other:?}"),
        }

        let tm = TransactionManager::new();
        let tx = tm.begin();
        let exec = ExecutionContext {
            storage: &storage,
            catalog: &catalog,
            functions,
            transaction: Arc::clone(tx.context()),
        };
        let mut op = planner.build_operator(&physical, root, &exec).unwrap();
        let mut ctx = BindingContext::new();
        let record = op.next(&mut ctx).unwrap().expect("one row");
        let expected: f64 = values.iter().sum();
        match record.get("sum") {
            Some(Value::Double(d)) => assert!((d - expected).abs() < 1e-6),
            other => panic!("expected a sum column, got {other:?}"),
        }
    }
}

/// Scenario 5: deleting the same tuple twice within one transaction
/// removes a row the first time and nothing the second.
#[test]
fn repeated_delete_within_one_transaction_is_idempotent_at_zero() {
    let entity = Arc::new(MemoryEntityTx::new(Name::parse("s.e")));
    entity.insert(vec![col("s.e.a")], vec![Value::Int(1)]);
    let storage = TestStorage::new();
    storage.register_entity("s.e", Arc::clone(&entity) as Arc<dyn EntityTx>);

    let catalog = Catalog::new();
    catalog.register_entity(EntityMeta {
        name: Name::parse("s.e"),
        columns: vec![col("s.e.a")],
        estimated_rows: 1,
    });
    let functions = FunctionRegistry::global();
    let tm = TransactionManager::new();
    let tx = tm.begin();
    let exec = ExecutionContext {
        storage: &storage,
        catalog: &catalog,
        functions,
        transaction: Arc::clone(tx.context()),
    };

    let mut logical = LogicalPlan::new();
    let delete = logical.push_source(
        LogicalNodeKind::Delete {
            entity: Name::parse("s.e"),
            predicate: None,
        },
        0,
    );

    let config = EngineConfig::default();
    let planner = Planner::new();

    let (physical_first, root_first) = planner.plan(&logical, delete, &catalog, functions, &config).unwrap();
    let mut first_op = planner.build_operator(&physical_first, root_first, &exec).unwrap();
    let mut ctx = BindingContext::new();
    let first = first_op.next(&mut ctx).unwrap().expect("one delete summary record");
    assert_eq!(first.get("deleted_count"), Some(&Value::Long(1)));

    let (physical_second, root_second) = planner.plan(&logical, delete, &catalog, functions, &config).unwrap();
    let mut second_op = planner.build_operator(&physical_second, root_second, &exec).unwrap();
    let second = second_op.next(&mut ctx).unwrap().expect("one delete summary record");
    assert_eq!(second.get("deleted_count"), Some(&Value::Long(0)));
}

/// Scenario 6: cancelling a transaction's token between pulls stops a
/// scan early rather than running it to exhaustion.
#[test]
fn cancellation_stops_a_scan_before_exhaustion() {
    let entity = Arc::new(MemoryEntityTx::new(Name::parse("s.e")));
    for i in 0..100 {
        entity.insert(vec![col("s.e.a")], vec![Value::Int(i)]);
    }
    let storage = TestStorage::new();
    storage.register_entity("s.e", entity);

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

    let mut logical = LogicalPlan::new();
    let scan = logical.push_source(
        LogicalNodeKind::EntityScan {
            entity: Name::parse("s.e"),
            columns: vec![col("s.e.a")],
        },
        0,
    );

    let config = EngineConfig::default();
    let planner = Planner::new();
    let (physical, root) = planner.plan(&logical, scan, &catalog, functions, &config).unwrap();
    let mut op = planner.build_operator(&physical, root, &exec).unwrap();
    let mut ctx = BindingContext::new();

    let mut seen = 0;
    for _ in 0..10 {
        op.next(&mut ctx).unwrap();
        seen += 1;
    }
    exec.transaction.cancellation().cancel();
    assert!(op.next(&mut ctx).unwrap().is_none());
    assert!(seen < 100);
}

/// `KnnToIndexRule`: a kNN predicate over an `EntityScan` is rewritten to
/// scan through a catalog-registered index instead, when one matching
/// the predicate's column and distance kind exists.
#[test]
fn knn_to_index_rule_swaps_in_a_matching_index() {
    let probe = vector_col("s.e.v", 4);
    let entity = Arc::new(MemoryEntityTx::new(Name::parse("s.e")));
    entity.insert(vec![probe.clone()], vec![Value::DoubleVector(vec![1.0, 0.0, 0.0, 0.0])]);
    entity.insert(vec![probe.clone()], vec![Value::DoubleVector(vec![0.0, 1.0, 0.0, 0.0])]);
    let index = Arc::new(MemoryIndexTx::new(Name::parse("s.e.idx_v"), Arc::clone(&entity), vec![probe.clone()]));
    let storage = TestStorage::new();
    storage.register_entity("s.e", entity);
    storage.register_index("s.e.idx_v", index);

    let catalog = Catalog::new();
    catalog.register_index(IndexMeta {
        name: Name::parse("s.e.idx_v"),
        entity: Name::parse("s.e"),
        column: probe.clone(),
        distance: Some(DistanceKind::L2),
    });

    let mut logical = LogicalPlan::new();
    let scan = logical.push_source(
        LogicalNodeKind::EntityScan {
            entity: Name::parse("s.e"),
            columns: vec![probe.clone()],
        },
        0,
    );
    let predicate = cottontail_engine::execution::logical::KnnPredicate {
        column: probe.clone(),
        k: 1,
        distance: DistanceKind::L2,
        weight_bits: 0,
        hint: None,
        query_fingerprint: 0,
    };
    let knn = logical.push(LogicalNodeKind::Knn { predicate }, vec![scan]);

    let functions = FunctionRegistry::global();
    let config = EngineConfig::default();
    let planner = Planner::new();
    let (physical, root) = planner.plan(&logical, knn, &catalog, functions, &config).unwrap();
    assert!(matches!(physical.node(root).kind, PhysicalNodeKind::Knn { .. }));
    let scan_after = physical.node(root).inputs[0];
    assert!(matches!(physical.node(scan_after).kind, PhysicalNodeKind::IndexScan { .. }));

    let tm = TransactionManager::new();
    let tx = tm.begin();
    let exec = ExecutionContext {
        storage: &storage,
        catalog: &catalog,
        functions,
        transaction: Arc::clone(tx.context()),
    };
    let mut op = planner.build_operator(&physical, root, &exec).unwrap();
    let mut ctx = BindingContext::new();
    let fingerprint = ctx
        .bind(cottontail_engine::value::Binding::Literal(Value::DoubleVector(vec![1.0, 0.0, 0.0, 0.0])))
        .unwrap();
    assert_eq!(fingerprint, 0, "knn predicate's query_fingerprint was baked in assuming the first bind id is 0");
    let first = op.next(&mut ctx).unwrap().expect("one scored row");
    match first.get("distance") {
        Some(Value::Double(d)) => assert!(*d >= 0.0),
        other => panic!("expected a distance column, got {other:?}"),
    }
}
