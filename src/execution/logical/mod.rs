// Logical operator tree: an arena-based DAG.
//
// Nodes never hold parent pointers — `LogicalPlan` owns a flat
// `Vec<LogicalNode>` indexed by `NodeId`, and a node stores only its
// `inputs: Vec<NodeId>`. A logical planning representation kept
// separate from its physical lowering, using an explicit arena instead
// of a boxed recursive enum so structural equality and `copy()` stay
// arena-local.

use crate::function::DistanceKind;
use crate::value::{ColumnDef, Name, Value};

use super::physical::{PhysicalNodeKind, PhysicalPlan};

pub type NodeId = usize;

/// Sort direction for a `sortOn` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: ColumnDef,
    pub direction: SortDirection,
}

/// A kNN predicate. Digest is a structural hash over `(column, k,
/// distance, weight, hint)` — deliberately never folding in a
/// `HashMap`/pointer-derived hash, which would be non-stable across
/// processes and circular if it ever included the node's own hash.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnPredicate {
    pub column: ColumnDef,
    pub k: i64,
    pub distance: DistanceKind,
    pub weight_bits: u64,
    pub hint: Option<Name>,
    pub query_fingerprint: u64,
}

impl KnnPredicate {
    pub fn digest(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.column.name.hash(&mut hasher);
        self.k.hash(&mut hasher);
        (self.distance as u8).hash(&mut hasher);
        self.weight_bits.hash(&mut hasher);
        self.hint.hash(&mut hasher);
        self.query_fingerprint.hash(&mut hasher);
        hasher.finish()
    }
}

/// A boolean predicate over one column. Specified only down to the
/// shape the planner needs (column, comparison, literal bits) — the
/// actual expression language is out of scope. `literal` is `None` for
/// an unconditional pass-through predicate (e.g. a partitioned scan with
/// no filter of its own).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub column: ColumnDef,
    pub operator: ComparisonOperator,
    pub literal: Option<Value>,
}

impl FilterPredicate {
    pub fn with_literal(column: ColumnDef, operator: ComparisonOperator, literal: Value) -> Self {
        Self {
            column,
            operator,
            literal: Some(literal),
        }
    }

    /// An always-true predicate over `column` — used where a scan needs
    /// a `FilterPredicate` shape but no actual condition (e.g. a bare
    /// partitioned `IndexScan`).
    pub fn any(column: ColumnDef) -> Self {
        Self {
            column,
            operator: ComparisonOperator::Eq,
            literal: None,
        }
    }

    pub fn literal(&self) -> Option<&Value> {
        self.literal.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone)]
pub enum LogicalNodeKind {
    EntityScan {
        entity: Name,
        columns: Vec<ColumnDef>,
    },
    IndexScan {
        index: Name,
        columns: Vec<ColumnDef>,
        predicate: FilterPredicate,
        /// `(partition, partitions)` for a `filterRange` partitioned
        /// scan; `(0, 1)` is an unpartitioned scan.
        partition: usize,
        partitions: usize,
    },
    Filter {
        predicate: FilterPredicate,
    },
    Function {
        name: Name,
        arguments: Vec<ColumnDef>,
        out_column: ColumnDef,
    },
    Projection {
        columns: Vec<ColumnDef>,
    },
    Sort {
        sort_on: Vec<SortKey>,
    },
    Limit {
        skip: usize,
        limit: usize,
    },
    Knn {
        predicate: KnnPredicate,
    },
    Delete {
        entity: Name,
        /// Already-resolved row predicate (resolving a WHERE clause into
        /// this shape is the out-of-scope query-text layer's job; the
        /// node just executes it). `None` deletes every row.
        predicate: Option<FilterPredicate>,
    },
    /// Sugar for a direct `EntityCount` lowering — equivalent to, but
    /// skipping the rewrite that `CountPushdownRule` would otherwise
    /// apply to `Projection(COUNT, EntityScan(entity))`.
    Count {
        entity: Name,
    },
    Sample {
        probability: f64,
        seed: u64,
    },
}

/// One node in the arena: its variant, the columns it produces and
/// reads, its group (strand) identity, and whether it (and everything
/// feeding it) is ready to execute.
#[derive(Debug, Clone)]
pub struct LogicalNode {
    pub id: NodeId,
    pub inputs: Vec<NodeId>,
    pub kind: LogicalNodeKind,
    pub columns: Vec<ColumnDef>,
    pub requires: Vec<ColumnDef>,
    pub group_id: usize,
    pub executable: bool,
}

impl LogicalNode {
    /// A node with no inputs and an empty arena context — used by
    /// `copy()` to produce a detached node before it's re-inserted.
    fn detached(kind: LogicalNodeKind, columns: Vec<ColumnDef>, requires: Vec<ColumnDef>) -> Self {
        Self {
            id: 0,
            inputs: Vec::new(),
            kind,
            columns,
            requires,
            group_id: 0,
            executable: true,
        }
    }
}

pub struct LogicalPlan {
    nodes: Vec<LogicalNode>,
}

impl LogicalPlan {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn node(&self, id: NodeId) -> &LogicalNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut LogicalNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts a nullary (source) node and computes its column
    /// propagation.
    pub fn push_source(&mut self, kind: LogicalNodeKind, group_id: usize) -> NodeId {
        let (columns, requires) = Self::propagate(&kind, &[]);
        let id = self.nodes.len();
        self.nodes.push(LogicalNode {
            id,
            inputs: Vec::new(),
            kind,
            columns,
            requires,
            group_id,
            executable: true,
        });
        id
    }

    /// Inserts a unary/n-ary node with explicit inputs, propagating
    /// `columns`/`requires`/`executable` from its input set.
    pub fn push(&mut self, kind: LogicalNodeKind, inputs: Vec<NodeId>) -> NodeId {
        let input_columns: Vec<ColumnDef> = inputs
            .iter()
            .flat_map(|&i| self.nodes[i].columns.clone())
            .collect();
        let (columns, requires) = Self::propagate(&kind, &input_columns);
        let executable = inputs.iter().all(|&i| self.nodes[i].executable);
        let group_id = inputs.first().map(|&i| self.nodes[i].group_id).unwrap_or(0);

        let id = self.nodes.len();
        self.nodes.push(LogicalNode {
            id,
            inputs,
            kind,
            columns,
            requires,
            group_id,
            executable,
        });
        id
    }

    /// `columns = (input.columns ∪ produced) − consumed`;
    /// `requires` = columns this node reads from its input(s).
    fn propagate(kind: &LogicalNodeKind, input_columns: &[ColumnDef]) -> (Vec<ColumnDef>, Vec<ColumnDef>) {
        match kind {
            LogicalNodeKind::EntityScan { columns, .. } | LogicalNodeKind::IndexScan { columns, .. } => {
                (columns.clone(), Vec::new())
            }
            LogicalNodeKind::Filter { predicate } => {
                (input_columns.to_vec(), vec![predicate.column.clone()])
            }
            LogicalNodeKind::Function {
                arguments,
                out_column,
                ..
            } => {
                let mut columns = input_columns.to_vec();
                if !columns.contains(out_column) {
                    columns.push(out_column.clone());
                }
                (columns, arguments.clone())
            }
            LogicalNodeKind::Projection { columns } => (columns.clone(), columns.clone()),
            LogicalNodeKind::Sort { sort_on } => {
                (input_columns.to_vec(), sort_on.iter().map(|k| k.column.clone()).collect())
            }
            LogicalNodeKind::Limit { .. } => (input_columns.to_vec(), Vec::new()),
            LogicalNodeKind::Knn { predicate } => {
                let mut columns = input_columns.to_vec();
                let distance_col = predicate.column.clone();
                if !columns.contains(&distance_col) {
                    columns.push(distance_col);
                }
                (columns, vec![predicate.column.clone()])
            }
            LogicalNodeKind::Delete { .. } => {
                // Fixed (deleted_count, timestamp) output pair.
                use crate::value::{Type, TypeKind};
                let deleted_count =
                    ColumnDef::new(Name::parse("deleted_count"), Type::scalar(TypeKind::Long), false, false);
                let timestamp =
                    ColumnDef::new(Name::parse("timestamp"), Type::scalar(TypeKind::Long), false, false);
                (vec![deleted_count, timestamp], Vec::new())
            }
            LogicalNodeKind::Count { .. } => {
                use crate::value::{Type, TypeKind};
                let count = ColumnDef::new(Name::parse("count"), Type::scalar(TypeKind::Long), false, false);
                (vec![count], Vec::new())
            }
            LogicalNodeKind::Sample { .. } => (input_columns.to_vec(), Vec::new()),
        }
    }

    /// Detached copy of one node: same kind/columns/requires, no
    /// inputs, no arena-assigned id.
    pub fn copy_node(&self, id: NodeId) -> LogicalNode {
        let node = &self.nodes[id];
        LogicalNode::detached(node.kind.clone(), node.columns.clone(), node.requires.clone())
    }

    /// Lowers one logical node to its canonical physical counterpart,
    /// appending it (and recursively its inputs, if not already lowered)
    /// into `physical`. Returns the physical node's id.
    pub fn implement(&self, id: NodeId, physical: &mut PhysicalPlan) -> NodeId {
        let node = &self.nodes[id];
        let physical_inputs: Vec<NodeId> = node
            .inputs
            .iter()
            .map(|&input| self.implement(input, physical))
            .collect();

        let kind = match &node.kind {
            LogicalNodeKind::EntityScan { entity, columns } => PhysicalNodeKind::EntityScan {
                entity: entity.clone(),
                columns: columns.clone(),
            },
            LogicalNodeKind::IndexScan {
                index,
                columns,
                predicate,
                partition,
                partitions,
            } => PhysicalNodeKind::IndexScan {
                index: index.clone(),
                columns: columns.clone(),
                predicate: predicate.clone(),
                partition: *partition,
                partitions: *partitions,
            },
            LogicalNodeKind::Filter { predicate } => PhysicalNodeKind::Filter {
                predicate: predicate.clone(),
            },
            LogicalNodeKind::Function {
                name,
                arguments,
                out_column,
            } => PhysicalNodeKind::Function {
                name: name.clone(),
                arguments: arguments.clone(),
                out_column: out_column.clone(),
                vectorized: false,
            },
            LogicalNodeKind::Projection { columns } => PhysicalNodeKind::Projection {
                columns: columns.clone(),
            },
            LogicalNodeKind::Sort { sort_on } => PhysicalNodeKind::Sort {
                sort_on: sort_on.clone(),
            },
            LogicalNodeKind::Limit { skip, limit } => PhysicalNodeKind::Limit {
                skip: *skip,
                limit: *limit,
            },
            LogicalNodeKind::Knn { predicate } => PhysicalNodeKind::Knn {
                predicate: predicate.clone(),
            },
            LogicalNodeKind::Delete { entity, predicate } => PhysicalNodeKind::Delete {
                entity: entity.clone(),
                predicate: predicate.clone(),
            },
            LogicalNodeKind::Count { entity } => PhysicalNodeKind::EntityCount {
                entity: entity.clone(),
            },
            LogicalNodeKind::Sample { probability, seed } => PhysicalNodeKind::Sample {
                probability: *probability,
                seed: *seed,
            },
        };

        physical.push(kind, physical_inputs, node.columns.clone())
    }
}

impl Default for LogicalPlan {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Type, TypeKind};

    fn col(name: &str) -> ColumnDef {
        ColumnDef::new(Name::parse(name), Type::scalar(TypeKind::Int), false, false)
    }

    #[test]
    fn entity_scan_produces_its_declared_columns() {
        let mut plan = LogicalPlan::new();
        let id = plan.push_source(
            LogicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![col("s.e.a")],
            },
            0,
        );
        assert_eq!(plan.node(id).columns, vec![col("s.e.a")]);
        assert!(plan.node(id).requires.is_empty());
    }

    #[test]
    fn function_node_adds_its_output_column() {
        let mut plan = LogicalPlan::new();
        let scan = plan.push_source(
            LogicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![col("s.e.a")],
            },
            0,
        );
        let func = plan.push(
            LogicalNodeKind::Function {
                name: Name::parse("f"),
                arguments: vec![col("s.e.a")],
                out_column: col("s.e.b"),
            },
            vec![scan],
        );
        assert!(plan.node(func).columns.contains(&col("s.e.b")));
        assert!(plan.node(func).columns.contains(&col("s.e.a")));
    }

    #[test]
    fn delete_node_has_a_fixed_output_pair() {
        let mut plan = LogicalPlan::new();
        let id = plan.push_source(
            LogicalNodeKind::Delete {
                entity: Name::parse("s.e"),
                predicate: None,
            },
            0,
        );
        assert_eq!(plan.node(id).columns.len(), 2);
        assert!(plan.node(id).requires.is_empty());
    }

    #[test]
    fn executable_propagates_false_from_inputs() {
        let mut plan = LogicalPlan::new();
        let scan = plan.push_source(
            LogicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![col("s.e.a")],
            },
            0,
        );
        plan.node_mut(scan).executable = false;
        let projection = plan.push(
            LogicalNodeKind::Projection {
                columns: vec![col("s.e.a")],
            },
            vec![scan],
        );
        assert!(!plan.node(projection).executable);
    }

    #[test]
    fn knn_digest_is_stable_across_calls() {
        let predicate = KnnPredicate {
            column: col("s.e.v"),
            k: 10,
            distance: crate::function::DistanceKind::L2,
            weight_bits: 0,
            hint: None,
            query_fingerprint: 42,
        };
        assert_eq!(predicate.digest(), predicate.digest());
    }

    #[test]
    fn copy_node_is_detached_from_the_arena() {
        let mut plan = LogicalPlan::new();
        let id = plan.push_source(
            LogicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![col("s.e.a")],
            },
            0,
        );
        let copied = plan.copy_node(id);
        assert!(copied.inputs.is_empty());
        assert_eq!(copied.columns, plan.node(id).columns);
    }
}
