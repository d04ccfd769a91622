// Physical operator tree: a parallel arena to the logical one, adding
// cost, output-size, and trait bookkeeping.
//
// Trait-correctness rules (adding/removing sort invalidates `OrderTrait`
// unless preserved algorithmically; `LimitTrait` bounds `outputSize`
// above; `NotPartitionableTrait` disables NAry parallelism rewrites) are
// enforced at construction time in `PhysicalPlan::push`, not discovered
// after the fact by a separate validation pass.

use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::execution::cost::{Cost, DISK_ACCESS_READ, MEMORY_ACCESS, SIZE_OF_CHAR};
use crate::execution::logical::{FilterPredicate, KnnPredicate, SortKey};
use crate::value::{ColumnDef, Name, TypeKind, ValueStatistics};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TraitType {
    Order,
    Limit,
    NotPartitionable,
    Materialized,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trait {
    Order(Vec<SortKey>),
    Limit(usize),
    NotPartitionable,
    Materialized,
}

impl Trait {
    pub fn trait_type(&self) -> TraitType {
        match self {
            Trait::Order(_) => TraitType::Order,
            Trait::Limit(_) => TraitType::Limit,
            Trait::NotPartitionable => TraitType::NotPartitionable,
            Trait::Materialized => TraitType::Materialized,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PhysicalNodeKind {
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
        vectorized: bool,
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
        predicate: Option<FilterPredicate>,
    },
    /// `EntityCountPhysicalOperatorNode`: nullary, `outputSize =
    /// 1`, cost ~= `DISK_READ + MEM_ACCESS`, carries
    /// `NotPartitionableTrait`.
    EntityCount {
        entity: Name,
    },
    Sample {
        probability: f64,
        seed: u64,
    },
    /// `MergeLimitingSortPhysicalOperatorNode`: NAry, merges
    /// strands with an online bounded heap of size `limit`.
    MergeLimitingSort {
        sort_on: Vec<SortKey>,
        limit: usize,
    },
}

#[derive(Debug, Clone)]
pub struct PhysicalNode {
    pub id: NodeId,
    pub inputs: Vec<NodeId>,
    pub kind: PhysicalNodeKind,
    pub columns: Vec<ColumnDef>,
    pub output_size: u64,
    pub cost: Cost,
    pub parallelizable_cost: Cost,
    pub traits: HashMap<TraitType, Trait>,
    /// Per-column statistics available at the time this node was built,
    /// keyed by the column's fully-qualified name. Populated from
    /// whatever a caller has seeded via `seed_statistics`/
    /// `seed_statistics_from_catalog` before the node was pushed.
    pub statistics: HashMap<Name, ValueStatistics>,
}

pub struct PhysicalPlan {
    nodes: Vec<PhysicalNode>,
    /// Row-count estimate for each scanned entity, keyed by name. Used
    /// only to size `EntityScan`/`EntityCount`; in the absence of real
    /// catalog statistics a caller seeds this via `set_cardinality`.
    cardinalities: HashMap<String, u64>,
    /// Per-column `ValueStatistics`, keyed by fully-qualified name.
    /// Seeded from the catalog before nodes referencing those columns
    /// are built, so `build` can attach them and `row_width` can read
    /// them back for string columns.
    statistics: HashMap<String, ValueStatistics>,
}

impl PhysicalPlan {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            cardinalities: HashMap::new(),
            statistics: HashMap::new(),
        }
    }

    pub fn set_cardinality(&mut self, entity: &Name, rows: u64) {
        self.cardinalities.insert(entity.to_string(), rows);
    }

    fn cardinality(&self, entity: &Name) -> u64 {
        self.cardinalities.get(&entity.to_string()).copied().unwrap_or(1000)
    }

    pub fn seed_statistics(&mut self, column: &Name, stats: ValueStatistics) {
        self.statistics.insert(column.to_string(), stats);
    }

    /// Pulls `catalog.statistics(&column.name)` for every column in
    /// `columns`, seeding whichever are registered. Call this before
    /// lowering a plan whose nodes reference those columns, since
    /// `build` reads from `self.statistics` at construction time.
    pub fn seed_statistics_from_catalog(&mut self, catalog: &Catalog, columns: &[ColumnDef]) {
        for column in columns {
            if let Some(stats) = catalog.statistics(&column.name) {
                self.seed_statistics(&column.name, stats);
            }
        }
    }

    fn column_statistics(&self, column: &Name) -> Option<&ValueStatistics> {
        self.statistics.get(&column.to_string())
    }

    pub fn node(&self, id: NodeId) -> &PhysicalNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut PhysicalNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> Vec<NodeId> {
        let referenced: std::collections::HashSet<NodeId> =
            self.nodes.iter().flat_map(|n| n.inputs.iter().copied()).collect();
        (0..self.nodes.len()).filter(|id| !referenced.contains(id)).collect()
    }

    /// Replaces the node at `id` with a freshly-built one (same id,
    /// different kind/inputs) — used by rewrite rules to re-root a
    /// subtree without disturbing the rest of the arena's indices.
    pub fn replace(&mut self, id: NodeId, kind: PhysicalNodeKind, inputs: Vec<NodeId>, columns: Vec<ColumnDef>) {
        let rebuilt = self.build(id, kind, inputs, columns);
        self.nodes[id] = rebuilt;
    }

    /// Re-derives node `id`'s cost/output-size from a new `inputs` list,
    /// keeping its kind and columns — used by the rewrite engine after a
    /// child subtree changes shape underneath an otherwise untouched
    /// parent.
    pub fn rebuild_with_inputs(&mut self, id: NodeId, inputs: Vec<NodeId>) {
        let kind = self.nodes[id].kind.clone();
        let columns = self.nodes[id].columns.clone();
        self.replace(id, kind, inputs, columns);
    }

    pub fn push(&mut self, kind: PhysicalNodeKind, inputs: Vec<NodeId>, columns: Vec<ColumnDef>) -> NodeId {
        let id = self.nodes.len();
        let node = self.build(id, kind, inputs, columns);
        self.nodes.push(node);
        id
    }

    fn input_output_size(&self, inputs: &[NodeId]) -> u64 {
        inputs.iter().map(|&i| self.nodes[i].output_size).sum()
    }

    /// Estimated row width in bytes. String columns have no fixed
    /// `physical_size` worth using — their contribution comes from the
    /// column's `average_width` (a character count) scaled by
    /// `SIZE_OF_CHAR`, falling back to `physical_size` when no
    /// statistics have been seeded for that column.
    fn row_width(&self, columns: &[ColumnDef]) -> f64 {
        columns
            .iter()
            .map(|c| {
                if c.col_type.kind() == TypeKind::String {
                    self.column_statistics(&c.name)
                        .map(|stats| stats.average_width() * SIZE_OF_CHAR)
                        .unwrap_or(c.col_type.physical_size() as f64)
                } else {
                    c.col_type.physical_size() as f64
                }
            })
            .sum()
    }

    fn build(&self, id: NodeId, kind: PhysicalNodeKind, inputs: Vec<NodeId>, columns: Vec<ColumnDef>) -> PhysicalNode {
        let mut traits = HashMap::new();
        let (output_size, cost, parallelizable_cost) = match &kind {
            PhysicalNodeKind::EntityScan { entity, .. } => {
                let rows = self.cardinality(entity);
                (rows, Cost::io(rows as f64 / 100.0) + Cost::cpu(rows as f64 * 0.01), Cost::ZERO)
            }
            PhysicalNodeKind::IndexScan { index, partitions, .. } => {
                let rows = (self.cardinality(index) / 10) / (*partitions).max(1) as u64;
                (rows.max(1), Cost::io(rows as f64 / 100.0) + Cost::cpu(rows as f64 * 0.01), Cost::ZERO)
            }
            PhysicalNodeKind::Filter { .. } => {
                let rows = self.input_output_size(&inputs);
                let estimated = (rows as f64 * 0.5).ceil() as u64;
                (estimated, Cost::cpu(rows as f64 * 0.02), Cost::ZERO)
            }
            PhysicalNodeKind::Function { .. } => {
                let rows = self.input_output_size(&inputs);
                (rows, Cost::cpu(rows as f64 * crate::execution::cost::FUNCTION_CALL), Cost::ZERO)
            }
            PhysicalNodeKind::Projection { .. } => {
                let rows = self.input_output_size(&inputs);
                (rows, Cost::cpu(rows as f64 * MEMORY_ACCESS), Cost::ZERO)
            }
            PhysicalNodeKind::Sort { sort_on } => {
                let rows = self.input_output_size(&inputs);
                traits.insert(TraitType::Order, Trait::Order(sort_on.clone()));
                traits.insert(TraitType::Materialized, Trait::Materialized);
                let n = rows.max(1) as f64;
                (rows, Cost::cpu(n * n.log2() * MEMORY_ACCESS), Cost::ZERO)
            }
            PhysicalNodeKind::Limit { skip, limit } => {
                let rows = self.input_output_size(&inputs);
                let bounded = (*limit as u64).min(rows.saturating_sub(*skip as u64));
                traits.insert(TraitType::Limit, Trait::Limit(*limit));
                (bounded, Cost::cpu(rows as f64 * MEMORY_ACCESS), Cost::ZERO)
            }
            PhysicalNodeKind::Knn { predicate } => {
                let rows = self.input_output_size(&inputs).max(1);
                let k = predicate.k.max(0) as u64;
                traits.insert(TraitType::Limit, Trait::Limit(predicate.k.max(0) as usize));
                (k.min(rows), Cost::cpu(rows as f64 * predicate.k as f64 * MEMORY_ACCESS), Cost::ZERO)
            }
            PhysicalNodeKind::Delete { entity, .. } => {
                let rows = self.cardinality(entity);
                (1, Cost::io(rows as f64 / 100.0) + Cost::cpu(rows as f64 * 0.01), Cost::ZERO)
            }
            PhysicalNodeKind::EntityCount { .. } => {
                traits.insert(TraitType::NotPartitionable, Trait::NotPartitionable);
                (1, Cost::io(DISK_ACCESS_READ) + Cost::memory(MEMORY_ACCESS), Cost::ZERO)
            }
            PhysicalNodeKind::Sample { probability, .. } => {
                let rows = self.input_output_size(&inputs);
                let estimated = (rows as f64 * probability.clamp(0.0, 1.0)).ceil() as u64;
                (estimated, Cost::cpu(rows as f64 * MEMORY_ACCESS), Cost::ZERO)
            }
            PhysicalNodeKind::MergeLimitingSort { sort_on, limit } => {
                let total_input: u64 = self.input_output_size(&inputs);
                let output_size = total_input.min(*limit as u64);
                traits.insert(TraitType::Order, Trait::Order(sort_on.clone()));
                traits.insert(TraitType::Limit, Trait::Limit(*limit));

                let cpu = 2.0 * total_input as f64 * sort_on.len() as f64 * MEMORY_ACCESS;
                let width = self.row_width(&columns);
                let memory = output_size as f64 * width;
                let cost = Cost::new(cpu, 0.0, memory);

                // Each input strand's full subtree cost is counted once
                // (strands run concurrently with each other); `total_cost`
                // picks up the slowest strand instead of summing every
                // strand serially. Uses each strand's recursive total
                // cost, not just its own atomic cost, so a strand's scan
                // beneath its sort is not silently dropped.
                let per_strand: Cost = inputs
                    .iter()
                    .map(|&i| total_cost(self, i))
                    .fold(Cost::ZERO, |acc, c| if c.cpu > acc.cpu { c } else { acc });

                (output_size, cost, per_strand)
            }
        };

        let statistics: HashMap<Name, ValueStatistics> = columns
            .iter()
            .filter_map(|c| self.column_statistics(&c.name).map(|s| (c.name.clone(), s.clone())))
            .collect();

        PhysicalNode {
            id,
            inputs,
            kind,
            columns,
            output_size,
            cost,
            parallelizable_cost,
            traits,
            statistics,
        }
    }
}

impl Default for PhysicalPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// Bottom-up aggregation, computed fresh over the current arena shape
/// rather than cached per node — avoids the stale-cache bug class a
/// stored `total_cost` field would invite after a rewrite rule replaces
/// a subtree.
pub fn total_cost(plan: &PhysicalPlan, id: NodeId) -> Cost {
    let node = plan.node(id);
    let is_parallel_merge = matches!(node.kind, PhysicalNodeKind::MergeLimitingSort { .. })
        && !node.traits.contains_key(&TraitType::NotPartitionable);

    if is_parallel_merge {
        node.cost + node.parallelizable_cost
    } else {
        let children: Cost = node.inputs.iter().map(|&i| total_cost(plan, i)).sum();
        node.cost + children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::logical::SortDirection;
    use crate::value::{Type, TypeKind};

    fn col(name: &str) -> ColumnDef {
        ColumnDef::new(Name::parse(name), Type::scalar(TypeKind::Int), false, false)
    }

    #[test]
    fn entity_count_has_unit_output_and_not_partitionable_trait() {
        let mut plan = PhysicalPlan::new();
        let id = plan.push(
            PhysicalNodeKind::EntityCount {
                entity: Name::parse("s.e"),
            },
            vec![],
            vec![col("count")],
        );
        let node = plan.node(id);
        assert_eq!(node.output_size, 1);
        assert!(node.traits.contains_key(&TraitType::NotPartitionable));
    }

    #[test]
    fn merge_limiting_sort_output_size_is_bounded_by_limit() {
        let mut plan = PhysicalPlan::new();
        let mut strand_ids = Vec::new();
        for _ in 0..4 {
            let scan = plan.push(
                PhysicalNodeKind::EntityScan {
                    entity: Name::parse("s.e"),
                    columns: vec![col("s.e.v")],
                },
                vec![],
                vec![col("s.e.v")],
            );
            strand_ids.push(scan);
        }
        plan.set_cardinality(&Name::parse("s.e"), 500);
        for id in &strand_ids {
            // rebuild with the seeded cardinality
            let rebuilt_inputs = plan.node(*id).inputs.clone();
            let columns = plan.node(*id).columns.clone();
            plan.replace(
                *id,
                PhysicalNodeKind::EntityScan {
                    entity: Name::parse("s.e"),
                    columns: columns.clone(),
                },
                rebuilt_inputs,
                columns,
            );
        }
        let merge = plan.push(
            PhysicalNodeKind::MergeLimitingSort {
                sort_on: vec![SortKey {
                    column: col("s.e.v"),
                    direction: SortDirection::Asc,
                }],
                limit: 10,
            },
            strand_ids,
            vec![col("s.e.v")],
        );
        assert_eq!(plan.node(merge).output_size, 10);
    }

    #[test]
    fn limit_trait_bounds_output_size_above() {
        let mut plan = PhysicalPlan::new();
        let scan = plan.push(
            PhysicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![col("s.e.a")],
            },
            vec![],
            vec![col("s.e.a")],
        );
        plan.set_cardinality(&Name::parse("s.e"), 1000);
        let limited = plan.push(
            PhysicalNodeKind::Limit { skip: 0, limit: 5 },
            vec![scan],
            vec![col("s.e.a")],
        );
        assert!(plan.node(limited).output_size <= 5);
    }

    #[test]
    fn total_cost_sums_bottom_up_for_non_parallel_nodes() {
        let mut plan = PhysicalPlan::new();
        let scan = plan.push(
            PhysicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![col("s.e.a")],
            },
            vec![],
            vec![col("s.e.a")],
        );
        let projection = plan.push(
            PhysicalNodeKind::Projection {
                columns: vec![col("s.e.a")],
            },
            vec![scan],
            vec![col("s.e.a")],
        );
        let total = total_cost(&plan, projection);
        let expected = plan.node(scan).cost + plan.node(projection).cost;
        assert_eq!(total, expected);
    }

    #[test]
    fn total_cost_under_a_merge_counts_each_strand_s_full_subtree() {
        let mut plan = PhysicalPlan::new();
        plan.set_cardinality(&Name::parse("s.e"), 10_000);
        let mut strand_tops = Vec::new();
        for _ in 0..2 {
            let scan = plan.push(
                PhysicalNodeKind::EntityScan {
                    entity: Name::parse("s.e"),
                    columns: vec![col("s.e.v")],
                },
                vec![],
                vec![col("s.e.v")],
            );
            let sort = plan.push(
                PhysicalNodeKind::Sort {
                    sort_on: vec![SortKey {
                        column: col("s.e.v"),
                        direction: SortDirection::Asc,
                    }],
                },
                vec![scan],
                vec![col("s.e.v")],
            );
            strand_tops.push((scan, sort));
        }
        let inputs: Vec<NodeId> = strand_tops.iter().map(|&(_, sort)| sort).collect();
        let merge = plan.push(
            PhysicalNodeKind::MergeLimitingSort {
                sort_on: vec![SortKey {
                    column: col("s.e.v"),
                    direction: SortDirection::Asc,
                }],
                limit: 10,
            },
            inputs,
            vec![col("s.e.v")],
        );

        let slowest_strand = strand_tops
            .iter()
            .map(|&(scan, sort)| plan.node(scan).cost + plan.node(sort).cost)
            .fold(Cost::ZERO, |acc, c| if c.cpu > acc.cpu { c } else { acc });

        let total = total_cost(&plan, merge);
        assert_eq!(total, plan.node(merge).cost + slowest_strand);
        // Every strand's scan cost must be reflected, not just its sort.
        assert!(total.cpu > plan.node(merge).cost.cpu + plan.node(strand_tops[0].1).cost.cpu);
    }

    fn string_col(name: &str) -> ColumnDef {
        ColumnDef::new(Name::parse(name), Type::scalar(TypeKind::String), false, false)
    }

    #[test]
    fn row_width_falls_back_to_physical_size_without_seeded_statistics() {
        let mut plan = PhysicalPlan::new();
        let scan = plan.push(
            PhysicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![string_col("s.e.name")],
            },
            vec![],
            vec![string_col("s.e.name")],
        );
        let merge = plan.push(
            PhysicalNodeKind::MergeLimitingSort {
                sort_on: vec![SortKey {
                    column: string_col("s.e.name"),
                    direction: SortDirection::Asc,
                }],
                limit: 10,
            },
            vec![scan],
            vec![string_col("s.e.name")],
        );
        assert_eq!(plan.node(merge).cost.memory, 10.0 * Type::scalar(TypeKind::String).physical_size() as f64);
    }

    #[test]
    fn row_width_uses_average_width_for_seeded_string_statistics() {
        use crate::catalog::Catalog;

        let catalog = Catalog::new();
        let mut stats = ValueStatistics::new();
        stats.insert(Some(&crate::value::Value::StringValue("abcdefgh".to_string())));
        catalog.set_statistics(&Name::parse("s.e.name"), stats);

        let mut plan = PhysicalPlan::new();
        plan.seed_statistics_from_catalog(&catalog, &[string_col("s.e.name")]);
        let scan = plan.push(
            PhysicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![string_col("s.e.name")],
            },
            vec![],
            vec![string_col("s.e.name")],
        );
        let merge = plan.push(
            PhysicalNodeKind::MergeLimitingSort {
                sort_on: vec![SortKey {
                    column: string_col("s.e.name"),
                    direction: SortDirection::Asc,
                }],
                limit: 10,
            },
            vec![scan],
            vec![string_col("s.e.name")],
        );
        let expected_width = 8.0 * crate::execution::cost::SIZE_OF_CHAR;
        assert_eq!(plan.node(merge).cost.memory, 10.0 * expected_width);
    }

    #[test]
    fn build_attaches_seeded_statistics_to_the_node() {
        use crate::catalog::Catalog;

        let catalog = Catalog::new();
        let mut stats = ValueStatistics::new();
        stats.insert(Some(&crate::value::Value::Int(1)));
        catalog.set_statistics(&Name::parse("s.e.a"), stats);

        let mut plan = PhysicalPlan::new();
        plan.seed_statistics_from_catalog(&catalog, &[col("s.e.a")]);
        let scan = plan.push(
            PhysicalNodeKind::EntityScan {
                entity: Name::parse("s.e"),
                columns: vec![col("s.e.a")],
            },
            vec![],
            vec![col("s.e.a")],
        );
        assert!(plan.node(scan).statistics.contains_key(&Name::parse("s.e.a")));
    }
}
