// The planner's rule catalogue.
//
// Each rule is deliberately narrow — one structural shape in, one
// rewritten shape out — rather than a single `optimize` method that
// inlines every step together. Several rules need
// to reorder two stacked nodes without a parent pointer to update; the
// pattern (seen in `FilterPushdownRule`/`LimitPushdownRule`) is to reuse
// both nodes' existing arena ids as swap space: the outer id keeps
// whatever the grandparent referenced, the inner id becomes the new
// top, and `apply` returns whichever id ends up on top.

use crate::error::Result;
use crate::execution::logical::FilterPredicate;
use crate::execution::physical::{NodeId, PhysicalNodeKind, PhysicalPlan};
use crate::value::Type;

use super::{RewriteContext, RewriteRule};

/// `Projection([]) over EntityScan` needs no column data at all — only a
/// row count — so it's replaced outright by `EntityCount`. Cost strictly
/// decreases: `EntityCount`'s cost is a single disk read plus a memory
/// access versus scanning every row.
pub struct CountPushdownRule;

impl RewriteRule for CountPushdownRule {
    fn name(&self) -> &'static str {
        "count_pushdown"
    }

    fn can_be_applied(&self, plan: &PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> bool {
        let node = plan.node(node);
        let PhysicalNodeKind::Projection { columns } = &node.kind else {
            return false;
        };
        if !columns.is_empty() || node.inputs.len() != 1 {
            return false;
        }
        matches!(plan.node(node.inputs[0]).kind, PhysicalNodeKind::EntityScan { .. })
    }

    fn apply(&self, plan: &mut PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> Result<NodeId> {
        let scan_id = plan.node(node).inputs[0];
        let PhysicalNodeKind::EntityScan { entity, .. } = &plan.node(scan_id).kind else {
            unreachable!("can_be_applied guarantees an EntityScan input");
        };
        let entity = entity.clone();
        let columns = plan.node(node).columns.clone();
        plan.replace(node, PhysicalNodeKind::EntityCount { entity }, vec![], columns);
        Ok(node)
    }
}

/// Flips a `Function` node's `vectorized` flag once its widest argument
/// reaches the configured SIMD threshold and the resolved function
/// actually has a vectorized dual. Leaves the node's id, inputs,
/// and columns untouched — only the execution strategy changes.
pub struct SimdRule;

impl RewriteRule for SimdRule {
    fn name(&self) -> &'static str {
        "simd"
    }

    fn can_be_applied(&self, plan: &PhysicalPlan, node: NodeId, ctx: &RewriteContext) -> bool {
        let PhysicalNodeKind::Function {
            name,
            arguments,
            vectorized,
            ..
        } = &plan.node(node).kind
        else {
            return false;
        };
        if *vectorized {
            return false;
        }
        let wide_enough = arguments
            .iter()
            .any(|a| a.col_type.is_vector() && a.col_type.logical_size() >= ctx.config.simd_dimensionality_threshold);
        if !wide_enough {
            return false;
        }
        let arg_types: Vec<Type> = arguments.iter().map(|c| c.col_type).collect();
        match ctx.functions.resolve(&name.to_string(), &arg_types) {
            Ok(function) => function.as_vectorizable().is_some(),
            Err(_) => false,
        }
    }

    fn apply(&self, plan: &mut PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> Result<NodeId> {
        let PhysicalNodeKind::Function {
            name,
            arguments,
            out_column,
            ..
        } = plan.node(node).kind.clone()
        else {
            unreachable!("can_be_applied guarantees a Function node");
        };
        let inputs = plan.node(node).inputs.clone();
        let columns = plan.node(node).columns.clone();
        plan.replace(
            node,
            PhysicalNodeKind::Function {
                name,
                arguments,
                out_column,
                vectorized: true,
            },
            inputs,
            columns,
        );
        Ok(node)
    }
}

/// Narrows an `EntityScan`/`IndexScan` to exactly the columns a
/// `Projection` directly above it asks for, eliminating the `Projection`
/// layer. Only fires when the scan currently reads a strict
/// superset, so the rewrite is cost-decreasing and can't re-match the
/// node it just produced (a scan is no longer a `Projection`).
pub struct ProjectionPushdownRule;

impl ProjectionPushdownRule {
    fn scan_columns(kind: &PhysicalNodeKind) -> Option<&[crate::value::ColumnDef]> {
        match kind {
            PhysicalNodeKind::EntityScan { columns, .. } => Some(columns),
            PhysicalNodeKind::IndexScan { columns, .. } => Some(columns),
            _ => None,
        }
    }
}

impl RewriteRule for ProjectionPushdownRule {
    fn name(&self) -> &'static str {
        "projection_pushdown"
    }

    fn can_be_applied(&self, plan: &PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> bool {
        let node_ref = plan.node(node);
        let PhysicalNodeKind::Projection { columns } = &node_ref.kind else {
            return false;
        };
        if columns.is_empty() || node_ref.inputs.len() != 1 {
            return false;
        }
        let Some(scan_columns) = Self::scan_columns(&plan.node(node_ref.inputs[0]).kind) else {
            return false;
        };
        columns.len() < scan_columns.len() && columns.iter().all(|c| scan_columns.contains(c))
    }

    fn apply(&self, plan: &mut PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> Result<NodeId> {
        let PhysicalNodeKind::Projection { columns } = plan.node(node).kind.clone() else {
            unreachable!("can_be_applied guarantees a Projection node");
        };
        let scan_id = plan.node(node).inputs[0];
        let narrowed = match plan.node(scan_id).kind.clone() {
            PhysicalNodeKind::EntityScan { entity, .. } => PhysicalNodeKind::EntityScan {
                entity,
                columns: columns.clone(),
            },
            PhysicalNodeKind::IndexScan {
                index,
                predicate,
                partition,
                partitions,
                ..
            } => PhysicalNodeKind::IndexScan {
                index,
                columns: columns.clone(),
                predicate,
                partition,
                partitions,
            },
            _ => unreachable!("can_be_applied guarantees a scan node"),
        };
        plan.replace(node, narrowed, vec![], columns);
        Ok(node)
    }
}

/// Swaps `Sort over Filter` into `Filter over Sort`: running the
/// filter first shrinks the row count the sort has to order. Always
/// valid — `Filter` never adds a column `Sort`'s keys could depend on.
pub struct FilterPushdownRule;

impl RewriteRule for FilterPushdownRule {
    fn name(&self) -> &'static str {
        "filter_pushdown"
    }

    fn can_be_applied(&self, plan: &PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> bool {
        let node_ref = plan.node(node);
        if !matches!(node_ref.kind, PhysicalNodeKind::Sort { .. }) || node_ref.inputs.len() != 1 {
            return false;
        }
        matches!(plan.node(node_ref.inputs[0]).kind, PhysicalNodeKind::Filter { .. })
    }

    fn apply(&self, plan: &mut PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> Result<NodeId> {
        let PhysicalNodeKind::Sort { sort_on } = plan.node(node).kind.clone() else {
            unreachable!("can_be_applied guarantees a Sort node");
        };
        let filter_id = plan.node(node).inputs[0];
        let PhysicalNodeKind::Filter { predicate } = plan.node(filter_id).kind.clone() else {
            unreachable!("can_be_applied guarantees a Filter input");
        };
        let x = plan.node(filter_id).inputs[0];
        let x_columns = plan.node(x).columns.clone();

        // `node` (the outer id the grandparent references) becomes the
        // filter, running directly over `x`.
        plan.replace(node, PhysicalNodeKind::Filter { predicate }, vec![x], x_columns.clone());
        // `filter_id` becomes the new top: a sort over the rewritten filter.
        plan.replace(filter_id, PhysicalNodeKind::Sort { sort_on }, vec![node], x_columns);
        Ok(filter_id)
    }
}

/// Swaps `Limit over Projection` into `Projection over Limit`:
/// bounding the row count before projecting means the projection does
/// less work. Always valid — `Projection` never changes row count or
/// order.
pub struct LimitPushdownRule;

impl RewriteRule for LimitPushdownRule {
    fn name(&self) -> &'static str {
        "limit_pushdown"
    }

    fn can_be_applied(&self, plan: &PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> bool {
        let node_ref = plan.node(node);
        if !matches!(node_ref.kind, PhysicalNodeKind::Limit { .. }) || node_ref.inputs.len() != 1 {
            return false;
        }
        matches!(plan.node(node_ref.inputs[0]).kind, PhysicalNodeKind::Projection { .. })
    }

    fn apply(&self, plan: &mut PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> Result<NodeId> {
        let PhysicalNodeKind::Limit { skip, limit } = plan.node(node).kind.clone() else {
            unreachable!("can_be_applied guarantees a Limit node");
        };
        let proj_id = plan.node(node).inputs[0];
        let PhysicalNodeKind::Projection { columns } = plan.node(proj_id).kind.clone() else {
            unreachable!("can_be_applied guarantees a Projection input");
        };
        let x = plan.node(proj_id).inputs[0];
        let x_columns = plan.node(x).columns.clone();

        plan.replace(node, PhysicalNodeKind::Limit { skip, limit }, vec![x], x_columns);
        plan.replace(proj_id, PhysicalNodeKind::Projection { columns: columns.clone() }, vec![node], columns);
        Ok(proj_id)
    }
}

/// Collapses `Limit{skip:0} over Sort over X` into one
/// `MergeLimitingSort` node. When `X` is an unpartitioned
/// `IndexScan` and the configured fanout is greater than one, fans it
/// out into that many `Sort over IndexScan{partition: i}` strands feeding
/// the merge instead of a single serial input.
pub struct SortMergeParallelizationRule;

impl RewriteRule for SortMergeParallelizationRule {
    fn name(&self) -> &'static str {
        "sort_merge_parallelization"
    }

    fn can_be_applied(&self, plan: &PhysicalPlan, node: NodeId, _ctx: &RewriteContext) -> bool {
        let node_ref = plan.node(node);
        let PhysicalNodeKind::Limit { skip, .. } = node_ref.kind else {
            return false;
        };
        if skip != 0 || node_ref.inputs.len() != 1 {
            return false;
        }
        let sort_ref = plan.node(node_ref.inputs[0]);
        matches!(sort_ref.kind, PhysicalNodeKind::Sort { .. }) && sort_ref.inputs.len() == 1
    }

    fn apply(&self, plan: &mut PhysicalPlan, node: NodeId, ctx: &RewriteContext) -> Result<NodeId> {
        let PhysicalNodeKind::Limit { limit, .. } = plan.node(node).kind.clone() else {
            unreachable!("can_be_applied guarantees a Limit node");
        };
        let sort_id = plan.node(node).inputs[0];
        let PhysicalNodeKind::Sort { sort_on } = plan.node(sort_id).kind.clone() else {
            unreachable!("can_be_applied guarantees a Sort input");
        };
        let x = plan.node(sort_id).inputs[0];
        let columns = plan.node(node).columns.clone();

        let fanout = ctx.config.default_merge_fanout;
        let inputs = match plan.node(x).kind.clone() {
            PhysicalNodeKind::IndexScan {
                index,
                columns: scan_columns,
                predicate,
                partitions,
                ..
            } if partitions == 1 && fanout > 1 => (0..fanout)
                .map(|p| {
                    let scan = plan.push(
                        PhysicalNodeKind::IndexScan {
                            index: index.clone(),
                            columns: scan_columns.clone(),
                            predicate: predicate.clone(),
                            partition: p,
                            partitions: fanout,
                        },
                        vec![],
                        scan_columns.clone(),
                    );
                    plan.push(PhysicalNodeKind::Sort { sort_on: sort_on.clone() }, vec![scan], scan_columns.clone())
                })
                .collect(),
            _ => vec![x],
        };

        plan.replace(node, PhysicalNodeKind::MergeLimitingSort { sort_on, limit }, inputs, columns);
        Ok(node)
    }
}

/// Replaces an `EntityScan` directly beneath a `Knn` node with an
/// `IndexScan` over a catalog-registered index matching the predicate's
/// column and distance kind, when one exists. The `Knn` node
/// itself is untouched — only the scan beneath it changes, since `Knn`
/// still does the actual distance scoring regardless of how its rows
/// were sourced.
pub struct KnnToIndexRule;

impl RewriteRule for KnnToIndexRule {
    fn name(&self) -> &'static str {
        "knn_to_index"
    }

    fn can_be_applied(&self, plan: &PhysicalPlan, node: NodeId, ctx: &RewriteContext) -> bool {
        let node_ref = plan.node(node);
        let PhysicalNodeKind::Knn { predicate } = &node_ref.kind else {
            return false;
        };
        if node_ref.inputs.len() != 1 {
            return false;
        }
        if !matches!(plan.node(node_ref.inputs[0]).kind, PhysicalNodeKind::EntityScan { .. }) {
            return false;
        }
        !ctx.catalog
            .candidate_indices(&predicate.column, Some(predicate.distance))
            .is_empty()
    }

    fn apply(&self, plan: &mut PhysicalPlan, node: NodeId, ctx: &RewriteContext) -> Result<NodeId> {
        let PhysicalNodeKind::Knn { predicate } = plan.node(node).kind.clone() else {
            unreachable!("can_be_applied guarantees a Knn node");
        };
        let scan_id = plan.node(node).inputs[0];
        let PhysicalNodeKind::EntityScan { columns, .. } = plan.node(scan_id).kind.clone() else {
            unreachable!("can_be_applied guarantees an EntityScan input");
        };
        let candidates = ctx.catalog.candidate_indices(&predicate.column, Some(predicate.distance));
        let chosen = candidates.first().expect("can_be_applied guarantees a non-empty candidate list");
        let index_predicate = FilterPredicate::any(predicate.column.clone());
        plan.replace(
            scan_id,
            PhysicalNodeKind::IndexScan {
                index: chosen.name.clone(),
                columns: columns.clone(),
                predicate: index_predicate,
                partition: 0,
                partitions: 1,
            },
            vec![],
            columns,
        );
        Ok(node)
    }
}
