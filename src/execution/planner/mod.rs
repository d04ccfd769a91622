// Rewrite-rule planner.
//
// A priority-ordered catalogue of small `RewriteRule`s applied by a
// depth-first `RewriteEngine` until no rule matches anywhere in the
// tree, bounded by an iteration budget so a buggy or non-confluent rule
// set fails the query with a `Planner` error instead of looping forever.

pub mod rules;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{DbError, Result};
use crate::function::FunctionRegistry;

use super::cost::CostWeights;
use super::logical::{LogicalPlan, NodeId as LogicalNodeId};
use super::physical::{NodeId as PhysicalNodeId, PhysicalPlan};
use super::runtime::{self, ExecutionContext, Operator};

/// Query-constant configuration the planner and runtime read: never
/// hardcoded, always threaded through explicitly so a caller can tune
/// it per workload — including the SIMD dimensionality threshold, which
/// is hardware-dependent and has no single universally correct value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum vector dimensionality `SimdRule` requires before
    /// substituting a function's vectorized dual.
    pub simd_dimensionality_threshold: usize,
    pub cost_weights: CostWeights,
    /// Upper bound on total rule applications across one `optimize` call
    /// (shared across the whole tree, not per node) — exhausting it is
    /// a `DbError::Planner`, never a silent partial optimization.
    pub max_rewrite_iterations: usize,
    /// Strand count `SortMergeParallelizationRule` fans an eligible
    /// unpartitioned `IndexScan` out into.
    pub default_merge_fanout: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simd_dimensionality_threshold: 256,
            cost_weights: CostWeights::default(),
            max_rewrite_iterations: 10_000,
            default_merge_fanout: num_cpus::get().clamp(1, 8),
        }
    }
}

impl EngineConfig {
    /// Loads planner parameters from a JSON document, falling back to
    /// `Default::default()` for any field the document omits.
    pub fn from_json(text: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(default)]
        struct Partial {
            simd_dimensionality_threshold: usize,
            cost_weights: CostWeights,
            max_rewrite_iterations: usize,
            default_merge_fanout: usize,
        }
        impl Default for Partial {
            fn default() -> Self {
                let d = EngineConfig::default();
                Self {
                    simd_dimensionality_threshold: d.simd_dimensionality_threshold,
                    cost_weights: d.cost_weights,
                    max_rewrite_iterations: d.max_rewrite_iterations,
                    default_merge_fanout: d.default_merge_fanout,
                }
            }
        }
        let parsed: Partial = serde_json::from_str(text).map_err(|e| DbError::internal(e.to_string()))?;
        Ok(Self {
            simd_dimensionality_threshold: parsed.simd_dimensionality_threshold,
            cost_weights: parsed.cost_weights,
            max_rewrite_iterations: parsed.max_rewrite_iterations,
            default_merge_fanout: parsed.default_merge_fanout,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DbError::internal(e.to_string()))
    }
}

/// The read-only collaborators a rule needs to decide whether, and how,
/// it applies: catalog lookups (`KnnToIndexRule`, `CountPushdownRule`),
/// function resolution (`SimdRule`), and the tunables above.
pub struct RewriteContext<'a> {
    pub catalog: &'a Catalog,
    pub functions: &'a FunctionRegistry,
    pub config: &'a EngineConfig,
}

/// One rewrite rule. `can_be_applied` must be side-effect-free;
/// `apply` is the only place a rule may mutate the plan.
pub trait RewriteRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_be_applied(&self, plan: &PhysicalPlan, node: PhysicalNodeId, ctx: &RewriteContext) -> bool;

    /// Rewrites the subtree rooted at `node` and returns the id that
    /// should replace it in its parent's `inputs` (usually `node` itself
    /// via `PhysicalPlan::replace`, but a rule that reorders two stacked
    /// nodes returns the id that ends up on top — see
    /// [`rules::FilterPushdownRule`] for the swap pattern).
    fn apply(&self, plan: &mut PhysicalPlan, node: PhysicalNodeId, ctx: &RewriteContext) -> Result<PhysicalNodeId>;
}

/// Depth-first, priority-ordered rewrite driver. Children are rewritten
/// before their parent is tested (so a pushdown rule sees its input's
/// final shape), and at each node every rule is retried in order until
/// none applies before moving on — a single node may absorb several
/// rule applications (e.g. `ProjectionPushdownRule` then `SimdRule`)
/// before the traversal continues upward.
pub struct RewriteEngine {
    rules: Vec<Box<dyn RewriteRule>>,
}

impl RewriteEngine {
    pub fn new(rules: Vec<Box<dyn RewriteRule>>) -> Self {
        Self { rules }
    }

    /// The full catalogue: the six pushdown/SIMD rules plus
    /// `KnnToIndexRule`, in an order chosen so structural eliminations
    /// (count/projection/knn-to-index) run before the pure reorderings
    /// (filter/limit pushdown), which in turn run before the rules that
    /// collapse or annotate what's left (sort-merge parallelization,
    /// SIMD).
    pub fn with_default_rules() -> Self {
        Self::new(vec![
            Box::new(rules::CountPushdownRule),
            Box::new(rules::KnnToIndexRule),
            Box::new(rules::ProjectionPushdownRule),
            Box::new(rules::FilterPushdownRule),
            Box::new(rules::LimitPushdownRule),
            Box::new(rules::SortMergeParallelizationRule),
            Box::new(rules::SimdRule),
        ])
    }

    /// Rewrites `root` (and everything beneath it) to a fixed point,
    /// returning the new root id. A rewrite sequence that never settles
    /// within `ctx.config.max_rewrite_iterations` total rule
    /// applications is a `DbError::Planner`, not an infinite loop.
    pub fn optimize(&self, plan: &mut PhysicalPlan, root: PhysicalNodeId, ctx: &RewriteContext) -> Result<PhysicalNodeId> {
        let mut budget = ctx.config.max_rewrite_iterations;
        self.rewrite(plan, root, ctx, &mut budget)
    }

    fn rewrite(
        &self,
        plan: &mut PhysicalPlan,
        id: PhysicalNodeId,
        ctx: &RewriteContext,
        budget: &mut usize,
    ) -> Result<PhysicalNodeId> {
        let inputs = plan.node(id).inputs.clone();
        let mut new_inputs = Vec::with_capacity(inputs.len());
        let mut changed = false;
        for input in inputs {
            let rewritten = self.rewrite(plan, input, ctx, budget)?;
            changed |= rewritten != input;
            new_inputs.push(rewritten);
        }
        if changed {
            plan.rebuild_with_inputs(id, new_inputs);
        }

        let mut current = id;
        loop {
            let next_rule = self.rules.iter().find(|rule| rule.can_be_applied(plan, current, ctx));
            let Some(rule) = next_rule else { break };
            if *budget == 0 {
                return Err(DbError::planner(format!(
                    "rewrite engine exceeded its iteration budget while '{}' still matched",
                    rule.name()
                )));
            }
            *budget -= 1;
            current = rule.apply(plan, current, ctx)?;
        }
        Ok(current)
    }
}

impl Default for RewriteEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

/// Ties the logical tree, the rewrite engine, and the runtime operator
/// builder into one entry point, `Planner::plan`. Parse-independent:
/// callers hand it an already-built `LogicalPlan`, since turning query
/// text into one is out of scope here.
pub struct Planner {
    engine: RewriteEngine,
}

impl Planner {
    pub fn new() -> Self {
        Self {
            engine: RewriteEngine::with_default_rules(),
        }
    }

    pub fn with_engine(engine: RewriteEngine) -> Self {
        Self { engine }
    }

    /// Lowers `logical_root` into a fresh `PhysicalPlan` via
    /// `LogicalPlan::implement`, rewrites it to a fixed point, and
    /// returns the rewritten plan plus its (possibly relocated) root.
    pub fn plan(
        &self,
        logical: &LogicalPlan,
        logical_root: LogicalNodeId,
        catalog: &Catalog,
        functions: &FunctionRegistry,
        config: &EngineConfig,
    ) -> Result<(PhysicalPlan, PhysicalNodeId)> {
        let mut physical = PhysicalPlan::new();
        for id in 0..logical.len() {
            physical.seed_statistics_from_catalog(catalog, &logical.node(id).columns);
        }
        let root = logical.implement(logical_root, &mut physical);
        let ctx = RewriteContext {
            catalog,
            functions,
            config,
        };
        let rewritten_root = self.engine.optimize(&mut physical, root, &ctx)?;
        Ok((physical, rewritten_root))
    }

    /// Instantiates the runtime operator tree for an already-planned
    /// physical plan, after late values have been bound.
    pub fn build_operator(
        &self,
        physical: &PhysicalPlan,
        root: PhysicalNodeId,
        exec: &ExecutionContext,
    ) -> Result<Box<dyn Operator>> {
        runtime::build_operator(physical, root, exec)
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}
