//! The query planning and execution subsystem: the logical operator
//! tree, its physical lowering, the cost model, the runtime
//! pull-pipeline, and the rewrite-rule planner tying them together.

pub mod cost;
pub mod logical;
pub mod physical;
pub mod planner;
pub mod runtime;

pub use cost::{Cost, CostWeights};
pub use logical::LogicalPlan;
pub use physical::PhysicalPlan;
pub use planner::{EngineConfig, Planner, RewriteEngine, RewriteRule};
pub use runtime::{ExecutionContext, Operator, StorageContext};
