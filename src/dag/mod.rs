pub mod builder;
pub mod resolver;
pub mod visualizer;

pub use builder::{DanglingReference, GraphNode, UnitGraph};
pub use resolver::{compute_batches, ExecutionPlan};
pub use visualizer::{get_dependency_graph, GraphData, GraphFormat, RenderedGraph};

use crate::config::CyclePolicy;
use crate::discovery::models::Unit;
use crate::error::PlanError;

/// Execution order for a set of units.
pub fn plan_execution(units: &[Unit], policy: CyclePolicy) -> Result<ExecutionPlan, PlanError> {
    compute_batches(units, policy)
}
