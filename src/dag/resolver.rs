use petgraph::graph::NodeIndex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use super::builder::{DanglingReference, UnitGraph};
use crate::config::CyclePolicy;
use crate::discovery::models::Unit;
use crate::error::PlanError;

/// Ordered batches of unit paths. Every unit in batch `i` may start once
/// all units in earlier batches have finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub batches: Vec<Vec<String>>,
    /// Units emitted together to break a dependency cycle.
    pub forced: Vec<String>,
    pub dangling: Vec<DanglingReference>,
    pub warnings: Vec<String>,
}

impl ExecutionPlan {
    pub fn unit_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn batch_of(&self, path: &str) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.iter().any(|p| p == path))
    }

    /// The same plan with the batch order reversed, for teardown.
    pub fn reversed(mut self) -> Self {
        self.batches.reverse();
        self
    }
}

/// Group units into dependency-respecting batches.
///
/// Dependencies on paths outside `units` count as already satisfied and are
/// reported in `dangling`. When a cycle blocks progress, `policy` decides
/// between emitting the blocked units as one last batch and failing.
pub fn compute_batches(units: &[Unit], policy: CyclePolicy) -> Result<ExecutionPlan, PlanError> {
    if units.is_empty() {
        return Err(PlanError::Empty);
    }
    let mut seen = HashSet::new();
    for unit in units {
        if !seen.insert(unit.path.as_str()) {
            return Err(PlanError::DuplicateUnit(unit.path.clone()));
        }
    }

    let graph = UnitGraph::build(units);
    let mut plan = resolve_batches(&graph, policy)?;

    for dangling in &graph.dangling {
        plan.warnings.push(format!(
            "{} depends on {}, which is not part of this plan",
            dangling.unit, dangling.target
        ));
    }
    plan.dangling = graph.dangling;
    Ok(plan)
}

/// Layered Kahn's algorithm over the graph.
pub fn resolve_batches(graph: &UnitGraph, policy: CyclePolicy) -> Result<ExecutionPlan, PlanError> {
    let g = &graph.graph;
    let mut in_degree: HashMap<NodeIndex, usize> =
        g.node_indices().map(|idx| (idx, 0)).collect();
    for edge in g.edge_indices() {
        if let Some((_, to)) = g.edge_endpoints(edge) {
            *in_degree.entry(to).or_insert(0) += 1;
        }
    }

    let mut plan = ExecutionPlan::default();
    let mut emitted: HashSet<NodeIndex> = HashSet::new();
    let mut queue: VecDeque<NodeIndex> = g
        .node_indices()
        .filter(|idx| in_degree[idx] == 0)
        .collect();

    while !queue.is_empty() {
        let mut batch = Vec::new();
        let mut next_queue = VecDeque::new();

        // All nodes currently in the queue form one parallel batch
        while let Some(node) = queue.pop_front() {
            emitted.insert(node);
            batch.push(g[node].path.clone());

            for neighbor in g.neighbors(node) {
                if let Some(deg) = in_degree.get_mut(&neighbor) {
                    *deg -= 1;
                    if *deg == 0 {
                        next_queue.push_back(neighbor);
                    }
                }
            }
        }

        batch.sort();
        plan.batches.push(batch);
        queue = next_queue;
    }

    if emitted.len() == g.node_count() {
        return Ok(plan);
    }

    let mut remaining: Vec<String> = g
        .node_indices()
        .filter(|idx| !emitted.contains(idx))
        .map(|idx| g[idx].path.clone())
        .collect();
    remaining.sort();

    match policy {
        CyclePolicy::Strict => {
            let mut cyclic: Vec<String> = petgraph::algo::tarjan_scc(g)
                .into_iter()
                .filter(|component| component.len() > 1)
                .flatten()
                .map(|idx| g[idx].path.clone())
                .collect();
            cyclic.sort();
            Err(PlanError::Cycle { units: cyclic })
        }
        CyclePolicy::Lenient => {
            let warning = format!(
                "Circular dependency detected, running {} units together: {}",
                remaining.len(),
                remaining.join(", ")
            );
            tracing::warn!("{}", warning);
            plan.warnings.push(warning);
            plan.forced = remaining.clone();
            plan.batches.push(remaining);
            Ok(plan)
        }
    }
}
