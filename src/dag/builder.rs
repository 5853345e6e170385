use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::discovery::models::{ResourceType, Unit};

/// A unit as seen by the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub path: String,
    pub name: String,
    pub resource_type: ResourceType,
    /// Distinct declared dependencies, dangling ones included.
    pub dependency_count: usize,
}

/// A dependency on a path that is not among the graph's units.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DanglingReference {
    pub unit: String,
    pub target: String,
}

/// Dependency graph over a set of units.
///
/// An edge from A to B means B depends on A (A must run first). Duplicate
/// edges collapse into one and self references are dropped.
#[derive(Debug, Clone, Default)]
pub struct UnitGraph {
    pub graph: DiGraph<GraphNode, ()>,
    pub node_map: HashMap<String, NodeIndex>,
    pub dangling: Vec<DanglingReference>,
}

impl UnitGraph {
    /// Build the graph. When a path occurs more than once, the first unit
    /// wins.
    pub fn build(units: &[Unit]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map: HashMap<String, NodeIndex> = HashMap::new();

        for unit in units {
            if node_map.contains_key(&unit.path) {
                continue;
            }
            let idx = graph.add_node(GraphNode {
                path: unit.path.clone(),
                name: unit.name.clone(),
                resource_type: unit.resource_type,
                dependency_count: unit.unique_dependencies().len(),
            });
            node_map.insert(unit.path.clone(), idx);
        }

        let mut dangling = Vec::new();
        let mut linked = HashSet::new();
        for unit in units {
            if !linked.insert(unit.path.as_str()) {
                continue;
            }
            let to_idx = node_map[&unit.path];
            if unit.dependencies.iter().any(|d| *d == unit.path) {
                tracing::warn!(unit = %unit.path, "Ignoring self dependency");
            }
            for dep in unit.unique_dependencies() {
                match node_map.get(dep) {
                    // Edge from dependency -> dependent (dependency must run first)
                    Some(&from_idx) => {
                        graph.update_edge(from_idx, to_idx, ());
                    }
                    None => dangling.push(DanglingReference {
                        unit: unit.path.clone(),
                        target: dep.to_string(),
                    }),
                }
            }
        }
        dangling.sort();
        dangling.dedup();

        Self {
            graph,
            node_map,
            dangling,
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node(&self, path: &str) -> Option<&GraphNode> {
        self.node_map.get(path).map(|&idx| &self.graph[idx])
    }

    /// Paths of the units `path` depends on, sorted.
    pub fn dependencies_of(&self, path: &str) -> Vec<String> {
        self.neighbors(path, petgraph::Direction::Incoming)
    }

    /// Paths of the units that depend on `path`, sorted.
    pub fn dependents_of(&self, path: &str) -> Vec<String> {
        self.neighbors(path, petgraph::Direction::Outgoing)
    }

    fn neighbors(&self, path: &str, direction: petgraph::Direction) -> Vec<String> {
        let Some(&idx) = self.node_map.get(path) else {
            return Vec::new();
        };
        let mut paths: Vec<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].path.clone())
            .collect();
        paths.sort();
        paths
    }
}
