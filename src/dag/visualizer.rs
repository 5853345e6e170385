use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use super::builder::{DanglingReference, GraphNode, UnitGraph};
use crate::discovery::models::Unit;

const TREE_ROOT: &str = "Infrastructure";

/// Which projection of the dependency graph to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Tree,
    Graph,
    Dag,
}

impl FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tree" => Ok(GraphFormat::Tree),
            "graph" => Ok(GraphFormat::Graph),
            "dag" => Ok(GraphFormat::Dag),
            other => Err(format!("unknown graph format '{other}'")),
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphFormat::Tree => f.write_str("tree"),
            GraphFormat::Graph => f.write_str("graph"),
            GraphFormat::Dag => f.write_str("dag"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

/// Edge-list form of the graph. Edges point from dependency to dependent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub dangling: Vec<DanglingReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum RenderedGraph {
    Tree { lines: Vec<String> },
    Graph(GraphData),
    Dag { lines: Vec<String> },
}

impl RenderedGraph {
    /// Text lines for terminal output. The edge list renders as `from -> to`.
    pub fn lines(&self) -> Vec<String> {
        match self {
            RenderedGraph::Tree { lines } | RenderedGraph::Dag { lines } => lines.clone(),
            RenderedGraph::Graph(data) => data
                .edges
                .iter()
                .map(|e| format!("{} -> {}", e.from, e.to))
                .collect(),
        }
    }
}

/// Build the graph once and project it into the requested format.
pub fn get_dependency_graph(
    units: &[Unit],
    format: GraphFormat,
    max_depth: Option<usize>,
) -> RenderedGraph {
    let graph = UnitGraph::build(units);
    match format {
        GraphFormat::Tree => RenderedGraph::Tree {
            lines: render_tree(&graph, max_depth),
        },
        GraphFormat::Graph => RenderedGraph::Graph(to_edge_list(&graph)),
        GraphFormat::Dag => RenderedGraph::Dag {
            lines: render_dag_text(&graph),
        },
    }
}

#[derive(Default)]
struct TreeNode<'a> {
    unit: Option<&'a GraphNode>,
    children: BTreeMap<&'a str, TreeNode<'a>>,
}

/// Folder-style tree keyed by path segment. Unit nodes are annotated with
/// their resource type and dependency count; nodes deeper than `max_depth`
/// are left out.
pub fn render_tree(graph: &UnitGraph, max_depth: Option<usize>) -> Vec<String> {
    let mut root = TreeNode::default();
    for node in graph.graph.node_weights() {
        let mut current = &mut root;
        for segment in node.path.split('/').filter(|s| !s.is_empty()) {
            current = current.children.entry(segment).or_default();
        }
        current.unit = Some(node);
    }

    let mut lines = vec![TREE_ROOT.to_string()];
    render_children(&root, "", 1, max_depth, &mut lines);
    lines
}

fn render_children(
    node: &TreeNode<'_>,
    prefix: &str,
    depth: usize,
    max_depth: Option<usize>,
    lines: &mut Vec<String>,
) {
    if max_depth.is_some_and(|max| depth > max) {
        return;
    }

    let count = node.children.len();
    for (i, (name, child)) in node.children.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let annotation = child
            .unit
            .map(|u| format!(" ({}) [deps: {}]", u.resource_type, u.dependency_count))
            .unwrap_or_default();
        lines.push(format!("{prefix}{branch}{name}{annotation}"));

        let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_children(child, &child_prefix, depth + 1, max_depth, lines);
    }
}

pub fn to_edge_list(graph: &UnitGraph) -> GraphData {
    let g = &graph.graph;

    let mut nodes: Vec<GraphNode> = g.node_weights().cloned().collect();
    nodes.sort_by(|a, b| a.path.cmp(&b.path));

    let mut edges: Vec<GraphEdge> = g
        .edge_indices()
        .filter_map(|e| g.edge_endpoints(e))
        .map(|(from, to)| GraphEdge {
            from: g[from].path.clone(),
            to: g[to].path.clone(),
        })
        .collect();
    edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

    GraphData {
        nodes,
        edges,
        dangling: graph.dangling.clone(),
    }
}

/// Identifiers for exported nodes. Units are numbered in path order and
/// missing dependency targets follow, so distinct paths never share an id.
struct NodeIds<'a> {
    ids: HashMap<&'a str, String>,
}

impl<'a> NodeIds<'a> {
    fn new(data: &'a GraphData) -> Self {
        let mut ids = HashMap::new();
        let paths = data
            .nodes
            .iter()
            .map(|n| n.path.as_str())
            .chain(data.dangling.iter().map(|d| d.target.as_str()));
        for path in paths {
            let next = format!("n{}", ids.len());
            ids.entry(path).or_insert(next);
        }
        Self { ids }
    }

    fn get(&self, path: &str) -> &str {
        self.ids.get(path).map(String::as_str).unwrap_or("unknown")
    }
}

fn label(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Escape a value for use inside a double-quoted DOT string.
fn dot_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Convert the edge list to DOT format for visualization.
pub fn to_dot(data: &GraphData) -> String {
    let ids = NodeIds::new(data);
    let mut lines = Vec::new();
    lines.push("digraph stackwise {".to_string());
    lines.push("    rankdir=TB;".to_string());
    lines.push("    node [shape=box, style=rounded];".to_string());

    for node in &data.nodes {
        lines.push(format!(
            "    {} [label=\"{}\", tooltip=\"{}\"];",
            ids.get(&node.path),
            dot_escape(label(&node.path)),
            dot_escape(&node.path)
        ));
    }

    for edge in &data.edges {
        lines.push(format!(
            "    {} -> {};",
            ids.get(&edge.from),
            ids.get(&edge.to)
        ));
    }

    for dangling in &data.dangling {
        lines.push(format!(
            "    {} [label=\"{}\", tooltip=\"{}\", style=dashed];",
            ids.get(&dangling.target),
            dot_escape(label(&dangling.target)),
            dot_escape(&dangling.target)
        ));
        lines.push(format!(
            "    {} -> {} [style=dashed];",
            ids.get(&dangling.target),
            ids.get(&dangling.unit)
        ));
    }

    lines.push("}".to_string());
    lines.join("\n")
}

pub fn to_mermaid(data: &GraphData) -> String {
    let ids = NodeIds::new(data);
    let mut lines = vec!["graph TD".to_string()];

    for node in &data.nodes {
        lines.push(format!(
            "    {}[\"{}\"]",
            ids.get(&node.path),
            label(&node.path).replace('"', "#quot;")
        ));
    }
    for edge in &data.edges {
        lines.push(format!(
            "    {} --> {}",
            ids.get(&edge.from),
            ids.get(&edge.to)
        ));
    }
    for dangling in &data.dangling {
        lines.push(format!(
            "    {}[\"{}?\"] -.-> {}",
            ids.get(&dangling.target),
            label(&dangling.target).replace('"', "#quot;"),
            ids.get(&dangling.unit)
        ));
    }

    lines.join("\n")
}

/// One entry per unit with the units it depends on, missing ones included.
pub fn render_dag_text(graph: &UnitGraph) -> Vec<String> {
    let mut paths: Vec<&str> = graph.graph.node_weights().map(|n| n.path.as_str()).collect();
    paths.sort();

    let mut lines = Vec::new();
    for path in paths {
        let mut deps = graph.dependencies_of(path);
        deps.extend(
            graph
                .dangling
                .iter()
                .filter(|d| d.unit == path)
                .map(|d| format!("{} (missing)", d.target)),
        );
        lines.push(path.to_string());
        lines.push(format!("  depends on: [{}]", deps.join(", ")));
    }
    lines
}
