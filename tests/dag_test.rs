mod common;

use common::unit;
use stackwise::config::CyclePolicy;
use stackwise::dag::visualizer::{to_dot, to_edge_list, to_mermaid};
use stackwise::dag::{compute_batches, get_dependency_graph, GraphFormat, RenderedGraph, UnitGraph};
use stackwise::error::PlanError;

#[test]
fn test_units_without_dependencies_form_one_batch() {
    let units = vec![unit("c", &[]), unit("a", &[]), unit("b", &[])];
    let plan = compute_batches(&units, CyclePolicy::Lenient).unwrap();

    assert_eq!(plan.batches, vec![vec!["a", "b", "c"]]);
    assert!(plan.warnings.is_empty());
    assert!(plan.forced.is_empty());
}

#[test]
fn test_linear_dependency_chain() {
    let units = vec![unit("c", &["b"]), unit("b", &["a"]), unit("a", &[])];
    let plan = compute_batches(&units, CyclePolicy::Lenient).unwrap();

    assert_eq!(plan.batches, vec![vec!["a"], vec!["b"], vec!["c"]]);
}

#[test]
fn test_diamond_dependency() {
    let units = vec![
        unit("net", &[]),
        unit("sql", &["net"]),
        unit("gke", &["net"]),
        unit("app", &["sql", "gke"]),
    ];
    let plan = compute_batches(&units, CyclePolicy::Lenient).unwrap();

    assert_eq!(plan.batches.len(), 3);
    assert_eq!(plan.batches[0], vec!["net"]);
    assert_eq!(plan.batches[1], vec!["gke", "sql"]);
    assert_eq!(plan.batches[2], vec!["app"]);
}

#[test]
fn test_every_dependency_lands_in_an_earlier_batch() {
    let units = vec![
        unit("a", &[]),
        unit("b", &["a"]),
        unit("c", &["a"]),
        unit("d", &["b", "c"]),
        unit("e", &[]),
        unit("f", &["e", "d"]),
    ];
    let plan = compute_batches(&units, CyclePolicy::Lenient).unwrap();

    assert_eq!(plan.unit_count(), units.len());
    for u in &units {
        let own = plan.batch_of(&u.path).unwrap();
        for dep in &u.dependencies {
            assert!(plan.batch_of(dep).unwrap() < own, "{dep} must run before {}", u.path);
        }
    }
}

#[test]
fn test_duplicate_dependency_entries_count_once() {
    let units = vec![unit("a", &[]), unit("b", &["a", "a", "a"])];
    let plan = compute_batches(&units, CyclePolicy::Lenient).unwrap();

    assert_eq!(plan.batches, vec![vec!["a"], vec!["b"]]);
    let graph = UnitGraph::build(&units);
    assert_eq!(graph.graph.edge_count(), 1);
}

#[test]
fn test_lenient_cycle_is_forced_into_final_batch() {
    let units = vec![unit("root", &[]), unit("x", &["root", "y"]), unit("y", &["x"])];
    let plan = compute_batches(&units, CyclePolicy::Lenient).unwrap();

    assert_eq!(plan.batches, vec![vec!["root"], vec!["x", "y"]]);
    assert_eq!(plan.forced, vec!["x", "y"]);
    assert!(plan.warnings.iter().any(|w| w.contains("Circular dependency")));
    assert_eq!(plan.unit_count(), 3);
}

#[test]
fn test_strict_cycle_is_an_error() {
    let units = vec![unit("root", &[]), unit("x", &["y"]), unit("y", &["x"])];
    let err = compute_batches(&units, CyclePolicy::Strict).unwrap_err();

    assert_eq!(
        err,
        PlanError::Cycle {
            units: vec!["x".to_string(), "y".to_string()]
        }
    );
}

#[test]
fn test_dangling_reference_is_resolved_and_reported() {
    let units = vec![unit("app", &["elsewhere/net"]), unit("db", &[])];
    let plan = compute_batches(&units, CyclePolicy::Strict).unwrap();

    assert_eq!(plan.batches, vec![vec!["app", "db"]]);
    assert_eq!(plan.dangling.len(), 1);
    assert_eq!(plan.dangling[0].unit, "app");
    assert_eq!(plan.dangling[0].target, "elsewhere/net");
    assert!(plan.warnings[0].contains("elsewhere/net"));
}

#[test]
fn test_empty_and_duplicate_inputs_are_rejected() {
    assert_eq!(compute_batches(&[], CyclePolicy::Lenient), Err(PlanError::Empty));

    let units = vec![unit("a", &[]), unit("a", &[])];
    assert_eq!(
        compute_batches(&units, CyclePolicy::Lenient),
        Err(PlanError::DuplicateUnit("a".to_string()))
    );
}

#[test]
fn test_destroy_order_is_reversed() {
    let units = vec![unit("a", &[]), unit("b", &["a"])];
    let plan = compute_batches(&units, CyclePolicy::Lenient).unwrap().reversed();

    assert_eq!(plan.batches, vec![vec!["b"], vec!["a"]]);
}

#[test]
fn test_graph_edges_point_from_dependency_to_dependent() {
    let units = vec![unit("a", &[]), unit("b", &["a"]), unit("c", &["a", "b"])];
    let data = to_edge_list(&UnitGraph::build(&units));

    let edges: Vec<(&str, &str)> = data
        .edges
        .iter()
        .map(|e| (e.from.as_str(), e.to.as_str()))
        .collect();
    assert_eq!(edges, vec![("a", "b"), ("a", "c"), ("b", "c")]);
    assert_eq!(data.nodes.len(), 3);

    let graph = UnitGraph::build(&units);
    assert_eq!(graph.dependencies_of("c"), vec!["a", "b"]);
    assert_eq!(graph.dependents_of("a"), vec!["b", "c"]);
}

#[test]
fn test_tree_rendering() {
    let units = vec![
        unit("live/acct1/dev/proj1/compute/web", &[]),
        unit("live/acct1/dev/proj1/compute/db", &["live/acct1/dev/proj1/compute/web"]),
    ];
    let rendered = get_dependency_graph(&units, GraphFormat::Tree, None);
    let lines = rendered.lines();

    assert_eq!(lines[0], "Infrastructure");
    assert_eq!(lines[1], "└── live");
    assert!(lines.contains(&"                    ├── db (compute) [deps: 1]".to_string()));
    assert!(lines.contains(&"                    └── web (compute) [deps: 0]".to_string()));
}

#[test]
fn test_tree_depth_limit() {
    let units = vec![unit("live/acct1/dev/proj1/compute/web", &[])];
    let lines = get_dependency_graph(&units, GraphFormat::Tree, Some(2)).lines();

    assert_eq!(lines, vec!["Infrastructure", "└── live", "    └── acct1"]);
}

#[test]
fn test_dag_text_marks_missing_dependencies() {
    let units = vec![unit("a", &[]), unit("b", &["a", "gone"])];
    let rendered = get_dependency_graph(&units, GraphFormat::Dag, None);

    let RenderedGraph::Dag { lines } = rendered else {
        panic!("expected dag output");
    };
    assert_eq!(
        lines,
        vec![
            "a",
            "  depends on: []",
            "b",
            "  depends on: [a, gone (missing)]"
        ]
    );
}

#[test]
fn test_dot_and_mermaid_exports() {
    let units = vec![unit("x/a", &[]), unit("x/b", &["x/a"])];
    let data = to_edge_list(&UnitGraph::build(&units));

    let dot = to_dot(&data);
    assert!(dot.starts_with("digraph stackwise {"));
    assert!(dot.contains("n0 [label=\"a\", tooltip=\"x/a\"];"));
    assert!(dot.contains("n0 -> n1;"));
    assert!(dot.ends_with('}'));

    let mermaid = to_mermaid(&data);
    assert!(mermaid.starts_with("graph TD"));
    assert!(mermaid.contains("n1[\"b\"]"));
    assert!(mermaid.contains("n0 --> n1"));
}

#[test]
fn test_exported_ids_stay_distinct_for_similar_paths() {
    let units = vec![
        unit("live/a/dev/p/compute/web-1", &[]),
        unit("live/a/dev/p/compute/web_1", &["live/a/dev/p/compute/web-1"]),
        unit("live/a/dev/p/compute/app", &["live/a/dev/p/compute/web_1", "gone/web-1"]),
    ];
    let data = to_edge_list(&UnitGraph::build(&units));

    // app, web-1, web_1 in path order, then the missing target.
    let dot = to_dot(&data);
    assert!(dot.contains("n1 [label=\"web-1\", tooltip=\"live/a/dev/p/compute/web-1\"];"));
    assert!(dot.contains("n2 [label=\"web_1\", tooltip=\"live/a/dev/p/compute/web_1\"];"));
    assert!(dot.contains("n1 -> n2;"));
    assert!(dot.contains("n2 -> n0;"));
    assert!(dot.contains("n3 -> n0 [style=dashed];"));

    let mermaid = to_mermaid(&data);
    assert!(mermaid.contains("n1 --> n2"));
    assert!(mermaid.contains("n3[\"web-1?\"] -.-> n0"));
}

#[test]
fn test_dot_escapes_quotes_and_backslashes() {
    let units = vec![unit("x/say \"hi\"", &[]), unit("x/back\\slash", &[])];
    let dot = to_dot(&to_edge_list(&UnitGraph::build(&units)));

    assert!(dot.contains("label=\"say \\\"hi\\\"\""));
    assert!(dot.contains("tooltip=\"x/back\\\\slash\""));
}
