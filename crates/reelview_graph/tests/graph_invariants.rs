// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural invariants that must hold after any sequence of edits.

use reelview_graph::{Graph, GraphError, NodeId};
use std::collections::HashSet;

fn source(graph: &mut Graph, name: &str, movie: &str) -> NodeId {
    let id = graph.new_node("FileSource", name).unwrap();
    graph.set_property(id, "media.movie", vec![movie.to_string()]).unwrap();
    id
}

fn assert_consistent(graph: &Graph) {
    let order = graph.topological_order().expect("graph has a cycle");
    assert_eq!(order.len(), graph.nodes().count());

    let mut names = HashSet::new();
    for id in graph.nodes() {
        let node = graph.node(id).unwrap();
        if node.group().is_none() {
            assert!(names.insert(node.name().to_string()), "duplicate name {}", node.name());
        }
        for &input in node.inputs() {
            let upstream = graph.node(input).unwrap();
            let uses = node.inputs().iter().filter(|&&i| i == input).count();
            let listed = upstream.outputs().iter().filter(|&&o| o == id).count();
            assert_eq!(uses, listed, "{} -> {} not mirrored", upstream.name(), node.name());
            assert_eq!(upstream.group(), node.group(), "{} crosses a group boundary", node.name());
        }
    }
}

#[test]
fn test_edits_keep_graph_consistent() {
    let mut graph = Graph::with_builtins().unwrap();
    let a = source(&mut graph, "a", "solid,red=1.movieproc");
    let b = source(&mut graph, "b", "smptebars.movieproc");
    let grade = graph.new_node("ColorPipelineGroup", "").unwrap();
    let stack = graph.new_node("StackGroup", "").unwrap();
    let switch = graph.new_node("SwitchGroup", "").unwrap();

    graph.set_inputs(grade, &[a]).unwrap();
    graph.set_inputs(stack, &[grade, b]).unwrap();
    graph.set_inputs(switch, &[stack, a, b]).unwrap();
    graph.set_view_node(Some(switch)).unwrap();
    assert_consistent(&graph);

    assert!(matches!(graph.set_inputs(a, &[switch]), Err(GraphError::Cycle { .. }) | Err(GraphError::TooManyInputs { .. })));
    assert!(matches!(graph.set_inputs(grade, &[switch]), Err(GraphError::Cycle { .. })));
    assert_consistent(&graph);

    graph.set_inputs(stack, &[b, grade, b]).unwrap();
    graph.set_property(switch, "switch.active", vec![2i32]).unwrap();
    graph
        .set_property(grade, "pipeline.nodes", vec!["ColorExposure".to_string(), "Retime".to_string()])
        .unwrap();
    assert_consistent(&graph);

    graph.isolate_node(stack).unwrap();
    assert_consistent(&graph);
    graph.restore_isolated_node(stack).unwrap();
    assert_consistent(&graph);

    graph.delete_node(grade).unwrap();
    assert_consistent(&graph);
    assert_eq!(graph.find_node("colorPipelineGroup"), None);
}

#[test]
fn test_names_unique_across_isolation() {
    let mut graph = Graph::with_builtins().unwrap();
    let first = graph.new_node("Switch", "cut").unwrap();
    graph.isolate_node(first).unwrap();

    let second = graph.new_node("Switch", "cut").unwrap();
    assert_ne!(graph.node_name(first), graph.node_name(second));
    assert_eq!(graph.find_node_possibly_isolated("cut"), Some(first));
    assert_eq!(graph.find_node("cut"), None);
}

#[test]
fn test_stale_handles_rejected() {
    let mut graph = Graph::with_builtins().unwrap();
    let node = graph.new_node("Switch", "").unwrap();
    graph.delete_node(node).unwrap();

    let replacement = graph.new_node("Switch", "").unwrap();
    assert_ne!(node, replacement);
    assert!(graph.node(node).is_none());
    assert!(matches!(graph.set_inputs(node, &[]), Err(GraphError::StaleNode(_))));
}

#[test]
fn test_display_groups_are_protected() {
    let mut graph = Graph::with_builtins().unwrap();
    let display = graph.default_display_group();
    assert!(matches!(graph.delete_node(display), Err(GraphError::Protected(_))));
    assert!(matches!(graph.delete_node(graph.root()), Err(GraphError::Protected(_))));
    assert!(graph.manager().user_visible_definitions().all(|d| d.type_name() != "DisplayGroup"));
}
