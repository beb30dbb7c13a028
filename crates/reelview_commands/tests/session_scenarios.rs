// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end editing through the session: scenarios, undo/redo round trips
//! and isolation lifetimes.

use reelview_commands::{CommandError, Session};
use reelview_graph::{GraphError, NodeId, PropertyValue};

/// Observable graph state: top-level nodes with their inputs, view and frame
#[derive(Debug, PartialEq)]
struct Snapshot {
    nodes: Vec<(String, Vec<String>)>,
    view: Option<String>,
    frame: i32,
}

fn snapshot(session: &Session) -> Snapshot {
    let graph = session.graph();
    let name = |id: NodeId| graph.node_name(id).unwrap_or_default().to_string();
    let mut nodes: Vec<_> = graph
        .nodes()
        .map(|id| {
            let inputs = graph.node(id).map(|n| n.inputs().iter().map(|&i| name(i)).collect()).unwrap_or_default();
            (name(id), inputs)
        })
        .collect();
    nodes.sort();
    Snapshot {
        nodes,
        view: graph.view_node().map(name),
        frame: session.frame(),
    }
}

fn movie(path: &str) -> PropertyValue {
    PropertyValue::String(vec![path.to_string()])
}

fn add_source(session: &mut Session, name: &str, path: &str) -> NodeId {
    let id = session.new_node("FileSource", name).unwrap();
    session.set_property(id, "media.movie", movie(path)).unwrap();
    id
}

#[test]
fn test_exposure_at_zero_passes_source_through() {
    let mut session = Session::with_builtins().unwrap();
    let src = add_source(&mut session, "src1", "smptebars,start=1,end=10.movieproc");
    let exp = session.new_node("ColorExposure", "exp1").unwrap();
    session.set_inputs(exp, &[src]).unwrap();

    let graph = session.graph();
    let context = graph.context_for_frame(1);
    assert_eq!(
        graph.evaluate_node_identifier(exp, &context),
        graph.evaluate_node_identifier(src, &context)
    );
}

#[test]
fn test_delete_then_undo_restores_name_and_input() {
    let mut session = Session::with_builtins().unwrap();
    let src = add_source(&mut session, "src1", "solid,red=1.movieproc");
    let exp = session.new_node("ColorExposure", "exp1").unwrap();
    session.set_inputs(exp, &[src]).unwrap();

    session.delete_node(exp).unwrap();
    assert!(matches!(
        session.find_node("exp1"),
        Err(CommandError::Graph(GraphError::NodeNotFound(_)))
    ));

    session.undo().unwrap();
    let restored = session.find_node("exp1").unwrap();
    assert_eq!(restored, exp);
    assert_eq!(session.graph().node(restored).unwrap().inputs(), &[src]);
}

#[test]
fn test_delete_undo_restores_repeated_input_slots() {
    let mut session = Session::with_builtins().unwrap();
    let src = add_source(&mut session, "src1", "solid,red=1.movieproc");
    let other = add_source(&mut session, "src2", "solid,blue=1.movieproc");
    let stack = session.new_node("Stack", "stack1").unwrap();
    session.set_inputs(stack, &[src, other, src]).unwrap();
    let before = snapshot(&session);

    session.delete_node(src).unwrap();
    assert_eq!(session.graph().node(stack).unwrap().inputs(), &[other]);

    session.undo().unwrap();
    assert_eq!(session.graph().node(stack).unwrap().inputs(), &[src, other, src]);
    assert_eq!(session.graph().node(src).unwrap().outputs(), &[stack, stack]);
    assert_eq!(snapshot(&session), before);

    session.redo().unwrap();
    assert_eq!(session.graph().node(stack).unwrap().inputs(), &[other]);
    session.undo().unwrap();
    assert_eq!(snapshot(&session), before);
}

#[test]
fn test_undo_redo_round_trips_every_command() {
    let mut session = Session::with_builtins().unwrap();
    let a = add_source(&mut session, "a", "solid,red=1.movieproc");
    let b = add_source(&mut session, "b", "solid,blue=1.movieproc");
    let stack = session.new_node("Stack", "").unwrap();

    type Edit = Box<dyn Fn(&mut Session) -> Result<(), CommandError>>;
    let edits: Vec<Edit> = vec![
        Box::new(move |s: &mut Session| s.set_inputs(stack, &[a, b])),
        Box::new(move |s: &mut Session| s.set_view_node(Some(stack))),
        Box::new(|s: &mut Session| s.set_frame(12)),
        Box::new(|s: &mut Session| s.new_node("Retime", "late").map(|_| ())),
        Box::new(move |s: &mut Session| s.set_property(stack, "composite.type", movie("add"))),
        Box::new(move |s: &mut Session| s.delete_node(b)),
        Box::new(move |s: &mut Session| s.set_view_node(None)),
    ];

    for edit in &edits {
        let before = snapshot(&session);
        edit(&mut session).unwrap();
        let after = snapshot(&session);

        session.undo().unwrap();
        assert_eq!(snapshot(&session), before);
        session.redo().unwrap();
        assert_eq!(snapshot(&session), after);
    }
}

#[test]
fn test_pending_redo_keeps_deleted_node() {
    let mut session = Session::with_builtins().unwrap();
    let src = add_source(&mut session, "src1", "solid,red=1.movieproc");
    session.delete_node(src).unwrap();
    assert_eq!(session.graph().isolation_references(src), 1);

    session.undo().unwrap();
    assert!(session.graph().is_live(src));
    session.redo().unwrap();
    assert!(session.graph().is_isolated(src));

    session.clear_history();
    assert!(session.graph().node(src).is_none());
}

#[test]
fn test_undone_creation_destroyed_when_redo_dropped() {
    let mut session = Session::with_builtins().unwrap();
    let id = session.new_node("ColorExposure", "exp1").unwrap();
    session.undo().unwrap();
    assert!(session.graph().is_isolated(id));

    session.set_frame(3).unwrap();
    assert!(session.graph().node(id).is_none());
    assert!(session.find_node("exp1").is_err());
}

#[test]
fn test_switch_group_follows_active_index() {
    let mut session = Session::with_builtins().unwrap();
    let a = add_source(&mut session, "a", "solid,red=1.movieproc");
    let b = add_source(&mut session, "b", "solid,green=1.movieproc");
    let switch = session.new_node("SwitchGroup", "").unwrap();
    session.set_inputs(switch, &[a, b]).unwrap();
    session.set_view_node(Some(switch)).unwrap();

    let first = session.evaluate_identifier();
    session.set_property(switch, "switch.active", PropertyValue::Int(vec![1])).unwrap();
    let second = session.evaluate_identifier();
    assert_ne!(first, second);

    let context = session.graph().context_for_frame(session.frame());
    let graph = session.graph();
    assert_eq!(
        graph.evaluate_node_identifier(switch, &context),
        graph.evaluate_node_identifier(b, &context)
    );

    session.undo().unwrap();
    assert_eq!(session.evaluate_identifier(), first);
}

#[test]
fn test_compound_edit_undoes_in_one_step() {
    let mut session = Session::with_builtins().unwrap();
    let before = snapshot(&session);

    session.begin_compound("Add graded source");
    let src = add_source(&mut session, "src1", "solid,red=1.movieproc");
    let exp = session.new_node("ColorExposure", "").unwrap();
    session.set_inputs(exp, &[src]).unwrap();
    session.set_view_node(Some(exp)).unwrap();
    session.end_compound().unwrap();

    assert_eq!(session.history().undo_description().as_deref(), Some("Add graded source"));
    session.undo().unwrap();
    assert_eq!(snapshot(&session), before);
    session.redo().unwrap();
    assert_eq!(session.graph().view_node(), Some(exp));
}
