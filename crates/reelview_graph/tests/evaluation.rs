// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation through whole graphs: identifiers, identity kinds, caching.

use reelview_graph::context::DataType;
use reelview_graph::media::{FrameBuffer, ReadRequest};
use reelview_graph::{
    Context, FrameBufferIo, Graph, MediaError, MediaInfo, MediaRegistry, NodeId, NodeManager,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Reader for `count:*` paths that records how often frames are decoded
#[derive(Debug, Default)]
struct CountingIo {
    reads: AtomicUsize,
}

impl FrameBufferIo for CountingIo {
    fn name(&self) -> &str {
        "counting"
    }

    fn can_read(&self, path: &str) -> bool {
        path.starts_with("count:")
    }

    fn image_info(&self, _path: &str) -> Result<MediaInfo, MediaError> {
        Ok(MediaInfo {
            width: 320,
            height: 240,
            start: 1,
            end: 10,
            fps: 24.0,
            channels: vec!["R".into(), "G".into(), "B".into(), "A".into()],
            data_type: DataType::default(),
            views: Vec::new(),
        })
    }

    fn read_image(&self, request: &ReadRequest) -> Result<FrameBuffer, MediaError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(FrameBuffer {
            identifier: format!("{}#{}", request.path, request.frame),
            width: 320,
            height: 240,
            data_type: DataType::default(),
            channels: vec!["R".into(), "G".into(), "B".into(), "A".into()],
        })
    }
}

fn counting_graph() -> (Graph, Arc<CountingIo>) {
    let io = Arc::new(CountingIo::default());
    let mut media = MediaRegistry::with_builtin_readers();
    media.register(io.clone());
    let graph = Graph::new(Arc::new(NodeManager::with_builtin_nodes()), Arc::new(media)).unwrap();
    (graph, io)
}

fn source(graph: &mut Graph, movie: &str) -> NodeId {
    let id = graph.new_node("FileSource", "").unwrap();
    graph.set_property(id, "media.movie", vec![movie.to_string()]).unwrap();
    id
}

#[test]
fn test_identifier_tracks_description() {
    let mut graph = Graph::with_builtins().unwrap();
    let src = source(&mut graph, "smptebars,start=1,end=24.movieproc");
    let color = graph.new_node("Color", "").unwrap();
    graph.set_inputs(color, &[src]).unwrap();
    graph.set_view_node(Some(color)).unwrap();

    let frame_one = graph.context_for_frame(1);
    let frame_two = graph.context_for_frame(2);
    assert_eq!(graph.evaluate_identifier(&frame_one), graph.evaluate_identifier(&frame_one));
    assert_eq!(graph.evaluate(&frame_one), graph.evaluate(&frame_one));
    assert_ne!(graph.evaluate_identifier(&frame_one), graph.evaluate_identifier(&frame_two));

    let before = graph.evaluate_identifier(&frame_one);
    graph.set_property(color, "color.saturation", vec![0.0f32]).unwrap();
    let after = graph.evaluate_identifier(&frame_one);
    assert_ne!(before, after);
    assert_ne!(before.fingerprint(), after.fingerprint());

    graph.set_property(color, "color.saturation", vec![1.0f32]).unwrap();
    assert_eq!(graph.evaluate_identifier(&frame_one), before);
}

#[test]
fn test_identity_kinds_are_transparent() {
    let mut graph = Graph::with_builtins().unwrap();
    let src = source(&mut graph, "solid,red=1.movieproc");
    let exposure = graph.new_node("ColorExposure", "").unwrap();
    let retime = graph.new_node("Retime", "").unwrap();
    graph.set_inputs(exposure, &[src]).unwrap();
    graph.set_inputs(retime, &[exposure]).unwrap();
    let context = graph.context_for_frame(1);

    let source_id = graph.evaluate_node_identifier(src, &context);
    assert_eq!(graph.evaluate_node_identifier(retime, &context), source_id);
    assert_eq!(graph.evaluate_node(retime, &context), graph.evaluate_node(src, &context));

    graph.set_property(exposure, "color.exposure", vec![0.5f32]).unwrap();
    let exposed = graph.evaluate_node_identifier(retime, &context);
    assert_ne!(exposed, source_id);
    assert!(exposed.id.contains(graph.node_name(exposure).unwrap()));
    let image = graph.evaluate_node(retime, &context);
    assert_eq!(image.shader.as_ref().map(|s| s.functions()), Some(vec!["exposure"]));
}

#[test]
fn test_media_errors_stay_in_band() {
    let mut graph = Graph::with_builtins().unwrap();
    let broken = source(&mut graph, "error,errorString=boom.movieproc");
    let missing = source(&mut graph, "/shots/a.exr");
    let stack = graph.new_node("Stack", "").unwrap();
    graph.set_inputs(stack, &[broken, missing]).unwrap();
    graph.set_view_node(Some(stack)).unwrap();

    let image = graph.evaluate_node(stack, &graph.context_for_frame(1));
    assert_eq!(image.children.len(), 2);
    assert!(image.children.iter().all(|c| c.error_message().is_some()));
    assert!(image.children[1].error_message().unwrap().contains("No reader"));
}

#[test]
fn test_cache_fills_once_across_threads() {
    let (mut graph, io) = counting_graph();
    let src = source(&mut graph, "count:plate");
    let cache = graph.new_node("Cache", "").unwrap();
    graph.set_inputs(cache, &[src]).unwrap();
    let context = graph.context_for_frame(3);

    let graph = &graph;
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let context = context.clone();
                scope.spawn(move || graph.evaluate_node(cache, &context))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(io.reads.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_edits_upstream_flush_cache() {
    let (mut graph, io) = counting_graph();
    let src = source(&mut graph, "count:plate");
    let exposure = graph.new_node("ColorExposure", "").unwrap();
    let cache = graph.new_node("Cache", "").unwrap();
    graph.set_inputs(exposure, &[src]).unwrap();
    graph.set_inputs(cache, &[exposure]).unwrap();
    let context = graph.context_for_frame(1);

    graph.evaluate_node(cache, &context);
    graph.evaluate_node(cache, &context);
    assert_eq!(io.reads.load(Ordering::SeqCst), 1);

    graph.set_property(exposure, "color.exposure", vec![1.0f32]).unwrap();
    let image = graph.evaluate_node(cache, &context);
    assert_eq!(io.reads.load(Ordering::SeqCst), 2);
    assert!(image.shader.is_some());
}

#[test]
fn test_meta_evaluation_reaches_active_branch_only() {
    let mut graph = Graph::with_builtins().unwrap();
    let a = source(&mut graph, "solid,red=1.movieproc");
    let b = source(&mut graph, "solid,green=1.movieproc");
    let switch = graph.new_node("Switch", "").unwrap();
    graph.set_inputs(switch, &[a, b]).unwrap();
    graph.set_view_node(Some(switch)).unwrap();
    let context = Context::new(1, 24.0);

    let path = graph.nodes_in_evaluation_path(&context);
    assert!(path.contains(&a));
    assert!(!path.contains(&b));

    graph.set_property(switch, "switch.active", vec![1i32]).unwrap();
    assert_eq!(graph.find_in_evaluation_path(&context, "FileSource"), vec![b]);
}
