// SPDX-License-Identifier: MIT OR Apache-2.0
//! Frame remapping.

use crate::context::Context;
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::image::{ImageDescription, ImageId};
use crate::node::{clamp_frame, ImageRangeInfo, MetaEvalVisitor, NodeRef, Processor, ProcessorEnv};
use crate::property::PropertyContainer;

/// Parameters of the [`Retime`] kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetimeParams {
    /// Input frames per output frame
    pub scale: f32,
    /// Output start relative to the input start, in frames
    pub offset: f32,
}

impl Default for RetimeParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl RetimeParams {
    /// Whether output frames equal input frames
    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.offset == 0.0
    }

    /// Output range for an input range
    pub fn output_range(&self, input: &ImageRangeInfo) -> ImageRangeInfo {
        if self.is_identity() {
            return *input;
        }
        let start = self.output_start(input);
        let len = (f64::from(input.len()) / f64::from(self.scale)).ceil() as i64;
        let end = i64::from(start).saturating_add(len.max(1) - 1);
        ImageRangeInfo::new(start, clamp_frame(end), input.fps)
    }

    /// Input frame shown at output `frame`
    pub fn input_frame(&self, input: &ImageRangeInfo, frame: i32) -> i32 {
        if self.is_identity() {
            return frame;
        }
        let delta = i64::from(frame) - i64::from(self.output_start(input));
        let scaled = (delta as f64 * f64::from(self.scale)).floor() as i64;
        clamp_frame(i64::from(input.start).saturating_add(scaled))
    }

    fn output_start(&self, input: &ImageRangeInfo) -> i32 {
        clamp_frame(i64::from(input.start).saturating_add(self.offset.round() as i64))
    }
}

/// Maps output frames onto input frames by scale and offset
#[derive(Debug, Default)]
pub struct Retime {
    params: RetimeParams,
}

impl Retime {
    fn input_context(&self, node: NodeRef<'_>, context: &Context) -> Context {
        let frame = self.params.input_frame(&node.input_range_info(0), context.frame);
        context.with_frame(frame)
    }
}

impl Processor for Retime {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        let mut scale = properties.front_or("visual.scale", 1.0f32);
        if !(scale.is_finite() && scale > 0.0) {
            tracing::warn!("Ignoring retime scale {}", scale);
            scale = 1.0;
        }
        self.params = RetimeParams {
            scale,
            offset: properties.front_or("visual.offset", 0.0f32),
        };
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        node.evaluate_input(0, &self.input_context(node, context))
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        node.input_identifier(0, &self.input_context(node, context))
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        self.params.output_range(&node.input_range_info(0))
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        node.meta_evaluate_input(0, &self.input_context(node, context), visitor);
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("Retime", NodeCategory::Time, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("visual", "scale", 1.0f32)?;
            properties.declare("visual", "offset", 0.0f32)?;
            Ok(NodeSpec::new(Retime::default())
                .with_properties(properties)
                .max_inputs(1))
        })
        .with_summary("Frame scale and offset"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let params = RetimeParams::default();
        let input = ImageRangeInfo::new(1, 48, 24.0);
        assert_eq!(params.output_range(&input), input);
        assert_eq!(params.input_frame(&input, 17), 17);
    }

    #[test]
    fn test_offset_shifts_range() {
        let params = RetimeParams {
            scale: 1.0,
            offset: 10.0,
        };
        let input = ImageRangeInfo::new(1, 48, 24.0);
        let output = params.output_range(&input);
        assert_eq!((output.start, output.end), (11, 58));
        assert_eq!(params.input_frame(&input, 11), 1);
    }

    #[test]
    fn test_half_speed() {
        let params = RetimeParams {
            scale: 0.5,
            offset: 0.0,
        };
        let input = ImageRangeInfo::new(1, 10, 24.0);
        let output = params.output_range(&input);
        assert_eq!((output.start, output.end), (1, 20));
        assert_eq!(params.input_frame(&input, 1), 1);
        assert_eq!(params.input_frame(&input, 2), 1);
        assert_eq!(params.input_frame(&input, 3), 2);
    }

    #[test]
    fn test_extreme_offset_saturates() {
        let params = RetimeParams {
            scale: 1.0,
            offset: 3.0e9,
        };
        let input = ImageRangeInfo::new(1, 48, 24.0);
        let output = params.output_range(&input);
        assert_eq!((output.start, output.end), (i32::MAX, i32::MAX));
        assert_eq!(params.input_frame(&input, i32::MAX), 1);

        let params = RetimeParams {
            scale: 1.0,
            offset: -3.0e9,
        };
        assert_eq!(params.output_range(&input).start, i32::MIN);
        assert_eq!(params.input_frame(&input, i32::MAX), i32::MAX);
    }

    #[test]
    fn test_extreme_offset_evaluates() {
        let mut graph = crate::graph::Graph::with_builtins().unwrap();
        let src = graph.new_node("FileSource", "").unwrap();
        graph
            .set_property(src, "media.movie", vec!["smptebars,start=1,end=48.movieproc".to_string()])
            .unwrap();
        let retime = graph.new_node("Retime", "").unwrap();
        graph.set_inputs(retime, &[src]).unwrap();
        graph.set_property(retime, "visual.offset", vec![3.0e9f32]).unwrap();

        let range = graph.image_range_info(retime);
        assert_eq!(range.start, i32::MAX);
        assert_eq!(range.len(), 1);
        let _ = graph.evaluate_node(retime, &graph.context_for_frame(1));
        let _ = graph.evaluate_node_identifier(retime, &graph.context_for_frame(i32::MIN));
    }

    #[test]
    fn test_retime_node_shares_input_frames() {
        let mut graph = crate::graph::Graph::with_builtins().unwrap();
        let src = graph.new_node("FileSource", "").unwrap();
        graph
            .set_property(src, "media.movie", vec!["solid,start=1,end=10.movieproc".to_string()])
            .unwrap();
        let retime = graph.new_node("Retime", "").unwrap();
        graph.set_inputs(retime, &[src]).unwrap();
        graph.set_property(retime, "visual.scale", vec![0.5f32]).unwrap();

        assert_eq!(graph.image_range_info(retime).len(), 20);
        let a = graph.evaluate_node_identifier(retime, &graph.context_for_frame(3));
        let b = graph.evaluate_node_identifier(retime, &graph.context_for_frame(4));
        assert_eq!(a, b);
        assert_eq!(a, graph.evaluate_node_identifier(src, &graph.context_for_frame(2)));
    }
}
