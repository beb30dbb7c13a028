// SPDX-License-Identifier: MIT OR Apache-2.0
//! Display and output groups.
//!
//! A target group hangs off the root and is fed by the view node. Inside it
//! the view passes through an adaptor and a nested display pipeline. The
//! result is tagged with the device it is meant for, and the device's size
//! becomes the view size of everything evaluated beneath it.

use crate::context::Context;
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::graph::{Graph, GraphError};
use crate::group::{group_root, GroupBehavior};
use crate::image::{ImageDescription, ImageId, RenderDestination};
use crate::node::{ImageRangeInfo, MetaEvalVisitor, NodeRef, Processor, ProcessorEnv};
use crate::property::{PropertyContainer, PropertyError, PropertyInfo, PropertyValue};
use crate::store::NodeId;

const NO_DISPLAY: &str = "No display pipeline";

/// Builds `adaptor -> pipeline` inside a target group
#[derive(Debug, Clone)]
pub struct TargetBehavior {
    pipeline_type: String,
}

impl TargetBehavior {
    fn adaptor(graph: &Graph, group: NodeId) -> Result<NodeId, GraphError> {
        graph
            .find_member(group, "adaptor")
            .ok_or_else(|| GraphError::Internal(format!("{} has no adaptor", graph.node_name(group).unwrap_or_default())))
    }
}

impl GroupBehavior for TargetBehavior {
    fn build(&self, graph: &mut Graph, group: NodeId) -> Result<(), GraphError> {
        let adaptor = graph.new_adaptor(group, None)?;
        let pipeline = graph.new_member_node(group, &self.pipeline_type, "pipeline")?;
        graph.connect_member(pipeline, vec![adaptor])?;
        graph.set_group_root(group, Some(pipeline))
    }

    fn set_inputs(&self, graph: &mut Graph, group: NodeId, _old: &[NodeId], new: &[NodeId]) -> Result<(), GraphError> {
        let adaptor = Self::adaptor(graph, group)?;
        graph.rebind_adaptor(adaptor, new.first().copied())
    }
}

/// Evaluates the pipeline for one device
#[derive(Debug, Default)]
pub struct TargetProcessor {
    output: bool,
    device: String,
    width: u32,
    height: u32,
}

impl TargetProcessor {
    fn context(&self, context: &Context) -> Context {
        if self.width > 0 && self.height > 0 {
            context.with_view_size(self.width, self.height)
        } else {
            context.derive()
        }
    }

    fn destination(&self) -> RenderDestination {
        let device = self.device.clone();
        if self.output {
            RenderDestination::Output { device }
        } else {
            RenderDestination::Display { device }
        }
    }

    fn tag(&self) -> String {
        let kind = if self.output { "output" } else { "display" };
        format!("{kind}({},{}x{})", self.device, self.width, self.height)
    }
}

impl Processor for TargetProcessor {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        self.device = properties.front_or("device.name", String::new());
        self.width = properties.front_or("device.width", 0i32).max(0).unsigned_abs();
        self.height = properties.front_or("device.height", 0i32).max(0).unsigned_abs();
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        let Some(root) = group_root(node) else {
            return ImageDescription::no_image(node.name(), NO_DISPLAY);
        };
        node.graph()
            .evaluate_node(root, &self.context(context))
            .with_destination(self.destination())
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        let Some(root) = group_root(node) else {
            return ImageId::no_image(node.name(), NO_DISPLAY);
        };
        let child = node.graph().evaluate_node_identifier(root, &self.context(context));
        ImageId::with_children(format!("{}:{}", node.name(), self.tag()), vec![child])
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        group_root(node).map_or_else(ImageRangeInfo::empty, |root| node.graph().image_range_info(root))
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        if let Some(root) = group_root(node) {
            node.graph().meta_evaluate_node(root, &self.context(context), visitor);
        }
    }
}

fn target_spec(definition: &NodeDefinition, output: bool) -> Result<NodeSpec, PropertyError> {
    let device_info = PropertyInfo::DEFAULT.transient().excluded_from_profile();
    let mut properties = PropertyContainer::new();
    properties.declare_with_info("device.name", vec![String::new()], device_info)?;
    properties.declare_with_info("device.width", vec![0i32], device_info)?;
    properties.declare_with_info("device.height", vec![0i32], device_info)?;

    let processor = TargetProcessor {
        output,
        ..TargetProcessor::default()
    };
    Ok(NodeSpec::new(processor)
        .with_properties(properties)
        .max_inputs(1)
        .group(TargetBehavior {
            pipeline_type: definition.string_value("defaults.pipelineType", "DisplayPipelineGroup"),
        }))
}

pub(crate) fn register(manager: &mut NodeManager) {
    let pipeline = || PropertyValue::String(vec!["DisplayPipelineGroup".to_string()]);
    manager.register(
        NodeDefinition::new("DisplayGroup", NodeCategory::Group, |d| target_spec(d, false))
            .with_summary("Image sent to a display device")
            .with_default("defaults.pipelineType", pipeline())
            .hidden(),
    );
    manager.register(
        NodeDefinition::new("OutputGroup", NodeCategory::Group, |d| target_spec(d, true))
            .with_summary("Image sent to an output device")
            .with_default("defaults.pipelineType", pipeline())
            .hidden(),
    );
}

#[cfg(test)]
mod tests {
    use crate::device::DeviceDescriptor;
    use crate::graph::Graph;
    use crate::image::RenderDestination;

    #[test]
    fn test_display_group_tags_destination() {
        let mut graph = Graph::with_builtins().unwrap();
        let src = graph.new_node("FileSource", "").unwrap();
        graph.set_property(src, "media.movie", vec!["solid.movieproc".to_string()]).unwrap();
        graph.set_view_node(Some(src)).unwrap();

        let display = graph.default_display_group();
        graph
            .bind_device(display, &DeviceDescriptor::new("desktop", 1280, 720, 60.0))
            .unwrap();

        let context = graph.context_for_frame(1);
        assert_eq!((context.view_width, context.view_height), (1280, 720));
        let image = graph.evaluate_node(display, &context);
        assert_eq!(
            image.destination,
            RenderDestination::Display {
                device: "desktop".to_string()
            }
        );
        let id = graph.evaluate_node_identifier(display, &context);
        assert_eq!(id.id, "displayGroup:display(desktop,1280x720)");
        assert_eq!(id.children[0], graph.evaluate_node_identifier(src, &context));
    }

    #[test]
    fn test_output_group_follows_view() {
        let mut graph = Graph::with_builtins().unwrap();
        let output = graph
            .add_output_group(&DeviceDescriptor::new("file", 640, 480, 24.0))
            .unwrap();
        assert_eq!(graph.targets().len(), 2);
        assert_eq!(graph.node(graph.root()).unwrap().inputs(), graph.targets());

        let src = graph.new_node("FileSource", "").unwrap();
        graph.set_view_node(Some(src)).unwrap();
        assert_eq!(graph.node(output).unwrap().inputs(), &[src]);

        let image = graph.evaluate_node(output, &graph.context_for_frame(1));
        assert!(matches!(image.destination, RenderDestination::Output { .. }));
    }
}
