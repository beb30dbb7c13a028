// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plumbing kinds: the root and group adaptors.

use crate::context::Context;
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::group::ADAPTOR_TYPE;
use crate::image::{ImageDescription, ImageId};
use crate::node::{ImageRangeInfo, MetaEvalVisitor, NodeRef, Processor};

/// Forwards a single input, composites several
#[derive(Debug, Default)]
pub struct PassThrough;

impl Processor for PassThrough {}

/// Stands in for one external input inside a group
#[derive(Debug, Default)]
pub struct Adaptor;

impl Processor for Adaptor {
    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        match node.node().adapted_input() {
            Some(input) => node.graph().evaluate_node(input, context),
            None => ImageDescription::no_image(node.name(), "No Input"),
        }
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        match node.node().adapted_input() {
            Some(input) => node.graph().evaluate_node_identifier(input, context),
            None => ImageId::no_image(node.name(), "No Input"),
        }
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        node.node()
            .adapted_input()
            .map_or_else(ImageRangeInfo::empty, |input| node.graph().image_range_info(input))
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        if let Some(input) = node.node().adapted_input() {
            if visitor.traverse_child(node, 0, input, context) {
                node.graph().meta_evaluate_node(input, context, visitor);
            }
        }
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("Root", NodeCategory::Internal, |_| {
            Ok(NodeSpec::new(PassThrough).unconstrained())
        })
        .with_summary("Collects the display and output groups")
        .hidden(),
    );
    manager.register(
        NodeDefinition::new(ADAPTOR_TYPE, NodeCategory::Internal, |_| {
            Ok(NodeSpec::new(Adaptor).max_inputs(0))
        })
        .with_summary("External input of a group")
        .hidden(),
    );
}
