// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input selection.

use crate::context::Context;
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::image::{ImageDescription, ImageId};
use crate::node::{ImageRangeInfo, MetaEvalVisitor, NodeRef, Processor, ProcessorEnv};
use crate::property::PropertyContainer;

const OUT_OF_RANGE: &str = "Switch input out of range";

/// Evaluates only the active input
#[derive(Debug, Default)]
pub struct Switch {
    active: i32,
}

impl Switch {
    fn active_index(&self, node: NodeRef<'_>) -> Option<usize> {
        usize::try_from(self.active)
            .ok()
            .filter(|&i| i < node.inputs().len())
    }
}

impl Processor for Switch {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        self.active = properties.front_or("switch.active", 0i32);
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        match self.active_index(node) {
            Some(index) => node.evaluate_input(index, context),
            None if node.inputs().is_empty() => ImageDescription::no_image(node.name(), "No Input"),
            None => ImageDescription::no_image(node.name(), OUT_OF_RANGE),
        }
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        match self.active_index(node) {
            Some(index) => node.input_identifier(index, context),
            None if node.inputs().is_empty() => ImageId::no_image(node.name(), "No Input"),
            None => ImageId::no_image(node.name(), OUT_OF_RANGE),
        }
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        self.active_index(node)
            .map_or_else(ImageRangeInfo::empty, |index| node.input_range_info(index))
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        if let Some(index) = self.active_index(node) {
            node.meta_evaluate_input(index, context, visitor);
        }
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("Switch", NodeCategory::Utility, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("switch", "active", 0i32)?;
            Ok(NodeSpec::new(Switch::default()).with_properties(properties))
        })
        .with_summary("Shows one of its inputs"),
    );
}
