// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layered compositing.

use crate::context::Context;
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::image::{Arg, ImageDescription, ImageId, ShaderOp};
use crate::node::{ImageRangeInfo, MetaEvalVisitor, NodeRef, Processor, ProcessorEnv};
use crate::property::PropertyContainer;

/// How stacked inputs combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompositeMode {
    /// Alpha over, first input on top
    #[default]
    Over,
    /// Sum
    Add,
    /// Absolute difference
    Difference,
    /// Each layer replaces the one below inside its bounds
    Replace,
    /// Only the first input
    Topmost,
}

impl CompositeMode {
    /// Parse a `composite.type` value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "over" => Some(Self::Over),
            "add" => Some(Self::Add),
            "difference" => Some(Self::Difference),
            "replace" => Some(Self::Replace),
            "topmost" => Some(Self::Topmost),
            _ => None,
        }
    }

    /// Name used in properties and shader calls
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Over => "over",
            Self::Add => "add",
            Self::Difference => "difference",
            Self::Replace => "replace",
            Self::Topmost => "topmost",
        }
    }
}

/// Composites every input in index order
#[derive(Debug, Default)]
pub struct Stack {
    mode: CompositeMode,
}

impl Stack {
    fn merge(&self) -> ShaderOp {
        ShaderOp::new("stack", vec![Arg::Text(self.mode.as_str().to_string())])
    }

    fn passes_through(&self, node: NodeRef<'_>) -> bool {
        node.inputs().len() <= 1 || self.mode == CompositeMode::Topmost
    }
}

impl Processor for Stack {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        let value = properties.front_or("composite.type", "over".to_string());
        self.mode = CompositeMode::parse(&value).unwrap_or_else(|| {
            tracing::warn!("Unknown composite type {:?}, using over", value);
            CompositeMode::Over
        });
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        if self.passes_through(node) {
            return node.evaluate_input(0, context);
        }
        let children = (0..node.inputs().len())
            .map(|i| node.evaluate_input(i, context))
            .collect();
        ImageDescription::composite(node.name(), children, Some(self.merge()))
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        if self.passes_through(node) {
            return node.input_identifier(0, context);
        }
        let children = (0..node.inputs().len())
            .map(|i| node.input_identifier(i, context))
            .collect();
        ImageId::with_children(format!("{}:{}", node.name(), self.merge().canonical()), children)
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        if self.passes_through(node) {
            return node.input_range_info(0);
        }
        (1..node.inputs().len()).fold(node.input_range_info(0), |range, i| {
            range.union(&node.input_range_info(i))
        })
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        let count = if self.passes_through(node) { 1 } else { node.inputs().len() };
        for index in 0..count {
            node.meta_evaluate_input(index, context, visitor);
        }
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("Stack", NodeCategory::Composite, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("composite", "type", "over".to_string())?;
            Ok(NodeSpec::new(Stack::default()).with_properties(properties))
        })
        .with_summary("Layers inputs, first on top"),
    );
}
