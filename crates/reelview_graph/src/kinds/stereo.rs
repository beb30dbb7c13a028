// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stereo display modes.

use crate::context::{Context, Eye};
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::image::{Arg, ImageDescription, ImageId, ShaderOp};
use crate::node::{MetaEvalVisitor, NodeRef, Processor, ProcessorEnv};
use crate::property::PropertyContainer;

/// What the stereo node shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StereoMode {
    /// Input as is
    #[default]
    Off,
    /// Left eye only
    Left,
    /// Right eye only
    Right,
    /// Both eyes side by side
    Pair,
}

impl StereoMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(Self::Off),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "pair" => Some(Self::Pair),
            _ => None,
        }
    }
}

/// Selects or pairs eyes for display
#[derive(Debug, Default)]
pub struct DisplayStereo {
    mode: StereoMode,
    swap: bool,
}

impl DisplayStereo {
    fn eyes(&self) -> (Eye, Eye) {
        if self.swap {
            (Eye::Right, Eye::Left)
        } else {
            (Eye::Left, Eye::Right)
        }
    }

    fn single_eye(&self) -> Option<Eye> {
        let (left, right) = self.eyes();
        match self.mode {
            StereoMode::Left => Some(left),
            StereoMode::Right => Some(right),
            StereoMode::Off | StereoMode::Pair => None,
        }
    }

    fn pair_op() -> ShaderOp {
        ShaderOp::new("stereo", vec![Arg::Text("pair".to_string())])
    }
}

impl Processor for DisplayStereo {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        let value = properties.front_or("stereo.type", "off".to_string());
        self.mode = StereoMode::parse(&value).unwrap_or_else(|| {
            tracing::warn!("Unknown stereo type {:?}", value);
            StereoMode::Off
        });
        self.swap = properties.front_or("stereo.swap", 0i32) != 0;
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        if let Some(eye) = self.single_eye() {
            return node.evaluate_input(0, &context.with_eye(eye));
        }
        if self.mode == StereoMode::Off {
            return node.evaluate_input(0, context);
        }
        let (left, right) = self.eyes();
        let children = vec![
            node.evaluate_input(0, &context.with_eye(left)),
            node.evaluate_input(0, &context.with_eye(right)),
        ];
        ImageDescription::composite(node.name(), children, Some(Self::pair_op()))
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        if let Some(eye) = self.single_eye() {
            return node.input_identifier(0, &context.with_eye(eye));
        }
        if self.mode == StereoMode::Off {
            return node.input_identifier(0, context);
        }
        let (left, right) = self.eyes();
        let children = vec![
            node.input_identifier(0, &context.with_eye(left)),
            node.input_identifier(0, &context.with_eye(right)),
        ];
        ImageId::with_children(format!("{}:{}", node.name(), Self::pair_op().canonical()), children)
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        match self.single_eye() {
            Some(eye) => node.meta_evaluate_input(0, &context.with_eye(eye), visitor),
            None => node.meta_evaluate_input(0, context, visitor),
        }
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("DisplayStereo", NodeCategory::Utility, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("stereo", "type", "off".to_string())?;
            properties.declare("stereo", "swap", 0i32)?;
            Ok(NodeSpec::new(DisplayStereo::default())
                .with_properties(properties)
                .max_inputs(1))
        })
        .with_summary("Stereo eye selection"),
    );
}

#[cfg(test)]
mod tests {
    use crate::graph::Graph;

    #[test]
    fn test_eye_selection_reaches_source() {
        let mut graph = Graph::with_builtins().unwrap();
        let src = graph.new_node("FileSource", "").unwrap();
        graph.set_property(src, "media.movie", vec!["solid.movieproc".to_string()]).unwrap();
        let stereo = graph.new_node("DisplayStereo", "").unwrap();
        graph.set_inputs(stereo, &[src]).unwrap();
        let context = graph.context_for_frame(1);

        graph.set_property(stereo, "stereo.type", vec!["left".to_string()]).unwrap();
        let left = graph.evaluate_node_identifier(stereo, &context);
        assert!(left.id.contains("@1L"));

        graph.set_property(stereo, "stereo.swap", vec![1i32]).unwrap();
        assert!(graph.evaluate_node_identifier(stereo, &context).id.contains("@1R"));

        graph.set_property(stereo, "stereo.type", vec!["pair".to_string()]).unwrap();
        let pair = graph.evaluate_node(stereo, &context);
        assert_eq!(pair.children.len(), 2);
    }
}
