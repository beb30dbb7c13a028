// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph nodes and the processing trait every node kind implements.
//!
//! A [`Node`] holds the state the graph manages (name, edges, properties,
//! group membership). What a node *does* lives in its [`Processor`], which
//! sees the node and the rest of the graph through a read-only [`NodeRef`]
//! during evaluation.

use crate::context::Context;
use crate::definition::NodeDefinition;
use crate::graph::Graph;
use crate::group::Members;
use crate::image::{ImageDescription, ImageId};
use crate::media::MediaRegistry;
use crate::property::{PropertyContainer, PropertyValue};
use crate::store::NodeId;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Narrow a frame computed in `i64` back into `i32`, saturating
pub(crate) fn clamp_frame(frame: i64) -> i32 {
    i32::try_from(frame).unwrap_or(if frame < 0 { i32::MIN } else { i32::MAX })
}

/// Frame range and rate a node produces
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageRangeInfo {
    /// First frame
    pub start: i32,
    /// Last frame, inclusive
    pub end: i32,
    /// Frame step
    pub inc: i32,
    /// Playback rate, 0 when unknown
    pub fps: f32,
    /// Start of the in-use region
    pub cut_in: i32,
    /// End of the in-use region
    pub cut_out: i32,
}

impl ImageRangeInfo {
    /// Range with cuts at its ends
    pub fn new(start: i32, end: i32, fps: f32) -> Self {
        Self {
            start,
            end,
            inc: 1,
            fps,
            cut_in: start,
            cut_out: end,
        }
    }

    /// Single frame range with unknown rate
    pub fn empty() -> Self {
        Self::new(1, 1, 0.0)
    }

    /// Number of frames
    pub fn len(&self) -> i32 {
        clamp_frame((i64::from(self.end) - i64::from(self.start) + 1).max(0))
    }

    /// True if the range holds no frames
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `frame` is inside the range
    pub fn contains(&self, frame: i32) -> bool {
        frame >= self.start && frame <= self.end
    }

    /// Smallest range covering both; the rate comes from `self` when known
    pub fn union(&self, other: &ImageRangeInfo) -> Self {
        let fps = if self.fps > 0.0 { self.fps } else { other.fps };
        Self::new(self.start.min(other.start), self.end.max(other.end), fps)
    }
}

impl Default for ImageRangeInfo {
    fn default() -> Self {
        Self::empty()
    }
}

/// Services available to processors when they refresh their parameters
#[derive(Debug, Clone, Copy)]
pub struct ProcessorEnv<'a> {
    /// Media readers
    pub media: &'a MediaRegistry,
}

/// Receives the nodes an evaluation would touch, without evaluating
pub trait MetaEvalVisitor {
    /// Called before a node's inputs are visited
    fn enter(&mut self, node: NodeRef<'_>, context: &Context);

    /// Called after a node's inputs are visited
    fn leave(&mut self, _node: NodeRef<'_>, _context: &Context) {}

    /// Whether to descend into `child`
    fn traverse_child(&mut self, _parent: NodeRef<'_>, _index: usize, _child: NodeId, _context: &Context) -> bool {
        true
    }
}

/// Evaluation behavior of a node kind.
///
/// Every method has a default that treats the node as a pass-through: no
/// inputs yields "No Input", one input is forwarded, several inputs are
/// composited in order.
pub trait Processor: fmt::Debug + Send + Sync {
    /// Re-read typed parameters from the node's properties
    fn refresh(&mut self, _properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {}

    /// A property changed; refreshes everything unless overridden
    fn property_changed(&mut self, properties: &PropertyContainer, _name: &str, env: &ProcessorEnv<'_>) {
        self.refresh(properties, env);
    }

    /// Produce the render description for `context`
    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        node.evaluate_default(context)
    }

    /// Produce the identifier of what [`Processor::evaluate`] would return
    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        node.identifier_default(context)
    }

    /// Frame range this node produces
    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        node.input_range_info(0)
    }

    /// Visit the inputs an evaluation at `context` would reach
    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        for index in 0..node.inputs().len() {
            node.meta_evaluate_input(index, context, visitor);
        }
    }

    /// Drop any cached results
    fn flush(&self) {}

    /// Values for output-only properties, written back after each refresh
    fn output_properties(&self) -> Vec<(&'static str, PropertyValue)> {
        Vec::new()
    }
}

/// A node in the graph
#[derive(Debug)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) definition: Arc<NodeDefinition>,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) outputs: Vec<NodeId>,
    pub(crate) group: Option<NodeId>,
    pub(crate) properties: PropertyContainer,
    pub(crate) processor: Box<dyn Processor>,
    pub(crate) max_inputs: Option<usize>,
    pub(crate) unconstrained_inputs: bool,
    pub(crate) members: Option<Members>,
    pub(crate) adapted_input: Option<NodeId>,
    pub(crate) protected: bool,
    pub(crate) isolated: bool,
}

impl Node {
    /// Unique name within the node's scope
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name from the definition
    pub fn type_name(&self) -> &str {
        self.definition.type_name()
    }

    /// Definition the node was built from
    pub fn definition(&self) -> &Arc<NodeDefinition> {
        &self.definition
    }

    /// Ordered inputs
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Nodes that list this one as an input, once per occurrence
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    /// Owning group, `None` for top-level nodes
    pub fn group(&self) -> Option<NodeId> {
        self.group
    }

    /// Properties
    pub fn properties(&self) -> &PropertyContainer {
        &self.properties
    }

    /// Input limit
    pub fn max_inputs(&self) -> Option<usize> {
        self.max_inputs
    }

    /// Whether inputs may come from any scope
    pub fn has_unconstrained_inputs(&self) -> bool {
        self.unconstrained_inputs
    }

    /// Group state, present for group nodes
    pub fn members(&self) -> Option<&Members> {
        self.members.as_ref()
    }

    /// True for group nodes
    pub fn is_group(&self) -> bool {
        self.members.is_some()
    }

    /// External node an adaptor stands in for
    pub fn adapted_input(&self) -> Option<NodeId> {
        self.adapted_input
    }

    /// Protected nodes cannot be deleted or isolated
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Removed from the graph but kept for undo
    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Processor, for diagnostics
    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }
}

/// Read-only view of a node inside its graph
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    graph: &'a Graph,
    id: NodeId,
    node: &'a Node,
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(graph: &'a Graph, id: NodeId, node: &'a Node) -> Self {
        Self { graph, id, node }
    }

    /// Handle of this node
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Owning graph
    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// The node
    pub fn node(&self) -> &'a Node {
        self.node
    }

    /// Node name
    pub fn name(&self) -> &'a str {
        &self.node.name
    }

    /// Ordered inputs
    pub fn inputs(&self) -> &'a [NodeId] {
        &self.node.inputs
    }

    /// Properties
    pub fn properties(&self) -> &'a PropertyContainer {
        &self.node.properties
    }

    /// Evaluate input `index`; "No Input" when there is none
    pub fn evaluate_input(&self, index: usize, context: &Context) -> ImageDescription {
        match self.node.inputs.get(index) {
            Some(&input) => self.graph.evaluate_node(input, context),
            None => ImageDescription::no_image(self.name(), "No Input"),
        }
    }

    /// Identifier of input `index`, matching [`NodeRef::evaluate_input`]
    pub fn input_identifier(&self, index: usize, context: &Context) -> ImageId {
        match self.node.inputs.get(index) {
            Some(&input) => self.graph.evaluate_node_identifier(input, context),
            None => ImageId::no_image(self.name(), "No Input"),
        }
    }

    /// Range of input `index`, empty when there is none
    pub fn input_range_info(&self, index: usize) -> ImageRangeInfo {
        self.node
            .inputs
            .get(index)
            .map_or_else(ImageRangeInfo::empty, |&input| self.graph.image_range_info(input))
    }

    /// Descend into input `index` if the visitor agrees
    pub fn meta_evaluate_input(&self, index: usize, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        if let Some(&input) = self.node.inputs.get(index) {
            if visitor.traverse_child(*self, index, input, context) {
                self.graph.meta_evaluate_node(input, context, visitor);
            }
        }
    }

    /// Pass-through evaluation
    pub fn evaluate_default(&self, context: &Context) -> ImageDescription {
        match self.node.inputs.len() {
            0 => ImageDescription::no_image(self.name(), "No Input"),
            1 => self.evaluate_input(0, context),
            n => {
                let children = (0..n).map(|i| self.evaluate_input(i, context)).collect();
                ImageDescription::composite(self.name(), children, None)
            }
        }
    }

    /// Identifier of [`NodeRef::evaluate_default`]
    pub fn identifier_default(&self, context: &Context) -> ImageId {
        match self.node.inputs.len() {
            0 => ImageId::no_image(self.name(), "No Input"),
            1 => self.input_identifier(0, context),
            n => {
                let children = (0..n).map(|i| self.input_identifier(i, context)).collect();
                ImageId::with_children(format!("{}:composite", self.name()), children)
            }
        }
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.node.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_union() {
        let a = ImageRangeInfo::new(1, 10, 24.0);
        let b = ImageRangeInfo::new(5, 30, 30.0);
        let u = a.union(&b);
        assert_eq!((u.start, u.end, u.fps), (1, 30, 24.0));
        assert_eq!(ImageRangeInfo::empty().union(&b).fps, 30.0);
    }

    #[test]
    fn test_range_len_and_contains() {
        let r = ImageRangeInfo::new(3, 7, 24.0);
        assert_eq!(r.len(), 5);
        assert!(r.contains(3) && r.contains(7));
        assert!(!r.contains(8));
    }
}
