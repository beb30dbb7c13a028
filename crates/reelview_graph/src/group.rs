// SPDX-License-Identifier: MIT OR Apache-2.0
//! Group nodes.
//!
//! A group owns a private subgraph of member nodes. Members live in the same
//! store as every other node but never enter the graph's name map; they are
//! reached through their group. External inputs enter the subgraph through
//! adaptor members, and the group evaluates as whichever member is its root.

use crate::context::Context;
use crate::graph::{build_node, FlushContext, Graph, GraphError};
use crate::image::{ImageDescription, ImageId};
use crate::naming;
use crate::node::{ImageRangeInfo, MetaEvalVisitor, NodeRef, Processor};
use crate::store::NodeId;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Type name of adaptor members
pub const ADAPTOR_TYPE: &str = "Adaptor";

const EMPTY_GROUP: &str = "Empty group";

/// Subgraph owned by a group node
#[derive(Debug)]
pub struct Members {
    behavior: Arc<dyn GroupBehavior>,
    pub(crate) nodes: IndexMap<String, NodeId>,
    pub(crate) root: Option<NodeId>,
    pub(crate) fan_in: Option<NodeId>,
    pub(crate) heads: Vec<NodeId>,
    pub(crate) chain: Vec<NodeId>,
}

impl Members {
    pub(crate) fn new(behavior: Arc<dyn GroupBehavior>) -> Self {
        Self {
            behavior,
            nodes: IndexMap::new(),
            root: None,
            fan_in: None,
            heads: Vec::new(),
            chain: Vec::new(),
        }
    }

    /// Structural logic of the group
    pub fn behavior(&self) -> Arc<dyn GroupBehavior> {
        Arc::clone(&self.behavior)
    }

    /// Members by name, in creation order
    pub fn nodes(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.nodes.iter().map(|(name, &id)| (name.as_str(), id))
    }

    /// Member handles
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.values().copied().collect()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the group has no members
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` is a member
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.values().any(|&m| m == id)
    }

    /// Member the group evaluates as
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Member combining the per-input subgraphs
    pub fn fan_in(&self) -> Option<NodeId> {
        self.fan_in
    }

    /// Last member of each per-input subgraph, by input slot
    pub fn heads(&self) -> &[NodeId] {
        &self.heads
    }

    /// Processing chain of pipeline groups, upstream first
    pub fn chain(&self) -> &[NodeId] {
        &self.chain
    }

    pub(crate) fn forget(&mut self, id: NodeId) {
        self.nodes.retain(|_, &mut m| m != id);
        if self.root == Some(id) {
            self.root = None;
        }
        if self.fan_in == Some(id) {
            self.fan_in = None;
        }
        self.heads.retain(|&h| h != id);
        self.chain.retain(|&c| c != id);
    }
}

/// Structural logic of a group kind.
///
/// The graph calls these hooks while it holds no borrows, so implementations
/// are free to create, connect and destroy members through the group API on
/// [`Graph`].
pub trait GroupBehavior: fmt::Debug + Send + Sync {
    /// Create the initial members
    fn build(&self, _graph: &mut Graph, _group: NodeId) -> Result<(), GraphError> {
        Ok(())
    }

    /// The group's external inputs changed
    fn set_inputs(&self, graph: &mut Graph, group: NodeId, old: &[NodeId], new: &[NodeId]) -> Result<(), GraphError>;

    /// Build the subgraph for a new input; returns its head
    fn new_subgraph_for_input(
        &self,
        graph: &mut Graph,
        group: NodeId,
        _slot: usize,
        input: NodeId,
    ) -> Result<NodeId, GraphError> {
        graph.new_adaptor(group, Some(input))
    }

    /// Point an existing subgraph at a (possibly different) input
    fn modify_subgraph_for_input(
        &self,
        graph: &mut Graph,
        _group: NodeId,
        _slot: usize,
        input: NodeId,
        head: NodeId,
    ) -> Result<(), GraphError> {
        match graph.chain_adaptor(head) {
            Some(adaptor) => graph.rebind_adaptor(adaptor, Some(input)),
            None => Err(GraphError::Internal(format!(
                "subgraph {} has no adaptor",
                graph.node_name(head).unwrap_or_default()
            ))),
        }
    }

    /// Feed the per-input heads into the fan-in member
    fn connect_fan_in(&self, graph: &mut Graph, group: NodeId, heads: &[NodeId]) -> Result<(), GraphError> {
        match graph.group_members(group)?.fan_in() {
            Some(fan_in) => graph.connect_member(fan_in, heads.to_vec()),
            None => Ok(()),
        }
    }

    /// Recreate whatever depends on graph-edit properties
    fn rebuild(&self, _graph: &mut Graph, _group: NodeId) -> Result<(), GraphError> {
        Ok(())
    }

    /// A graph-edit property of the group or one of its members changed
    fn graph_edit(&self, graph: &mut Graph, group: NodeId, _node: NodeId, _property: &str) -> Result<(), GraphError> {
        self.rebuild(graph, group)
    }

    /// A property of the group node itself changed
    fn property_changed(&self, _graph: &mut Graph, _group: NodeId, _property: &str) -> Result<(), GraphError> {
        Ok(())
    }
}

/// Match new inputs to existing per-input subgraphs so their member state
/// follows the input when inputs are reordered.
///
/// Subgraphs are matched by the node they adapt first, then by slot. Matched
/// subgraphs are rebound, the rest are created; unclaimed ones are destroyed
/// after the fan-in is reconnected.
pub fn set_inputs_with_reordering(
    behavior: &dyn GroupBehavior,
    graph: &mut Graph,
    group: NodeId,
    new: &[NodeId],
) -> Result<(), GraphError> {
    let old_heads = graph.group_members(group)?.heads.clone();
    let old_inputs: Vec<Option<NodeId>> = old_heads
        .iter()
        .map(|&head| {
            graph
                .chain_adaptor(head)
                .and_then(|a| graph.node(a))
                .and_then(|a| a.adapted_input())
        })
        .collect();

    let mut claimed = vec![false; old_heads.len()];
    let mut assignment: Vec<Option<usize>> = vec![None; new.len()];

    for (slot, input) in new.iter().enumerate() {
        let found = (0..old_heads.len()).find(|&i| !claimed[i] && old_inputs[i] == Some(*input));
        if let Some(i) = found {
            claimed[i] = true;
            assignment[slot] = Some(i);
        }
    }
    for (slot, matched) in assignment.iter_mut().enumerate() {
        if matched.is_none() && slot < old_heads.len() && !claimed[slot] {
            claimed[slot] = true;
            *matched = Some(slot);
        }
    }

    let mut heads = Vec::with_capacity(new.len());
    let mut created = Vec::new();
    let mut built = Ok(());
    for (slot, (&input, matched)) in new.iter().zip(&assignment).enumerate() {
        let head = match matched {
            Some(i) => {
                let head = old_heads[*i];
                behavior
                    .modify_subgraph_for_input(graph, group, slot, input, head)
                    .map(|()| head)
            }
            None => behavior.new_subgraph_for_input(graph, group, slot, input).inspect(|&head| created.push(head)),
        };
        match head {
            Ok(head) => heads.push(head),
            Err(err) => {
                built = Err(err);
                break;
            }
        }
    }
    if let Err(err) = built.and_then(|()| behavior.connect_fan_in(graph, group, &heads)) {
        for head in created {
            graph.destroy_subgraph(head)?;
        }
        return Err(err);
    }
    for (&head, _) in old_heads.iter().zip(&claimed).filter(|(_, taken)| !**taken) {
        graph.destroy_subgraph(head)?;
    }
    graph.group_members_mut(group)?.heads = heads;
    Ok(())
}

pub(crate) fn group_root(node: NodeRef<'_>) -> Option<NodeId> {
    node.node().members().and_then(Members::root)
}

/// Evaluates a group as its root member
#[derive(Debug, Default)]
pub struct GroupProcessor;

impl Processor for GroupProcessor {
    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        match group_root(node) {
            Some(root) => node.graph().evaluate_node(root, context),
            None => ImageDescription::no_image(node.name(), EMPTY_GROUP),
        }
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        match group_root(node) {
            Some(root) => node.graph().evaluate_node_identifier(root, context),
            None => ImageId::no_image(node.name(), EMPTY_GROUP),
        }
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        group_root(node).map_or_else(ImageRangeInfo::empty, |root| node.graph().image_range_info(root))
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        if let Some(root) = group_root(node) {
            node.graph().meta_evaluate_node(root, context, visitor);
        }
    }
}

impl Graph {
    /// Members of a group
    pub fn group_members(&self, group: NodeId) -> Result<&Members, GraphError> {
        let node = self.node_checked(group)?;
        node.members
            .as_ref()
            .ok_or_else(|| GraphError::NotAGroup(node.name.clone()))
    }

    pub(crate) fn group_members_mut(&mut self, group: NodeId) -> Result<&mut Members, GraphError> {
        let node = self.node_mut_checked(group)?;
        match node.members.as_mut() {
            Some(members) => Ok(members),
            None => Err(GraphError::NotAGroup(node.name.clone())),
        }
    }

    /// Structural logic of a group
    pub fn group_behavior(&self, group: NodeId) -> Result<Arc<dyn GroupBehavior>, GraphError> {
        self.group_members(group).map(Members::behavior)
    }

    /// Find a member by full name or by the stem after `<group>_`
    pub fn find_member(&self, group: NodeId, name: &str) -> Option<NodeId> {
        let members = self.group_members(group).ok()?;
        let name = naming::canonical_name(name);
        if let Some(&id) = members.nodes.get(name) {
            return Some(id);
        }
        let group_name = self.node_name(group)?;
        members.nodes.get(&format!("{group_name}_{name}")).copied()
    }

    pub(crate) fn initialize_group(&mut self, id: NodeId) -> Result<(), GraphError> {
        let Some(behavior) = self.store.get(id).and_then(|n| n.members.as_ref()).map(Members::behavior) else {
            return Ok(());
        };
        behavior.build(self, id)
    }

    /// Create a member named `<group>_<stem>`, unique within the group
    pub fn new_member_node(&mut self, group: NodeId, type_name: &str, stem: &str) -> Result<NodeId, GraphError> {
        let group_name = self.node_checked(group)?.name.clone();
        let taken = &self.group_members(group)?.nodes;
        let name = naming::unique_name(&format!("{group_name}_{stem}"), |n| taken.contains_key(n));

        let node = build_node(&self.manager, &self.media, type_name, name.clone(), Some(group))?;
        let id = self.store.insert(node);
        self.group_members_mut(group)?.nodes.insert(name.clone(), id);

        if let Err(err) = self.initialize_group(id) {
            self.destroy(id);
            return Err(err);
        }
        tracing::trace!("Created member {} ({}) in {}", name, type_name, group_name);
        Ok(id)
    }

    /// Create an adaptor member standing in for `input`
    pub fn new_adaptor(&mut self, group: NodeId, input: Option<NodeId>) -> Result<NodeId, GraphError> {
        let id = self.new_member_node(group, ADAPTOR_TYPE, "adaptor")?;
        self.node_mut_checked(id)?.adapted_input = input;
        Ok(id)
    }

    /// Point an adaptor at another external node
    pub fn rebind_adaptor(&mut self, adaptor: NodeId, input: Option<NodeId>) -> Result<(), GraphError> {
        let node = self.node_mut_checked(adaptor)?;
        if node.adapted_input != input {
            node.adapted_input = input;
            self.flush_all_caches(&FlushContext::new(adaptor));
        }
        Ok(())
    }

    /// Adaptor at the upstream end of a member chain, following first inputs
    pub fn chain_adaptor(&self, head: NodeId) -> Option<NodeId> {
        let mut current = head;
        for _ in 0..=self.store.len() {
            let node = self.store.get(current)?;
            if node.type_name() == ADAPTOR_TYPE {
                return Some(current);
            }
            current = *node.inputs.first()?;
        }
        None
    }

    /// Replace the inputs of a member
    pub fn connect_member(&mut self, id: NodeId, inputs: Vec<NodeId>) -> Result<(), GraphError> {
        let node = self.node_checked(id)?;
        if node.group.is_none() {
            return Err(GraphError::Internal(format!("{} is not a group member", node.name)));
        }
        self.connect_inputs(id, inputs)
    }

    fn member_group(&self, id: NodeId) -> Result<NodeId, GraphError> {
        let node = self.node_checked(id)?;
        node.group.ok_or_else(|| {
            tracing::error!("{} is not a group member", node.name);
            GraphError::Internal(format!("{} is not a group member", node.name))
        })
    }

    /// Destroy one member
    pub fn destroy_member(&mut self, id: NodeId) -> Result<(), GraphError> {
        let group = self.member_group(id)?;
        self.destroy(id);
        self.flush_all_caches(&FlushContext::new(group));
        Ok(())
    }

    /// Destroy a member and every member upstream of it in the same group
    pub fn destroy_subgraph(&mut self, head: NodeId) -> Result<(), GraphError> {
        let group = self.member_group(head)?;
        let mut doomed = Vec::new();
        let mut stack = vec![head];
        while let Some(id) = stack.pop() {
            if doomed.contains(&id) {
                continue;
            }
            if let Some(node) = self.store.get(id).filter(|n| n.group == Some(group)) {
                doomed.push(id);
                stack.extend(node.inputs.iter().copied());
            }
        }
        for id in doomed {
            self.destroy(id);
        }
        self.flush_all_caches(&FlushContext::new(group));
        Ok(())
    }

    /// Set the member a group evaluates as
    pub fn set_group_root(&mut self, group: NodeId, root: Option<NodeId>) -> Result<(), GraphError> {
        self.group_members_mut(group)?.root = root;
        self.flush_all_caches(&FlushContext::new(group));
        Ok(())
    }

    /// Set the member combining per-input subgraphs
    pub fn set_group_fan_in(&mut self, group: NodeId, fan_in: Option<NodeId>) -> Result<(), GraphError> {
        self.group_members_mut(group)?.fan_in = fan_in;
        Ok(())
    }

    /// Record a pipeline group's processing chain
    pub fn set_group_chain(&mut self, group: NodeId, chain: Vec<NodeId>) -> Result<(), GraphError> {
        self.group_members_mut(group)?.chain = chain;
        Ok(())
    }

    /// Copy `from` onto `to`, which must have the same type.
    ///
    /// Group properties go first since they may rebuild the subgraph; then
    /// members are copied from the root upstream for as long as the member
    /// types line up.
    pub fn copy_node(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        let source = self.node_checked(from)?;
        let target = self.node_checked(to)?;
        if source.type_name() != target.type_name() {
            return Err(GraphError::IncompatibleTypes {
                from: source.name.clone(),
                to: target.name.clone(),
            });
        }
        let source_root = source.members.as_ref().and_then(Members::root);

        self.copy_node_properties(from, to)?;
        let target_root = self.group_members(to).ok().and_then(Members::root);
        if let (Some(a), Some(b)) = (source_root, target_root) {
            self.copy_member_chain(a, b)?;
        }
        Ok(())
    }

    fn copy_member_chain(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        if self.node_checked(from)?.type_name() != self.node_checked(to)?.type_name() {
            return Ok(());
        }
        self.copy_node(from, to)?;
        let pairs: Vec<(NodeId, NodeId)> = self
            .node_checked(from)?
            .inputs
            .iter()
            .copied()
            .zip(self.node_checked(to)?.inputs.iter().copied())
            .collect();
        for (a, b) in pairs {
            self.copy_member_chain(a, b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_stay_out_of_name_space() {
        let mut graph = Graph::with_builtins().unwrap();
        let group = graph.new_node("ColorPipelineGroup", "").unwrap();
        let members = graph.group_members(group).unwrap();
        assert!(!members.is_empty());

        for (name, _) in members.nodes() {
            assert!(name.starts_with("colorPipelineGroup_"));
            assert_eq!(graph.find_node(name), None);
        }
    }

    #[test]
    fn test_find_member_by_stem() {
        let mut graph = Graph::with_builtins().unwrap();
        let group = graph.new_node("ColorPipelineGroup", "").unwrap();
        let adaptor = graph.find_member(group, "adaptor").unwrap();
        assert_eq!(graph.node(adaptor).unwrap().type_name(), ADAPTOR_TYPE);
        assert_eq!(graph.find_member(group, "colorPipelineGroup_adaptor"), Some(adaptor));
    }

    #[test]
    fn test_member_edits_go_through_group() {
        let mut graph = Graph::with_builtins().unwrap();
        let group = graph.new_node("ColorPipelineGroup", "").unwrap();
        let member = graph.group_members(group).unwrap().chain()[0];

        assert!(matches!(graph.set_inputs(member, &[]), Err(GraphError::MemberNode(_))));
        assert!(matches!(graph.delete_node(member), Err(GraphError::MemberNode(_))));
        assert!(matches!(graph.set_view_node(Some(member)), Err(GraphError::MemberNode(_))));
    }

    #[test]
    fn test_members_cannot_take_outer_inputs() {
        let mut graph = Graph::with_builtins().unwrap();
        let outer = graph.new_node("FileSource", "").unwrap();
        let group = graph.new_node("ColorPipelineGroup", "").unwrap();
        let member = graph.group_members(group).unwrap().chain()[0];

        let err = graph.connect_member(member, vec![outer]).unwrap_err();
        assert!(matches!(err, GraphError::GroupMismatch { .. }));
    }

    #[test]
    fn test_delete_group_destroys_members() {
        let mut graph = Graph::with_builtins().unwrap();
        let group = graph.new_node("StackGroup", "").unwrap();
        let members = graph.group_members(group).unwrap().ids();
        graph.delete_node(group).unwrap();
        for member in members {
            assert!(graph.node(member).is_none());
        }
    }

    #[test]
    fn test_copy_node_follows_members() {
        let mut graph = Graph::with_builtins().unwrap();
        let a = graph.new_node("ColorPipelineGroup", "").unwrap();
        graph
            .set_property(a, "pipeline.nodes", vec!["ColorExposure".to_string(), "Color".to_string()])
            .unwrap();
        let exposure = graph.group_members(a).unwrap().chain()[0];
        graph.set_property(exposure, "color.exposure", vec![2.0f32]).unwrap();

        let b = graph.new_node("ColorPipelineGroup", "").unwrap();
        graph.copy_node(a, b).unwrap();
        let chain = graph.group_members(b).unwrap().chain().to_vec();
        assert_eq!(chain.len(), 2);
        assert_eq!(
            graph.node(chain[0]).unwrap().properties().front_or("color.exposure", 0.0f32),
            2.0
        );

        let other = graph.new_node("Switch", "").unwrap();
        assert!(matches!(graph.copy_node(a, other), Err(GraphError::IncompatibleTypes { .. })));
    }

    #[test]
    fn test_group_without_inputs_has_no_image() {
        let mut graph = Graph::with_builtins().unwrap();
        let group = graph.new_node("StackGroup", "").unwrap();
        let context = Context::default();
        let image = graph.evaluate_node(group, &context);
        assert!(image.is_no_image());
        assert_eq!(
            graph.evaluate_node_identifier(group, &context),
            graph.evaluate_node_identifier(group, &context.with_frame(9))
        );
    }
}
