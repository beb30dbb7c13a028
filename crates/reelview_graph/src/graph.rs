// SPDX-License-Identifier: MIT OR Apache-2.0
//! The processing graph.
//!
//! A [`Graph`] owns every node, top-level and group member alike, in a
//! generational store. It keeps input and output lists consistent, rejects
//! edits that would create cycles, manages the view node and the display and
//! output groups hanging off the root, and is the entry point for evaluation.

use crate::context::Context;
use crate::definition::{NodeManager, NodeSpec};
use crate::device::DeviceDescriptor;
use crate::group::Members;
use crate::image::{ImageDescription, ImageId};
use crate::media::MediaRegistry;
use crate::naming;
use crate::node::{ImageRangeInfo, MetaEvalVisitor, Node, NodeRef, Processor, ProcessorEnv};
use crate::property::{
    Property, PropertyContainer, PropertyElement, PropertyError, PropertyInfo, PropertyValue,
};
use crate::store::{NodeId, NodeStore};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Name of the root node
pub const ROOT_NODE_NAME: &str = "root";

/// Name of the display group created with every graph
pub const DEFAULT_DISPLAY_GROUP: &str = "displayGroup";

const DEFAULT_FPS: f32 = 24.0;

/// Errors from graph edits
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// No definition registered for a type
    #[error("Unknown node type: {0}")]
    UnknownType(String),

    /// No node with this name
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Handle refers to a destroyed node
    #[error("Stale node handle: {0:?}")]
    StaleNode(NodeId),

    /// Connecting `input` to `node` would close a loop
    #[error("{input} would cause a cycle in {node}")]
    Cycle {
        /// Node being connected
        node: String,
        /// Offending input
        input: String,
    },

    /// Input limit exceeded
    #[error("{node} accepts no more than {max} inputs")]
    TooManyInputs {
        /// Node being connected
        node: String,
        /// Its limit
        max: usize,
    },

    /// Input lives in another scope
    #[error("{input} is not in the same group as {node}")]
    GroupMismatch {
        /// Node being connected
        node: String,
        /// Offending input
        input: String,
    },

    /// Group members are edited through their group
    #[error("{0} is a group member and cannot be edited directly")]
    MemberNode(String),

    /// Root, display and output groups cannot be removed
    #[error("{0} is protected")]
    Protected(String),

    /// Operation needs a live node
    #[error("{0} is isolated")]
    Isolated(String),

    /// Operation needs an isolated node
    #[error("{0} is not isolated")]
    NotIsolated(String),

    /// Operation needs a group node
    #[error("{0} is not a group")]
    NotAGroup(String),

    /// Copy between nodes of different types
    #[error("Cannot copy {from} onto {to}: types differ")]
    IncompatibleTypes {
        /// Source node
        from: String,
        /// Destination node
        to: String,
    },

    /// Property access failed
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// Invariant violated inside a group implementation
    #[error("Internal graph error: {0}")]
    Internal(String),
}

/// Change notifications delivered to observers
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A node was created
    NodeCreated {
        /// Node name
        node: String,
        /// Node type
        type_name: String,
    },
    /// A node was destroyed for good
    NodeDeleted {
        /// Node name
        node: String,
    },
    /// A node was removed but kept for undo
    NodeIsolated {
        /// Node name
        node: String,
    },
    /// An isolated node was put back
    NodeRestored {
        /// Node name
        node: String,
    },
    /// A node's inputs changed
    InputsChanged {
        /// Node name
        node: String,
    },
    /// A property was declared on a live node
    PropertyCreated {
        /// Node name
        node: String,
        /// Qualified property name
        property: String,
    },
    /// A property value changed
    PropertyChanged {
        /// Node name
        node: String,
        /// Qualified property name
        property: String,
    },
    /// A property was removed
    PropertyDeleted {
        /// Node name
        node: String,
        /// Qualified property name
        property: String,
    },
    /// A group restructured its subgraph
    GraphEdited {
        /// Group name
        group: String,
    },
    /// The view node changed
    ViewNodeChanged {
        /// New view node name
        node: Option<String>,
    },
}

/// Callback receiving graph events
pub type GraphObserver = Box<dyn Fn(&GraphEvent) + Send + Sync>;

/// Where a cache flush starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushContext {
    /// Node whose output changed
    pub start: NodeId,
}

impl FlushContext {
    /// Flush downstream of `start`
    pub fn new(start: NodeId) -> Self {
        Self { start }
    }
}

#[derive(Debug, Clone)]
struct Isolation {
    inputs: Vec<NodeId>,
    outputs: Vec<(NodeId, usize)>,
    was_view: bool,
    references: usize,
}

pub(crate) fn build_node(
    manager: &NodeManager,
    media: &MediaRegistry,
    type_name: &str,
    name: String,
    group: Option<NodeId>,
) -> Result<Node, GraphError> {
    let definition = manager
        .definition(type_name)
        .ok_or_else(|| GraphError::UnknownType(type_name.to_string()))?;
    let NodeSpec {
        mut processor,
        mut properties,
        max_inputs,
        unconstrained_inputs,
        group: behavior,
    } = definition.instantiate()?;
    processor.refresh(&properties, &ProcessorEnv { media });
    publish_outputs(processor.as_ref(), &mut properties);

    Ok(Node {
        name,
        definition,
        inputs: Vec::new(),
        outputs: Vec::new(),
        group,
        properties,
        processor,
        max_inputs,
        unconstrained_inputs,
        members: behavior.map(Members::new),
        adapted_input: None,
        protected: false,
        isolated: false,
    })
}

fn publish_outputs(processor: &dyn Processor, properties: &mut PropertyContainer) {
    for (name, value) in processor.output_properties() {
        if let Err(err) = properties.set_value(name, value) {
            tracing::warn!("Could not publish {}: {}", name, err);
        }
    }
}

/// Node graph with evaluation
pub struct Graph {
    pub(crate) manager: Arc<NodeManager>,
    pub(crate) media: Arc<MediaRegistry>,
    pub(crate) store: NodeStore<Node>,
    names: IndexMap<String, NodeId>,
    isolated: IndexMap<NodeId, Isolation>,
    root: NodeId,
    targets: Vec<NodeId>,
    view: Option<NodeId>,
    fps: f32,
    observers: Vec<GraphObserver>,
}

impl Graph {
    /// Create a graph with a root node and one unbound display group
    pub fn new(manager: Arc<NodeManager>, media: Arc<MediaRegistry>) -> Result<Self, GraphError> {
        let mut store = NodeStore::new();
        let mut root_node = build_node(&manager, &media, "Root", ROOT_NODE_NAME.to_string(), None)?;
        root_node.protected = true;
        let root = store.insert(root_node);

        let mut names = IndexMap::new();
        names.insert(ROOT_NODE_NAME.to_string(), root);

        let mut graph = Self {
            manager,
            media,
            store,
            names,
            isolated: IndexMap::new(),
            root,
            targets: Vec::new(),
            view: None,
            fps: DEFAULT_FPS,
            observers: Vec::new(),
        };
        graph.new_target("DisplayGroup", DEFAULT_DISPLAY_GROUP, None)?;
        Ok(graph)
    }

    /// Graph with every built-in node type and the procedural reader
    pub fn with_builtins() -> Result<Self, GraphError> {
        Self::new(
            Arc::new(NodeManager::with_builtin_nodes()),
            Arc::new(MediaRegistry::with_builtin_readers()),
        )
    }

    /// Node definitions
    pub fn manager(&self) -> &Arc<NodeManager> {
        &self.manager
    }

    /// Media readers
    pub fn media(&self) -> &Arc<MediaRegistry> {
        &self.media
    }

    /// Register a change observer
    pub fn add_observer(&mut self, observer: impl Fn(&GraphEvent) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub(crate) fn emit(&self, event: GraphEvent) {
        for observer in &self.observers {
            observer(&event);
        }
    }

    /// Root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Display and output groups feeding the root
    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    /// Display group created with the graph
    pub fn default_display_group(&self) -> NodeId {
        self.targets.first().copied().unwrap_or(self.root)
    }

    /// Rate used when the view node has none
    pub fn set_default_fps(&mut self, fps: f32) {
        self.fps = fps;
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Borrow a node, isolated or not
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.store.get(id)
    }

    /// Read-only evaluation view of a node
    pub fn node_ref(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.store.get(id).map(|node| NodeRef::new(self, id, node))
    }

    pub(crate) fn node_checked(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.store.get(id).ok_or(GraphError::StaleNode(id))
    }

    pub(crate) fn node_mut_checked(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.store.get_mut(id).ok_or(GraphError::StaleNode(id))
    }

    /// Whether `id` refers to a node that is neither destroyed nor isolated
    pub fn is_live(&self, id: NodeId) -> bool {
        self.store.get(id).is_some_and(|n| !n.isolated)
    }

    /// Whether `id` refers to an isolated node
    pub fn is_isolated(&self, id: NodeId) -> bool {
        self.isolated.contains_key(&id)
    }

    /// Name of a node
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.store.get(id).map(Node::name)
    }

    /// Find a live top-level node by (canonicalized) name
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.names.get(naming::canonical_name(name)).copied()
    }

    /// Find a top-level node by name even while it is isolated
    pub fn find_node_possibly_isolated(&self, name: &str) -> Option<NodeId> {
        let name = naming::canonical_name(name);
        self.find_node(name).or_else(|| {
            self.isolated
                .keys()
                .copied()
                .find(|&id| self.node_name(id) == Some(name))
        })
    }

    /// Live top-level nodes of a type
    pub fn find_nodes_by_type(&self, type_name: &str) -> Vec<NodeId> {
        self.nodes()
            .filter(|&id| self.store.get(id).is_some_and(|n| n.type_name() == type_name))
            .collect()
    }

    /// Live top-level nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.names.values().copied()
    }

    /// Number of live top-level nodes
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Every stored node, members and isolated nodes included
    pub fn all_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.store.iter()
    }

    /// Top-level edges as `(input, node)` pairs
    pub fn connections(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes()
            .filter_map(|id| self.store.get(id).map(|n| (id, n)))
            .flat_map(|(id, n)| n.inputs.iter().map(move |&input| (input, id)))
            .collect()
    }

    /// Live top-level nodes ordered so every node follows its inputs
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut visited = HashSet::new();
        let mut temp_mark = HashSet::new();
        let mut order = Vec::new();

        for id in self.nodes() {
            if !visited.contains(&id) {
                self.visit(id, &mut visited, &mut temp_mark, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit(
        &self,
        id: NodeId,
        visited: &mut HashSet<NodeId>,
        temp_mark: &mut HashSet<NodeId>,
        order: &mut Vec<NodeId>,
    ) -> Result<(), GraphError> {
        if temp_mark.contains(&id) {
            let name = self.node_name(id).unwrap_or_default().to_string();
            return Err(GraphError::Cycle {
                node: name.clone(),
                input: name,
            });
        }
        if visited.contains(&id) {
            return Ok(());
        }

        temp_mark.insert(id);
        let inputs = self.store.get(id).map(|n| n.inputs.clone()).unwrap_or_default();
        for input in inputs {
            self.visit(input, visited, temp_mark, order)?;
        }
        temp_mark.remove(&id);
        visited.insert(id);
        order.push(id);

        Ok(())
    }

    // ------------------------------------------------------------------
    // Node lifetime
    // ------------------------------------------------------------------

    fn unique_name(&self, name: &str) -> String {
        naming::unique_name(name, |candidate| {
            self.names.contains_key(candidate)
                || self
                    .isolated
                    .keys()
                    .any(|&id| self.node_name(id) == Some(candidate))
        })
    }

    /// Create a top-level node. An empty name uses the type's default name;
    /// taken names get a counter.
    pub fn new_node(&mut self, type_name: &str, name: &str) -> Result<NodeId, GraphError> {
        let definition = self
            .manager
            .definition(type_name)
            .ok_or_else(|| GraphError::UnknownType(type_name.to_string()))?;
        let requested = if name.is_empty() { definition.default_name() } else { name };
        let name = self.unique_name(requested);

        let node = build_node(&self.manager, &self.media, type_name, name.clone(), None)?;
        let id = self.store.insert(node);
        self.names.insert(name.clone(), id);

        if let Err(err) = self.initialize_group(id) {
            tracing::warn!("Failed to build group {}: {}", name, err);
            self.destroy(id);
            return Err(err);
        }

        tracing::debug!("Created {} node {}", type_name, name);
        self.emit(GraphEvent::NodeCreated {
            node: name,
            type_name: type_name.to_string(),
        });
        Ok(id)
    }

    fn new_target(
        &mut self,
        type_name: &str,
        name: &str,
        device: Option<&DeviceDescriptor>,
    ) -> Result<NodeId, GraphError> {
        let id = self.new_node(type_name, name)?;
        self.node_mut_checked(id)?.protected = true;
        if let Some(device) = device {
            self.bind_device(id, device)?;
        }
        self.targets.push(id);
        self.connect_inputs(self.root, self.targets.clone())?;
        if let Some(view) = self.view {
            self.connect_inputs(id, vec![view])?;
        }
        Ok(id)
    }

    /// Add a display group bound to `device`, fed by the view node
    pub fn add_display_group(&mut self, device: &DeviceDescriptor) -> Result<NodeId, GraphError> {
        self.new_target("DisplayGroup", "displayGroup", Some(device))
    }

    /// Add an output group bound to `device`, fed by the view node
    pub fn add_output_group(&mut self, device: &DeviceDescriptor) -> Result<NodeId, GraphError> {
        self.new_target("OutputGroup", "outputGroup", Some(device))
    }

    /// Bind a display or output group to a device
    pub fn bind_device(&mut self, group: NodeId, device: &DeviceDescriptor) -> Result<(), GraphError> {
        let width = i32::try_from(device.width).unwrap_or(i32::MAX);
        let height = i32::try_from(device.height).unwrap_or(i32::MAX);
        self.set_property(group, "device.name", vec![device.name.clone()])?;
        self.set_property(group, "device.width", vec![width])?;
        self.set_property(group, "device.height", vec![height])?;
        tracing::info!(
            "Bound {} to device {} ({}x{})",
            self.node_name(group).unwrap_or_default(),
            device.name,
            device.width,
            device.height
        );
        Ok(())
    }

    /// Destroy a top-level node for good, disconnecting it first
    pub fn delete_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node_checked(id)?;
        let name = node.name.clone();
        if node.group.is_some() {
            return Err(GraphError::MemberNode(name));
        }
        if node.protected {
            return Err(GraphError::Protected(name));
        }

        if !node.isolated {
            if self.view == Some(id) {
                self.set_view_node(None)?;
            }
            let mut outputs: Vec<NodeId> = self.output_slots(id).into_iter().map(|(o, _)| o).collect();
            outputs.dedup();
            for output in outputs {
                let remaining = self.inputs_without(output, id);
                self.connect_inputs(output, remaining)?;
            }
            self.connect_inputs(id, Vec::new())?;
        }

        self.destroy(id);
        tracing::debug!("Deleted node {}", name);
        self.emit(GraphEvent::NodeDeleted { node: name });
        Ok(())
    }

    /// Free a node and its members without running group logic. Callers
    /// disconnect anything that must be rewired first.
    pub(crate) fn destroy(&mut self, id: NodeId) {
        let Some(node) = self.store.get(id) else {
            return;
        };
        let members: Vec<NodeId> = node
            .members
            .as_ref()
            .map(|m| m.nodes.values().copied().collect())
            .unwrap_or_default();
        for member in members {
            self.destroy(member);
        }

        let Some(node) = self.store.remove(id) else {
            return;
        };
        for input in &node.inputs {
            if let Some(upstream) = self.store.get_mut(*input) {
                if let Some(pos) = upstream.outputs.iter().position(|&o| o == id) {
                    upstream.outputs.remove(pos);
                }
            }
        }
        for output in &node.outputs {
            if let Some(downstream) = self.store.get_mut(*output) {
                downstream.inputs.retain(|&i| i != id);
            }
        }

        if self.names.get(&node.name) == Some(&id) {
            self.names.shift_remove(&node.name);
        }
        self.isolated.shift_remove(&id);
        if self.view == Some(id) {
            self.view = None;
        }
        if let Some(group) = node.group {
            if let Some(members) = self.store.get_mut(group).and_then(|g| g.members.as_mut()) {
                members.forget(id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Every `(downstream, slot)` pair `id` occupies, slots ascending per node
    fn output_slots(&self, id: NodeId) -> Vec<(NodeId, usize)> {
        let mut downstream: Vec<NodeId> = Vec::new();
        for &output in self.store.get(id).map(Node::outputs).unwrap_or_default() {
            if !downstream.contains(&output) {
                downstream.push(output);
            }
        }

        let mut slots = Vec::new();
        for output in downstream {
            let Some(node) = self.store.get(output) else {
                continue;
            };
            slots.extend(
                node.inputs
                    .iter()
                    .enumerate()
                    .filter(|&(_, &i)| i == id)
                    .map(|(index, _)| (output, index)),
            );
        }
        slots
    }

    fn inputs_without(&self, node: NodeId, removed: NodeId) -> Vec<NodeId> {
        self.store
            .get(node)
            .map(|n| n.inputs.iter().copied().filter(|&i| i != removed).collect())
            .unwrap_or_default()
    }

    fn is_upstream(&self, target: NodeId, from: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.store.get(id) {
                stack.extend(node.inputs.iter().copied());
                stack.extend(node.adapted_input);
            }
        }
        false
    }

    /// Check whether `inputs` would be accepted by [`Graph::set_inputs`]
    pub fn test_inputs(&self, id: NodeId, inputs: &[NodeId]) -> Result<(), GraphError> {
        let node = self.node_checked(id)?;
        if node.isolated {
            return Err(GraphError::Isolated(node.name.clone()));
        }
        if let Some(max) = node.max_inputs {
            if inputs.len() > max {
                return Err(GraphError::TooManyInputs {
                    node: node.name.clone(),
                    max,
                });
            }
        }

        for &input in inputs {
            let upstream = self.node_checked(input)?;
            if upstream.isolated {
                return Err(GraphError::Isolated(upstream.name.clone()));
            }
            if !node.unconstrained_inputs && upstream.group != node.group {
                return Err(GraphError::GroupMismatch {
                    node: node.name.clone(),
                    input: upstream.name.clone(),
                });
            }
            if self.is_upstream(id, input) {
                return Err(GraphError::Cycle {
                    node: node.name.clone(),
                    input: upstream.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Replace the inputs of a top-level node
    pub fn set_inputs(&mut self, id: NodeId, inputs: &[NodeId]) -> Result<(), GraphError> {
        let node = self.node_checked(id)?;
        if node.group.is_some() {
            return Err(GraphError::MemberNode(node.name.clone()));
        }
        self.connect_inputs(id, inputs.to_vec())
    }

    pub(crate) fn connect_inputs(&mut self, id: NodeId, inputs: Vec<NodeId>) -> Result<(), GraphError> {
        self.test_inputs(id, &inputs)?;
        let old = self.node_checked(id)?.inputs.clone();
        if old == inputs {
            return Ok(());
        }

        self.rewire(id, &old, &inputs)?;
        let node = self.node_checked(id)?;
        let name = node.name.clone();
        let behavior = node.members.as_ref().map(Members::behavior);

        if let Some(behavior) = behavior {
            if let Err(err) = behavior.set_inputs(self, id, &old, &inputs) {
                self.rewire(id, &inputs, &old)?;
                if let Err(rebuild) = behavior.set_inputs(self, id, &inputs, &old) {
                    tracing::warn!("Could not rebuild members of {}: {}", name, rebuild);
                }
                self.flush_all_caches(&FlushContext::new(id));
                return Err(err);
            }
        }

        self.flush_all_caches(&FlushContext::new(id));
        tracing::trace!("Inputs of {} now {:?}", name, inputs);
        self.emit(GraphEvent::InputsChanged { node: name });
        Ok(())
    }

    /// Swap the edge lists of `id` from `old` to `new` on both ends
    fn rewire(&mut self, id: NodeId, old: &[NodeId], new: &[NodeId]) -> Result<(), GraphError> {
        for input in old {
            if let Some(upstream) = self.store.get_mut(*input) {
                if let Some(pos) = upstream.outputs.iter().position(|&o| o == id) {
                    upstream.outputs.remove(pos);
                }
            }
        }
        for input in new {
            if let Some(upstream) = self.store.get_mut(*input) {
                upstream.outputs.push(id);
            }
        }
        self.node_mut_checked(id)?.inputs = new.to_vec();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Isolation
    // ------------------------------------------------------------------

    /// Disconnect a top-level node and hide it from lookup, remembering its
    /// connections so it can be restored. The caller holds one reference.
    pub fn isolate_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node_checked(id)?;
        let name = node.name.clone();
        if node.group.is_some() {
            return Err(GraphError::MemberNode(name));
        }
        if node.protected {
            return Err(GraphError::Protected(name));
        }
        if node.isolated {
            return Err(GraphError::Isolated(name));
        }
        let inputs = node.inputs.clone();

        let was_view = self.view == Some(id);
        if was_view {
            self.set_view_node(None)?;
        }

        let outputs = self.output_slots(id);
        let mut downstream: Vec<NodeId> = outputs.iter().map(|&(o, _)| o).collect();
        downstream.dedup();
        for output in downstream {
            let remaining = self.inputs_without(output, id);
            self.connect_inputs(output, remaining)?;
        }
        self.connect_inputs(id, Vec::new())?;

        self.names.shift_remove(&name);
        self.node_mut_checked(id)?.isolated = true;
        self.isolated.insert(
            id,
            Isolation {
                inputs,
                outputs,
                was_view,
                references: 1,
            },
        );

        tracing::debug!("Isolated node {}", name);
        self.emit(GraphEvent::NodeIsolated { node: name });
        Ok(())
    }

    /// Reconnect an isolated node to whatever of its old neighbors still exists
    pub fn restore_isolated_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let name = self.node_checked(id)?.name.clone();
        let record = self
            .isolated
            .shift_remove(&id)
            .ok_or_else(|| GraphError::NotIsolated(name.clone()))?;

        self.node_mut_checked(id)?.isolated = false;
        self.names.insert(name.clone(), id);

        let inputs: Vec<NodeId> = record.inputs.into_iter().filter(|&i| self.is_live(i)).collect();
        if let Err(err) = self.connect_inputs(id, inputs) {
            tracing::warn!("Could not restore inputs of {}: {}", name, err);
        }
        let mut downstream: Vec<NodeId> = record.outputs.iter().map(|&(o, _)| o).collect();
        downstream.dedup();
        for output in downstream {
            if !self.is_live(output) {
                continue;
            }
            let mut inputs = self.node_checked(output)?.inputs.clone();
            for &(_, index) in record.outputs.iter().filter(|(o, _)| *o == output) {
                inputs.insert(index.min(inputs.len()), id);
            }
            if let Err(err) = self.connect_inputs(output, inputs) {
                tracing::warn!("Could not reconnect {} to {}: {}", name, self.node_name(output).unwrap_or_default(), err);
            }
        }
        if record.was_view {
            self.set_view_node(Some(id))?;
        }

        tracing::debug!("Restored node {}", name);
        self.emit(GraphEvent::NodeRestored { node: name });
        Ok(())
    }

    /// Take another reference to an isolated node
    pub fn retain_isolated(&mut self, id: NodeId) -> Result<(), GraphError> {
        let name = self.node_checked(id)?.name.clone();
        let record = self.isolated.get_mut(&id).ok_or(GraphError::NotIsolated(name))?;
        record.references += 1;
        Ok(())
    }

    /// Drop a reference to an isolated node; the last one destroys it.
    /// Returns whether the node was destroyed.
    pub fn release_isolated(&mut self, id: NodeId) -> Result<bool, GraphError> {
        let name = self.node_checked(id)?.name.clone();
        let record = self
            .isolated
            .get_mut(&id)
            .ok_or_else(|| GraphError::NotIsolated(name.clone()))?;
        record.references = record.references.saturating_sub(1);
        if record.references > 0 {
            return Ok(false);
        }

        self.destroy(id);
        tracing::debug!("Destroyed isolated node {}", name);
        self.emit(GraphEvent::NodeDeleted { node: name });
        Ok(true)
    }

    /// Outstanding references to an isolated node
    pub fn isolation_references(&self, id: NodeId) -> usize {
        self.isolated.get(&id).map_or(0, |r| r.references)
    }

    // ------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------

    /// Node currently feeding the display and output groups
    pub fn view_node(&self) -> Option<NodeId> {
        self.view
    }

    /// Feed every display and output group from `id`
    pub fn set_view_node(&mut self, id: Option<NodeId>) -> Result<(), GraphError> {
        let name = match id {
            Some(id) => {
                let node = self.node_checked(id)?;
                if node.group.is_some() {
                    return Err(GraphError::MemberNode(node.name.clone()));
                }
                if node.isolated {
                    return Err(GraphError::Isolated(node.name.clone()));
                }
                if id == self.root || self.targets.contains(&id) {
                    return Err(GraphError::Protected(node.name.clone()));
                }
                Some(node.name.clone())
            }
            None => None,
        };

        let inputs: Vec<NodeId> = id.into_iter().collect();
        for target in self.targets.clone() {
            self.connect_inputs(target, inputs.clone())?;
        }
        self.view = id;
        tracing::debug!("View node is now {:?}", name);
        self.emit(GraphEvent::ViewNodeChanged { node: name });
        Ok(())
    }

    /// Range of the view node
    pub fn view_range(&self) -> ImageRangeInfo {
        self.view.map_or_else(ImageRangeInfo::empty, |v| self.image_range_info(v))
    }

    /// Top-level context for `frame`, using the view node's rate and the
    /// default display device's size
    pub fn context_for_frame(&self, frame: i32) -> Context {
        let range = self.view_range();
        let fps = if range.fps > 0.0 { range.fps } else { self.fps };
        let mut context = Context::new(frame, fps);
        if let Some(display) = self.store.get(self.default_display_group()) {
            let width = display.properties.front_or("device.width", 0i32);
            let height = display.properties.front_or("device.height", 0i32);
            if width > 0 && height > 0 {
                context.view_width = width.unsigned_abs();
                context.view_height = height.unsigned_abs();
            }
        }
        context
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Declare a property on a node, notifying observers if it is new
    pub fn declare_property(
        &mut self,
        id: NodeId,
        name: &str,
        default: PropertyValue,
        info: PropertyInfo,
    ) -> Result<(), GraphError> {
        let node = self.node_mut_checked(id)?;
        let created = !node.properties.contains(name);
        node.properties.declare_value(name, default, info)?;
        if created {
            let node_name = node.name.clone();
            self.refresh_processor(id, name)?;
            self.emit(GraphEvent::PropertyCreated {
                node: node_name,
                property: name.to_string(),
            });
        }
        Ok(())
    }

    /// Set a typed property value
    pub fn set_property<T: PropertyElement>(&mut self, id: NodeId, name: &str, values: Vec<T>) -> Result<(), GraphError> {
        self.set_property_value(id, name, T::into_value(values))
    }

    /// Set a property value and run everything that depends on it
    pub fn set_property_value(&mut self, id: NodeId, name: &str, value: PropertyValue) -> Result<(), GraphError> {
        let node = self.node_mut_checked(id)?;
        if node.properties.value(name) == Some(&value) {
            return Ok(());
        }
        node.properties.set_value(name, value)?;
        self.property_changed(id, name)
    }

    /// Current value of a property
    pub fn property_value(&self, id: NodeId, name: &str) -> Option<&PropertyValue> {
        self.store.get(id).and_then(|n| n.properties.value(name))
    }

    /// Remove a property, returning it
    pub fn delete_property(&mut self, id: NodeId, name: &str) -> Result<Property, GraphError> {
        let node = self.node_mut_checked(id)?;
        let property = node
            .properties
            .remove(name)
            .ok_or_else(|| PropertyError::NotFound(name.to_string()))?;
        let node_name = node.name.clone();
        self.refresh_processor(id, name)?;
        self.flush_all_caches(&FlushContext::new(id));
        self.emit(GraphEvent::PropertyDeleted {
            node: node_name,
            property: name.to_string(),
        });
        Ok(property)
    }

    /// Copy copyable properties of `from` onto `to`; returns the changed names
    pub fn copy_node_properties(&mut self, from: NodeId, to: NodeId) -> Result<Vec<String>, GraphError> {
        let source = self.node_checked(from)?.properties.clone();
        let changed = self.node_mut_checked(to)?.properties.copy_from(&source);
        for name in &changed {
            self.property_changed(to, name)?;
        }
        Ok(changed)
    }

    fn refresh_processor(&mut self, id: NodeId, name: &str) -> Result<(), GraphError> {
        let media = Arc::clone(&self.media);
        let node = self.node_mut_checked(id)?;
        node.processor
            .property_changed(&node.properties, name, &ProcessorEnv { media: &media });
        publish_outputs(node.processor.as_ref(), &mut node.properties);
        Ok(())
    }

    fn property_changed(&mut self, id: NodeId, name: &str) -> Result<(), GraphError> {
        self.refresh_processor(id, name)?;

        let node = self.node_checked(id)?;
        let info = node.properties.info(name).unwrap_or_default();
        let node_name = node.name.clone();
        let own_behavior = node.members.as_ref().map(Members::behavior);
        let parent = node.group;

        if let Some(behavior) = &own_behavior {
            behavior.property_changed(self, id, name)?;
        }

        if info.requires_graph_edit {
            let target = if own_behavior.is_some() { Some(id) } else { parent };
            if let Some(group) = target {
                let behavior = self.group_behavior(group)?;
                let group_name = self.node_name(group).unwrap_or_default().to_string();
                tracing::debug!("{}.{} restructures {}", node_name, name, group_name);
                behavior.graph_edit(self, group, id, name)?;
                self.emit(GraphEvent::GraphEdited { group: group_name });
            }
        }

        if !info.output_only {
            self.flush_all_caches(&FlushContext::new(id));
        }
        self.emit(GraphEvent::PropertyChanged {
            node: node_name,
            property: name.to_string(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Evaluate the root
    pub fn evaluate(&self, context: &Context) -> ImageDescription {
        self.evaluate_node(self.root, context)
    }

    /// Identifier of the root's result
    pub fn evaluate_identifier(&self, context: &Context) -> ImageId {
        self.evaluate_node_identifier(self.root, context)
    }

    /// Evaluate one node
    pub fn evaluate_node(&self, id: NodeId, context: &Context) -> ImageDescription {
        match self.store.get(id) {
            Some(node) => node.processor.evaluate(NodeRef::new(self, id, node), context),
            None => ImageDescription::error("", format!("stale node {id:?}")),
        }
    }

    /// Identifier of one node's result
    pub fn evaluate_node_identifier(&self, id: NodeId, context: &Context) -> ImageId {
        match self.store.get(id) {
            Some(node) => node
                .processor
                .evaluate_identifier(NodeRef::new(self, id, node), context),
            None => ImageId::error("", &format!("stale node {id:?}")),
        }
    }

    /// Frame range one node produces
    pub fn image_range_info(&self, id: NodeId) -> ImageRangeInfo {
        self.store.get(id).map_or_else(ImageRangeInfo::empty, |node| {
            node.processor.image_range_info(NodeRef::new(self, id, node))
        })
    }

    /// Walk the nodes an evaluation of `id` at `context` would reach
    pub fn meta_evaluate_node(&self, id: NodeId, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        if let Some(node) = self.store.get(id) {
            let node_ref = NodeRef::new(self, id, node);
            visitor.enter(node_ref, context);
            node.processor.meta_evaluate(node_ref, context, visitor);
            visitor.leave(node_ref, context);
        }
    }

    /// Nodes an evaluation of the root at `context` reaches, in visit order
    pub fn nodes_in_evaluation_path(&self, context: &Context) -> Vec<NodeId> {
        struct Collect(Vec<NodeId>);

        impl MetaEvalVisitor for Collect {
            fn enter(&mut self, node: NodeRef<'_>, _context: &Context) {
                if !self.0.contains(&node.id()) {
                    self.0.push(node.id());
                }
            }
        }

        let mut collect = Collect(Vec::new());
        self.meta_evaluate_node(self.root, context, &mut collect);
        collect.0
    }

    /// Nodes of a type in the evaluation path at `context`
    pub fn find_in_evaluation_path(&self, context: &Context, type_name: &str) -> Vec<NodeId> {
        self.nodes_in_evaluation_path(context)
            .into_iter()
            .filter(|&id| self.store.get(id).is_some_and(|n| n.type_name() == type_name))
            .collect()
    }

    /// Flush cached results downstream of `context.start`. Never touches
    /// nodes upstream of it. Returns the number of nodes notified.
    pub fn flush_all_caches(&self, context: &FlushContext) -> usize {
        let mut visited = HashSet::new();
        let mut stack = vec![context.start];
        if let Some(members) = self.store.get(context.start).and_then(|n| n.members.as_ref()) {
            stack.extend(members.nodes.values().copied());
        }

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.store.get(id) else {
                continue;
            };
            node.processor.flush();

            for &output in &node.outputs {
                stack.push(output);
                if let Some(members) = self.store.get(output).and_then(|o| o.members.as_ref()) {
                    stack.extend(
                        members
                            .nodes
                            .values()
                            .copied()
                            .filter(|&m| self.store.get(m).and_then(Node::adapted_input) == Some(id)),
                    );
                }
            }
            if let Some(group) = node.group {
                let is_root = self
                    .store
                    .get(group)
                    .and_then(|g| g.members.as_ref())
                    .is_some_and(|m| m.root == Some(id));
                if is_root {
                    stack.push(group);
                }
            }
        }
        visited.len()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.names.keys().collect::<Vec<_>>())
            .field("isolated", &self.isolated.len())
            .field("view", &self.view)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}
