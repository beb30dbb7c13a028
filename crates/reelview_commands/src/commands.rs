// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph editing commands.
//!
//! Every command is created empty with `new()` and armed by `set_args`, which
//! checks its preconditions against the session without touching it. Once
//! armed, `doit`, `undo` and `redo` are expected to succeed.

use crate::command::{expect_state, Command, CommandError, CommandState};
use crate::session::SessionState;
use reelview_graph::{Graph, GraphError, Node, NodeId, Profile, PropertyError, PropertyValue};

/// A node that may be edited from outside: live and not a group member
fn editable_node(graph: &Graph, id: NodeId) -> Result<&Node, GraphError> {
    let node = graph.node(id).ok_or(GraphError::StaleNode(id))?;
    if node.group().is_some() {
        return Err(GraphError::MemberNode(node.name().to_string()));
    }
    if node.is_isolated() {
        return Err(GraphError::Isolated(node.name().to_string()));
    }
    Ok(node)
}

// ============================================================================
// NewNode
// ============================================================================

/// Create a node. Undo isolates it so redo can bring the same node back.
#[derive(Debug, Default)]
pub struct NewNode {
    type_name: String,
    name: String,
    node: Option<NodeId>,
    state: CommandState,
}

impl NewNode {
    /// Unarmed command
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with a node type and a requested name (empty for the type's default)
    pub fn set_args(
        &mut self,
        state: &SessionState,
        type_name: &str,
        name: &str,
    ) -> Result<(), CommandError> {
        if !state.graph.manager().contains(type_name) {
            return Err(GraphError::UnknownType(type_name.to_string()).into());
        }
        self.type_name = type_name.to_string();
        self.name = name.to_string();
        self.state = CommandState::Armed;
        Ok(())
    }
}

impl Command for NewNode {
    fn name(&self) -> &str {
        "newNode"
    }

    fn description(&self) -> String {
        format!("New {}", self.type_name)
    }

    fn state(&self) -> CommandState {
        self.state
    }

    fn node(&self) -> Option<NodeId> {
        self.node
    }

    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "do", &[CommandState::Armed])?;
        let id = state.graph.new_node(&self.type_name, &self.name)?;
        self.node = Some(id);
        self.state = CommandState::Done;
        Ok(())
    }

    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "undo", &[CommandState::Done])?;
        if let Some(id) = self.node {
            state.graph.isolate_node(id)?;
        }
        self.state = CommandState::Undone;
        Ok(())
    }

    fn redo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "redo", &[CommandState::Undone])?;
        if let Some(id) = self.node {
            state.graph.restore_isolated_node(id)?;
        }
        self.state = CommandState::Done;
        Ok(())
    }

    fn release(&mut self, state: &mut SessionState) {
        if self.state != CommandState::Undone {
            return;
        }
        if let Some(id) = self.node.take() {
            if state.graph.is_isolated(id) {
                if let Err(err) = state.graph.release_isolated(id) {
                    tracing::error!("Could not release {:?}: {}", id, err);
                }
            }
        }
    }
}

// ============================================================================
// DeleteNode
// ============================================================================

/// Remove a top-level node. The node is isolated, not destroyed, until the
/// command leaves the history.
#[derive(Debug, Default)]
pub struct DeleteNode {
    node: Option<NodeId>,
    label: String,
    state: CommandState,
}

impl DeleteNode {
    /// Unarmed command
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with the node to delete
    pub fn set_args(&mut self, state: &SessionState, node: NodeId) -> Result<(), CommandError> {
        let target = editable_node(&state.graph, node)?;
        if target.is_protected() {
            return Err(GraphError::Protected(target.name().to_string()).into());
        }
        self.label = target.name().to_string();
        self.node = Some(node);
        self.state = CommandState::Armed;
        Ok(())
    }
}

impl Command for DeleteNode {
    fn name(&self) -> &str {
        "deleteNode"
    }

    fn description(&self) -> String {
        format!("Delete {}", self.label)
    }

    fn state(&self) -> CommandState {
        self.state
    }

    fn node(&self) -> Option<NodeId> {
        self.node
    }

    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "do", &[CommandState::Armed, CommandState::Undone])?;
        if let Some(id) = self.node {
            state.graph.isolate_node(id)?;
        }
        self.state = CommandState::Done;
        Ok(())
    }

    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "undo", &[CommandState::Done])?;
        if let Some(id) = self.node {
            state.graph.restore_isolated_node(id)?;
        }
        self.state = CommandState::Undone;
        Ok(())
    }

    fn release(&mut self, state: &mut SessionState) {
        if self.state != CommandState::Done {
            return;
        }
        if let Some(id) = self.node.take() {
            if state.graph.is_isolated(id) {
                if let Err(err) = state.graph.release_isolated(id) {
                    tracing::error!("Could not release {}: {}", self.label, err);
                }
            }
        }
    }
}

// ============================================================================
// CopyNode
// ============================================================================

/// Copy the state of one node onto another of the same type
#[derive(Debug, Default)]
pub struct CopyNode {
    from: Option<NodeId>,
    to: Option<NodeId>,
    label: String,
    before: Option<Profile>,
    state: CommandState,
}

impl CopyNode {
    /// Unarmed command
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with source and destination
    pub fn set_args(&mut self, state: &SessionState, from: NodeId, to: NodeId) -> Result<(), CommandError> {
        let source = editable_node(&state.graph, from)?;
        let target = editable_node(&state.graph, to)?;
        if source.type_name() != target.type_name() {
            return Err(GraphError::IncompatibleTypes {
                from: source.name().to_string(),
                to: target.name().to_string(),
            }
            .into());
        }
        self.label = format!("{} to {}", source.name(), target.name());
        self.from = Some(from);
        self.to = Some(to);
        self.state = CommandState::Armed;
        Ok(())
    }
}

impl Command for CopyNode {
    fn name(&self) -> &str {
        "copyNode"
    }

    fn description(&self) -> String {
        format!("Copy {}", self.label)
    }

    fn state(&self) -> CommandState {
        self.state
    }

    fn node(&self) -> Option<NodeId> {
        self.to
    }

    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "do", &[CommandState::Armed, CommandState::Undone])?;
        if let (Some(from), Some(to)) = (self.from, self.to) {
            self.before = Some(Profile::capture(&state.graph, to, "copyNode", "")?);
            state.graph.copy_node(from, to)?;
        }
        self.state = CommandState::Done;
        Ok(())
    }

    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "undo", &[CommandState::Done])?;
        if let (Some(before), Some(to)) = (&self.before, self.to) {
            before.apply(&mut state.graph, to)?;
        }
        self.state = CommandState::Undone;
        Ok(())
    }
}

// ============================================================================
// ApplyProfile
// ============================================================================

/// Apply a profile to a node and its members
#[derive(Debug, Default)]
pub struct ApplyProfile {
    node: Option<NodeId>,
    profile: Option<Profile>,
    before: Option<Profile>,
    label: String,
    state: CommandState,
}

impl ApplyProfile {
    /// Unarmed command
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with the target node and the profile to apply
    pub fn set_args(&mut self, state: &SessionState, node: NodeId, profile: Profile) -> Result<(), CommandError> {
        let target = editable_node(&state.graph, node)?;
        self.label = format!("{} to {}", profile.name, target.name());
        self.node = Some(node);
        self.profile = Some(profile);
        self.state = CommandState::Armed;
        Ok(())
    }
}

impl Command for ApplyProfile {
    fn name(&self) -> &str {
        "applyProfile"
    }

    fn description(&self) -> String {
        format!("Apply {}", self.label)
    }

    fn state(&self) -> CommandState {
        self.state
    }

    fn node(&self) -> Option<NodeId> {
        self.node
    }

    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "do", &[CommandState::Armed, CommandState::Undone])?;
        if let (Some(id), Some(profile)) = (self.node, &self.profile) {
            self.before = Some(Profile::capture(&state.graph, id, "applyProfile", "")?);
            let applied = profile.apply(&mut state.graph, id)?;
            tracing::debug!("Applied {} values from profile {}", applied, profile.name);
        }
        self.state = CommandState::Done;
        Ok(())
    }

    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "undo", &[CommandState::Done])?;
        if let (Some(id), Some(before)) = (self.node, &self.before) {
            before.apply(&mut state.graph, id)?;
        }
        self.state = CommandState::Undone;
        Ok(())
    }
}

// ============================================================================
// SetInputs
// ============================================================================

/// Replace the inputs of a top-level node
#[derive(Debug, Default)]
pub struct SetInputs {
    node: Option<NodeId>,
    inputs: Vec<NodeId>,
    old: Vec<NodeId>,
    label: String,
    state: CommandState,
}

impl SetInputs {
    /// Unarmed command
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with the node and its new inputs; rejects cycles, input limits
    /// and inputs from another scope
    pub fn set_args(&mut self, state: &SessionState, node: NodeId, inputs: &[NodeId]) -> Result<(), CommandError> {
        let target = editable_node(&state.graph, node)?;
        self.label = target.name().to_string();
        self.old = target.inputs().to_vec();
        state.graph.test_inputs(node, inputs)?;
        self.node = Some(node);
        self.inputs = inputs.to_vec();
        self.state = CommandState::Armed;
        Ok(())
    }
}

impl Command for SetInputs {
    fn name(&self) -> &str {
        "setInputs"
    }

    fn description(&self) -> String {
        format!("Connect {}", self.label)
    }

    fn state(&self) -> CommandState {
        self.state
    }

    fn node(&self) -> Option<NodeId> {
        self.node
    }

    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "do", &[CommandState::Armed, CommandState::Undone])?;
        if let Some(id) = self.node {
            state.graph.set_inputs(id, &self.inputs)?;
        }
        self.state = CommandState::Done;
        Ok(())
    }

    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "undo", &[CommandState::Done])?;
        if let Some(id) = self.node {
            state.graph.set_inputs(id, &self.old)?;
        }
        self.state = CommandState::Undone;
        Ok(())
    }
}

// ============================================================================
// SetViewNode
// ============================================================================

/// Change which node feeds the display and output groups
#[derive(Debug, Default)]
pub struct SetViewNode {
    view: Option<NodeId>,
    old: Option<NodeId>,
    state: CommandState,
}

impl SetViewNode {
    /// Unarmed command
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with the new view node, or `None` to view nothing
    pub fn set_args(&mut self, state: &SessionState, view: Option<NodeId>) -> Result<(), CommandError> {
        if let Some(id) = view {
            let target = editable_node(&state.graph, id)?;
            if target.is_protected() {
                return Err(GraphError::Protected(target.name().to_string()).into());
            }
        }
        self.view = view;
        self.old = state.graph.view_node();
        self.state = CommandState::Armed;
        Ok(())
    }
}

impl Command for SetViewNode {
    fn name(&self) -> &str {
        "setViewNode"
    }

    fn description(&self) -> String {
        "Change View".to_string()
    }

    fn state(&self) -> CommandState {
        self.state
    }

    fn node(&self) -> Option<NodeId> {
        self.view
    }

    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "do", &[CommandState::Armed, CommandState::Undone])?;
        state.graph.set_view_node(self.view)?;
        self.state = CommandState::Done;
        Ok(())
    }

    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "undo", &[CommandState::Done])?;
        state.graph.set_view_node(self.old)?;
        self.state = CommandState::Undone;
        Ok(())
    }
}

// ============================================================================
// SetFrame
// ============================================================================

/// Move the session's current frame
#[derive(Debug, Default)]
pub struct SetFrame {
    frame: i32,
    old: i32,
    state: CommandState,
}

impl SetFrame {
    /// Unarmed command
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with the frame to go to
    pub fn set_args(&mut self, state: &SessionState, frame: i32) -> Result<(), CommandError> {
        self.frame = frame;
        self.old = state.frame;
        self.state = CommandState::Armed;
        Ok(())
    }
}

impl Command for SetFrame {
    fn name(&self) -> &str {
        "setFrame"
    }

    fn description(&self) -> String {
        format!("Go to frame {}", self.frame)
    }

    fn state(&self) -> CommandState {
        self.state
    }

    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "do", &[CommandState::Armed, CommandState::Undone])?;
        state.frame = self.frame;
        self.state = CommandState::Done;
        Ok(())
    }

    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "undo", &[CommandState::Done])?;
        state.frame = self.old;
        self.state = CommandState::Undone;
        Ok(())
    }
}

// ============================================================================
// SetProperty
// ============================================================================

/// Set an existing property to a value of the same type
#[derive(Debug, Default)]
pub struct SetProperty {
    node: Option<NodeId>,
    property: String,
    value: Option<PropertyValue>,
    old: Option<PropertyValue>,
    label: String,
    state: CommandState,
}

impl SetProperty {
    /// Unarmed command
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm with a node, a qualified property name and its new value.
    /// Members are allowed here, so pipeline slots can be tuned directly.
    pub fn set_args(
        &mut self,
        state: &SessionState,
        node: NodeId,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), CommandError> {
        let target = state.graph.node(node).ok_or(GraphError::StaleNode(node))?;
        let current = target
            .properties()
            .value(property)
            .ok_or_else(|| GraphError::from(PropertyError::NotFound(property.to_string())))?;
        if current.property_type() != value.property_type() {
            return Err(GraphError::from(PropertyError::TypeMismatch {
                name: property.to_string(),
                expected: value.property_type(),
                found: current.property_type(),
            })
            .into());
        }
        self.old = Some(current.clone());
        self.label = format!("{}.{}", target.name(), property);
        self.node = Some(node);
        self.property = property.to_string();
        self.value = Some(value);
        self.state = CommandState::Armed;
        Ok(())
    }
}

impl Command for SetProperty {
    fn name(&self) -> &str {
        "setProperty"
    }

    fn description(&self) -> String {
        format!("Set {}", self.label)
    }

    fn state(&self) -> CommandState {
        self.state
    }

    fn node(&self) -> Option<NodeId> {
        self.node
    }

    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "do", &[CommandState::Armed, CommandState::Undone])?;
        if let (Some(id), Some(value)) = (self.node, &self.value) {
            state.graph.set_property_value(id, &self.property, value.clone())?;
        }
        self.state = CommandState::Done;
        Ok(())
    }

    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        expect_state(self, "undo", &[CommandState::Done])?;
        if let (Some(id), Some(old)) = (self.node, &self.old) {
            state.graph.set_property_value(id, &self.property, old.clone())?;
        }
        self.state = CommandState::Undone;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(Graph::with_builtins().unwrap())
    }

    fn source(state: &mut SessionState, name: &str) -> NodeId {
        let id = state.graph.new_node("FileSource", name).unwrap();
        state
            .graph
            .set_property(id, "media.movie", vec!["solid,red=1.movieproc".to_string()])
            .unwrap();
        id
    }

    #[test]
    fn test_unarmed_command_refuses_to_run() {
        let mut state = state();
        let mut command = NewNode::new();
        assert!(matches!(command.doit(&mut state), Err(CommandError::NotArmed(_))));
    }

    #[test]
    fn test_new_node_rejects_unknown_type() {
        let state = state();
        let mut command = NewNode::new();
        let err = command.set_args(&state, "NoSuchNode", "").unwrap_err();
        assert!(matches!(err, CommandError::Graph(GraphError::UnknownType(_))));
        assert_eq!(command.state(), CommandState::Uninitialized);
    }

    #[test]
    fn test_new_node_undo_isolates_same_node() {
        let mut state = state();
        let mut command = NewNode::new();
        command.set_args(&state, "ColorExposure", "exp1").unwrap();
        command.doit(&mut state).unwrap();
        let id = command.node().unwrap();

        command.undo(&mut state).unwrap();
        assert!(state.graph.find_node("exp1").is_none());
        assert_eq!(state.graph.isolation_references(id), 1);

        command.redo(&mut state).unwrap();
        assert_eq!(state.graph.find_node("exp1"), Some(id));

        command.undo(&mut state).unwrap();
        command.release(&mut state);
        assert!(!state.graph.is_live(id));
        assert!(state.graph.node(id).is_none());
    }

    #[test]
    fn test_delete_node_refuses_protected() {
        let state = state();
        let mut command = DeleteNode::new();
        let err = command.set_args(&state, state.graph.default_display_group()).unwrap_err();
        assert!(matches!(err, CommandError::Graph(GraphError::Protected(_))));
    }

    #[test]
    fn test_set_inputs_rejects_cycle_before_mutation() {
        let mut state = state();
        let src = source(&mut state, "src1");
        let a = state.graph.new_node("ColorExposure", "a").unwrap();
        let b = state.graph.new_node("ColorExposure", "b").unwrap();
        state.graph.set_inputs(a, &[src]).unwrap();
        state.graph.set_inputs(b, &[a]).unwrap();

        let mut command = SetInputs::new();
        let err = command.set_args(&state, a, &[b]).unwrap_err();
        assert!(matches!(err, CommandError::Graph(GraphError::Cycle { .. })));
        assert_eq!(state.graph.node(a).unwrap().inputs(), &[src]);
    }

    #[test]
    fn test_set_property_checks_type() {
        let mut state = state();
        let exp = state.graph.new_node("ColorExposure", "").unwrap();

        let mut command = SetProperty::new();
        let err = command
            .set_args(&state, exp, "color.exposure", PropertyValue::Int(vec![1]))
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Graph(GraphError::Property(PropertyError::TypeMismatch { .. }))
        ));
        let err = command
            .set_args(&state, exp, "color.nothing", PropertyValue::Float(vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, CommandError::Graph(GraphError::Property(PropertyError::NotFound(_)))));

        command
            .set_args(&state, exp, "color.exposure", PropertyValue::Float(vec![2.0]))
            .unwrap();
        command.doit(&mut state).unwrap();
        assert_eq!(state.graph.property_value(exp, "color.exposure"), Some(&PropertyValue::Float(vec![2.0])));
        command.undo(&mut state).unwrap();
        assert_eq!(state.graph.property_value(exp, "color.exposure"), Some(&PropertyValue::Float(vec![0.0])));
    }

    #[test]
    fn test_copy_node_undo_restores_target() {
        let mut state = state();
        let a = state.graph.new_node("ColorExposure", "").unwrap();
        let b = state.graph.new_node("ColorExposure", "").unwrap();
        state.graph.set_property(a, "color.exposure", vec![1.5f32]).unwrap();

        let mut command = CopyNode::new();
        command.set_args(&state, a, b).unwrap();
        command.doit(&mut state).unwrap();
        assert_eq!(state.graph.property_value(b, "color.exposure"), Some(&PropertyValue::Float(vec![1.5])));

        command.undo(&mut state).unwrap();
        assert_eq!(state.graph.property_value(b, "color.exposure"), Some(&PropertyValue::Float(vec![0.0])));
    }

    #[test]
    fn test_copy_node_rejects_mixed_types() {
        let mut state = state();
        let a = state.graph.new_node("ColorExposure", "").unwrap();
        let b = state.graph.new_node("Retime", "").unwrap();
        let mut command = CopyNode::new();
        let err = command.set_args(&state, a, b).unwrap_err();
        assert!(matches!(err, CommandError::Graph(GraphError::IncompatibleTypes { .. })));
    }

    #[test]
    fn test_undo_before_do_is_rejected() {
        let mut state = state();
        let mut command = SetFrame::new();
        command.set_args(&state, 12).unwrap();
        let err = command.undo(&mut state).unwrap_err();
        assert!(matches!(err, CommandError::InvalidState { action: "undo", .. }));
    }

    #[test]
    fn test_apply_profile_is_undoable() {
        let mut state = state();
        let a = state.graph.new_node("ColorExposure", "").unwrap();
        let b = state.graph.new_node("ColorExposure", "").unwrap();
        state.graph.set_property(a, "color.exposure", vec![0.75f32]).unwrap();
        let profile = Profile::capture(&state.graph, a, "bright", "look").unwrap();

        let mut command = ApplyProfile::new();
        command.set_args(&state, b, profile).unwrap();
        assert_eq!(command.description(), format!("Apply bright to {}", state.graph.node_name(b).unwrap()));
        command.doit(&mut state).unwrap();
        assert_eq!(state.graph.property_value(b, "color.exposure"), Some(&PropertyValue::Float(vec![0.75])));
        command.undo(&mut state).unwrap();
        assert_eq!(state.graph.property_value(b, "color.exposure"), Some(&PropertyValue::Float(vec![0.0])));
    }
}
