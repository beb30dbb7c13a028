// SPDX-License-Identifier: MIT OR Apache-2.0
//! The session facade.
//!
//! A [`Session`] owns a graph, the current frame and the command history. Its
//! methods are the mutation surface offered to UI actions and scripts: each
//! one builds a command, arms it, and hands it to the history.

use crate::command::{Command, CommandError, MarkerCommand};
use crate::commands::{ApplyProfile, CopyNode, DeleteNode, NewNode, SetFrame, SetInputs, SetProperty, SetViewNode};
use crate::history::CommandHistory;
use reelview_graph::{Graph, GraphError, ImageDescription, ImageId, NodeId, Profile, PropertyValue};

/// Everything commands act on
#[derive(Debug)]
pub struct SessionState {
    /// The node graph
    pub graph: Graph,
    /// Current frame
    pub frame: i32,
}

impl SessionState {
    /// State positioned at frame 1
    pub fn new(graph: Graph) -> Self {
        Self { graph, frame: 1 }
    }
}

/// A graph together with its undo history
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    history: CommandHistory,
}

impl Session {
    /// Session over an existing graph
    pub fn new(graph: Graph) -> Self {
        Self {
            state: SessionState::new(graph),
            history: CommandHistory::new(),
        }
    }

    /// Session over a graph with every built-in node type and reader
    pub fn with_builtins() -> Result<Self, CommandError> {
        Ok(Self::new(Graph::with_builtins()?))
    }

    /// Replace the history, e.g. to change its depth
    pub fn with_history(mut self, history: CommandHistory) -> Self {
        self.history = history;
        self
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The graph, read-only
    pub fn graph(&self) -> &Graph {
        &self.state.graph
    }

    /// Current frame
    pub fn frame(&self) -> i32 {
        self.state.frame
    }

    /// The command history
    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Look up a live top-level node by name
    pub fn find_node(&self, name: &str) -> Result<NodeId, CommandError> {
        self.state
            .graph
            .find_node(name)
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()).into())
    }

    /// Evaluate the view at the current frame
    pub fn evaluate(&self) -> ImageDescription {
        let context = self.state.graph.context_for_frame(self.state.frame);
        self.state.graph.evaluate(&context)
    }

    /// Identifier of the view at the current frame
    pub fn evaluate_identifier(&self) -> ImageId {
        let context = self.state.graph.context_for_frame(self.state.frame);
        self.state.graph.evaluate_identifier(&context)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Run an armed command through the history
    pub fn execute(&mut self, command: Box<dyn Command>) -> Result<Option<NodeId>, CommandError> {
        self.history.do_command(&mut self.state, command)
    }

    /// Create a node; an empty name picks the type's default
    pub fn new_node(&mut self, type_name: &str, name: &str) -> Result<NodeId, CommandError> {
        let mut command = NewNode::new();
        command.set_args(&self.state, type_name, name)?;
        self.execute(Box::new(command))?
            .ok_or_else(|| GraphError::Internal(format!("{} was not created", type_name)).into())
    }

    /// Delete a top-level node
    pub fn delete_node(&mut self, node: NodeId) -> Result<(), CommandError> {
        let mut command = DeleteNode::new();
        command.set_args(&self.state, node)?;
        self.execute(Box::new(command)).map(|_| ())
    }

    /// Copy the state of `from` onto `to`
    pub fn copy_node(&mut self, from: NodeId, to: NodeId) -> Result<(), CommandError> {
        let mut command = CopyNode::new();
        command.set_args(&self.state, from, to)?;
        self.execute(Box::new(command)).map(|_| ())
    }

    /// Replace the inputs of a node
    pub fn set_inputs(&mut self, node: NodeId, inputs: &[NodeId]) -> Result<(), CommandError> {
        let mut command = SetInputs::new();
        command.set_args(&self.state, node, inputs)?;
        self.execute(Box::new(command)).map(|_| ())
    }

    /// Change the view node
    pub fn set_view_node(&mut self, node: Option<NodeId>) -> Result<(), CommandError> {
        let mut command = SetViewNode::new();
        command.set_args(&self.state, node)?;
        self.execute(Box::new(command)).map(|_| ())
    }

    /// Move to a frame
    pub fn set_frame(&mut self, frame: i32) -> Result<(), CommandError> {
        let mut command = SetFrame::new();
        command.set_args(&self.state, frame)?;
        self.execute(Box::new(command)).map(|_| ())
    }

    /// Set a property value
    pub fn set_property(
        &mut self,
        node: NodeId,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), CommandError> {
        let mut command = SetProperty::new();
        command.set_args(&self.state, node, property, value)?;
        self.execute(Box::new(command)).map(|_| ())
    }

    /// Apply a profile to a node and its members
    pub fn apply_profile(&mut self, node: NodeId, profile: Profile) -> Result<(), CommandError> {
        let mut command = ApplyProfile::new();
        command.set_args(&self.state, node, profile)?;
        self.execute(Box::new(command)).map(|_| ())
    }

    /// Undo the last command
    pub fn undo(&mut self) -> Result<(), CommandError> {
        self.history.undo(&mut self.state)
    }

    /// Redo the last undone command
    pub fn redo(&mut self) -> Result<(), CommandError> {
        self.history.redo(&mut self.state)
    }

    /// Group the following commands into one undo step
    pub fn begin_compound(&mut self, description: impl Into<String>) {
        self.history.begin_compound(description);
    }

    /// Close the innermost compound
    pub fn end_compound(&mut self) -> Result<(), CommandError> {
        self.history.end_compound(&mut self.state)
    }

    /// Put a unique marker on the history
    pub fn mark(&mut self, name: &str) {
        self.history.mark(&mut self.state, MarkerCommand::new(name));
    }

    /// Drop the whole history
    pub fn clear_history(&mut self) {
        self.history.clear(&mut self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_is_findable_and_undoable() {
        let mut session = Session::with_builtins().unwrap();
        let id = session.new_node("ColorExposure", "exp1").unwrap();
        assert_eq!(session.find_node("exp1").unwrap(), id);
        assert_eq!(session.history().undo_description().as_deref(), Some("New ColorExposure"));

        session.undo().unwrap();
        assert!(matches!(
            session.find_node("exp1"),
            Err(CommandError::Graph(GraphError::NodeNotFound(_)))
        ));
        session.redo().unwrap();
        assert_eq!(session.find_node("exp1").unwrap(), id);
    }

    #[test]
    fn test_set_frame_is_undoable() {
        let mut session = Session::with_builtins().unwrap();
        session.set_frame(40).unwrap();
        assert_eq!(session.frame(), 40);
        session.undo().unwrap();
        assert_eq!(session.frame(), 1);
        session.redo().unwrap();
        assert_eq!(session.frame(), 40);
    }

    #[test]
    fn test_failed_validation_leaves_history_alone() {
        let mut session = Session::with_builtins().unwrap();
        assert!(session.new_node("Bogus", "").is_err());
        assert!(!session.history().can_undo());
    }
}
