// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo history of executed commands.
//!
//! Undoable commands are kept on a bounded undo stack; undoing moves them to
//! the redo stack and redoing moves them back. Commands between
//! `begin_compound` and `end_compound` are collected into one
//! [`CompoundCommand`]. Compounds nest.

use crate::command::{Command, CommandError, CommandState, CompoundCommand, MarkerCommand, UndoType};
use crate::session::SessionState;
use reelview_graph::NodeId;
use std::collections::VecDeque;
use thiserror::Error;

/// Maximum undo history depth
pub const MAX_HISTORY: usize = 100;

/// History errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// Undo and redo are unavailable inside a compound
    #[error("A compound command is still open")]
    CompoundActive,

    /// `end_compound` without `begin_compound`
    #[error("No compound command is open")]
    NoCompound,
}

/// History statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStats {
    /// Commands in the undo stack
    pub undo_count: usize,
    /// Commands in the redo stack
    pub redo_count: usize,
    /// Open compound commands
    pub compound_depth: usize,
    /// Maximum history depth
    pub max_depth: usize,
}

/// Undo and redo stacks of executed commands
#[derive(Debug)]
pub struct CommandHistory {
    /// Most recent at the back
    undo_stack: VecDeque<Box<dyn Command>>,
    /// Most recently undone at the back
    redo_stack: VecDeque<Box<dyn Command>>,
    /// Open compounds, innermost last
    compounds: Vec<CompoundCommand>,
    max_depth: usize,
}

impl CommandHistory {
    /// Create a history with the default depth
    pub fn new() -> Self {
        Self::with_max_depth(MAX_HISTORY)
    }

    /// Create with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            compounds: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Execute an armed command and record it according to its undo type.
    /// Returns the node the command created or acted on.
    pub fn do_command(
        &mut self,
        state: &mut SessionState,
        mut command: Box<dyn Command>,
    ) -> Result<Option<NodeId>, CommandError> {
        let undo_type = command.undo_type();
        if undo_type == UndoType::Marker {
            self.record(state, command);
            return Ok(None);
        }
        if command.state() != CommandState::Armed {
            return Err(CommandError::NotArmed(command.name().to_string()));
        }

        tracing::debug!("Do {}", command.description());
        if let Err(err) = command.doit(state) {
            tracing::error!("Command {} failed after validation: {}", command.name(), err);
            command.release(state);
            return Err(err);
        }
        let node = command.node();

        match undo_type {
            UndoType::Undoable | UndoType::Marker => {
                if self.compounds.is_empty() {
                    self.clear_redo(state);
                }
                self.record(state, command);
            }
            UndoType::NotUndoable => {
                self.clear_innermost(state);
                command.release(state);
            }
            UndoType::EditOnly => command.release(state),
        }
        Ok(node)
    }

    /// Record a marker, dropping earlier markers of the same name if it is unique
    pub fn mark(&mut self, state: &mut SessionState, marker: MarkerCommand) {
        if marker.is_unique() && self.compounds.is_empty() {
            let name = marker.name().to_string();
            let is_same = |c: &Box<dyn Command>| c.undo_type() == UndoType::Marker && c.name() == name;
            self.undo_stack.retain(|c| !is_same(c));
            self.redo_stack.retain(|c| !is_same(c));
        }
        self.record(state, Box::new(marker));
    }

    fn record(&mut self, state: &mut SessionState, command: Box<dyn Command>) {
        if let Some(compound) = self.compounds.last_mut() {
            compound.push(command);
            return;
        }
        self.undo_stack.push_back(command);
        while self.undo_stack.len() > self.max_depth {
            if let Some(mut old) = self.undo_stack.pop_front() {
                tracing::trace!("History full, dropping {}", old.description());
                old.release(state);
            }
        }
    }

    /// Undo the most recent command. A marker on top is undone together
    /// with the command beneath it.
    pub fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        if !self.compounds.is_empty() {
            return Err(HistoryError::CompoundActive.into());
        }
        let mut command = self.undo_stack.pop_back().ok_or(HistoryError::NothingToUndo)?;
        tracing::debug!("Undo {}", command.description());
        let is_marker = command.undo_type() == UndoType::Marker;
        let result = if is_marker { Ok(()) } else { command.undo(state) };
        self.redo_stack.push_back(command);
        result?;

        if is_marker && !self.undo_stack.is_empty() {
            self.undo(state)?;
        }
        Ok(())
    }

    /// Redo the most recently undone command, carrying any marker above it
    pub fn redo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        if !self.compounds.is_empty() {
            return Err(HistoryError::CompoundActive.into());
        }
        let mut command = self.redo_stack.pop_back().ok_or(HistoryError::NothingToRedo)?;
        tracing::debug!("Redo {}", command.description());
        let result = if command.undo_type() == UndoType::Marker {
            Ok(())
        } else {
            command.redo(state)
        };
        self.undo_stack.push_back(command);
        result?;

        if self
            .redo_stack
            .back()
            .is_some_and(|c| c.undo_type() == UndoType::Marker)
        {
            self.redo(state)?;
        }
        Ok(())
    }

    /// Start collecting commands into a compound
    pub fn begin_compound(&mut self, description: impl Into<String>) {
        self.compounds.push(CompoundCommand::new(description));
    }

    /// Close the innermost compound. An empty compound leaves no trace.
    pub fn end_compound(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        let compound = self.compounds.pop().ok_or(HistoryError::NoCompound)?;
        if compound.is_empty() {
            return Ok(());
        }
        if self.compounds.is_empty() {
            self.clear_redo(state);
        }
        self.record(state, Box::new(compound));
        Ok(())
    }

    /// Whether a compound is open
    pub fn compound_active(&self) -> bool {
        !self.compounds.is_empty()
    }

    fn clear_redo(&mut self, state: &mut SessionState) {
        while let Some(mut command) = self.redo_stack.pop_back() {
            command.release(state);
        }
    }

    fn clear_undo(&mut self, state: &mut SessionState) {
        while let Some(mut command) = self.undo_stack.pop_back() {
            command.release(state);
        }
    }

    fn clear_innermost(&mut self, state: &mut SessionState) {
        match self.compounds.last_mut() {
            Some(compound) => compound.clear(state),
            None => self.clear(state),
        }
    }

    /// Drop both stacks, releasing every command
    pub fn clear(&mut self, state: &mut SessionState) {
        self.clear_redo(state);
        self.clear_undo(state);
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.compounds.is_empty() && !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.compounds.is_empty() && !self.redo_stack.is_empty()
    }

    /// Description of the next undo, looking past a marker on top
    pub fn undo_description(&self) -> Option<String> {
        top_description(&self.undo_stack)
    }

    /// Description of the next redo, looking past a marker on top
    pub fn redo_description(&self) -> Option<String> {
        top_description(&self.redo_stack)
    }

    /// Whether a marker with this name is anywhere in the history
    pub fn has_marker(&self, name: &str) -> bool {
        self.undo_stack
            .iter()
            .chain(&self.redo_stack)
            .any(|c| c.undo_type() == UndoType::Marker && c.name() == name)
    }

    /// Whether the top of the undo stack is a marker with this name
    pub fn is_marker_recent(&self, name: &str) -> bool {
        self.undo_stack
            .back()
            .is_some_and(|c| c.undo_type() == UndoType::Marker && c.name() == name)
    }

    /// Get history statistics
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
            compound_depth: self.compounds.len(),
            max_depth: self.max_depth,
        }
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}

fn top_description(stack: &VecDeque<Box<dyn Command>>) -> Option<String> {
    let mut iter = stack.iter().rev();
    let top = iter.next()?;
    if top.undo_type() == UndoType::Marker {
        if let Some(below) = iter.next() {
            return Some(below.description());
        }
    }
    Some(top.description())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{DeleteNode, NewNode, SetFrame};
    use reelview_graph::Graph;

    fn state() -> SessionState {
        SessionState::new(Graph::with_builtins().unwrap())
    }

    fn go_to(history: &mut CommandHistory, state: &mut SessionState, frame: i32) {
        let mut command = SetFrame::new();
        command.set_args(state, frame).unwrap();
        history.do_command(state, Box::new(command)).unwrap();
    }

    /// Resets the frame and cannot be undone
    #[derive(Debug)]
    struct Rewind;

    impl Command for Rewind {
        fn name(&self) -> &str {
            "rewind"
        }

        fn undo_type(&self) -> UndoType {
            UndoType::NotUndoable
        }

        fn state(&self) -> CommandState {
            CommandState::Armed
        }

        fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
            state.frame = 0;
            Ok(())
        }

        fn undo(&mut self, _state: &mut SessionState) -> Result<(), CommandError> {
            Ok(())
        }
    }

    #[test]
    fn test_undo_redo_empty() {
        let mut state = state();
        let mut history = CommandHistory::new();
        assert!(matches!(
            history.undo(&mut state),
            Err(CommandError::History(HistoryError::NothingToUndo))
        ));
        assert!(matches!(
            history.redo(&mut state),
            Err(CommandError::History(HistoryError::NothingToRedo))
        ));
    }

    #[test]
    fn test_unarmed_command_not_recorded() {
        let mut state = state();
        let mut history = CommandHistory::new();
        let result = history.do_command(&mut state, Box::new(SetFrame::new()));
        assert!(matches!(result, Err(CommandError::NotArmed(_))));
        assert_eq!(history.stats().undo_count, 0);
    }

    #[test]
    fn test_eviction_releases_oldest() {
        let mut state = state();
        let mut history = CommandHistory::with_max_depth(2);
        let nodes: Vec<_> = (0..3)
            .map(|_| state.graph.new_node("ColorExposure", "").unwrap())
            .collect();
        for &id in &nodes {
            let mut command = DeleteNode::new();
            command.set_args(&state, id).unwrap();
            history.do_command(&mut state, Box::new(command)).unwrap();
        }

        assert_eq!(history.stats().undo_count, 2);
        assert!(state.graph.node(nodes[0]).is_none());
        assert!(state.graph.is_isolated(nodes[1]));
        assert_eq!(state.graph.isolation_references(nodes[2]), 1);
    }

    #[test]
    fn test_new_command_drops_redo() {
        let mut state = state();
        let mut history = CommandHistory::new();
        let mut command = NewNode::new();
        command.set_args(&state, "Retime", "").unwrap();
        let id = history.do_command(&mut state, Box::new(command)).unwrap().unwrap();

        history.undo(&mut state).unwrap();
        assert!(state.graph.is_isolated(id));
        go_to(&mut history, &mut state, 9);

        assert!(!history.can_redo());
        assert!(state.graph.node(id).is_none());
    }

    #[test]
    fn test_marker_travels_with_command_below() {
        let mut state = state();
        let mut history = CommandHistory::new();
        go_to(&mut history, &mut state, 2);
        history.mark(&mut state, MarkerCommand::new("saved"));
        go_to(&mut history, &mut state, 3);

        history.undo(&mut state).unwrap();
        assert_eq!(state.frame, 2);
        assert!(history.is_marker_recent("saved"));
        assert_eq!(history.undo_description().as_deref(), Some("Go to frame 2"));

        history.undo(&mut state).unwrap();
        assert_eq!(state.frame, 1);
        assert!(!history.can_undo());

        history.redo(&mut state).unwrap();
        assert_eq!(state.frame, 2);
        assert!(history.is_marker_recent("saved"));
        assert_eq!(history.redo_description().as_deref(), Some("Go to frame 3"));
    }

    #[test]
    fn test_unique_marker_replaces_earlier() {
        let mut state = state();
        let mut history = CommandHistory::new();
        history.mark(&mut state, MarkerCommand::new("saved"));
        go_to(&mut history, &mut state, 5);
        history.mark(&mut state, MarkerCommand::new("saved"));
        history.mark(&mut state, MarkerCommand::new("checkpoint").repeatable());
        history.mark(&mut state, MarkerCommand::new("checkpoint").repeatable());

        assert_eq!(history.stats().undo_count, 4);
        assert!(history.has_marker("saved"));
        assert!(history.is_marker_recent("checkpoint"));
    }

    #[test]
    fn test_compounds_nest_into_one_step() {
        let mut state = state();
        let mut history = CommandHistory::new();
        history.begin_compound("Scrub");
        go_to(&mut history, &mut state, 5);
        go_to(&mut history, &mut state, 6);
        history.begin_compound("Nudge");
        go_to(&mut history, &mut state, 7);
        assert!(matches!(
            history.undo(&mut state),
            Err(CommandError::History(HistoryError::CompoundActive))
        ));
        history.end_compound(&mut state).unwrap();
        history.end_compound(&mut state).unwrap();

        assert_eq!(history.stats().undo_count, 1);
        assert_eq!(history.undo_description().as_deref(), Some("Scrub"));
        history.undo(&mut state).unwrap();
        assert_eq!(state.frame, 1);
        history.redo(&mut state).unwrap();
        assert_eq!(state.frame, 7);

        assert!(matches!(
            history.end_compound(&mut state),
            Err(CommandError::History(HistoryError::NoCompound))
        ));
        history.begin_compound("Nothing");
        history.end_compound(&mut state).unwrap();
        assert_eq!(history.stats().undo_count, 1);
    }

    #[test]
    fn test_not_undoable_clears_history() {
        let mut state = state();
        let mut history = CommandHistory::new();
        go_to(&mut history, &mut state, 4);
        go_to(&mut history, &mut state, 8);
        history.undo(&mut state).unwrap();

        history.do_command(&mut state, Box::new(Rewind)).unwrap();
        assert_eq!(state.frame, 0);
        assert_eq!(history.stats(), HistoryStats { max_depth: MAX_HISTORY, ..HistoryStats::default() });
    }
}
