// SPDX-License-Identifier: MIT OR Apache-2.0
//! The command contract.
//!
//! A command is created empty, armed by its `set_args`, then executed by a
//! [`CommandHistory`](crate::history::CommandHistory). Undoable commands stay
//! in the history and move between its stacks; `release` is called once a
//! command leaves the history for good.

use crate::history::HistoryError;
use crate::session::SessionState;
use reelview_graph::{GraphError, NodeId, ProfileError};
use std::fmt;

/// Error type for command execution
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Graph edit rejected
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// History misuse
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Restoring captured state failed
    #[error("Could not restore node state: {0}")]
    Restore(#[from] ProfileError),

    /// Command executed before `set_args`
    #[error("Command {0} has no arguments")]
    NotArmed(String),

    /// Command driven out of order
    #[error("Command {command} cannot {action} while {state:?}")]
    InvalidState {
        /// Command name
        command: String,
        /// What was attempted
        action: &'static str,
        /// State it was in
        state: CommandState,
    },
}

/// How the history treats a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoType {
    /// Kept in the history for undo and redo
    Undoable,
    /// Executed and dropped; clears the history
    NotUndoable,
    /// Executed and dropped; history untouched
    EditOnly,
    /// Never executed; marks a point in the history
    Marker,
}

/// Lifecycle of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandState {
    /// Created, no arguments yet
    #[default]
    Uninitialized,
    /// Arguments validated
    Armed,
    /// Executed or redone
    Done,
    /// Undone
    Undone,
}

/// An operation on a session that may be undone
pub trait Command: fmt::Debug + Send {
    /// Type name of the command
    fn name(&self) -> &str;

    /// Human-readable summary for undo menus
    fn description(&self) -> String {
        self.name().to_string()
    }

    /// How the history treats this command
    fn undo_type(&self) -> UndoType {
        UndoType::Undoable
    }

    /// Current lifecycle state
    fn state(&self) -> CommandState;

    /// Node created or acted on, once executed
    fn node(&self) -> Option<NodeId> {
        None
    }

    /// Perform the edit
    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError>;

    /// Revert the edit
    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError>;

    /// Re-apply after an undo
    fn redo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        self.doit(state)
    }

    /// The command is leaving the history; drop anything it retains
    fn release(&mut self, _state: &mut SessionState) {}
}

/// Reject a transition from the wrong state
pub(crate) fn expect_state(
    command: &dyn Command,
    action: &'static str,
    allowed: &[CommandState],
) -> Result<(), CommandError> {
    let state = command.state();
    if allowed.contains(&state) {
        return Ok(());
    }
    if state == CommandState::Uninitialized {
        return Err(CommandError::NotArmed(command.name().to_string()));
    }
    Err(CommandError::InvalidState {
        command: command.name().to_string(),
        action,
        state,
    })
}

/// Commands executed between `begin_compound` and `end_compound`, undone and
/// redone as one
#[derive(Debug)]
pub struct CompoundCommand {
    description: String,
    children: Vec<Box<dyn Command>>,
    state: CommandState,
}

impl CompoundCommand {
    /// Empty compound
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            children: Vec::new(),
            state: CommandState::Done,
        }
    }

    /// Executed children, oldest first
    pub fn children(&self) -> &[Box<dyn Command>] {
        &self.children
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn push(&mut self, command: Box<dyn Command>) {
        self.children.push(command);
    }

    pub(crate) fn clear(&mut self, state: &mut SessionState) {
        for mut child in self.children.drain(..).rev() {
            child.release(state);
        }
    }
}

impl Command for CompoundCommand {
    fn name(&self) -> &str {
        "compound"
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn state(&self) -> CommandState {
        self.state
    }

    fn doit(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        self.redo(state)
    }

    fn undo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        for child in self.children.iter_mut().rev() {
            if child.undo_type() != UndoType::Marker {
                child.undo(state)?;
            }
        }
        self.state = CommandState::Undone;
        Ok(())
    }

    fn redo(&mut self, state: &mut SessionState) -> Result<(), CommandError> {
        for child in &mut self.children {
            if child.undo_type() != UndoType::Marker {
                child.redo(state)?;
            }
        }
        self.state = CommandState::Done;
        Ok(())
    }

    fn release(&mut self, state: &mut SessionState) {
        self.clear(state);
    }
}

/// Named point in the history, such as "saved"
#[derive(Debug, Clone)]
pub struct MarkerCommand {
    name: String,
    unique: bool,
}

impl MarkerCommand {
    /// Marker that replaces any earlier marker of the same name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique: true,
        }
    }

    /// Allow several markers with this name
    pub fn repeatable(mut self) -> Self {
        self.unique = false;
        self
    }

    /// Whether earlier markers of the same name are removed
    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

impl Command for MarkerCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn undo_type(&self) -> UndoType {
        UndoType::Marker
    }

    fn state(&self) -> CommandState {
        CommandState::Done
    }

    fn doit(&mut self, _state: &mut SessionState) -> Result<(), CommandError> {
        Ok(())
    }

    fn undo(&mut self, _state: &mut SessionState) -> Result<(), CommandError> {
        Ok(())
    }
}
