// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undoable editing for the reelview graph.
//!
//! This crate provides:
//! - The [`Command`] contract and its lifecycle
//! - Commands for every graph edit: new, delete, copy, connect, view, frame
//!   and property changes
//! - A bounded undo/redo history with compound commands and markers
//! - The [`Session`] facade, the one mutation path for external callers
//!
//! ## Architecture
//!
//! Commands validate in `set_args` before anything changes. Deleted and
//! undone-created nodes are isolated inside the graph rather than destroyed;
//! a command keeps its isolation reference while it can still be redone and
//! drops it when the history lets go of it.

pub mod command;
pub mod commands;
pub mod history;
pub mod session;

pub use command::{Command, CommandError, CommandState, CompoundCommand, MarkerCommand, UndoType};
pub use commands::{ApplyProfile, CopyNode, DeleteNode, NewNode, SetFrame, SetInputs, SetProperty, SetViewNode};
pub use history::{CommandHistory, HistoryError, HistoryStats, MAX_HISTORY};
pub use session::{Session, SessionState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_defaults() {
        let history = CommandHistory::default();
        assert_eq!(history.stats().max_depth, MAX_HISTORY);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }
}
