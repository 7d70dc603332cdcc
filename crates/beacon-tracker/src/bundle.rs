// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An ordered, eventually-immutable group of commands bound for one request.

use crate::command::TrackingCommand;

/// Accumulates commands in insertion order until sealed.
///
/// A frozen bundle is sorted by command creation time, accepts no further
/// commands, and is handed to its consumer exactly once.
#[derive(Debug, Default)]
pub struct CommandBundle {
    commands: Vec<TrackingCommand>,
    is_frozen: bool,
}

impl CommandBundle {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_frozen(&self) -> bool {
        self.is_frozen
    }

    pub fn first(&self) -> Option<&TrackingCommand> {
        self.commands.first()
    }

    pub fn last(&self) -> Option<&TrackingCommand> {
        self.commands.last()
    }

    pub fn commands(&self) -> &[TrackingCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<TrackingCommand> {
        self.commands
    }

    /// Append a command. Callers must not add to a frozen bundle; the
    /// bundler swaps in a fresh bundle before freezing the old one.
    pub fn add_command(&mut self, command: TrackingCommand) {
        debug_assert!(!self.is_frozen, "cannot add to a frozen bundle");
        self.commands.push(command);
    }

    /// Seal the bundle. Events do not always arrive in order of occurrence,
    /// so sort by creation time before freezing.
    pub fn freeze(&mut self) {
        self.commands.sort_by(|a, b| a.date.cmp(&b.date));
        self.is_frozen = true;
    }
}
