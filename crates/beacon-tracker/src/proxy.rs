// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bundler admission gating on host application state.
//!
//! The live pipeline holds commands that are not ready on background while
//! the app is backgrounded, flushing them in original order on foreground.
//! The retry pipeline passes everything through.

use std::collections::VecDeque;

use beacon_core::AppState;

use crate::bundle::CommandBundle;
use crate::bundler::{AsyncFire, CommandBundler};
use crate::command::TrackingCommand;

/// Gates command admission to a [`CommandBundler`].
pub enum CommandBundlerProxy {
    /// Every command is forwarded immediately.
    Through(CommandBundler),
    /// Commands arriving while backgrounded are held unless marked
    /// ready-on-background; held commands flush on foreground in order.
    StateGated {
        bundler: CommandBundler,
        state: AppState,
        held: VecDeque<TrackingCommand>,
    },
}

impl CommandBundlerProxy {
    pub fn through(bundler: CommandBundler) -> Self {
        Self::Through(bundler)
    }

    pub fn state_gated(bundler: CommandBundler, state: AppState) -> Self {
        Self::StateGated {
            bundler,
            state,
            held: VecDeque::new(),
        }
    }

    /// Admit or hold one command, returning any bundles it sealed.
    pub fn add_command(&mut self, command: TrackingCommand) -> Vec<CommandBundle> {
        match self {
            Self::Through(bundler) => bundler.add_command(command),
            Self::StateGated {
                bundler,
                state,
                held,
            } => {
                if *state == AppState::Background && !command.properties.is_ready_on_background {
                    held.push_back(command);
                    Vec::new()
                } else {
                    bundler.add_command(command)
                }
            }
        }
    }

    /// Record an application state change; a transition out of background
    /// flushes the hold queue in original order.
    pub fn set_app_state(&mut self, new_state: AppState) -> Vec<CommandBundle> {
        match self {
            Self::Through(_) => Vec::new(),
            Self::StateGated {
                bundler,
                state,
                held,
            } => {
                *state = new_state;
                if new_state == AppState::Background {
                    return Vec::new();
                }
                let mut sealed = Vec::new();
                while let Some(command) = held.pop_front() {
                    sealed.extend(bundler.add_command(command));
                }
                sealed
            }
        }
    }

    /// Forward an async-rule fire to the underlying bundler.
    pub fn handle_fire(&mut self, fire: AsyncFire) -> Option<CommandBundle> {
        match self {
            Self::Through(bundler) => bundler.handle_fire(fire),
            Self::StateGated { bundler, .. } => bundler.handle_fire(fire),
        }
    }
}
