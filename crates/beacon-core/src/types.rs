// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared identifier types used across the Beacon workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifies the scene (window/screen) an event originated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifies one page view within a scene. A new page view starts a new
/// request grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PvId(pub String);

impl PvId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Host application foreground/background state, fed into the SDK by the
/// host. Commands not marked ready-on-background are held while the
/// application is backgrounded.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AppState {
    #[default]
    Active,
    Background,
}
