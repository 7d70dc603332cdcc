// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared helpers for the crate's tests.

use beacon_core::{PvId, SceneId};
use serde_json::Map;

use crate::command::{Scene, TrackHandle, TrackingCommand};
use crate::event::{Event, EventName};

pub(crate) fn scene(scene_id: &str, pv_id: &str) -> Scene {
    Scene {
        pv_id: PvId::new(pv_id),
        original_pv_id: PvId::new(pv_id),
        scene_id: SceneId::new(scene_id),
    }
}

pub(crate) fn command(visitor: &str, scene_id: &str, pv_id: &str) -> TrackingCommand {
    command_with_handle(visitor, scene_id, pv_id).0
}

pub(crate) fn command_with_handle(
    visitor: &str,
    scene_id: &str,
    pv_id: &str,
) -> (TrackingCommand, TrackHandle) {
    let event = Event::new(EventName::new("view"), Map::new());
    TrackingCommand::new(event, scene(scene_id, pv_id), visitor)
}
