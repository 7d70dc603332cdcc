// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracking commands: one durable, trackable unit of work per event.

use std::sync::{Arc, Mutex};

use beacon_core::{PvId, SceneId};
use beacon_resilience::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::event::Event;

/// Scene context captured at submission time. All commands in one bundle
/// share this grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub pv_id: PvId,
    pub original_pv_id: PvId,
    pub scene_id: SceneId,
}

/// Pipeline-relevant properties derived from the event at creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Properties {
    /// Whether the command may enter the bundler while the app is
    /// backgrounded.
    pub is_ready_on_background: bool,
    /// Whether the command is persisted for retry. Non-retryable commands
    /// bypass durability entirely.
    pub is_retryable: bool,
}

/// Single-fire completion signal shared between a command and the caller's
/// [`TrackHandle`]. Cloned freely with the command; the first `resolve` wins.
#[derive(Debug, Clone, Default)]
pub struct CompletionSlot(Arc<Mutex<Option<oneshot::Sender<bool>>>>);

impl CompletionSlot {
    pub fn new() -> (Self, TrackHandle) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), TrackHandle { rx })
    }

    /// Fire the completion. Later calls are no-ops.
    pub fn resolve(&self, delivered: bool) {
        if let Ok(mut slot) = self.0.lock()
            && let Some(tx) = slot.take()
        {
            let _ = tx.send(delivered);
        }
    }
}

/// Caller-side completion handle for one submission.
#[derive(Debug)]
pub struct TrackHandle {
    rx: oneshot::Receiver<bool>,
}

impl TrackHandle {
    /// Resolves once, to `true` when the command's bundle was delivered and
    /// `false` when it was rejected or its delivery failed. A dropped
    /// pipeline resolves to `false`.
    pub async fn outcome(self) -> bool {
        self.rx.await.unwrap_or(false)
    }

    /// A handle that is already resolved, used for submissions rejected
    /// before entering the pipeline.
    pub fn rejected() -> Self {
        let (slot, handle) = CompletionSlot::new();
        slot.resolve(false);
        handle
    }
}

// NOTE: serialized commands are stored in the database. The serialized set is
// identifier, event, scene, properties, visitor_id and date only: retry state
// and the completion slot belong to the process that created the command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingCommand {
    pub identifier: String,
    pub event: Event,
    pub scene: Scene,
    pub properties: Properties,
    pub visitor_id: String,
    pub date: DateTime<Utc>,

    #[serde(skip)]
    pub is_retry: bool,
    #[serde(skip, default = "command_backoff")]
    pub backoff: ExponentialBackoff,
    #[serde(skip)]
    pub completion: CompletionSlot,
}

/// Retry cadence for resubmitted commands: 0.5s base, 4x growth, six
/// attempts, no jitter.
pub fn command_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(0.5, 0.0, 4, 6)
}

impl TrackingCommand {
    /// Build a command for one submission, returning the caller's handle.
    pub fn new(event: Event, scene: Scene, visitor_id: impl Into<String>) -> (Self, TrackHandle) {
        let (completion, handle) = CompletionSlot::new();
        let properties = Properties {
            is_ready_on_background: !event.event_name.is_initialization_event(),
            is_retryable: event.is_retryable(),
        };
        let command = Self {
            identifier: Uuid::new_v4().to_string(),
            event,
            scene,
            properties,
            visitor_id: visitor_id.into(),
            date: Utc::now(),
            is_retry: false,
            backoff: command_backoff(),
            completion,
        };
        (command, handle)
    }
}

impl PartialEq for TrackingCommand {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}
