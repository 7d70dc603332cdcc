// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The submission front door: filtering, command construction, scheduling.

use std::sync::{Arc, RwLock};

use beacon_config::BeaconConfig;
use beacon_core::AppState;
use beacon_storage::Database;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::agent::TrackingAgent;
use crate::command::{Scene, TrackHandle, TrackingCommand};
use crate::event::Event;
use crate::filter::{EventFilter, RejectionFilter, RejectionFilterRule};
use crate::request::AppContext;

/// Accepts event submissions, rejects invalid or filtered ones before they
/// touch the pipeline, and schedules the rest on the agent.
///
/// The host only ever observes "delivered" or "not delivered" per call; a
/// rejection resolves the handle as not delivered without entering the
/// bundler.
pub struct TrackingService {
    agent: TrackingAgent,
    event_filter: EventFilter,
    rejection_filter: RwLock<RejectionFilter>,
}

impl TrackingService {
    pub async fn new(
        config: &BeaconConfig,
        db: Database,
        app: Arc<AppContext>,
        app_state: watch::Receiver<AppState>,
        reachability: watch::Receiver<bool>,
    ) -> Self {
        let agent = TrackingAgent::new(config, db, app, app_state, reachability).await;
        Self {
            agent,
            event_filter: EventFilter::standard(),
            rejection_filter: RwLock::new(RejectionFilter::default()),
        }
    }

    /// Submit one event. The handle resolves exactly once.
    pub fn track(&self, event: Event, scene: Scene, visitor_id: &str) -> TrackHandle {
        if let Err(e) = self.event_filter.filter(&event) {
            warn!(event_name = %event.event_name, error = %e, "event is invalid");
            return TrackHandle::rejected();
        }

        let rejected = self
            .rejection_filter
            .read()
            .map(|filter| filter.rejects(&event))
            .unwrap_or(false);
        if rejected {
            debug!(event_name = %event.event_name, "event excluded by rejection filter");
            return TrackHandle::rejected();
        }

        let (command, handle) = TrackingCommand::new(event, scene, visitor_id);
        self.agent.schedule(command);
        handle
    }

    /// Register a module-provided rejection rule.
    pub fn register_rejection_rule(&self, rule: Arc<dyn RejectionFilterRule>) {
        if let Ok(mut filter) = self.rejection_filter.write() {
            filter.add(rule);
        }
    }

    pub fn agent(&self) -> &TrackingAgent {
        &self.agent
    }

    pub async fn teardown(&self) {
        self.agent.teardown().await;
    }
}
