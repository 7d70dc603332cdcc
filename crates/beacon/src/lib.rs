// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Beacon: an embeddable client-side event tracking SDK.
//!
//! [`Beacon::setup`] builds the process-scoped service graph -- database,
//! reachability notifier, tracking pipeline, pub/sub channel -- and
//! [`Beacon::teardown`] winds it down. Everything is constructor-injected;
//! there is no global state.
//!
//! ```no_run
//! use beacon::{Beacon, Event, EventName, Scene};
//! use beacon_core::{PvId, SceneId};
//!
//! # async fn run() -> Result<(), beacon_core::BeaconError> {
//! let config = beacon_config::load_and_validate_str(r#"
//!     [app]
//!     key = "my-app-key"
//!     base_url = "https://track.example.com"
//! "#).expect("config errors");
//!
//! let beacon = Beacon::setup(config).await?;
//! let scene = Scene {
//!     scene_id: SceneId::new("main"),
//!     pv_id: PvId::new("pv-1"),
//!     original_pv_id: PvId::new("pv-1"),
//! };
//! let handle = beacon.track(
//!     Event::new(EventName::new("view"), serde_json::Map::new()),
//!     scene,
//!     "visitor-1",
//! );
//! let delivered = handle.outcome().await;
//! # let _ = delivered;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use beacon_config::BeaconConfig;
use beacon_core::{AppState, BeaconError};
use beacon_pubsub::PubSub;
use beacon_storage::Database;
use beacon_tracker::reachability::ProbeReachability;
use beacon_tracker::{AppContext, AppInfo, TrackingService};
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

pub use beacon_config::load_and_validate_str;
pub use beacon_core::{PvId, SceneId};
pub use beacon_pubsub::{PubSubMessage, PubSubResult, PubSubSubscriber, PublisherId, Topic};
pub use beacon_tracker::{
    AgentNotification, Event, EventName, RejectionFilterRule, ResponseConsumer, Scene,
    TrackHandle,
};

/// The SDK entry point: a process-scoped handle to the whole pipeline.
pub struct Beacon {
    db: Database,
    service: TrackingService,
    pubsub: PubSub,
    app: Arc<AppContext>,
    app_state_tx: watch::Sender<AppState>,
    reachability: Mutex<ProbeReachability>,
}

impl Beacon {
    /// Build and start the service graph from a validated configuration.
    pub async fn setup(config: BeaconConfig) -> Result<Self, BeaconError> {
        let db = Database::open(&config.storage.database_path).await?;

        let mut reachability = ProbeReachability::new(
            &config.app.base_url,
            Duration::from_secs(config.reachability.probe_interval_secs),
            Duration::from_millis(config.reachability.probe_timeout_ms),
        )?;
        reachability.start_notifier();

        let (app_state_tx, app_state_rx) = watch::channel(AppState::Active);
        let app = Arc::new(AppContext::new(
            &config.app.key,
            AppInfo::new(&config.app.name, &config.app.version),
        ));

        let service = TrackingService::new(
            &config,
            db.clone(),
            Arc::clone(&app),
            app_state_rx.clone(),
            reachability.receiver(),
        )
        .await;
        let pubsub = PubSub::spawn(db.clone(), app_state_rx);

        info!("beacon setup complete");
        Ok(Self {
            db,
            service,
            pubsub,
            app,
            app_state_tx,
            reachability: Mutex::new(reachability),
        })
    }

    /// Submit one event. The handle resolves exactly once to delivered or
    /// not delivered.
    pub fn track(&self, event: Event, scene: Scene, visitor_id: &str) -> TrackHandle {
        self.service.track(event, scene, visitor_id)
    }

    /// Feed the host application's foreground/background transitions into
    /// the pipeline.
    pub fn set_app_state(&self, state: AppState) {
        let _ = self.app_state_tx.send(state);
    }

    /// Register a module interested in server directives.
    pub fn register_response_consumer(&self, consumer: Arc<dyn ResponseConsumer>) {
        self.app.register_consumer(consumer);
    }

    /// Register a module-provided event rejection rule.
    pub fn register_rejection_rule(&self, rule: Arc<dyn RejectionFilterRule>) {
        self.service.register_rejection_rule(rule);
    }

    /// Notifications from the tracking agent (e.g. the pending queue
    /// draining to empty).
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<AgentNotification> {
        self.service.agent().subscribe()
    }

    /// The secondary pub/sub delivery channel.
    pub fn pubsub(&self) -> &PubSub {
        &self.pubsub
    }

    /// The tracking pipeline, for hosts needing lower-level access.
    pub fn tracking(&self) -> &TrackingService {
        &self.service
    }

    /// Wind the SDK down: drop durable state (opt-out semantics), stop the
    /// reachability notifier and checkpoint the database.
    pub async fn teardown(&self) {
        self.service.teardown().await;
        self.pubsub.teardown();
        if let Ok(mut reachability) = self.reachability.lock() {
            reachability.stop_notifier();
        }
        if let Err(e) = self.db.close().await {
            error!(error = %e, "database checkpoint failed during teardown");
        }
        info!("beacon teardown complete");
    }
}
