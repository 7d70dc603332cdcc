// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tracking agent: one live pipeline, one retry pipeline, one delegate
//! loop.
//!
//! The agent owns the command repository and the circuit breaker, wires both
//! executors to a shared delivery client, and consumes their delegate
//! events: success resolves caller completions and resets the breaker;
//! failure counts a breaker failure and -- while the breaker still admits
//! requests -- re-enters retryable commands through the retry executor after
//! their per-command backoff delay. At construction, commands spooled by a
//! previous process run are fed straight into the retry pipeline.

use std::sync::Arc;
use std::time::Duration;

use beacon_config::BeaconConfig;
use beacon_core::AppState;
use beacon_resilience::CircuitBreaker;
use beacon_storage::Database;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::client::DeliveryClient;
use crate::command::TrackingCommand;
use crate::executor::{
    ExecutorConfig, ExecutorEvent, ExecutorHandle, ExecutorKind, spawn_executor,
};
use crate::repository::CommandRepository;
use crate::request::AppContext;

/// Notifications other subsystems can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentNotification {
    /// All pending durable work has drained -- the signal a backgrounding
    /// flush (or a waiting test harness) uses to know delivery is done.
    QueueEmpty,
}

/// Orchestrates repository, executors and delivery client.
pub struct TrackingAgent {
    live: ExecutorHandle,
    retry: ExecutorHandle,
    repository: CommandRepository,
    notifications: broadcast::Sender<AgentNotification>,
}

impl TrackingAgent {
    pub async fn new(
        config: &BeaconConfig,
        db: Database,
        app: Arc<AppContext>,
        app_state: watch::Receiver<AppState>,
        reachability: watch::Receiver<bool>,
    ) -> Self {
        let client = DeliveryClient::spawn(
            config.app.base_url.clone(),
            Duration::from_secs(config.tracking.request_timeout_secs),
            reachability,
        );
        let repository = CommandRepository::new(db);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let live = spawn_executor(
            ExecutorKind::Live,
            ExecutorConfig {
                window: Duration::from_millis(config.tracking.live_window_ms),
                max_bundle_size: config.tracking.max_bundle_size,
            },
            repository.clone(),
            client.clone(),
            Arc::clone(&app),
            app_state.clone(),
            events_tx.clone(),
        );
        let retry = spawn_executor(
            ExecutorKind::Retry,
            ExecutorConfig {
                window: Duration::from_millis(config.tracking.retry_window_ms),
                max_bundle_size: config.tracking.max_bundle_size,
            },
            repository.clone(),
            client,
            app,
            app_state,
            events_tx,
        );

        let (notifications, _) = broadcast::channel(16);
        let delegate = DelegateLoop {
            breaker: CircuitBreaker::new(
                config.circuit_breaker.threshold,
                Duration::from_secs(config.circuit_breaker.recover_after_secs),
            ),
            repository: repository.clone(),
            retry: retry.clone(),
            notifications: notifications.clone(),
        };
        tokio::spawn(delegate.run(events_rx));

        let agent = Self {
            live,
            retry,
            repository,
            notifications,
        };
        agent.restore_retryable_commands().await;
        agent
    }

    /// Submit one command to the live pipeline.
    pub fn schedule(&self, command: TrackingCommand) {
        self.live.add_command(command);
    }

    /// Subscribe to agent notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentNotification> {
        self.notifications.subscribe()
    }

    pub fn repository(&self) -> &CommandRepository {
        &self.repository
    }

    /// Drop all durable state (opt-out / teardown).
    pub async fn teardown(&self) {
        self.repository.unregister_all().await;
    }

    /// Feed commands spooled by a previous, now-dead process run into the
    /// retry pipeline, giving them one more chance at delivery.
    async fn restore_retryable_commands(&self) {
        let commands = self.repository.retryable_commands().await;
        if commands.is_empty() {
            return;
        }
        debug!(count = commands.len(), "restoring retryable commands");
        for command in commands {
            self.retry.add_command(command);
        }
    }
}

struct DelegateLoop {
    breaker: CircuitBreaker,
    repository: CommandRepository,
    retry: ExecutorHandle,
    notifications: broadcast::Sender<AgentNotification>,
}

impl DelegateLoop {
    async fn run(mut self, mut events_rx: mpsc::UnboundedReceiver<ExecutorEvent>) {
        while let Some(event) = events_rx.recv().await {
            match event {
                ExecutorEvent::Completed(command) => {
                    command.completion.resolve(true);
                    self.breaker.reset();
                }
                ExecutorEvent::Failed(mut command) => {
                    self.breaker.count_failure();
                    command.completion.resolve(false);

                    if !command.properties.is_retryable || !self.breaker.can_request() {
                        continue;
                    }
                    match command.backoff.next_delay() {
                        Ok(delay) => {
                            let retry = self.retry.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                retry.add_command(command);
                            });
                        }
                        Err(_) => {
                            warn!(
                                command_id = %command.identifier,
                                "the maximum number of retries has been reached"
                            );
                        }
                    }
                }
                ExecutorEvent::AllExecuted => {
                    if self.repository.unprocessed_count().await == 0 {
                        let _ = self.notifications.send(AgentNotification::QueueEmpty);
                    }
                }
            }
        }
    }
}
