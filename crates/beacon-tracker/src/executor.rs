// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command executors: the glue between repository, bundler and delivery
//! client.
//!
//! Two variants run side by side. The live executor registers every command
//! durably, gates admission on app state, and bundles with a 100ms window.
//! The retry executor re-enters previously failed or resurrected commands:
//! it marks them as retries, passes everything through, and bundles with a
//! 1s window. Both report per-command outcomes to the agent through an
//! explicit event channel; each sealed bundle maps to exactly one request,
//! submitted exactly once.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::AppState;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::bundle::CommandBundle;
use crate::bundler::{
    CommandBundler, CountBundleRule, SceneBundleRule, TimeWindowRule, VisitorBundleRule,
};
use crate::client::DeliveryClient;
use crate::command::TrackingCommand;
use crate::proxy::CommandBundlerProxy;
use crate::repository::CommandRepository;
use crate::request::{AppContext, TrackRequest};
use crate::response::TrackResponse;

/// Which pipeline an executor serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Live,
    Retry,
}

/// Delegate events reported to the agent. Each command in a dispatched
/// bundle produces exactly one `Completed` or `Failed`, followed by exactly
/// one `AllExecuted` per bundle.
#[derive(Debug)]
pub enum ExecutorEvent {
    Completed(TrackingCommand),
    Failed(TrackingCommand),
    AllExecuted,
}

/// Bundling parameters for one executor.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub window: Duration,
    pub max_bundle_size: usize,
}

/// Handle feeding commands into an executor task.
#[derive(Clone)]
pub struct ExecutorHandle {
    tx: mpsc::UnboundedSender<TrackingCommand>,
}

impl ExecutorHandle {
    pub fn add_command(&self, command: TrackingCommand) {
        if self.tx.send(command).is_err() {
            warn!("executor is gone; command dropped");
        }
    }
}

/// Spawn an executor task and return its command handle.
pub fn spawn_executor(
    kind: ExecutorKind,
    config: ExecutorConfig,
    repository: CommandRepository,
    client: DeliveryClient,
    app: Arc<AppContext>,
    app_state: watch::Receiver<AppState>,
    events_tx: mpsc::UnboundedSender<ExecutorEvent>,
) -> ExecutorHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let window = TimeWindowRule::new(config.window, client.state_receiver());
    let (bundler, fire_rx) = CommandBundler::new(
        vec![Box::new(VisitorBundleRule), Box::new(SceneBundleRule)],
        vec![Box::new(CountBundleRule::new(config.max_bundle_size))],
        Some(window),
    );
    let proxy = match kind {
        ExecutorKind::Live => CommandBundlerProxy::state_gated(bundler, *app_state.borrow()),
        ExecutorKind::Retry => CommandBundlerProxy::through(bundler),
    };

    let task = ExecutorTask {
        kind,
        proxy,
        repository,
        client,
        app,
        events_tx,
    };
    tokio::spawn(task.run(rx, fire_rx, app_state));

    ExecutorHandle { tx }
}

struct ExecutorTask {
    kind: ExecutorKind,
    proxy: CommandBundlerProxy,
    repository: CommandRepository,
    client: DeliveryClient,
    app: Arc<AppContext>,
    events_tx: mpsc::UnboundedSender<ExecutorEvent>,
}

impl ExecutorTask {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<TrackingCommand>,
        mut fire_rx: mpsc::UnboundedReceiver<crate::bundler::AsyncFire>,
        mut app_state: watch::Receiver<AppState>,
    ) {
        let mut app_state_closed = false;

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.add_command(command).await,
                    None => break,
                },
                Some(fire) = fire_rx.recv() => {
                    if let Some(bundle) = self.proxy.handle_fire(fire) {
                        self.dispatch(bundle);
                    }
                }
                changed = app_state.changed(), if !app_state_closed => match changed {
                    Ok(()) => {
                        let state = *app_state.borrow();
                        for bundle in self.proxy.set_app_state(state) {
                            self.dispatch(bundle);
                        }
                    }
                    Err(_) => app_state_closed = true,
                },
            }
        }
    }

    async fn add_command(&mut self, mut command: TrackingCommand) {
        match self.kind {
            ExecutorKind::Live => {
                if self.repository.is_registered(&command).await {
                    // Non-fatal: duplicates are still accepted and processed.
                    info!(command_id = %command.identifier, "command is already registered");
                }
                self.repository.register(&command).await;
            }
            ExecutorKind::Retry => {
                command.is_retry = true;
            }
        }

        for bundle in self.proxy.add_command(command) {
            self.dispatch(bundle);
        }
    }

    /// Turn one sealed bundle into one enqueued request and spawn its
    /// completion handling.
    fn dispatch(&self, bundle: CommandBundle) {
        if bundle.is_empty() {
            return;
        }
        let Some(request) = TrackRequest::from_bundle(bundle, &self.app) else {
            warn!("bundle dropped: app metadata unavailable");
            return;
        };

        let outcome_rx = self.client.enqueue(request);
        let repository = self.repository.clone();
        let app = Arc::clone(&self.app);
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            match outcome_rx.await {
                Ok((request, Ok(response))) => {
                    handle_success(&repository, &app, &events_tx, request, response).await;
                }
                Ok((request, Err(error))) => {
                    handle_failure(&events_tx, request, &error);
                }
                Err(_) => debug!("delivery client dropped before completing the request"),
            }
        });
    }
}

async fn handle_success(
    repository: &CommandRepository,
    app: &AppContext,
    events_tx: &mpsc::UnboundedSender<ExecutorEvent>,
    request: TrackRequest,
    response: TrackResponse,
) {
    for command in &request.commands {
        repository.unregister(command).await;
    }

    if let Some(directives) = &response.response {
        let meta = request.meta();
        for consumer in app.consumers_snapshot() {
            if let Some(runtime) = consumer.runtime() {
                let directives = directives.clone();
                let meta = meta.clone();
                runtime.spawn(async move {
                    consumer.receive(&directives, &meta);
                });
            } else {
                consumer.receive(directives, &meta);
            }
        }
    }

    for command in request.commands {
        let _ = events_tx.send(ExecutorEvent::Completed(command));
    }
    let _ = events_tx.send(ExecutorEvent::AllExecuted);
}

fn handle_failure(
    events_tx: &mpsc::UnboundedSender<ExecutorEvent>,
    request: TrackRequest,
    error: &beacon_core::BeaconError,
) {
    error!(request_id = %request.request_id, error = %error, "failed to send request");
    for command in request.commands {
        let _ = events_tx.send(ExecutorEvent::Failed(command));
    }
    let _ = events_tx.send(ExecutorEvent::AllExecuted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{APP_KEY_HEADER, AppInfo, TRACK_PATH};
    use crate::response::ResponseConsumer;
    use crate::testutil::command;
    use beacon_storage::Database;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        handle: ExecutorHandle,
        repository: CommandRepository,
        events_rx: mpsc::UnboundedReceiver<ExecutorEvent>,
        app: Arc<AppContext>,
        _dir: tempfile::TempDir,
        _state_tx: watch::Sender<AppState>,
        _reach_tx: watch::Sender<bool>,
    }

    async fn harness(kind: ExecutorKind, server: &MockServer) -> Harness {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let repository = CommandRepository::new(db);

        let (reach_tx, reach_rx) = watch::channel(true);
        let client = DeliveryClient::spawn(server.uri(), Duration::from_secs(10), reach_rx);
        let (state_tx, state_rx) = watch::channel(AppState::Active);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let app = Arc::new(AppContext::new("app-key-1", AppInfo::new("demo", "1.0.0")));

        let handle = spawn_executor(
            kind,
            ExecutorConfig {
                window: Duration::from_millis(50),
                max_bundle_size: 10,
            },
            repository.clone(),
            client,
            Arc::clone(&app),
            state_rx,
            events_tx,
        );

        Harness {
            handle,
            repository,
            events_rx,
            app,
            _dir: dir,
            _state_tx: state_tx,
            _reach_tx: reach_tx,
        }
    }

    fn success_template() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "status": 200,
            "response": {"messages": [{"campaign_id": "c1"}]}
        }))
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ExecutorEvent>) -> ExecutorEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for executor event")
            .expect("executor event channel closed")
    }

    #[tokio::test]
    async fn success_clears_durability_and_reports_each_command_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(success_template())
            .expect(1)
            .mount(&server)
            .await;

        let mut h = harness(ExecutorKind::Live, &server).await;
        h.handle.add_command(command("vis-a", "s1", "pv1"));
        h.handle.add_command(command("vis-a", "s1", "pv1"));

        let mut completed = 0;
        loop {
            match next_event(&mut h.events_rx).await {
                ExecutorEvent::Completed(_) => completed += 1,
                ExecutorEvent::AllExecuted => break,
                ExecutorEvent::Failed(c) => panic!("unexpected failure for {}", c.identifier),
            }
        }
        assert_eq!(completed, 2);
        assert_eq!(h.repository.unprocessed_count().await, 0);

        // Both commands travelled in one bundle, so one request.
        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        let app_key = received[0].headers.get(APP_KEY_HEADER).unwrap();
        assert_eq!(app_key.to_str().unwrap(), "app-key-1");
    }

    #[tokio::test]
    async fn failure_preserves_durability_and_reports_each_command_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut h = harness(ExecutorKind::Live, &server).await;
        h.handle.add_command(command("vis-a", "s1", "pv1"));
        h.handle.add_command(command("vis-a", "s1", "pv1"));

        let mut failed = 0;
        loop {
            match next_event(&mut h.events_rx).await {
                ExecutorEvent::Failed(_) => failed += 1,
                ExecutorEvent::AllExecuted => break,
                ExecutorEvent::Completed(c) => panic!("unexpected success for {}", c.identifier),
            }
        }
        assert_eq!(failed, 2);
        // Durable records survive for a later retry pass.
        assert_eq!(h.repository.unprocessed_count().await, 2);
    }

    #[tokio::test]
    async fn retry_executor_marks_commands_and_skips_registration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(success_template())
            .mount(&server)
            .await;

        let mut h = harness(ExecutorKind::Retry, &server).await;
        h.handle.add_command(command("vis-a", "s1", "pv1"));

        loop {
            if matches!(next_event(&mut h.events_rx).await, ExecutorEvent::AllExecuted) {
                break;
            }
        }

        // The retry path never registers.
        assert_eq!(h.repository.unprocessed_count().await, 0);

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["events"][0]["values"]["_retry"], true);
    }

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl ResponseConsumer for Recorder {
        fn receive(
            &self,
            directives: &serde_json::Map<String, serde_json::Value>,
            request: &crate::request::RequestMeta,
        ) {
            let mut seen = self.seen.lock().unwrap();
            seen.push(format!(
                "{}:{}",
                request.visitor_id,
                directives.contains_key("messages")
            ));
        }
    }

    #[tokio::test]
    async fn success_dispatches_directives_to_consumers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(success_template())
            .mount(&server)
            .await;

        let mut h = harness(ExecutorKind::Live, &server).await;
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        h.app.register_consumer(recorder.clone());

        h.handle.add_command(command("vis-a", "s1", "pv1"));
        loop {
            if matches!(next_event(&mut h.events_rx).await, ExecutorEvent::AllExecuted) {
                break;
            }
        }

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["vis-a:true"]);
    }

    #[tokio::test]
    async fn duplicate_submission_is_advisory_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(success_template())
            .mount(&server)
            .await;

        let mut h = harness(ExecutorKind::Live, &server).await;
        let cmd = command("vis-a", "s1", "pv1");
        h.handle.add_command(cmd.clone());
        // The same identifier again: logged, still accepted and processed.
        h.handle.add_command(cmd);

        let mut completed = 0;
        loop {
            match next_event(&mut h.events_rx).await {
                ExecutorEvent::Completed(_) => completed += 1,
                ExecutorEvent::AllExecuted => break,
                ExecutorEvent::Failed(c) => panic!("unexpected failure for {}", c.identifier),
            }
        }
        assert_eq!(completed, 2);
    }
}
