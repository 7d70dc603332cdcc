// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FIFO delivery client.
//!
//! Owns the queue of outbound requests and sends exactly one at a time, in
//! order -- a second enqueue while sending appends, it never jumps the
//! queue. The client reports `Waiting`/`Running` transitions through a watch
//! channel (edge-triggered) and observes reachability: becoming reachable
//! drains the queue, becoming unreachable only updates state and never
//! cancels in-flight work.
//!
//! The client does not retry failed sends; retry is re-entry through the
//! executors. It guarantees ordered, one-at-a-time transmission, not
//! eventual success.

use std::collections::VecDeque;
use std::time::Duration;

use beacon_core::BeaconError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, trace, warn};

use crate::request::{APP_KEY_HEADER, TRACK_PATH, TrackRequest};
use crate::response::TrackResponse;

/// Delivery client state, for backpressure observers.
///
/// `Waiting` iff the queue is empty, nothing is in flight, and the network
/// is reachable. An unreachable client reports `Running` even with an empty
/// queue, so "running" does not always mean work in flight -- observers
/// depend on not seeing a premature idle signal while offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    #[default]
    Waiting,
    Running,
}

/// The result handed back per request: the request itself plus the outcome.
pub type DeliveryOutcome = (TrackRequest, Result<TrackResponse, BeaconError>);

enum ClientMsg {
    Enqueue {
        request: TrackRequest,
        completion: oneshot::Sender<DeliveryOutcome>,
    },
}

/// Handle to the delivery client task. Cheap to clone; dropping every handle
/// stops the task.
#[derive(Clone)]
pub struct DeliveryClient {
    tx: mpsc::UnboundedSender<ClientMsg>,
    state_rx: watch::Receiver<ClientState>,
}

impl DeliveryClient {
    /// Spawn the client task.
    ///
    /// `reachability` is the connectivity observation feed; its current
    /// value seeds the client's view.
    pub fn spawn(
        base_url: String,
        timeout: Duration,
        reachability: watch::Receiver<bool>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::default());

        let (task, finished_rx) = ClientTask::new(base_url, timeout, reachability, state_tx);
        tokio::spawn(task.run(rx, finished_rx));

        Self { tx, state_rx }
    }

    /// Append a request to the FIFO. The returned channel resolves once with
    /// the delivery outcome; it resolves with an error if the client task is
    /// gone.
    pub fn enqueue(&self, request: TrackRequest) -> oneshot::Receiver<DeliveryOutcome> {
        let (completion, rx) = oneshot::channel();
        let _ = self.tx.send(ClientMsg::Enqueue {
            request,
            completion,
        });
        rx
    }

    pub fn state(&self) -> ClientState {
        *self.state_rx.borrow()
    }

    /// Edge-triggered state observation feed.
    pub fn state_receiver(&self) -> watch::Receiver<ClientState> {
        self.state_rx.clone()
    }
}

struct PendingTask {
    request: TrackRequest,
    completion: oneshot::Sender<DeliveryOutcome>,
}

struct ClientTask {
    http: reqwest::Client,
    base_url: String,
    queue: VecDeque<PendingTask>,
    is_sending: bool,
    is_reachable: bool,
    reachability: watch::Receiver<bool>,
    state_tx: watch::Sender<ClientState>,
    finished_tx: mpsc::UnboundedSender<Result<TrackResponse, BeaconError>>,
}

impl ClientTask {
    fn new(
        base_url: String,
        timeout: Duration,
        reachability: watch::Receiver<bool>,
        state_tx: watch::Sender<ClientState>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<Result<TrackResponse, BeaconError>>,
    ) {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        let is_reachable = *reachability.borrow();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();

        (
            Self {
                http,
                base_url,
                queue: VecDeque::new(),
                is_sending: false,
                is_reachable,
                reachability,
                state_tx,
                finished_tx,
            },
            finished_rx,
        )
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ClientMsg>,
        mut finished_rx: mpsc::UnboundedReceiver<Result<TrackResponse, BeaconError>>,
    ) {
        let mut reachability = self.reachability.clone();
        let mut reachability_closed = false;

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(ClientMsg::Enqueue { request, completion }) => {
                        self.handle_enqueue(request, completion);
                    }
                    // All handles dropped: the pipeline is tearing down.
                    None => break,
                },
                Some(result) = finished_rx.recv() => {
                    self.finish_send(result);
                }
                changed = reachability.changed(), if !reachability_closed => {
                    match changed {
                        Ok(()) => {
                            self.is_reachable = *reachability.borrow();
                            if self.is_reachable {
                                debug!("network reachable");
                                self.send_next();
                            } else {
                                debug!("network unreachable");
                            }
                            self.update_state();
                        }
                        // Notifier gone; keep the last observed value.
                        Err(_) => reachability_closed = true,
                    }
                }
            }
        }
    }

    fn handle_enqueue(
        &mut self,
        request: TrackRequest,
        completion: oneshot::Sender<DeliveryOutcome>,
    ) {
        let was_waiting = *self.state_tx.borrow() == ClientState::Waiting;
        self.queue.push_back(PendingTask {
            request,
            completion,
        });

        if was_waiting {
            self.update_state();
            self.start_send();
        }
    }

    fn finish_send(&mut self, result: Result<TrackResponse, BeaconError>) {
        self.is_sending = false;

        if let Some(task) = self.queue.pop_front() {
            let _ = task.completion.send((task.request, result));
        }

        self.update_state();
        self.send_next();
    }

    /// Send the head of the queue if reachable and idle.
    fn send_next(&mut self) {
        if !self.queue.is_empty() && self.is_reachable && !self.is_sending {
            self.start_send();
        }
    }

    /// Unconditionally start sending the head of the queue.
    fn start_send(&mut self) {
        let Some(task) = self.queue.front() else {
            return;
        };
        if self.is_sending {
            return;
        }
        self.is_sending = true;

        let request_id = task.request.request_id.clone();
        debug!(request_id = %request_id, retry = task.request.is_retry, "request start");
        for command in &task.request.commands {
            trace!(
                request_id = %request_id,
                command_id = %command.identifier,
                event_name = %command.event.event_name,
                "event included in the request"
            );
        }

        let http = self.http.clone();
        let url = format!("{}{}", self.base_url, TRACK_PATH);
        let app_key = task.request.app_key.clone();
        let body = task.request.body();
        let finished_tx = self.finished_tx.clone();

        tokio::spawn(async move {
            let result = send_request(http, url, app_key, body).await;
            debug!(request_id = %request_id, "request end");
            let _ = finished_tx.send(result);
        });
    }

    fn update_state(&mut self) {
        let new_state = if self.is_reachable {
            if self.queue.is_empty() && !self.is_sending {
                ClientState::Waiting
            } else {
                ClientState::Running
            }
        } else {
            ClientState::Running
        };

        self.state_tx.send_if_modified(|state| {
            if *state == new_state {
                false
            } else {
                debug!(?new_state, "delivery client state changed");
                *state = new_state;
                true
            }
        });
    }
}

async fn send_request(
    http: reqwest::Client,
    url: String,
    app_key: String,
    body: serde_json::Value,
) -> Result<TrackResponse, BeaconError> {
    let response = http
        .post(&url)
        .header(APP_KEY_HEADER, &app_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| BeaconError::Network {
            message: format!("request failed: {e}"),
            source: Some(Box::new(e)),
        })?;

    let status = response.status();
    let code = status.as_u16();

    if status.is_success() || status.is_redirection() || status.is_client_error() {
        if status.is_client_error() {
            warn!(status = code, "the server returned an error response");
        } else {
            trace!(status = code, "the server returned a normal response");
        }
        let text = response.text().await.map_err(|e| BeaconError::Network {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&text).map_err(|e| BeaconError::Network {
            message: format!("failed to parse response body: {e}"),
            source: Some(Box::new(e)),
        })
    } else if code == 503 {
        // Service delivery intentionally paused; still a failed delivery.
        warn!(status = code, "request sent but service delivery is stopping");
        Err(BeaconError::Server { status: code })
    } else {
        error!(status = code, "the server returned an error response");
        Err(BeaconError::Server { status: code })
    }
}
