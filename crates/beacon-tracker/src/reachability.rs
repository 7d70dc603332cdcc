// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connectivity observation for the delivery client.
//!
//! The default notifier probes a TCP connect against the tracking endpoint
//! host on an interval and publishes reachability over a watch channel. The
//! delivery client (and anything else) subscribes via
//! [`receiver`](ProbeReachability::receiver).

use std::time::Duration;

use beacon_core::BeaconError;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Periodic TCP-connect reachability notifier.
///
/// Starts optimistic: the channel holds `true` until the first probe says
/// otherwise, so startup sends are not held hostage by probe latency.
pub struct ProbeReachability {
    host: String,
    port: u16,
    interval: Duration,
    timeout: Duration,
    tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ProbeReachability {
    pub fn new(
        base_url: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self, BeaconError> {
        let url = reqwest::Url::parse(base_url)
            .map_err(|e| BeaconError::Config(format!("invalid base URL `{base_url}`: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| BeaconError::Config(format!("base URL `{base_url}` has no host")))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| BeaconError::Config(format!("base URL `{base_url}` has no port")))?;

        let (tx, _rx) = watch::channel(true);
        Ok(Self {
            host,
            port,
            interval,
            timeout,
            tx,
            task: None,
        })
    }

    /// The observation feed consumed by the delivery client.
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Start probing. Restarting an already-started notifier is a no-op.
    pub fn start_notifier(&mut self) {
        if self.task.is_some() {
            return;
        }

        let host = self.host.clone();
        let port = self.port;
        let interval = self.interval;
        let timeout = self.timeout;
        let tx = self.tx.clone();

        self.task = Some(tokio::spawn(async move {
            loop {
                let reachable = probe(&host, port, timeout).await;
                tx.send_if_modified(|current| {
                    if *current == reachable {
                        false
                    } else {
                        if reachable {
                            info!("communication is possible");
                        } else {
                            info!("communication is impossible");
                        }
                        *current = reachable;
                        true
                    }
                });
                tokio::time::sleep(interval).await;
            }
        }));
        debug!(host = %self.host, port = self.port, "reachability notifier started");
    }

    /// Stop probing. The channel keeps its last value.
    pub fn stop_notifier(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("reachability notifier stopped");
        }
    }
}

impl Drop for ProbeReachability {
    fn drop(&mut self) {
        self.stop_notifier();
    }
}

async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// A hand-driven reachability feed, for tests and hosts with their own
/// connectivity signal.
pub fn manual(initial: bool) -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn probe_reaches_a_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe("127.0.0.1", port, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn notifier_reports_unreachable_endpoint() {
        // Bind then drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut reachability = ProbeReachability::new(
            &format!("http://127.0.0.1:{port}"),
            Duration::from_millis(10),
            Duration::from_millis(200),
        )
        .unwrap();
        let mut rx = reachability.receiver();
        assert!(*rx.borrow(), "starts optimistic");

        reachability.start_notifier();
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());

        reachability.stop_notifier();
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(
            ProbeReachability::new("nope", Duration::from_secs(1), Duration::from_secs(1))
                .is_err()
        );
    }
}
