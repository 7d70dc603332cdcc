// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pub/sub engine: per-topic batching dispatch, subscriber delivery,
//! publisher outcome fan-out, and backoff republish to the retry topic.
//!
//! One engine task owns every mutable aggregate (topic queues, subscriber
//! slots, publisher registry); everything else talks to it through channels.
//! Durable acceptance goes through the [`Registrar`] before a message enters
//! a queue, and the durable count reaching zero fires the queue-empty
//! notification other subsystems wait on.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{AppState, BeaconError};
use beacon_storage::Database;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::message::{PubSubMessage, PublisherId, Topic};
use crate::registrar::Registrar;

/// Quiet period between a message arriving and its batch dispatching.
const BATCH_DELAY: Duration = Duration::from_millis(500);
/// Messages handed to a subscriber per delivery.
const BATCH_LIMIT: usize = 10;

/// Receives batches for one topic. `Ok` acknowledges every message in the
/// batch; `Err` rejects them all.
#[async_trait]
pub trait PubSubSubscriber: Send + Sync {
    async fn receive(&self, topic: Topic, messages: Vec<PubSubMessage>)
    -> Result<(), BeaconError>;
}

/// Per-message delivery outcome reported back to the owning publisher.
#[derive(Debug, Clone)]
pub enum PubSubResult {
    Success(Topic, PubSubMessage),
    Failure(Topic, PubSubMessage),
}

enum EngineMsg {
    Publish {
        topic: Topic,
        message: PubSubMessage,
    },
    RegisterPublisher {
        id: PublisherId,
        outcomes: mpsc::UnboundedSender<PubSubResult>,
    },
    RegisterSubscriber {
        topic: Topic,
        subscriber: Arc<dyn PubSubSubscriber>,
    },
    SetSuspended(bool),
    Teardown,
}

enum InternalMsg {
    DrainTick(Topic),
    DeliveryDone {
        topic: Topic,
        messages: Vec<PubSubMessage>,
        accepted: bool,
    },
    Republish(PubSubMessage),
}

/// Handle to the pub/sub engine. Cheap to clone; dropping every handle stops
/// the engine task.
#[derive(Clone)]
pub struct PubSub {
    tx: mpsc::UnboundedSender<EngineMsg>,
    registrar: Registrar,
    queue_empty: broadcast::Sender<()>,
}

impl PubSub {
    pub fn spawn(db: Database, app_state: watch::Receiver<AppState>) -> Self {
        let registrar = Registrar::new(db);
        let (tx, rx) = mpsc::unbounded_channel();
        let (queue_empty, _) = broadcast::channel(16);

        let (engine, internal_rx) = Engine::new(registrar.clone(), queue_empty.clone(), app_state);
        tokio::spawn(engine.run(rx, internal_rx));

        Self {
            tx,
            registrar,
            queue_empty,
        }
    }

    /// Durably accept a message and route it to the topic's dispatcher.
    pub fn publish(&self, topic: Topic, message: PubSubMessage) {
        let _ = self.tx.send(EngineMsg::Publish { topic, message });
    }

    /// Register a publisher and receive its delivery outcomes. Messages this
    /// publisher spooled in previous process runs are republished to the
    /// retry topic.
    pub fn register_publisher(&self, id: PublisherId) -> mpsc::UnboundedReceiver<PubSubResult> {
        let (outcomes, rx) = mpsc::unbounded_channel();
        let _ = self.tx.send(EngineMsg::RegisterPublisher { id, outcomes });
        rx
    }

    /// Attach the subscriber for one topic. A topic holds at most one
    /// subscriber; later registrations are ignored with a warning.
    pub fn register_subscriber(&self, topic: Topic, subscriber: Arc<dyn PubSubSubscriber>) {
        let _ = self
            .tx
            .send(EngineMsg::RegisterSubscriber { topic, subscriber });
    }

    /// Stop delivery without losing queued messages.
    pub fn suspend(&self) {
        let _ = self.tx.send(EngineMsg::SetSuspended(true));
    }

    /// Restart delivery and drain whatever queued up while suspended.
    pub fn resume(&self) {
        let _ = self.tx.send(EngineMsg::SetSuspended(false));
    }

    /// Durable messages still pending delivery.
    pub async fn count(&self) -> u64 {
        self.registrar.count().await
    }

    /// Fires whenever the durable count drains to zero.
    pub fn subscribe_queue_empty(&self) -> broadcast::Receiver<()> {
        self.queue_empty.subscribe()
    }

    /// Drop all durable state.
    pub fn teardown(&self) {
        let _ = self.tx.send(EngineMsg::Teardown);
    }
}

#[derive(Default)]
struct TopicState {
    queue: VecDeque<PubSubMessage>,
    subscriber: Option<Arc<dyn PubSubSubscriber>>,
    delivering: bool,
    tick_scheduled: bool,
}

struct Engine {
    registrar: Registrar,
    publishers: HashMap<PublisherId, mpsc::UnboundedSender<PubSubResult>>,
    default_topic: TopicState,
    retry_topic: TopicState,
    suspended: bool,
    queue_empty: broadcast::Sender<()>,
    app_state: watch::Receiver<AppState>,
    internal_tx: mpsc::UnboundedSender<InternalMsg>,
}

impl Engine {
    fn new(
        registrar: Registrar,
        queue_empty: broadcast::Sender<()>,
        app_state: watch::Receiver<AppState>,
    ) -> (Self, mpsc::UnboundedReceiver<InternalMsg>) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        (
            Self {
                registrar,
                publishers: HashMap::new(),
                default_topic: TopicState::default(),
                retry_topic: TopicState::default(),
                suspended: false,
                queue_empty,
                app_state,
                internal_tx,
            },
            internal_rx,
        )
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<EngineMsg>,
        mut internal_rx: mpsc::UnboundedReceiver<InternalMsg>,
    ) {
        let mut app_state = self.app_state.clone();
        let mut app_state_closed = false;

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle_engine_msg(msg).await,
                    None => break,
                },
                Some(msg) = internal_rx.recv() => {
                    self.handle_internal_msg(msg).await;
                }
                changed = app_state.changed(), if !app_state_closed => match changed {
                    Ok(()) => {
                        // Foreground transitions unlock held messages.
                        if *app_state.borrow() == AppState::Active {
                            self.try_deliver(Topic::Default);
                            self.try_deliver(Topic::Retry);
                        }
                    }
                    Err(_) => app_state_closed = true,
                },
            }
        }
    }

    async fn handle_engine_msg(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::Publish { topic, message } => self.publish(topic, message).await,
            EngineMsg::RegisterPublisher { id, outcomes } => {
                if self.publishers.contains_key(&id) {
                    warn!(publisher_id = %id.0, "publisher is already registered");
                    return;
                }
                self.publishers.insert(id.clone(), outcomes);

                // Give this publisher's spool from dead process runs one
                // more chance via the retry topic.
                let retryable = self.registrar.retryable(&id).await;
                if !retryable.is_empty() {
                    debug!(
                        publisher_id = %id.0,
                        count = retryable.len(),
                        "republishing retryable messages"
                    );
                }
                for message in retryable {
                    self.publish(Topic::Retry, message).await;
                }
            }
            EngineMsg::RegisterSubscriber { topic, subscriber } => {
                let state = self.state_mut(topic);
                if state.subscriber.is_some() {
                    warn!(%topic, "subscriber is already registered");
                    return;
                }
                state.subscriber = Some(subscriber);
                self.try_deliver(topic);
            }
            EngineMsg::SetSuspended(suspended) => {
                if self.suspended != suspended {
                    self.suspended = suspended;
                    if !suspended {
                        self.try_deliver(Topic::Default);
                        self.try_deliver(Topic::Retry);
                    }
                }
            }
            EngineMsg::Teardown => self.registrar.teardown().await,
        }
    }

    async fn handle_internal_msg(&mut self, msg: InternalMsg) {
        match msg {
            InternalMsg::DrainTick(topic) => {
                self.state_mut(topic).tick_scheduled = false;
                self.try_deliver(topic);
            }
            InternalMsg::DeliveryDone {
                topic,
                messages,
                accepted,
            } => self.delivery_done(topic, messages, accepted).await,
            InternalMsg::Republish(message) => self.publish(Topic::Retry, message).await,
        }
    }

    async fn publish(&mut self, topic: Topic, message: PubSubMessage) {
        self.registrar.accept(&message).await;
        self.state_mut(topic).queue.push_back(message);
        self.schedule_tick(topic);
    }

    fn schedule_tick(&mut self, topic: Topic) {
        let tx = self.internal_tx.clone();
        let state = self.state_mut(topic);
        if state.tick_scheduled {
            return;
        }
        state.tick_scheduled = true;
        tokio::spawn(async move {
            tokio::time::sleep(BATCH_DELAY).await;
            let _ = tx.send(InternalMsg::DrainTick(topic));
        });
    }

    /// Dispatch the next eligible batch for a topic, if any.
    fn try_deliver(&mut self, topic: Topic) {
        if self.suspended {
            return;
        }
        let app_active = *self.app_state.borrow() == AppState::Active;
        let tx = self.internal_tx.clone();
        let state = self.state_mut(topic);

        if state.delivering {
            return;
        }
        let Some(subscriber) = state.subscriber.clone() else {
            if !state.queue.is_empty() {
                warn!(%topic, "subscriber isn't registered");
            }
            return;
        };

        // Up to BATCH_LIMIT messages, skipping ones held by background
        // state; the rest keep their order.
        let mut batch = Vec::new();
        let mut kept = VecDeque::new();
        while let Some(message) = state.queue.pop_front() {
            if batch.len() < BATCH_LIMIT && (message.is_ready_on_background || app_active) {
                batch.push(message);
            } else {
                kept.push_back(message);
            }
        }
        state.queue = kept;

        if batch.is_empty() {
            return;
        }
        state.delivering = true;

        tokio::spawn(async move {
            let accepted = subscriber.receive(topic, batch.clone()).await.is_ok();
            let _ = tx.send(InternalMsg::DeliveryDone {
                topic,
                messages: batch,
                accepted,
            });
        });
    }

    async fn delivery_done(
        &mut self,
        topic: Topic,
        messages: Vec<PubSubMessage>,
        accepted: bool,
    ) {
        self.state_mut(topic).delivering = false;

        if accepted {
            self.registrar.reached(&messages).await;
            for message in messages {
                self.notify_publisher(PubSubResult::Success(topic, message));
            }
        } else {
            self.registrar.not_reached(&messages);
            for mut message in messages {
                self.notify_publisher(PubSubResult::Failure(topic, message.clone()));
                if !message.is_retryable {
                    continue;
                }
                match message.backoff.next_delay() {
                    Ok(delay) => {
                        let tx = self.internal_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx.send(InternalMsg::Republish(message));
                        });
                    }
                    Err(_) => warn!(
                        message_id = %message.message_id.0,
                        "the maximum number of retries has been reached"
                    ),
                }
            }
        }

        if self.registrar.count().await == 0 {
            let _ = self.queue_empty.send(());
        }

        if !self.state_mut(topic).queue.is_empty() {
            self.schedule_tick(topic);
        }
    }

    fn notify_publisher(&self, result: PubSubResult) {
        let publisher_id = match &result {
            PubSubResult::Success(_, message) | PubSubResult::Failure(_, message) => {
                message.publisher_id.clone()
            }
        };
        if let Some(outcomes) = self.publishers.get(&publisher_id) {
            let _ = outcomes.send(result);
        }
    }

    fn state_mut(&mut self, topic: Topic) -> &mut TopicState {
        match topic {
            Topic::Default => &mut self.default_topic,
            Topic::Retry => &mut self.retry_topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct Recorder {
        seen: Mutex<Vec<(Topic, usize)>>,
        fail_on: Option<Topic>,
    }

    impl Recorder {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail_on: None,
            })
        }

        fn failing_on(topic: Topic) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail_on: Some(topic),
            })
        }

        fn batches(&self) -> Vec<(Topic, usize)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PubSubSubscriber for Recorder {
        async fn receive(
            &self,
            topic: Topic,
            messages: Vec<PubSubMessage>,
        ) -> Result<(), BeaconError> {
            self.seen.lock().unwrap().push((topic, messages.len()));
            if self.fail_on == Some(topic) {
                return Err(BeaconError::Internal("delivery refused".into()));
            }
            Ok(())
        }
    }

    async fn setup(initial_state: AppState) -> (PubSub, watch::Sender<AppState>, tempfile::TempDir)
    {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let (state_tx, state_rx) = watch::channel(initial_state);
        (PubSub::spawn(db, state_rx), state_tx, dir)
    }

    fn message(publisher: &str) -> PubSubMessage {
        PubSubMessage::new(PublisherId::new(publisher), b"payload".to_vec(), true, true)
    }

    async fn next_outcome(rx: &mut mpsc::UnboundedReceiver<PubSubResult>) -> PubSubResult {
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for outcome")
            .expect("outcome channel closed")
    }

    /// Wait until the durable spool holds exactly `expected` messages.
    async fn wait_for_count(pubsub: &PubSub, expected: u64) {
        tokio::time::timeout(Duration::from_secs(30), async {
            while pubsub.count().await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for spool count");
    }

    #[tokio::test]
    async fn publishes_deliver_and_drain_the_spool() {
        let (pubsub, _state, _dir) = setup(AppState::Active).await;
        let recorder = Recorder::ok();
        pubsub.register_subscriber(Topic::Default, recorder.clone());
        let mut outcomes = pubsub.register_publisher(PublisherId::new("pub-a"));
        let mut queue_empty = pubsub.subscribe_queue_empty();

        pubsub.publish(Topic::Default, message("pub-a"));

        match next_outcome(&mut outcomes).await {
            PubSubResult::Success(Topic::Default, _) => {}
            other => panic!("expected default-topic success, got {other:?}"),
        }
        tokio::time::timeout(Duration::from_secs(30), queue_empty.recv())
            .await
            .expect("queue-empty should fire")
            .unwrap();
        assert_eq!(pubsub.count().await, 0);
        assert_eq!(recorder.batches(), vec![(Topic::Default, 1)]);
    }

    #[tokio::test]
    async fn rejected_messages_republish_to_the_retry_topic() {
        let (pubsub, _state, _dir) = setup(AppState::Active).await;
        let flaky = Recorder::failing_on(Topic::Default);
        pubsub.register_subscriber(Topic::Default, flaky.clone());
        pubsub.register_subscriber(Topic::Retry, flaky.clone());
        let mut outcomes = pubsub.register_publisher(PublisherId::new("pub-a"));

        pubsub.publish(Topic::Default, message("pub-a"));

        match next_outcome(&mut outcomes).await {
            PubSubResult::Failure(Topic::Default, _) => {}
            other => panic!("expected default-topic failure, got {other:?}"),
        }
        match next_outcome(&mut outcomes).await {
            PubSubResult::Success(Topic::Retry, _) => {}
            other => panic!("expected retry-topic success, got {other:?}"),
        }
        assert_eq!(pubsub.count().await, 0);
        assert_eq!(
            flaky.batches(),
            vec![(Topic::Default, 1), (Topic::Retry, 1)]
        );
    }

    #[tokio::test]
    async fn suspension_holds_delivery_without_losing_messages() {
        let (pubsub, _state, _dir) = setup(AppState::Active).await;
        let recorder = Recorder::ok();
        pubsub.register_subscriber(Topic::Default, recorder.clone());
        let mut outcomes = pubsub.register_publisher(PublisherId::new("pub-a"));

        pubsub.suspend();
        pubsub.publish(Topic::Default, message("pub-a"));

        wait_for_count(&pubsub, 1).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(recorder.batches().is_empty(), "suspended: nothing delivers");

        pubsub.resume();
        match next_outcome(&mut outcomes).await {
            PubSubResult::Success(Topic::Default, _) => {}
            other => panic!("expected success after resume, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn background_messages_wait_for_foreground() {
        let (pubsub, state_tx, _dir) = setup(AppState::Background).await;
        let recorder = Recorder::ok();
        pubsub.register_subscriber(Topic::Default, recorder.clone());
        let mut outcomes = pubsub.register_publisher(PublisherId::new("pub-a"));

        let mut held = message("pub-a");
        held.is_ready_on_background = false;
        pubsub.publish(Topic::Default, held);

        wait_for_count(&pubsub, 1).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(recorder.batches().is_empty(), "held while backgrounded");

        state_tx.send(AppState::Active).unwrap();
        match next_outcome(&mut outcomes).await {
            PubSubResult::Success(Topic::Default, _) => {}
            other => panic!("expected success after foreground, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn batches_are_capped() {
        let (pubsub, _state, _dir) = setup(AppState::Active).await;
        let recorder = Recorder::ok();
        pubsub.register_subscriber(Topic::Default, recorder.clone());
        let mut outcomes = pubsub.register_publisher(PublisherId::new("pub-a"));

        for _ in 0..12 {
            pubsub.publish(Topic::Default, message("pub-a"));
        }
        for _ in 0..12 {
            next_outcome(&mut outcomes).await;
        }

        let batches = recorder.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], (Topic::Default, 10));
        assert_eq!(batches[1], (Topic::Default, 2));
    }

    #[tokio::test]
    async fn registering_a_publisher_resurrects_its_spool() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        // A previous process run accepted a message and died.
        let dead_run = Registrar::with_process_id(db.clone(), "proc-dead");
        dead_run.accept(&message("pub-a")).await;

        let (_state_tx, state_rx) = watch::channel(AppState::Active);
        let pubsub = PubSub::spawn(db, state_rx);
        let recorder = Recorder::ok();
        pubsub.register_subscriber(Topic::Retry, recorder.clone());
        let mut outcomes = pubsub.register_publisher(PublisherId::new("pub-a"));

        match next_outcome(&mut outcomes).await {
            PubSubResult::Success(Topic::Retry, _) => {}
            other => panic!("expected retry-topic success, got {other:?}"),
        }
        assert_eq!(pubsub.count().await, 0);
    }
}
