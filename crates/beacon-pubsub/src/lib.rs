// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic publish/subscribe delivery skeleton for the Beacon SDK.
//!
//! A second, more general realization of "accept durably, batch, deliver,
//! retry" for channels that do not want the tracking pipeline's
//! command-specific bundling rules. Publishers hand opaque messages to a
//! topic; a per-topic dispatcher batches them to the topic's subscriber;
//! outcomes flow back to publishers, rejected retryable messages republish
//! to the retry topic after backoff, and the durable count draining to zero
//! fires a queue-empty notification.

pub mod message;
pub mod pubsub;
pub mod registrar;

pub use message::{MessageId, PubSubMessage, PublisherId, Topic};
pub use pubsub::{PubSub, PubSubResult, PubSubSubscriber};
pub use registrar::Registrar;
