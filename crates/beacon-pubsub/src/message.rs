// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pub/sub message shape and identifiers.

use beacon_resilience::ExponentialBackoff;
use beacon_storage::PubSubMessageRecord;
use chrono::{DateTime, Utc};
use strum::Display;
use uuid::Uuid;

/// Delivery channel. Fresh messages go to `Default`; failed retryable
/// messages are republished to `Retry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Topic {
    Default,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublisherId(pub String);

impl PublisherId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// One publishable unit: an opaque payload plus delivery properties.
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub message_id: MessageId,
    pub publisher_id: PublisherId,
    pub is_ready_on_background: bool,
    /// Non-retryable messages bypass durability and are never republished.
    pub is_retryable: bool,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub backoff: ExponentialBackoff,
}

impl PubSubMessage {
    pub fn new(
        publisher_id: PublisherId,
        data: Vec<u8>,
        is_ready_on_background: bool,
        is_retryable: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id: MessageId::new(),
            publisher_id,
            is_ready_on_background,
            is_retryable,
            data,
            created_at: now,
            updated_at: now,
            backoff: message_backoff(),
        }
    }

    pub fn from_record(record: PubSubMessageRecord) -> Self {
        Self {
            message_id: MessageId(record.message_id),
            publisher_id: PublisherId(record.publisher_id),
            is_ready_on_background: record.is_ready_on_background,
            // Only retryable messages are spooled in the first place.
            is_retryable: true,
            data: record.data,
            created_at: epoch_to_datetime(record.created_at),
            updated_at: epoch_to_datetime(record.updated_at),
            backoff: message_backoff(),
        }
    }

    pub fn to_record(&self, process_id: &str) -> PubSubMessageRecord {
        PubSubMessageRecord {
            message_id: self.message_id.0.clone(),
            publisher_id: self.publisher_id.0.clone(),
            process_id: process_id.to_string(),
            data: self.data.clone(),
            is_ready_on_background: self.is_ready_on_background,
            created_at: self.created_at.timestamp_micros() as f64 / 1_000_000.0,
            updated_at: self.updated_at.timestamp_micros() as f64 / 1_000_000.0,
        }
    }
}

/// Retry cadence for republished messages: 0.5s base, 4x growth, six
/// attempts, no jitter.
fn message_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(0.5, 0.0, 4, 6)
}

fn epoch_to_datetime(epoch: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((epoch * 1_000_000.0) as i64).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip_preserves_identity() {
        let message = PubSubMessage::new(
            PublisherId::new("pub-a"),
            b"payload".to_vec(),
            true,
            true,
        );
        let record = message.to_record("proc-1");
        assert_eq!(record.process_id, "proc-1");

        let back = PubSubMessage::from_record(record);
        assert_eq!(back.message_id, message.message_id);
        assert_eq!(back.publisher_id, message.publisher_id);
        assert_eq!(back.data, message.data);
        assert!(back.is_retryable);
        // Sub-second precision survives the REAL column.
        assert_eq!(
            back.created_at.timestamp_micros(),
            message.created_at.timestamp_micros()
        );
    }

    #[test]
    fn topic_display_is_lowercase() {
        assert_eq!(Topic::Default.to_string(), "default");
        assert_eq!(Topic::Retry.to_string(), "retry");
    }
}
