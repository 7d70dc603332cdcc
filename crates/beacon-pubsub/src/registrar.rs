// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable bookkeeping for retryable pub/sub messages.
//!
//! Same contract as the command repository: storage failures are logged and
//! swallowed, queries degrade to empty, and the durable count reaching zero
//! is the "all delivery work has drained" signal.

use beacon_storage::{Database, queries};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::message::{PubSubMessage, PublisherId};

#[derive(Debug, Clone)]
pub struct Registrar {
    db: Database,
    process_id: String,
}

impl Registrar {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            process_id: Uuid::new_v4().to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_process_id(db: Database, process_id: impl Into<String>) -> Self {
        Self {
            db,
            process_id: process_id.into(),
        }
    }

    /// Durable messages within retention, regardless of publisher/process.
    pub async fn count(&self) -> u64 {
        queries::pubsub::count_within_retention(&self.db)
            .await
            .unwrap_or(0)
    }

    /// One publisher's messages written by a different process run.
    pub async fn retryable(&self, publisher_id: &PublisherId) -> Vec<PubSubMessage> {
        match queries::pubsub::select_retryable(&self.db, &publisher_id.0, &self.process_id).await {
            Ok(records) => records.into_iter().map(PubSubMessage::from_record).collect(),
            Err(e) => {
                error!(publisher_id = %publisher_id.0, error = %e, "failed to query retryable messages");
                Vec::new()
            }
        }
    }

    /// Durably accept a message. Non-retryable messages bypass the spool;
    /// duplicate accepts are advisory only.
    pub async fn accept(&self, message: &PubSubMessage) {
        if !message.is_retryable {
            return;
        }

        match queries::pubsub::exists(&self.db, &message.message_id.0).await {
            Ok(true) => {
                info!(message_id = %message.message_id.0, "message is already accepted");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!(message_id = %message.message_id.0, error = %e, "acceptance lookup failed");
            }
        }

        let record = message.to_record(&self.process_id);
        match queries::pubsub::insert(&self.db, &record).await {
            Ok(()) => debug!(message_id = %record.message_id, "message accepted"),
            Err(e) => error!(message_id = %record.message_id, error = %e, "failed to insert record"),
        }
    }

    /// Delivery succeeded: drop the durable rows.
    pub async fn reached(&self, messages: &[PubSubMessage]) {
        for message in messages.iter().filter(|m| m.is_retryable) {
            match queries::pubsub::delete(&self.db, &message.message_id.0).await {
                Ok(()) => debug!(message_id = %message.message_id.0, "message removed"),
                Err(e) => {
                    error!(message_id = %message.message_id.0, error = %e, "failed to delete record")
                }
            }
        }
    }

    /// Delivery failed: rows stay durable for a later attempt.
    pub fn not_reached(&self, _messages: &[PubSubMessage]) {}

    pub async fn teardown(&self) {
        match queries::pubsub::delete_all(&self.db).await {
            Ok(()) => debug!("all messages removed"),
            Err(e) => error!(error = %e, "failed to delete records"),
        }
    }
}
