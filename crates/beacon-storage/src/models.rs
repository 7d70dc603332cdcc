// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for the durable spools.
//!
//! Payloads are opaque blobs here; the owning crates (tracker, pubsub) define
//! the serialization contract and treat decode failure as non-fatal.

/// Age cutoff beyond which spool rows are ignored by every query. Rows older
/// than this are not actively purged by the queries themselves.
pub const RETENTION_WINDOW_SECS: f64 = 60.0 * 60.0 * 24.0 * 30.0;

/// The oldest `created_at` still visible to queries, as of now.
pub fn retention_floor() -> f64 {
    now_epoch() - RETENTION_WINDOW_SECS
}

/// Current time as fractional epoch seconds, the `REAL` timestamp format
/// used by both spool tables.
pub fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// One row of `tracking_commands`: the on-disk projection of a retryable
/// tracking command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    pub command_id: String,
    pub process_id: String,
    pub data: Vec<u8>,
    pub is_ready_on_background: bool,
    pub created_at: f64,
    pub updated_at: f64,
}

/// One row of `pubsub_messages`.
#[derive(Debug, Clone, PartialEq)]
pub struct PubSubMessageRecord {
    pub message_id: String,
    pub publisher_id: String,
    pub process_id: String,
    pub data: Vec<u8>,
    pub is_ready_on_background: bool,
    pub created_at: f64,
    pub updated_at: f64,
}
