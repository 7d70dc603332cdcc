// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query operations for the pub/sub message spool.
//!
//! Same retention semantics as the command spool; rows are additionally
//! partitioned by publisher.

use beacon_core::BeaconError;
use rusqlite::params;

use crate::database::Database;
use crate::models::{PubSubMessageRecord, retention_floor};

/// Insert one message record.
pub async fn insert(db: &Database, record: &PubSubMessageRecord) -> Result<(), BeaconError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO pubsub_messages
                 (message_id, publisher_id, process_id, data, is_ready_on_background,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.message_id,
                    record.publisher_id,
                    record.process_id,
                    record.data,
                    record.is_ready_on_background,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Point lookup by message id.
pub async fn exists(db: &Database, message_id: &str) -> Result<bool, BeaconError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pubsub_messages WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete one message record.
pub async fn delete(db: &Database, message_id: &str) -> Result<(), BeaconError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM pubsub_messages WHERE message_id = ?1",
                params![message_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Truncate the spool.
pub async fn delete_all(db: &Database) -> Result<(), BeaconError> {
    db.connection()
        .call(|conn| {
            conn.execute("DELETE FROM pubsub_messages", [])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count of rows within the retention window.
pub async fn count_within_retention(db: &Database) -> Result<u64, BeaconError> {
    let floor = retention_floor();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pubsub_messages WHERE created_at > ?1",
                params![floor],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Rows for one publisher, written by a different process, within retention.
pub async fn select_retryable(
    db: &Database,
    publisher_id: &str,
    process_id: &str,
) -> Result<Vec<PubSubMessageRecord>, BeaconError> {
    let publisher_id = publisher_id.to_string();
    let process_id = process_id.to_string();
    let floor = retention_floor();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, publisher_id, process_id, data,
                        is_ready_on_background, created_at, updated_at
                 FROM pubsub_messages
                 WHERE publisher_id = ?1 AND process_id != ?2 AND created_at > ?3",
            )?;
            let rows = stmt
                .query_map(params![publisher_id, process_id, floor], map_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn map_record(row: &rusqlite::Row<'_>) -> Result<PubSubMessageRecord, rusqlite::Error> {
    Ok(PubSubMessageRecord {
        message_id: row.get(0)?,
        publisher_id: row.get(1)?,
        process_id: row.get(2)?,
        data: row.get(3)?,
        is_ready_on_background: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
