// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query operations for the tracking command spool.
//!
//! Every scan applies the retention floor: rows older than 30 days are
//! invisible, though only successful delivery actually deletes them. The
//! floor comparison is exclusive on the older side (`created_at > floor`).

use beacon_core::BeaconError;
use rusqlite::params;

use crate::database::Database;
use crate::models::{CommandRecord, retention_floor};

/// Insert one command record.
pub async fn insert(db: &Database, record: &CommandRecord) -> Result<(), BeaconError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tracking_commands
                 (command_id, process_id, data, is_ready_on_background, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.command_id,
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

/// Point lookup by command id. Ignores the retention floor: a duplicate is a
/// duplicate regardless of age.
pub async fn exists(db: &Database, command_id: &str) -> Result<bool, BeaconError> {
    let command_id = command_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tracking_commands WHERE command_id = ?1",
                params![command_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete one command record. Removing a non-existent row is not an error.
pub async fn delete(db: &Database, command_id: &str) -> Result<(), BeaconError> {
    let command_id = command_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM tracking_commands WHERE command_id = ?1",
                params![command_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Truncate the spool (opt-out / teardown).
pub async fn delete_all(db: &Database) -> Result<(), BeaconError> {
    db.connection()
        .call(|conn| {
            conn.execute("DELETE FROM tracking_commands", [])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count of rows within the retention window, regardless of process.
pub async fn count_within_retention(db: &Database) -> Result<u64, BeaconError> {
    let floor = retention_floor();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tracking_commands WHERE created_at > ?1",
                params![floor],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All rows within the retention window, regardless of process.
pub async fn select_within_retention(db: &Database) -> Result<Vec<CommandRecord>, BeaconError> {
    let floor = retention_floor();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT command_id, process_id, data, is_ready_on_background,
                        created_at, updated_at
                 FROM tracking_commands
                 WHERE created_at > ?1",
            )?;
            let rows = stmt
                .query_map(params![floor], map_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Rows within the retention window written by a *different* process: the
/// resurrection set for commands whose original in-memory session died
/// mid-flight.
pub async fn select_retryable(
    db: &Database,
    process_id: &str,
) -> Result<Vec<CommandRecord>, BeaconError> {
    let process_id = process_id.to_string();
    let floor = retention_floor();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT command_id, process_id, data, is_ready_on_background,
                        created_at, updated_at
                 FROM tracking_commands
                 WHERE process_id != ?1 AND created_at > ?2",
            )?;
            let rows = stmt
                .query_map(params![process_id, floor], map_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn map_record(row: &rusqlite::Row<'_>) -> Result<CommandRecord, rusqlite::Error> {
    Ok(CommandRecord {
        command_id: row.get(0)?,
        process_id: row.get(1)?,
        data: row.get(2)?,
        is_ready_on_background: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
