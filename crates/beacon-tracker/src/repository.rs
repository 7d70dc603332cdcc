// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable bookkeeping for retryable commands.
//!
//! Durability is best-effort resilience, not a precondition for delivery:
//! every storage or serialization failure here is logged and swallowed, and
//! queries degrade to empty results. Nothing in this module may block the
//! tracking pipeline.

use beacon_storage::{CommandRecord, Database, queries};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::command::TrackingCommand;

/// Spool of serialized pending commands, partitioned by the process run that
/// wrote them.
#[derive(Debug, Clone)]
pub struct CommandRepository {
    db: Database,
    process_id: String,
}

impl CommandRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            process_id: Uuid::new_v4().to_string(),
        }
    }

    /// Build a repository with a fixed process id (restart simulation in
    /// tests).
    #[cfg(test)]
    pub fn with_process_id(db: Database, process_id: impl Into<String>) -> Self {
        Self {
            db,
            process_id: process_id.into(),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Point lookup used to warn about duplicate submissions. Advisory only.
    pub async fn is_registered(&self, command: &TrackingCommand) -> bool {
        match queries::commands::exists(&self.db, &command.identifier).await {
            Ok(found) => found,
            Err(e) => {
                error!(command_id = %command.identifier, error = %e, "registration lookup failed");
                false
            }
        }
    }

    /// Persist a retryable command. Non-retryable commands bypass durability
    /// entirely.
    pub async fn register(&self, command: &TrackingCommand) {
        if !command.properties.is_retryable {
            return;
        }

        let data = match serde_json::to_vec(command) {
            Ok(data) => data,
            Err(e) => {
                error!(command_id = %command.identifier, error = %e, "failed to serialize command");
                return;
            }
        };

        let created_at = command.date.timestamp_micros() as f64 / 1_000_000.0;
        let record = CommandRecord {
            command_id: command.identifier.clone(),
            process_id: self.process_id.clone(),
            data,
            is_ready_on_background: command.properties.is_ready_on_background,
            created_at,
            updated_at: created_at,
        };

        match queries::commands::insert(&self.db, &record).await {
            Ok(()) => debug!(command_id = %record.command_id, "command registered"),
            Err(e) => {
                error!(command_id = %record.command_id, error = %e, "failed to insert record")
            }
        }
    }

    /// Delete one command's record. Removing a non-existent row is not an
    /// error.
    pub async fn unregister(&self, command: &TrackingCommand) {
        match queries::commands::delete(&self.db, &command.identifier).await {
            Ok(()) => debug!(command_id = %command.identifier, "command unregistered"),
            Err(e) => {
                error!(command_id = %command.identifier, error = %e, "failed to delete record")
            }
        }
    }

    /// Truncate the spool (opt-out / teardown).
    pub async fn unregister_all(&self) {
        match queries::commands::delete_all(&self.db).await {
            Ok(()) => debug!("all commands unregistered"),
            Err(e) => error!(error = %e, "failed to delete records"),
        }
    }

    /// Pending work within the retention window, regardless of process.
    pub async fn unprocessed_count(&self) -> u64 {
        queries::commands::count_within_retention(&self.db)
            .await
            .unwrap_or(0)
    }

    /// All durable commands within the retention window.
    pub async fn commands(&self) -> Vec<TrackingCommand> {
        match queries::commands::select_within_retention(&self.db).await {
            Ok(records) => Self::rebuild(records),
            Err(e) => {
                error!(error = %e, "failed to query commands");
                Vec::new()
            }
        }
    }

    /// Commands written by a different process run: the resurrection set fed
    /// to the retry pipeline at startup.
    pub async fn retryable_commands(&self) -> Vec<TrackingCommand> {
        match queries::commands::select_retryable(&self.db, &self.process_id).await {
            Ok(records) => Self::rebuild(records),
            Err(e) => {
                error!(error = %e, "failed to query retryable commands");
                Vec::new()
            }
        }
    }

    fn rebuild(records: Vec<CommandRecord>) -> Vec<TrackingCommand> {
        records
            .into_iter()
            .filter_map(|record| match serde_json::from_slice(&record.data) {
                Ok(command) => Some(command),
                Err(e) => {
                    // Decode failure is non-fatal: drop the record.
                    warn!(command_id = %record.command_id, error = %e, "dropping undecodable record");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::command;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn register_and_unregister_round_trip() {
        let (db, _dir) = setup_db().await;
        let repo = CommandRepository::new(db);
        let cmd = command("vis-a", "s1", "pv1");

        assert!(!repo.is_registered(&cmd).await);
        repo.register(&cmd).await;
        assert!(repo.is_registered(&cmd).await);
        assert_eq!(repo.unprocessed_count().await, 1);

        repo.unregister(&cmd).await;
        assert!(!repo.is_registered(&cmd).await);
        assert_eq!(repo.unprocessed_count().await, 0);

        // Unregistering again is harmless.
        repo.unregister(&cmd).await;
    }

    #[tokio::test]
    async fn non_retryable_commands_bypass_storage() {
        let (db, _dir) = setup_db().await;
        let repo = CommandRepository::new(db);

        let mut cmd = command("vis-a", "s1", "pv1");
        cmd.properties.is_retryable = false;

        repo.register(&cmd).await;
        assert!(!repo.is_registered(&cmd).await);
        assert!(repo.commands().await.is_empty());
        assert!(repo.retryable_commands().await.is_empty());
    }

    #[tokio::test]
    async fn retryable_commands_come_from_other_processes() {
        let (db, _dir) = setup_db().await;
        let first_run = CommandRepository::with_process_id(db.clone(), "proc-1");
        let cmd = command("vis-a", "s1", "pv1");
        first_run.register(&cmd).await;

        // Same process sees no retryable work.
        assert!(first_run.retryable_commands().await.is_empty());

        // A later process run resurrects it.
        let second_run = CommandRepository::with_process_id(db, "proc-2");
        let resurrected = second_run.retryable_commands().await;
        assert_eq!(resurrected.len(), 1);
        assert_eq!(resurrected[0].identifier, cmd.identifier);
        assert_eq!(resurrected[0].visitor_id, "vis-a");

        // Unregistering removes it from both views.
        second_run.unregister(&resurrected[0]).await;
        assert!(second_run.retryable_commands().await.is_empty());
        assert!(!first_run.is_registered(&cmd).await);
    }

    #[tokio::test]
    async fn undecodable_records_are_dropped_not_fatal() {
        let (db, _dir) = setup_db().await;
        let repo = CommandRepository::with_process_id(db.clone(), "proc-1");

        let record = beacon_storage::CommandRecord {
            command_id: "garbled".into(),
            process_id: "proc-0".into(),
            data: b"not json".to_vec(),
            is_ready_on_background: true,
            created_at: beacon_storage::now_epoch(),
            updated_at: beacon_storage::now_epoch(),
        };
        beacon_storage::queries::commands::insert(&db, &record)
            .await
            .unwrap();

        assert!(repo.commands().await.is_empty());
        assert!(repo.retryable_commands().await.is_empty());
        // The row itself still counts as pending work.
        assert_eq!(repo.unprocessed_count().await, 1);
    }

    #[tokio::test]
    async fn unregister_all_truncates() {
        let (db, _dir) = setup_db().await;
        let repo = CommandRepository::new(db);

        repo.register(&command("vis-a", "s1", "pv1")).await;
        repo.register(&command("vis-b", "s1", "pv1")).await;
        assert_eq!(repo.unprocessed_count().await, 2);

        repo.unregister_all().await;
        assert_eq!(repo.unprocessed_count().await, 0);
    }
}
