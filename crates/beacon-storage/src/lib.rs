// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Beacon tracking SDK.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed query modules for the
//! durable command and pub/sub message spools.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread: [`Database`] wraps one connection, query functions accept
//! `&Database` and go through `conn.call()`, so concurrent access never hits
//! `SQLITE_BUSY`. Do NOT create additional `Connection` instances for writes.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
