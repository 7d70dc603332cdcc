// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Beacon tracking SDK.

use thiserror::Error;

/// The primary error type used across all Beacon crates.
///
/// Storage and serialization errors are logged and swallowed at the
/// repository boundary -- they never cross the public submit/deliver
/// boundary. Network and validation errors resolve caller completions
/// with a failure outcome instead of propagating.
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Encode/decode failures for persisted command payloads.
    #[error("serialization error: {source}")]
    Serialization {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport-level failures (connection refused, timeout, malformed body).
    #[error("network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The server answered with a failing status code (503, other 5xx).
    #[error("server returned an error response: {status}")]
    Server { status: u16 },

    /// An event failed a validation or rejection filter rule.
    #[error("event rejected: {0}")]
    EventRejected(String),

    /// The per-command retry budget has been used up.
    #[error("the maximum number of retries has been reached")]
    RetryExhausted,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
