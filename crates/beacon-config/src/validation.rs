// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty keys and well-formed endpoint URLs.

use thiserror::Error;

use crate::model::BeaconConfig;

/// A single configuration problem, reported with enough context to fix it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    Validation { message: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or all collected validation
/// errors (does not fail fast).
pub fn validate_config(config: &BeaconConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.app.key.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "app.key must not be empty".to_string(),
        });
    }

    let base_url = config.app.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        errors.push(ConfigError::Validation {
            message: format!("app.base_url `{base_url}` must be an http(s) URL"),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.tracking.max_bundle_size == 0 {
        errors.push(ConfigError::Validation {
            message: "tracking.max_bundle_size must be at least 1".to_string(),
        });
    }

    if config.tracking.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "tracking.request_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.circuit_breaker.threshold == 0 {
        errors.push(ConfigError::Validation {
            message: "circuit_breaker.threshold must be at least 1".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
