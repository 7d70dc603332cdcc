// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Beacon tracking SDK.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at load time, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Beacon configuration.
///
/// Loaded from a TOML file or string with `BEACON_*` environment variable
/// overrides. All sections except the app key default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BeaconConfig {
    /// Application identity and endpoint settings.
    #[serde(default)]
    pub app: AppConfig,

    /// Bundling and delivery tuning.
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Durable command spool settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Circuit breaker policy.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Connectivity probe settings.
    #[serde(default)]
    pub reachability: ReachabilityConfig,
}

/// Application identity and endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Project app key sent with every request. Required.
    #[serde(default)]
    pub key: String,

    /// Base URL of the tracking endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Host application name, reported in request app info.
    #[serde(default)]
    pub name: String,

    /// Host application version, reported in request app info.
    #[serde(default)]
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            base_url: default_base_url(),
            name: String::new(),
            version: String::new(),
        }
    }
}

fn default_base_url() -> String {
    "https://track.beacon.example.com".to_string()
}

/// Bundling and delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingConfig {
    /// Commands per bundle before the count rule seals it.
    #[serde(default = "default_max_bundle_size")]
    pub max_bundle_size: usize,

    /// Debounce window for live tracking, in milliseconds.
    #[serde(default = "default_live_window_ms")]
    pub live_window_ms: u64,

    /// Debounce window for the retry pipeline, in milliseconds.
    #[serde(default = "default_retry_window_ms")]
    pub retry_window_ms: u64,

    /// Per-request network timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_bundle_size: default_max_bundle_size(),
            live_window_ms: default_live_window_ms(),
            retry_window_ms: default_retry_window_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_max_bundle_size() -> usize {
    10
}

fn default_live_window_ms() -> u64 {
    100
}

fn default_retry_window_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Durable command spool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database path.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "beacon.sqlite".to_string()
}

/// Circuit breaker policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Failures tolerated before the breaker opens.
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// Seconds after the last failure before the breaker recovers.
    #[serde(default = "default_recover_after_secs")]
    pub recover_after_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            recover_after_secs: default_recover_after_secs(),
        }
    }
}

fn default_threshold() -> u32 {
    3
}

fn default_recover_after_secs() -> u64 {
    300
}

/// Connectivity probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReachabilityConfig {
    /// Seconds between connectivity probes.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Per-probe connect timeout, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_probe_timeout_ms() -> u64 {
    1500
}
