// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order: compiled defaults < TOML file/string < `BEACON_*` environment
//! variables. Beacon is an embedded SDK, so there is no directory-hierarchy
//! lookup -- the host hands us a path or a string.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::BeaconConfig;

/// Load configuration from a TOML file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BeaconConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BeaconConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no env overrides).
///
/// Used for testing and explicit in-process configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<BeaconConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BeaconConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from environment variables over compiled defaults.
pub fn load_config() -> Result<BeaconConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BeaconConfig::default()))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `BEACON_APP_BASE_URL` must map to
/// `app.base_url`, not `app.base.url`.
fn env_provider() -> Env {
    Env::prefixed("BEACON_").map(|key| {
        // `key` is the lowercased env var name with the prefix stripped.
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("app_", "app.", 1)
            .replacen("tracking_", "tracking.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("circuit_breaker_", "circuit_breaker.", 1)
            .replacen("reachability_", "reachability.", 1);
        mapped.into()
    })
}
