// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Beacon tracking SDK.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), environment variable overrides, and
//! post-deserialization semantic checks.
//!
//! # Usage
//!
//! ```no_run
//! use beacon_config::load_and_validate_str;
//!
//! let config = load_and_validate_str(r#"
//!     [app]
//!     key = "my-app-key"
//! "#).expect("config errors");
//! assert_eq!(config.tracking.max_bundle_size, 10);
//! ```

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::BeaconConfig;
pub use validation::ConfigError;

/// Load configuration from environment variables and validate it.
pub fn load_and_validate() -> Result<BeaconConfig, Vec<ConfigError>> {
    finish(loader::load_config())
}

/// Load configuration from a TOML file path and validate it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<BeaconConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path))
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit in-process configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<BeaconConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content))
}

fn finish(loaded: Result<BeaconConfig, figment::Error>) -> Result<BeaconConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(vec![ConfigError::Load(err)]),
    }
}
