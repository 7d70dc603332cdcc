// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Beacon tracking SDK.
//!
//! This crate provides the error type and the small identifier types shared
//! across the Beacon workspace. Everything else (bundling, delivery, storage)
//! lives in the dedicated crates and depends on this one.

pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::BeaconError;
pub use types::{AppState, PvId, SceneId};
