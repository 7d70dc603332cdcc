// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query operations over the durable spools.

pub mod commands;
pub mod pubsub;
