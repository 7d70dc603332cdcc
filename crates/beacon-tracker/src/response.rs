// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Track endpoint response envelope and the consumer fan-out contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::request::RequestMeta;

/// Response body of the track endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackResponse {
    pub success: bool,
    pub status: i64,
    /// Server-issued directives (messages, variables, ...), dispatched to
    /// registered [`ResponseConsumer`]s after a successful delivery.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// A module interested in server directives (in-app messaging, variables
/// fetch, ...). Invoked once per successful batch delivery.
pub trait ResponseConsumer: Send + Sync {
    /// Runtime the callback should run on; `None` means invoke inline on
    /// the delivery completion task.
    fn runtime(&self) -> Option<tokio::runtime::Handle> {
        None
    }

    /// Receive the directives of one delivered request.
    fn receive(&self, directives: &Map<String, Value>, request: &RequestMeta);
}
