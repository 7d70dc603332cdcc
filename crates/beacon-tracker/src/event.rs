// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Application events and their names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field injected into every transmitted event: the client-side timestamp,
/// as fractional epoch seconds.
pub const FIELD_LOCAL_EVENT_DATE: &str = "_local_event_date";
/// Field injected into retried events.
pub const FIELD_RETRY: &str = "_retry";

/// The name of a tracked event.
///
/// Names use lowercase ASCII letters, digits and underscores. A leading
/// underscore is reserved for system events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventName(pub String);

impl EventName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// System events that must not be retried: their payloads are only
    /// meaningful for the session that produced them.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.0.as_str(), "_fetch_variables")
    }

    /// Initialization events fire during app start and are the one class of
    /// events admitted while the app is still backgrounded.
    pub fn is_initialization_event(&self) -> bool {
        matches!(
            self.0.as_str(),
            "native_app_install" | "native_app_update" | "native_app_open"
        )
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One application event: a name plus a free-form key/value payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_name: EventName,
    pub values: Map<String, Value>,
    /// Library that fired the event, if any. Used by rejection filter rules.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub library_name: Option<String>,
}

impl Event {
    pub fn new(event_name: EventName, values: Map<String, Value>) -> Self {
        Self {
            event_name,
            values,
            library_name: None,
        }
    }

    pub fn with_library(mut self, library_name: impl Into<String>) -> Self {
        self.library_name = Some(library_name.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.event_name.is_retryable()
    }

    /// Merge key/value pairs into the payload, replacing existing keys.
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (key, value) in other {
            self.values.insert(key, value);
        }
    }

    /// Inject the wire-only fields: the client-side event date and, for
    /// retried commands, the retry marker.
    pub fn merge_additional_parameters(&mut self, date: DateTime<Utc>, is_retry: bool) {
        let epoch = date.timestamp_micros() as f64 / 1_000_000.0;
        self.values
            .insert(FIELD_LOCAL_EVENT_DATE.to_string(), Value::from(epoch));
        if is_retry {
            self.values.insert(FIELD_RETRY.to_string(), Value::Bool(true));
        }
    }
}
