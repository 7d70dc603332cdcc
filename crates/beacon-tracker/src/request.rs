// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Track endpoint request envelope.
//!
//! A request carries one sealed bundle. All commands in a bundle share the
//! (visitor, scene, page-view) grouping key -- enforced upstream by the
//! bundler's boundary rules, not re-checked here.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::bundle::CommandBundle;
use crate::command::{Scene, TrackingCommand};
use crate::event::EventName;
use crate::response::ResponseConsumer;

/// Path of the track endpoint, relative to the configured base URL.
pub const TRACK_PATH: &str = "/v0/track";

/// Request header carrying the project app key.
pub const APP_KEY_HEADER: &str = "X-Beacon-App-Key";

/// Host application metadata reported with every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_name: String,
    pub version_name: String,
    pub sdk_version: String,
    pub os: String,
}

impl AppInfo {
    pub fn new(app_name: impl Into<String>, version_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            version_name: version_name.into(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
        }
    }
}

/// Process-scoped application context shared by the executors: identity for
/// request construction plus the registered response consumers.
pub struct AppContext {
    pub app_key: String,
    /// `None` while app metadata is unavailable; requests cannot be built
    /// without it and the bundle is dropped.
    pub app_info: Option<AppInfo>,
    pub consumers: RwLock<Vec<Arc<dyn ResponseConsumer>>>,
}

impl AppContext {
    pub fn new(app_key: impl Into<String>, app_info: AppInfo) -> Self {
        Self {
            app_key: app_key.into(),
            app_info: Some(app_info),
            consumers: RwLock::new(Vec::new()),
        }
    }

    pub fn register_consumer(&self, consumer: Arc<dyn ResponseConsumer>) {
        if let Ok(mut consumers) = self.consumers.write() {
            consumers.push(consumer);
        }
    }

    pub fn consumers_snapshot(&self) -> Vec<Arc<dyn ResponseConsumer>> {
        self.consumers
            .read()
            .map(|consumers| consumers.clone())
            .unwrap_or_default()
    }
}

/// One outbound request: a sealed bundle plus identity and app metadata.
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub visitor_id: String,
    pub scene: Scene,
    pub request_id: String,
    pub app_key: String,
    pub app_info: AppInfo,
    pub commands: Vec<TrackingCommand>,
    pub is_retry: bool,
}

impl TrackRequest {
    /// Build a request from a sealed bundle. Returns `None` for an empty
    /// bundle or when app metadata is unavailable.
    pub fn from_bundle(bundle: CommandBundle, app: &AppContext) -> Option<Self> {
        let commands = bundle.into_commands();
        let first = commands.first()?;
        let app_info = app.app_info.clone()?;

        Some(Self {
            visitor_id: first.visitor_id.clone(),
            scene: first.scene.clone(),
            request_id: Uuid::new_v4().to_string(),
            app_key: app.app_key.clone(),
            app_info,
            is_retry: first.is_retry,
            commands,
        })
    }

    /// The JSON body: app metadata, the commands as events with their
    /// injected wire-only fields, and the grouping keys.
    pub fn body(&self) -> Value {
        let events: Vec<Value> = self
            .commands
            .iter()
            .map(|command| {
                let mut event = command.event.clone();
                event.merge_additional_parameters(command.date, command.is_retry);
                serde_json::to_value(event).unwrap_or(Value::Null)
            })
            .collect();

        json!({
            "app_info": self.app_info,
            "events": events,
            "keys": {
                "visitor_id": self.visitor_id,
                "pv_id": self.scene.pv_id,
                "original_pv_id": self.scene.original_pv_id,
            },
        })
    }

    /// Whether any command in the request carries the given event name.
    pub fn contains(&self, event_name: &EventName) -> bool {
        self.commands
            .iter()
            .any(|command| &command.event.event_name == event_name)
    }

    /// The metadata handed to response consumers alongside the directives.
    pub fn meta(&self) -> RequestMeta {
        RequestMeta {
            request_id: self.request_id.clone(),
            visitor_id: self.visitor_id.clone(),
            scene: self.scene.clone(),
            is_retry: self.is_retry,
            event_names: self
                .commands
                .iter()
                .map(|command| command.event.event_name.clone())
                .collect(),
        }
    }
}

/// Identity of one delivered request, without the command payloads.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub request_id: String,
    pub visitor_id: String,
    pub scene: Scene,
    pub is_retry: bool,
    pub event_names: Vec<EventName>,
}

impl RequestMeta {
    pub fn contains(&self, event_name: &EventName) -> bool {
        self.event_names.contains(event_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{FIELD_LOCAL_EVENT_DATE, FIELD_RETRY};
    use crate::testutil::command;

    fn app_context() -> AppContext {
        AppContext::new("app-key-1", AppInfo::new("demo", "1.2.3"))
    }

    fn sealed_bundle(commands: Vec<TrackingCommand>) -> CommandBundle {
        let mut bundle = CommandBundle::default();
        for command in commands {
            bundle.add_command(command);
        }
        bundle.freeze();
        bundle
    }

    #[test]
    fn empty_bundle_builds_no_request() {
        let bundle = sealed_bundle(vec![]);
        assert!(TrackRequest::from_bundle(bundle, &app_context()).is_none());
    }

    #[test]
    fn missing_app_info_builds_no_request() {
        let mut app = app_context();
        app.app_info = None;
        let bundle = sealed_bundle(vec![command("vis-a", "s1", "pv1")]);
        assert!(TrackRequest::from_bundle(bundle, &app).is_none());
    }

    #[test]
    fn request_takes_grouping_key_from_first_command() {
        let bundle = sealed_bundle(vec![
            command("vis-a", "s1", "pv1"),
            command("vis-a", "s1", "pv1"),
        ]);
        let request = TrackRequest::from_bundle(bundle, &app_context()).unwrap();

        assert_eq!(request.visitor_id, "vis-a");
        assert_eq!(request.scene.scene_id.as_str(), "s1");
        assert_eq!(request.commands.len(), 2);
        assert!(!request.is_retry);
        assert_eq!(request.app_key, "app-key-1");
    }

    #[test]
    fn body_injects_wire_fields() {
        let mut retried = command("vis-a", "s1", "pv1");
        retried.is_retry = true;
        let bundle = sealed_bundle(vec![retried]);
        let request = TrackRequest::from_bundle(bundle, &app_context()).unwrap();

        let body = request.body();
        assert_eq!(body["keys"]["visitor_id"], "vis-a");
        assert_eq!(body["app_info"]["version_name"], "1.2.3");

        let event = &body["events"][0];
        assert_eq!(event["event_name"], "view");
        assert!(event["values"][FIELD_LOCAL_EVENT_DATE].is_number());
        assert_eq!(event["values"][FIELD_RETRY], true);
    }

    #[test]
    fn meta_reports_event_names() {
        let bundle = sealed_bundle(vec![command("vis-a", "s1", "pv1")]);
        let request = TrackRequest::from_bundle(bundle, &app_context()).unwrap();
        let meta = request.meta();

        assert!(meta.contains(&EventName::new("view")));
        assert!(!meta.contains(&EventName::new("buy")));
        assert_eq!(meta.request_id, request.request_id);
    }
}
