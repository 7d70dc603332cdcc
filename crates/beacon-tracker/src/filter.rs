// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event admission filters.
//!
//! Two independent gates run before a submission enters the pipeline:
//!
//! 1. [`EventFilter`] -- an ordered list of validation rules. The first rule
//!    that errors rejects the event.
//! 2. [`RejectionFilter`] -- host-registered predicate rules keyed by
//!    originating library name + event name. Any rule returning `true`
//!    rejects the event silently (resolved as failure to the caller).

use std::sync::Arc;

use beacon_core::BeaconError;

use crate::event::Event;

/// One validation rule. Rules are pure predicates over the event.
pub trait EventFilterRule: Send + Sync {
    fn filter(&self, event: &Event) -> Result<(), BeaconError>;
}

/// Rejects events with an empty name.
pub struct EmptyEventNameRule;

impl EventFilterRule for EmptyEventNameRule {
    fn filter(&self, event: &Event) -> Result<(), BeaconError> {
        if event.event_name.as_str().is_empty() {
            return Err(BeaconError::EventRejected("event name is empty".into()));
        }
        Ok(())
    }
}

/// Rejects events whose name contains non-ASCII characters.
pub struct NonAsciiEventNameRule;

impl EventFilterRule for NonAsciiEventNameRule {
    fn filter(&self, event: &Event) -> Result<(), BeaconError> {
        if !event.event_name.as_str().is_ascii() {
            return Err(BeaconError::EventRejected(format!(
                "event name `{}` contains non-ASCII characters",
                event.event_name
            )));
        }
        Ok(())
    }
}

/// Rejects names outside `[a-z0-9_]`. Leading underscores are reserved for
/// system events, which are allowlisted by the caller building the filter.
pub struct InvalidEventNameRule;

impl EventFilterRule for InvalidEventNameRule {
    fn filter(&self, event: &Event) -> Result<(), BeaconError> {
        let name = event.event_name.as_str();
        let valid = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(BeaconError::EventRejected(format!(
                "event name `{name}` may only contain lowercase letters, digits and underscores"
            )));
        }
        Ok(())
    }
}

/// Rejects payload field names containing dots or starting with `$`, both of
/// which collide with server-side field addressing.
pub struct InvalidFieldNameRule;

impl EventFilterRule for InvalidFieldNameRule {
    fn filter(&self, event: &Event) -> Result<(), BeaconError> {
        for key in event.values.keys() {
            if key.contains('.') || key.starts_with('$') {
                return Err(BeaconError::EventRejected(format!(
                    "field name `{key}` must not contain dots or start with `$`"
                )));
            }
        }
        Ok(())
    }
}

/// Ordered validation filter. First failing rule wins.
pub struct EventFilter {
    rules: Vec<Box<dyn EventFilterRule>>,
}

impl EventFilter {
    pub fn builder() -> EventFilterBuilder {
        EventFilterBuilder { rules: Vec::new() }
    }

    /// The standard rule set applied to every submission.
    pub fn standard() -> Self {
        Self::builder()
            .add(EmptyEventNameRule)
            .add(NonAsciiEventNameRule)
            .add(InvalidEventNameRule)
            .add(InvalidFieldNameRule)
            .build()
    }

    pub fn filter(&self, event: &Event) -> Result<(), BeaconError> {
        for rule in &self.rules {
            rule.filter(event)?;
        }
        Ok(())
    }
}

pub struct EventFilterBuilder {
    rules: Vec<Box<dyn EventFilterRule>>,
}

impl EventFilterBuilder {
    pub fn add(mut self, rule: impl EventFilterRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn add_if(self, rule: impl EventFilterRule + 'static, enabled: bool) -> Self {
        if enabled { self.add(rule) } else { self }
    }

    pub fn build(self) -> EventFilter {
        EventFilter { rules: self.rules }
    }
}

/// A host-registered rejection rule, keyed by library and event name.
pub trait RejectionFilterRule: Send + Sync {
    /// Library name the rule applies to.
    fn library_name(&self) -> &str;
    /// Event name the rule applies to.
    fn event_name(&self) -> &str;
    /// Whether to exclude this event from transmission.
    fn reject(&self, event: &Event) -> bool;
}

/// Prioritized list of rejection rules. A rule is consulted only when both
/// its library name and event name match the event; any `true` rejects.
#[derive(Default, Clone)]
pub struct RejectionFilter {
    rules: Vec<Arc<dyn RejectionFilterRule>>,
}

impl RejectionFilter {
    pub fn add(&mut self, rule: Arc<dyn RejectionFilterRule>) {
        self.rules.push(rule);
    }

    pub fn rejects(&self, event: &Event) -> bool {
        let library = event.library_name.as_deref().unwrap_or("");
        self.rules.iter().any(|rule| {
            rule.library_name() == library
                && rule.event_name() == event.event_name.as_str()
                && rule.reject(event)
        })
    }
}
