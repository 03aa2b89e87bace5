//! Incoming cluster events
//!
//! Events are produced elsewhere and arrive already classified. Every field
//! is optional on the wire: a malformed event is normalized into one that
//! simply never matches instead of being rejected.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::Severity;

/// The object an event is about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvolvedObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// An operational event to route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEvent {
    #[serde(default)]
    pub involved_object: InvolvedObject,
    /// Raw severity as reported, see [`IncomingEvent::severity_level`]
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_controller: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl IncomingEvent {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        severity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            involved_object: InvolvedObject {
                api_version: None,
                kind: kind.into(),
                namespace: namespace.into(),
                name: name.into(),
                labels: BTreeMap::new(),
            },
            severity: severity.into(),
            message: message.into(),
            reason: None,
            reporting_controller: None,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.involved_object.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.involved_object.api_version = Some(api_version.into());
        self
    }

    /// Parsed severity; unknown values are `None`, the lowest level
    pub fn severity_level(&self) -> Option<Severity> {
        self.severity.trim().to_ascii_lowercase().parse().ok()
    }

    /// Whether the event identifies its object well enough to be matched.
    ///
    /// Kind, namespace and name must all be present; an empty namespace never
    /// matches, not even a `*` selector.
    pub fn is_addressable(&self) -> bool {
        let object = &self.involved_object;
        !object.kind.is_empty() && !object.namespace.is_empty() && !object.name.is_empty()
    }
}
