//! Notification payload sent to providers

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{IncomingEvent, InvolvedObject};
use crate::rules::RuleKey;

/// Metadata key carrying the rule's summary
pub const SUMMARY_METADATA_KEY: &str = "summary";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Rule that admitted the event, `namespace/name`
    pub rule: String,
    pub involved_object: InvolvedObject,
    pub severity: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_controller: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Build the payload for `event` admitted by `rule`.
    ///
    /// The rule summary, when present, overrides any `summary` metadata
    /// already on the event.
    pub fn from_event(rule: &RuleKey, summary: Option<&str>, event: &IncomingEvent) -> Self {
        let mut metadata = event.metadata.clone();
        if let Some(summary) = summary.filter(|s| !s.is_empty()) {
            metadata.insert(SUMMARY_METADATA_KEY.to_string(), summary.to_string());
        }

        Self {
            rule: rule.to_string(),
            involved_object: event.involved_object.clone(),
            severity: event.severity.clone(),
            message: event.message.clone(),
            reason: event.reason.clone(),
            reporting_controller: event.reporting_controller.clone(),
            metadata,
            timestamp: event.timestamp,
        }
    }

    /// One-line human rendering
    pub fn headline(&self) -> String {
        format!(
            "{}/{}.{}: {}",
            self.involved_object.kind,
            self.involved_object.name,
            self.involved_object.namespace,
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_added_to_metadata() {
        let mut event = IncomingEvent::new("Deployment", "prod", "api", "error", "crashloop");
        event.metadata.insert("revision".to_string(), "abc123".to_string());

        let rule = RuleKey::new("ops", "prod-alerts");
        let notification = Notification::from_event(&rule, Some("production cluster"), &event);

        assert_eq!(notification.rule, "ops/prod-alerts");
        assert_eq!(notification.metadata["summary"], "production cluster");
        assert_eq!(notification.metadata["revision"], "abc123");
        assert_eq!(notification.headline(), "Deployment/api.prod: crashloop");
    }

    #[test]
    fn test_no_summary() {
        let event = IncomingEvent::new("Deployment", "prod", "api", "info", "ok");
        let notification = Notification::from_event(&RuleKey::new("ops", "r"), None, &event);
        assert!(notification.metadata.is_empty());

        let json = serde_json::to_value(&notification).unwrap();
        assert!(json.get("metadata").is_none());
        assert_eq!(json["involvedObject"]["kind"], "Deployment");
    }
}
