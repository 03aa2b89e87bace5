//! Alert rule definition types

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::admission::ConfigError;

/// Declared form of a pattern that matches every value
pub const WILDCARD: &str = "*";

/// Maximum length of a rule summary
pub const MAX_SUMMARY_LEN: usize = 255;

/// Identity of a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleKey {
    pub namespace: String,
    pub name: String,
}

impl RuleKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Alert rule as declared by its author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    /// Provider this rule delivers to
    pub provider_ref: ProviderRef,
    /// Minimum severity of events to forward
    #[serde(default)]
    pub event_severity: Severity,
    /// Origins of events this rule cares about, OR-ed together
    pub event_sources: Vec<EventSourceSelector>,
    /// Regular expressions dropping events by message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusion_list: Vec<String>,
    /// Short description of the impact, attached to every notification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Pause event handling for this rule
    #[serde(default)]
    pub suspend: bool,
}

impl RuleDefinition {
    /// Create a rule delivering matching `info` events to a provider
    pub fn new(provider: impl Into<String>, sources: Vec<EventSourceSelector>) -> Self {
        Self {
            provider_ref: ProviderRef {
                name: provider.into(),
            },
            event_severity: Severity::Info,
            event_sources: sources,
            exclusion_list: Vec::new(),
            summary: None,
            suspend: false,
        }
    }

    /// Set the severity threshold
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.event_severity = severity;
        self
    }

    /// Add an exclusion pattern
    pub fn with_exclusion(mut self, pattern: impl Into<String>) -> Self {
        self.exclusion_list.push(pattern.into());
        self
    }

    /// Set the summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Set the suspend flag
    pub fn with_suspend(mut self, suspend: bool) -> Self {
        self.suspend = suspend;
        self
    }
}

/// Reference to a provider by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRef {
    pub name: String,
}

/// Coarse event importance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "error" => Ok(Severity::Error),
            other => Err(ConfigError::InvalidSeverity(other.to_string())),
        }
    }
}

/// Namespace or name pattern of a selector.
///
/// The declared form is a plain string where `*` means any value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourcePattern {
    Any,
    Exact(String),
}

impl SourcePattern {
    /// Whether `value` is accepted by this pattern
    pub fn matches(&self, value: &str) -> bool {
        match self {
            SourcePattern::Any => true,
            SourcePattern::Exact(expected) => expected == value,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, SourcePattern::Any)
    }
}

impl From<String> for SourcePattern {
    fn from(value: String) -> Self {
        if value == WILDCARD {
            SourcePattern::Any
        } else {
            SourcePattern::Exact(value)
        }
    }
}

impl From<&str> for SourcePattern {
    fn from(value: &str) -> Self {
        SourcePattern::from(value.to_string())
    }
}

impl From<SourcePattern> for String {
    fn from(pattern: SourcePattern) -> Self {
        match pattern {
            SourcePattern::Any => WILDCARD.to_string(),
            SourcePattern::Exact(value) => value,
        }
    }
}

impl fmt::Display for SourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePattern::Any => f.write_str(WILDCARD),
            SourcePattern::Exact(value) => f.write_str(value),
        }
    }
}

/// Selects events by the object they are about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSourceSelector {
    /// API version of the object, any when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub kind: String,
    /// Defaults to the rule's own namespace when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<SourcePattern>,
    pub name: SourcePattern,
    /// Labels the object must carry; only valid with a wildcard name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

impl EventSourceSelector {
    pub fn new(kind: impl Into<String>, namespace: &str, name: &str) -> Self {
        Self {
            api_version: None,
            kind: kind.into(),
            namespace: Some(SourcePattern::from(namespace)),
            name: SourcePattern::from(name),
            match_labels: BTreeMap::new(),
        }
    }

    /// Selector without a namespace, scoped to the rule's namespace
    pub fn local(kind: impl Into<String>, name: &str) -> Self {
        Self {
            namespace: None,
            ..Self::new(kind, "", name)
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }
}
