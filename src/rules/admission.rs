//! Rule validation and compilation
//!
//! Everything that can be wrong with a rule is caught here, when the rule is
//! written. The compiled form is what the event hot path works with, so
//! matching never has to parse or compile anything.

use std::collections::BTreeMap;

use regex::{RegexSet, RegexSetBuilder};

use super::config::{RuleDefinition, Severity, SourcePattern, MAX_SUMMARY_LEN};
use super::status::reasons;

/// Upper bound on the compiled size of a rule's exclusion patterns
const EXCLUSION_SIZE_LIMIT: usize = 1 << 20;

/// Configuration errors found when a rule is applied
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one event source is required")]
    NoEventSources,

    #[error("event source {index}: kind must not be empty")]
    EmptyKind { index: usize },

    #[error("event source {index}: name must not be empty")]
    EmptyName { index: usize },

    #[error("event source {index}: matchLabels requires name '*'")]
    LabelsWithExactName { index: usize },

    #[error("invalid exclusion pattern '{pattern}': {reason}")]
    InvalidExclusion { pattern: String, reason: String },

    #[error("invalid event severity '{0}', expected 'info' or 'error'")]
    InvalidSeverity(String),

    #[error("summary is {0} characters, at most 255 are allowed")]
    SummaryTooLong(usize),

    #[error("providerRef name must not be empty")]
    EmptyProviderRef,

    #[error("provider '{0}' not found")]
    ProviderNotFound(String),
}

impl ConfigError {
    /// Reason recorded on the `Ready` condition for this error
    pub fn reason(&self) -> &'static str {
        match self {
            ConfigError::ProviderNotFound(_) => reasons::PROVIDER_NOT_FOUND,
            _ => reasons::INVALID_CONFIGURATION,
        }
    }
}

/// Selector with its namespace resolved against the rule's namespace
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    pub api_version: Option<String>,
    pub kind: String,
    pub namespace: SourcePattern,
    pub name: SourcePattern,
    pub match_labels: BTreeMap<String, String>,
}

/// Validated rule ready for event matching
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub selectors: Vec<CompiledSelector>,
    pub severity: Severity,
    /// None when the rule has no exclusions
    pub exclusions: Option<RegexSet>,
    pub summary: Option<String>,
    pub provider: String,
    pub suspend: bool,
}

/// Validate a definition declared in `namespace` and compile it
pub fn compile(namespace: &str, definition: &RuleDefinition) -> Result<CompiledRule, ConfigError> {
    if definition.provider_ref.name.trim().is_empty() {
        return Err(ConfigError::EmptyProviderRef);
    }

    if definition.event_sources.is_empty() {
        return Err(ConfigError::NoEventSources);
    }

    let selectors = definition
        .event_sources
        .iter()
        .enumerate()
        .map(|(index, source)| {
            if source.kind.is_empty() {
                return Err(ConfigError::EmptyKind { index });
            }
            if source.name == SourcePattern::Exact(String::new()) {
                return Err(ConfigError::EmptyName { index });
            }
            if !source.match_labels.is_empty() && !source.name.is_any() {
                return Err(ConfigError::LabelsWithExactName { index });
            }

            let namespace = match &source.namespace {
                Some(pattern) => pattern.clone(),
                None => SourcePattern::Exact(namespace.to_string()),
            };

            Ok(CompiledSelector {
                api_version: source.api_version.clone(),
                kind: source.kind.clone(),
                namespace,
                name: source.name.clone(),
                match_labels: source.match_labels.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(summary) = &definition.summary {
        let len = summary.chars().count();
        if len > MAX_SUMMARY_LEN {
            return Err(ConfigError::SummaryTooLong(len));
        }
    }

    Ok(CompiledRule {
        selectors,
        severity: definition.event_severity,
        exclusions: compile_exclusions(&definition.exclusion_list)?,
        summary: definition.summary.clone(),
        provider: definition.provider_ref.name.clone(),
        suspend: definition.suspend,
    })
}

fn compile_exclusions(patterns: &[String]) -> Result<Option<RegexSet>, ConfigError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    // Compile individually first so the error names the offending pattern
    for pattern in patterns {
        build_set(std::slice::from_ref(pattern)).map_err(|e| ConfigError::InvalidExclusion {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
    }

    build_set(patterns)
        .map(Some)
        .map_err(|e| ConfigError::InvalidExclusion {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })
}

fn build_set(patterns: &[String]) -> Result<RegexSet, regex::Error> {
    RegexSetBuilder::new(patterns)
        .size_limit(EXCLUSION_SIZE_LIMIT)
        .build()
}
