//! Notification providers
//!
//! A provider is an external sink that rules deliver notifications to.
//! Providers are registered by name and resolved when a notification is sent,
//! so a provider removed while a rule still references it shows up as a
//! permanent delivery failure rather than a stale handle.

pub mod log;
pub mod payload;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use self::log::LogProvider;
pub use payload::Notification;
pub use webhook::WebhookProvider;

/// A notification sink
pub trait Provider: Send + Sync {
    /// Short type name, e.g. `webhook`
    fn kind(&self) -> &'static str;

    /// Deliver one notification
    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

/// Declared provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Write notifications to the log
    Log,
    /// POST notifications as JSON
    Webhook {
        address: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

/// Delivery failures, classified by whether a retry can help
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("rule was suspended or deleted")]
    RuleRetired,
}

impl DeliveryError {
    /// Whether the failure may go away on its own
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Timeout(_) | DeliveryError::Connection(_) => true,
            DeliveryError::Status { status, .. } => (500..=599).contains(status) || *status == 429,
            DeliveryError::InvalidRequest(_)
            | DeliveryError::ProviderNotFound(_)
            | DeliveryError::RuleRetired => false,
        }
    }
}

/// Provider configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider name must not be empty")]
    EmptyName,

    #[error("invalid webhook address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("provider '{0}' not found")]
    NotFound(String),
}

struct RegisteredProvider {
    config: Option<ProviderConfig>,
    provider: Arc<dyn Provider>,
}

/// Summary of a registered provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ProviderConfig>,
}

/// Named providers shared by all rules
pub struct ProviderRegistry {
    providers: DashMap<String, RegisteredProvider>,
    client: reqwest::Client,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    /// Register or replace a provider from its declared configuration
    pub fn register(&self, name: &str, config: ProviderConfig) -> Result<(), ProviderError> {
        if name.trim().is_empty() {
            return Err(ProviderError::EmptyName);
        }

        let provider: Arc<dyn Provider> = match &config {
            ProviderConfig::Log => Arc::new(LogProvider::new(name)),
            ProviderConfig::Webhook { address, headers } => Arc::new(WebhookProvider::new(
                self.client.clone(),
                address,
                headers.clone(),
            )?),
        };

        tracing::info!(provider = %name, kind = provider.kind(), "Provider registered");
        self.providers.insert(
            name.to_string(),
            RegisteredProvider {
                config: Some(config),
                provider,
            },
        );
        Ok(())
    }

    /// Register a provider implementation directly
    pub fn insert(&self, name: &str, provider: Arc<dyn Provider>) {
        self.providers.insert(
            name.to_string(),
            RegisteredProvider {
                config: None,
                provider,
            },
        );
    }

    pub fn remove(&self, name: &str) -> Result<(), ProviderError> {
        self.providers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).map(|p| Arc::clone(&p.provider))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// List providers sorted by name
    pub fn list(&self) -> Vec<ProviderInfo> {
        let mut providers: Vec<ProviderInfo> = self
            .providers
            .iter()
            .map(|e| ProviderInfo {
                name: e.key().clone(),
                kind: e.value().provider.kind(),
                config: e.value().config.clone(),
            })
            .collect();
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        providers
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DeliveryError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(DeliveryError::Connection("refused".into()).is_transient());
        assert!(DeliveryError::Status { status: 503, body: String::new() }.is_transient());
        assert!(DeliveryError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!DeliveryError::Status { status: 404, body: String::new() }.is_transient());
        assert!(!DeliveryError::ProviderNotFound("x".into()).is_transient());
        assert!(!DeliveryError::RuleRetired.is_transient());
    }

    #[test]
    fn test_register_and_remove() {
        let registry = ProviderRegistry::new();
        registry.register("audit", ProviderConfig::Log).unwrap();
        registry
            .register(
                "hook",
                ProviderConfig::Webhook {
                    address: "http://127.0.0.1:9000/alerts".to_string(),
                    headers: HashMap::new(),
                },
            )
            .unwrap();

        let names: Vec<_> = registry.list().into_iter().map(|p| (p.name, p.kind)).collect();
        assert_eq!(
            names,
            vec![("audit".to_string(), "log"), ("hook".to_string(), "webhook")]
        );

        registry.remove("audit").unwrap();
        assert!(!registry.contains("audit"));
        assert!(matches!(registry.remove("audit"), Err(ProviderError::NotFound(_))));
    }

    #[test]
    fn test_invalid_registrations() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.register("", ProviderConfig::Log),
            Err(ProviderError::EmptyName)
        ));
        assert!(matches!(
            registry.register(
                "hook",
                ProviderConfig::Webhook {
                    address: "not a url".to_string(),
                    headers: HashMap::new(),
                }
            ),
            Err(ProviderError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_provider_config_wire_format() {
        let config: ProviderConfig = serde_json::from_value(serde_json::json!({
            "type": "webhook",
            "address": "https://hooks.example.com/alerts",
            "headers": {"Authorization": "Bearer token"}
        }))
        .unwrap();

        match config {
            ProviderConfig::Webhook { address, headers } => {
                assert_eq!(address, "https://hooks.example.com/alerts");
                assert_eq!(headers["Authorization"], "Bearer token");
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }
}
