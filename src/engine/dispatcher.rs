//! Single-attempt delivery to a rule's provider

use std::sync::Arc;
use std::time::Duration;

use crate::events::IncomingEvent;
use crate::providers::{DeliveryError, Notification, ProviderRegistry};
use crate::rules::{CompiledRule, RuleKey};

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered,
    Failed(DeliveryError),
}

impl From<Result<(), DeliveryError>> for DispatchOutcome {
    fn from(result: Result<(), DeliveryError>) -> Self {
        match result {
            Ok(()) => DispatchOutcome::Delivered,
            Err(e) => DispatchOutcome::Failed(e),
        }
    }
}

/// Sends admitted events to providers
#[derive(Clone)]
pub struct Dispatcher {
    providers: Arc<ProviderRegistry>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(providers: Arc<ProviderRegistry>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Payload for `event` as admitted by `rule`
    pub fn notification(key: &RuleKey, rule: &CompiledRule, event: &IncomingEvent) -> Notification {
        Notification::from_event(key, rule.summary.as_deref(), event)
    }

    /// Build the payload and make one delivery attempt
    pub async fn dispatch(
        &self,
        key: &RuleKey,
        rule: &CompiledRule,
        event: &IncomingEvent,
    ) -> DispatchOutcome {
        let notification = Self::notification(key, rule, event);
        self.send(&rule.provider, &notification).await.into()
    }

    /// Resolve the provider and send, bounded by the dispatch timeout
    pub async fn send(&self, provider: &str, notification: &Notification) -> Result<(), DeliveryError> {
        let sink = self
            .providers
            .get(provider)
            .ok_or_else(|| DeliveryError::ProviderNotFound(provider.to_string()))?;

        match tokio::time::timeout(self.timeout, sink.send(notification)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        }
    }
}
