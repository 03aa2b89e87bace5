//! Generic JSON webhook provider

use std::collections::HashMap;

use futures::future::BoxFuture;

use super::{DeliveryError, Notification, Provider, ProviderError};

/// POSTs notifications as JSON to a fixed address
pub struct WebhookProvider {
    client: reqwest::Client,
    url: reqwest::Url,
    headers: HashMap<String, String>,
}

impl WebhookProvider {
    pub fn new(
        client: reqwest::Client,
        address: &str,
        headers: HashMap<String, String>,
    ) -> Result<Self, ProviderError> {
        let url = reqwest::Url::parse(address).map_err(|e| ProviderError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ProviderError::InvalidAddress {
                address: address.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        Ok(Self {
            client,
            url,
            headers,
        })
    }

    async fn post(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let mut request = self.client.post(self.url.clone()).json(notification);

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            rule = %notification.rule,
            url = %self.url,
            "Webhook notification sent"
        );

        Ok(())
    }
}

impl Provider for WebhookProvider {
    fn kind(&self) -> &'static str {
        "webhook"
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(self.post(notification))
    }
}

fn classify(e: reqwest::Error) -> DeliveryError {
    if e.is_builder() {
        DeliveryError::InvalidRequest(e.to_string())
    } else {
        DeliveryError::Connection(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::IncomingEvent;
    use crate::rules::RuleKey;

    #[test]
    fn test_rejects_unsupported_scheme() {
        let result = WebhookProvider::new(
            reqwest::Client::new(),
            "ftp://example.com/alerts",
            HashMap::new(),
        );
        assert!(matches!(result, Err(ProviderError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        // Nothing listens on port 9 locally
        let provider = WebhookProvider::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/alerts",
            HashMap::new(),
        )
        .unwrap();

        let event = IncomingEvent::new("Deployment", "prod", "api", "error", "down");
        let notification = Notification::from_event(&RuleKey::new("ops", "r"), None, &event);

        let err = provider.send(&notification).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
