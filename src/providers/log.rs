use futures::future::BoxFuture;

use super::payload::SUMMARY_METADATA_KEY;
use super::{DeliveryError, Notification, Provider};

/// Writes notifications to the log
pub struct LogProvider {
    name: String,
}

impl LogProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Provider for LogProvider {
    fn kind(&self) -> &'static str {
        "log"
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            tracing::warn!(
                provider = %self.name,
                rule = %notification.rule,
                severity = %notification.severity,
                summary = ?notification.metadata.get(SUMMARY_METADATA_KEY),
                "Alert: {}",
                notification.headline()
            );
            Ok(())
        })
    }
}
