//! Outbound operator notification (§6 `Notifier`): an optional webhook POST,
//! or a no-op when no URL is configured. Failures are logged and swallowed —
//! per `domain::ports::Notifier`'s contract, a dropped notification must
//! never propagate back into the control loop.

use crate::domain::ports::Notifier;
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use tracing::warn;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
}

pub struct WebhookNotifier {
    client: ClientWithMiddleware,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) {
        let payload = WebhookPayload { subject, body };
        if let Err(err) = self.client.post(&self.url).json(&payload).send().await {
            warn!(error = %err, url = %self.url, "webhook notification failed");
        }
    }
}

/// Used when no notifier URL is configured. Absence of a configured
/// endpoint is a deliberate no-op implementation, not a missing feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _subject: &str, _body: &str) {}
}
