//! Slack webhook notification sender.

use tracing::{debug, warn};

use crate::errors::NotifyError;

/// Slack incoming-webhook notifier.
pub struct SlackNotifier {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackNotifier {
    /// Create a notifier targeting the given webhook URL.
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    /// Send a message to the configured Slack channel.
    ///
    /// The `message` is sent as a simple `text` payload; Slack mrkdwn
    /// formatting is supported.
    pub async fn send_message(&self, message: &str) -> Result<(), NotifyError> {
        debug!(len = message.len(), "sending Slack message");

        let payload = serde_json::json!({
            "text": message,
            "unfurl_links": false,
            "unfurl_media": false,
        });

        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(NotifyError::HttpError)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Slack webhook returned error");
            return Err(NotifyError::SlackError(format!("HTTP {status}: {body}")));
        }

        Ok(())
    }
}
