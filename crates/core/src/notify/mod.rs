//! User-visible notification sink.
//!
//! The engine reports sync start/completion, per-file errors, and conflicts
//! here, fire-and-forget: no notification outcome is ever consumed by sync
//! logic, and channel failures are logged without aborting anything.
//!
//! Every event is also emitted as a tracing event, so the sink is useful
//! even with no external channel configured.

pub mod slack;

use tracing::{info, warn};

use crate::config::NotificationConfig;
use crate::models::SyncSummary;

/// Unified notifier that dispatches to all configured channels.
pub struct Notifier {
    slack: Option<slack::SlackNotifier>,
}

impl Notifier {
    /// Create a notifier from the notification configuration.
    pub fn from_config(config: &NotificationConfig) -> Self {
        let slack = config.slack_webhook_url.as_ref().map(|url| {
            info!("Slack notifications enabled");
            slack::SlackNotifier::new(url.clone())
        });
        Self { slack }
    }

    /// A notifier with no external channels (tracing only).
    pub fn disabled() -> Self {
        Self { slack: None }
    }

    async fn dispatch(&self, message: &str) {
        if let Some(ref slack) = self.slack {
            if let Err(e) = slack.send_message(message).await {
                warn!(error = %e, "Slack notification failed");
            }
        }
    }

    /// A reconciliation pass has started.
    pub async fn sync_started(&self) {
        info!("sync started");
        self.dispatch(":arrows_counterclockwise: *VaultSync* sync started")
            .await;
    }

    /// A reconciliation pass finished; quiet when nothing happened.
    pub async fn sync_completed(&self, summary: &SyncSummary) {
        info!(
            downloaded = summary.downloaded,
            uploaded = summary.uploaded,
            failed = summary.failed,
            conflicts_resolved = summary.conflicts_resolved,
            conflicts_manual = summary.conflicts_manual,
            "sync completed"
        );
        if summary.is_noop() {
            return;
        }
        self.dispatch(&format!(
            ":arrows_counterclockwise: *VaultSync* downloaded {}, uploaded {}, failed {} \
             (conflicts: {} auto, {} manual)",
            summary.downloaded,
            summary.uploaded,
            summary.failed,
            summary.conflicts_resolved,
            summary.conflicts_manual
        ))
        .await;
    }

    /// A file-scoped or pass-scoped sync failure.
    pub async fn sync_error(&self, path: Option<&str>, operation: &str, error: &str) {
        match path {
            Some(path) => warn!(path, operation, error, "sync failure"),
            None => warn!(operation, error, "sync failure"),
        }
        let target = path.unwrap_or("(pass)");
        self.dispatch(&format!(
            ":x: *VaultSync* {operation} failed for `{target}`: {error}"
        ))
        .await;
    }

    /// A conflict was written out for manual resolution.
    pub async fn conflict(&self, path: &str, backup_path: &str) {
        warn!(path, backup_path, "conflict requires manual resolution");
        self.dispatch(&format!(
            ":warning: *VaultSync* conflict on `{path}` — server version saved to `{backup_path}`"
        ))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_notifier_is_silent() {
        let notifier = Notifier::disabled();
        notifier.sync_started().await;
        notifier.sync_completed(&SyncSummary::default()).await;
        notifier.sync_error(Some("a.md"), "upload", "boom").await;
        notifier.conflict("a.md", "a (conflicted copy).md").await;
    }

    #[test]
    fn test_from_config_enables_slack() {
        let config = NotificationConfig {
            slack_webhook_url: Some("https://hooks.slack.com/x".into()),
        };
        let notifier = Notifier::from_config(&config);
        assert!(notifier.slack.is_some());
    }
}
