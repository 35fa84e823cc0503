//! Chat notifications for incident transitions
//!
//! Posts a Discord-compatible embed when an incident opens or resolves.
//! Notifications are best-effort: the reconciler logs failures and moves on.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Webhook display name
pub const BOT_USERNAME: &str = "Valvoja";

const FOOTER_TEXT: &str = "Valvoja HTTP monitor";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook POST failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned HTTP {0}")]
    Status(u16),
}

/// State the service moved into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Online,
    Offline,
}

impl ServiceStatus {
    pub fn label(self) -> &'static str {
        match self {
            ServiceStatus::Online => "Online",
            ServiceStatus::Offline => "Offline",
        }
    }

    /// Embed color: `#22c55e` online, `#ef4444` offline
    pub fn color(self) -> u32 {
        match self {
            ServiceStatus::Online => 0x22c55e,
            ServiceStatus::Offline => 0xef4444,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, status: ServiceStatus) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookMessage {
    pub username: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    pub footer: EmbedFooter,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

/// Build the webhook payload for `service` entering `status`
pub fn build_message(service: &str, status: ServiceStatus) -> WebhookMessage {
    WebhookMessage {
        username: BOT_USERNAME.to_string(),
        embeds: vec![Embed {
            title: format!("{} is {}", service, status.label()),
            color: status.color(),
            footer: EmbedFooter {
                text: FOOTER_TEXT.to_string(),
            },
        }],
    }
}

/// Production notifier posting to a chat webhook
///
/// Without a webhook URL every call is a no-op.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    service_name: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: Option<String>, service_name: String) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to build webhook HTTP client, using default");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            webhook_url,
            service_name,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, status: ServiceStatus) -> Result<(), NotifyError> {
        let Some(url) = &self.webhook_url else {
            return Ok(()); // No webhook configured, skip
        };

        let response = self
            .client
            .post(url)
            .json(&build_message(&self.service_name, status))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Mock notifier - stores notifications in memory
#[cfg(test)]
#[derive(Default)]
pub struct MockNotifier {
    sent: std::sync::Mutex<Vec<ServiceStatus>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record notifications but report every send as failed
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<ServiceStatus> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, status: ServiceStatus) -> Result<(), NotifyError> {
        #[allow(clippy::unwrap_used)]
        self.sent.lock().unwrap().push(status);
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError::Status(503));
        }
        Ok(())
    }
}
