//! Dead-man's-switch pings (healthchecks.io protocol)
//!
//! - `GET {base}/start` when a pass begins
//! - `GET {base}` when it succeeds
//! - `POST {base}/log` with a plain-text diagnostic, then `GET {base}/fail`, when it fails
//!
//! Without a base URL every ping is a no-op.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("heartbeat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("heartbeat endpoint returned HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ping {
    Start,
    Success,
    Fail,
    Log(String),
}

impl Ping {
    /// URL suffix appended to the check's base URL
    pub fn suffix(&self) -> &'static str {
        match self {
            Ping::Start => "/start",
            Ping::Success => "",
            Ping::Fail => "/fail",
            Ping::Log(_) => "/log",
        }
    }
}

#[async_trait]
pub trait Heartbeat: Send + Sync {
    async fn ping(&self, ping: &Ping) -> Result<(), HeartbeatError>;
}

/// Production heartbeat client
pub struct HealthchecksClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HealthchecksClient {
    pub fn new(base_url: Option<String>) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to build heartbeat HTTP client, using default");
                reqwest::Client::new()
            }
        };
        let base_url = base_url.map(|url| url.trim_end_matches('/').to_string());
        Self { client, base_url }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }
}

#[async_trait]
impl Heartbeat for HealthchecksClient {
    async fn ping(&self, ping: &Ping) -> Result<(), HeartbeatError> {
        let Some(base) = &self.base_url else {
            return Ok(()); // No heartbeat configured, skip
        };
        let url = format!("{}{}", base, ping.suffix());

        let request = match ping {
            Ping::Log(message) => self
                .client
                .post(&url)
                .header("Content-Type", "text/plain")
                .body(message.clone()),
            _ => self.client.get(&url),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(HeartbeatError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Mock heartbeat - records pings in order
#[cfg(test)]
#[derive(Default)]
pub struct MockHeartbeat {
    pings: std::sync::Mutex<Vec<Ping>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pings(&self) -> Vec<Ping> {
        self.pings.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Heartbeat for MockHeartbeat {
    async fn ping(&self, ping: &Ping) -> Result<(), HeartbeatError> {
        #[allow(clippy::unwrap_used)]
        self.pings.lock().unwrap().push(ping.clone());
        Ok(())
    }
}
