//! Reachability probe for the monitored endpoint
//!
//! One HEAD request per pass, no retries. Any 2xx response is up; a non-2xx
//! status, a timeout or a connection error is down. Probe failures are never
//! errors, they are the signal.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Up { status: u16 },
    Down { reason: String },
}

impl ProbeOutcome {
    pub fn is_up(&self) -> bool {
        matches!(self, ProbeOutcome::Up { .. })
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}

/// Production prober issuing a HEAD request
pub struct HttpProber {
    client: reqwest::Client,
    url: String,
}

impl HttpProber {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to build probe HTTP client, using default");
                reqwest::Client::new()
            }
        };
        Self { client, url }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self) -> ProbeOutcome {
        let result = self
            .client
            .head(&self.url)
            .header("Content-Type", "text/html;charset=UTF-8")
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(url = %self.url, status = %response.status(), "Probe succeeded");
                ProbeOutcome::Up {
                    status: response.status().as_u16(),
                }
            }
            Ok(response) => ProbeOutcome::Down {
                reason: format!("HTTP {}", response.status()),
            },
            Err(e) if e.is_timeout() => ProbeOutcome::Down {
                reason: "request timed out".to_string(),
            },
            Err(e) => ProbeOutcome::Down {
                reason: e.to_string(),
            },
        }
    }
}

/// Mock prober with a switchable result
#[cfg(test)]
pub struct MockProber {
    up: std::sync::atomic::AtomicBool,
    probes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockProber {
    pub fn up() -> Self {
        Self::with(true)
    }

    pub fn down() -> Self {
        Self::with(false)
    }

    fn with(up: bool) -> Self {
        Self {
            up: std::sync::atomic::AtomicBool::new(up),
            probes: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Prober for MockProber {
    async fn probe(&self) -> ProbeOutcome {
        self.probes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.up.load(std::sync::atomic::Ordering::SeqCst) {
            ProbeOutcome::Up { status: 200 }
        } else {
            ProbeOutcome::Down {
                reason: "HTTP 500 Internal Server Error".to_string(),
            }
        }
    }
}
