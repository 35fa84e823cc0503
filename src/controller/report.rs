//! Best-effort side effects of a reconciliation pass
//!
//! Chat notifications and heartbeat pings run as spawned tasks so they never
//! delay or fail the pass. Their errors are logged at `warn`. `finish` drains
//! every task so a one-shot process does not exit with requests in flight.
//!
//! The outcome ping waits for the start ping, so the heartbeat service always
//! sees `/start` before the matching success or failure.

use super::heartbeat::{Heartbeat, Ping};
use super::notifier::{Notifier, ServiceStatus};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::warn;

pub struct RunReport {
    heartbeat: Arc<dyn Heartbeat>,
    start: Option<JoinHandle<()>>,
    tasks: JoinSet<()>,
}

impl RunReport {
    /// Begin a pass: fires the start ping
    pub fn begin(heartbeat: Arc<dyn Heartbeat>) -> Self {
        let start_heartbeat = heartbeat.clone();
        let start = tokio::spawn(async move {
            send_ping(start_heartbeat.as_ref(), &Ping::Start).await;
        });

        RunReport {
            heartbeat,
            start: Some(start),
            tasks: JoinSet::new(),
        }
    }

    /// Queue a chat notification
    pub fn notify(&mut self, notifier: Arc<dyn Notifier>, status: ServiceStatus) {
        self.tasks.spawn(async move {
            if let Err(e) = notifier.notify(status).await {
                warn!(error = %e, status = status.label(), "Chat notification failed");
            }
        });
    }

    /// Report success, then wait for every queued side effect
    pub async fn succeed(self) {
        self.finish(vec![Ping::Success]).await;
    }

    /// Report failure with a diagnostic, then wait for every queued side effect
    pub async fn fail(self, diagnostic: String) {
        self.finish(vec![Ping::Log(diagnostic), Ping::Fail]).await;
    }

    async fn finish(mut self, pings: Vec<Ping>) {
        let start = self.start.take();
        let heartbeat = self.heartbeat.clone();
        self.tasks.spawn(async move {
            if let Some(start) = start {
                if let Err(e) = start.await {
                    warn!(error = %e, "Start ping task panicked");
                }
            }
            for ping in &pings {
                send_ping(heartbeat.as_ref(), ping).await;
            }
        });

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Side-effect task panicked");
            }
        }
    }
}

async fn send_ping(heartbeat: &dyn Heartbeat, ping: &Ping) {
    if let Err(e) = heartbeat.ping(ping).await {
        warn!(error = %e, suffix = ping.suffix(), "Heartbeat ping failed");
    }
}
