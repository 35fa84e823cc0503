//! Pass scheduling
//!
//! `once` runs a single pass. `watch` runs passes back to back on a fixed
//! interval: passes never overlap, a slow pass delays the next tick and
//! missed ticks are skipped rather than bunched up.

pub mod shutdown;

pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

use crate::controller::{run_once, Context};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Counts from a finished `watch` loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub passes: u64,
    pub failures: u64,
}

/// Reconcile every `interval` until `shutdown` fires
///
/// The first pass runs immediately. Shutdown is only observed between
/// passes; a failed pass is logged and the loop carries on.
pub async fn watch(ctx: &Context, interval: Duration, mut shutdown: ShutdownSignal) -> WatchSummary {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut summary = WatchSummary::default();

    info!(interval_secs = interval.as_secs_f64(), "Watching endpoint");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                summary.passes += 1;
                if let Err(e) = run_once(ctx).await {
                    summary.failures += 1;
                    warn!(error = %e, pass = summary.passes, "Pass failed, retrying next tick");
                }
            }
        }
    }

    info!(passes = summary.passes, failures = summary.failures, "Watch loop stopped");
    summary
}

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
