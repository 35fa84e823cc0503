pub mod clock;
pub mod heartbeat;
pub mod notifier;
pub mod probe;
pub mod reconcile;
pub mod report;
pub mod tracker;

pub use reconcile::{
    plan, reconcile, run_once, Context, ReconcileError, ReconcileOutcome, ReconcileSettings,
    Transition,
};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "reconcile_test.rs"]
mod tests;
