use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use valvoja::config::{Cli, Command, Settings};
use valvoja::controller::clock::SystemClock;
use valvoja::controller::heartbeat::HealthchecksClient;
use valvoja::controller::notifier::WebhookNotifier;
use valvoja::controller::probe::HttpProber;
use valvoja::controller::{run_once, Context};
use valvoja::github::GitHubClient;
use valvoja::runner::{self, shutdown_channel, wait_for_signal};

/// Optional webhook and heartbeat clients; unset URLs leave them disabled
fn build_integrations(settings: &Settings) -> (WebhookNotifier, HealthchecksClient) {
    let notifier = WebhookNotifier::new(
        settings.webhook_url(),
        settings.service_name.trim().to_string(),
    );
    let heartbeat = HealthchecksClient::new(settings.heartbeat_url());
    (notifier, heartbeat)
}

/// Wire the real GitHub, probe, webhook and heartbeat clients together
fn build_context(settings: &Settings) -> anyhow::Result<Context> {
    let repo = settings.repository()?;
    let credentials = settings.credentials()?;
    let clock = Arc::new(SystemClock);

    let (notifier, heartbeat) = build_integrations(settings);
    info!(
        repository = %repo,
        webhook = notifier.is_enabled(),
        heartbeat = heartbeat.is_enabled(),
        "Integrations configured"
    );

    Ok(Context {
        settings: settings.reconcile_settings(),
        tracker: Arc::new(GitHubClient::new(
            settings.github_api_url.trim(),
            repo,
            credentials,
            clock.clone(),
        )),
        prober: Arc::new(HttpProber::new(
            settings.check_url.trim().to_string(),
            settings.probe_timeout(),
        )),
        notifier: Arc::new(notifier),
        heartbeat: Arc::new(heartbeat),
        clock,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli.settings.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let ctx = build_context(&cli.settings)?;
    info!(
        service = %ctx.settings.service_name,
        label = %ctx.settings.issue_label,
        "Starting valvoja"
    );

    match cli.command.unwrap_or(Command::Once) {
        Command::Once => {
            let outcome = run_once(&ctx).await?;
            info!(outcome = ?outcome, "Pass complete");
        }
        Command::Watch { interval } => {
            if interval == 0 {
                anyhow::bail!("watch interval must be greater than zero");
            }
            let (shutdown_controller, shutdown_signal) = shutdown_channel();
            tokio::spawn(async move {
                let signal = wait_for_signal().await;
                info!(signal = signal, "Initiating graceful shutdown");
                shutdown_controller.shutdown();
            });

            runner::watch(&ctx, Duration::from_secs(interval), shutdown_signal).await;
            info!("valvoja shut down gracefully");
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
