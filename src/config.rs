//! Command line and environment configuration
//!
//! Every setting can come from the environment (the names a scheduled
//! deployment sets) or from a long flag. Optional integrations are disabled
//! by leaving their variables unset or empty.

use crate::controller::ReconcileSettings;
use crate::github::{AppCredentials, Credentials, InvalidRepository, RepoRef, DEFAULT_API_URL};
use crate::incident::slugify;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Blank(&'static str),

    #[error(transparent)]
    Repository(#[from] InvalidRepository),

    #[error("invalid {name} '{value}': {reason}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("no GitHub credentials: set GITHUB_APP_ID, GITHUB_APP_PRIVATE_KEY and GITHUB_APP_INSTALLATION_ID (or GITHUB_TOKEN)")]
    MissingCredentials,

    #[error("incomplete GitHub App credentials: {0} is not set")]
    IncompleteAppCredentials(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("SERVICE_NAME '{0}' has no letters or digits to name incident files with")]
    UnnamedService(String),
}

#[derive(Debug, Parser)]
#[command(name = "valvoja", version, about = "Track HTTP outages as GitHub incidents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Run a single reconciliation pass and exit (default)
    Once,
    /// Reconcile on a fixed interval until SIGINT/SIGTERM
    Watch {
        /// Seconds between passes
        #[arg(long, env = "WATCH_INTERVAL_SECS", default_value_t = 60)]
        interval: u64,
    },
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Endpoint to probe
    #[arg(long, env = "CHECK_URL")]
    pub check_url: String,

    /// Label marking the incident ticket
    #[arg(long, env = "ISSUE_LABEL")]
    pub issue_label: String,

    /// Display name used in posts, tickets and notifications
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: String,

    /// Repository holding tickets and posts, as owner/repo
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub github_repository: String,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub github_api_url: String,

    #[arg(long, env = "GITHUB_APP_ID")]
    pub github_app_id: Option<u64>,

    /// PEM private key; literal `\n` sequences are accepted
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY", hide_env_values = true)]
    pub github_app_private_key: Option<String>,

    #[arg(long, env = "GITHUB_APP_INSTALLATION_ID")]
    pub github_app_installation_id: Option<u64>,

    /// Token used instead of GitHub App credentials
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    #[arg(long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    pub discord_webhook_url: Option<String>,

    /// Dead-man's-switch check URL (healthchecks.io protocol)
    #[arg(long, env = "HEALTHCHECKS_URL")]
    pub healthchecks_url: Option<String>,

    /// Repository directory for incident posts
    #[arg(long, env = "CONTENT_DIR", default_value = "content/issues")]
    pub content_dir: String,

    #[arg(long, env = "PROBE_TIMEOUT_SECS", default_value_t = 10)]
    pub probe_timeout_secs: u64,
}

impl Settings {
    /// Check everything that can be checked without network access
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("CHECK_URL", &self.check_url)?;
        require("ISSUE_LABEL", &self.issue_label)?;
        require("SERVICE_NAME", &self.service_name)?;
        require("CONTENT_DIR", &self.content_dir)?;
        if slugify(&self.service_name).is_empty() {
            return Err(ConfigError::UnnamedService(self.service_name.clone()));
        }
        check_url("CHECK_URL", &self.check_url)?;
        check_url("GITHUB_API_URL", &self.github_api_url)?;
        if let Some(url) = non_blank(&self.discord_webhook_url) {
            check_url("DISCORD_WEBHOOK_URL", url)?;
        }
        if let Some(url) = non_blank(&self.healthchecks_url) {
            check_url("HEALTHCHECKS_URL", url)?;
        }
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::Zero("PROBE_TIMEOUT_SECS"));
        }
        self.repository()?;
        self.credentials()?;
        Ok(())
    }

    pub fn repository(&self) -> Result<RepoRef, ConfigError> {
        Ok(RepoRef::parse(&self.github_repository)?)
    }

    /// App credentials when any app setting is present, else a plain token
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let key = non_blank(&self.github_app_private_key);
        let any_app = self.github_app_id.is_some()
            || self.github_app_installation_id.is_some()
            || key.is_some();

        if any_app {
            let app_id = self
                .github_app_id
                .ok_or(ConfigError::IncompleteAppCredentials("GITHUB_APP_ID"))?;
            let installation_id = self
                .github_app_installation_id
                .ok_or(ConfigError::IncompleteAppCredentials("GITHUB_APP_INSTALLATION_ID"))?;
            let key = key.ok_or(ConfigError::IncompleteAppCredentials("GITHUB_APP_PRIVATE_KEY"))?;
            return Ok(Credentials::App(AppCredentials {
                app_id,
                installation_id,
                private_key: unescape_newlines(key),
            }));
        }

        non_blank(&self.github_token)
            .map(|token| Credentials::Token(token.to_string()))
            .ok_or(ConfigError::MissingCredentials)
    }

    pub fn webhook_url(&self) -> Option<String> {
        non_blank(&self.discord_webhook_url).map(str::to_string)
    }

    pub fn heartbeat_url(&self) -> Option<String> {
        non_blank(&self.healthchecks_url).map(str::to_string)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            service_name: self.service_name.trim().to_string(),
            issue_label: self.issue_label.trim().to_string(),
            content_dir: self.content_dir.trim().trim_matches('/').to_string(),
        }
    }
}

fn require(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Blank(name));
    }
    Ok(())
}

fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    reqwest::Url::parse(value.trim())
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Single-line secrets store the PEM with literal `\n`
fn unescape_newlines(key: &str) -> String {
    key.replace("\\n", "\n")
}
