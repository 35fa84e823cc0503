//! Issue tracker capability
//!
//! The reconciler needs tickets (the incident record) and versioned content
//! files (the incident post) from the same repository. Production code uses
//! `github::GitHubClient`; tests use `MockTracker`, an in-memory repository
//! with per-operation failure injection.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("authentication failed: {0}")]
    Auth(String),
}

/// An open ticket as listed by the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
}

/// Ticket to be opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Decoded content file with its revision token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    pub path: String,
    pub sha: String,
    pub content: String,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Authenticate and return the identity the tracker knows us by
    async fn authenticate(&self) -> Result<String, TrackerError>;

    /// Open tickets carrying `label`, newest first
    async fn list_open_tickets(&self, label: &str) -> Result<Vec<Ticket>, TrackerError>;

    async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket, TrackerError>;

    async fn close_ticket(&self, number: u64) -> Result<(), TrackerError>;

    /// Create a file, returning its revision token
    async fn create_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String, TrackerError>;

    async fn get_file(&self, path: &str) -> Result<ContentFile, TrackerError>;

    /// Replace a file if its current revision is still `sha`, returning the new revision
    async fn update_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: &str,
    ) -> Result<String, TrackerError>;
}

#[cfg(test)]
pub use mock::{MockTracker, TrackerOp};
