//! Ticket body linkage back to the incident post
//!
//! The ticket body ends with a fenced JSON block:
//!
//! ````text
//! ```json
//! {"filename":"2026-10-15-status-api-outage-12-30-05.md","hash":"3a0f..."}
//! ```
//! ````
//!
//! It is found by locating the fence markers, so any prose around it is ignored.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

#[derive(Debug, Error)]
pub enum LinkageError {
    #[error("ticket body has no ```json block")]
    MissingBlock,

    #[error("ticket linkage block is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Content file name and blob hash recorded when the incident was opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLinkage {
    pub filename: String,
    pub hash: String,
}

impl IssueLinkage {
    /// Ticket body announcing the incident with the linkage block embedded
    pub fn to_issue_body(&self, opened_at: DateTime<Utc>) -> Result<String, LinkageError> {
        let json = serde_json::to_string(self)?;
        Ok(format!(
            "Automatically opened by valvoja at {}\n{FENCE_OPEN}\n{json}\n{FENCE_CLOSE}",
            opened_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ))
    }

    /// Extract the linkage from a ticket body
    pub fn from_issue_body(body: &str) -> Result<Self, LinkageError> {
        let start = body.find(FENCE_OPEN).ok_or(LinkageError::MissingBlock)?;
        let after = &body[start + FENCE_OPEN.len()..];
        let block = match after.find(FENCE_CLOSE) {
            Some(end) => &after[..end],
            None => after,
        };

        Ok(serde_json::from_str(block.trim())?)
    }
}
