//! GitHub as the incident store
//!
//! Tickets are GitHub issues and incident posts are files committed through
//! the Contents API. The client authenticates as a GitHub App installation
//! (or with a plain token for local runs).

mod auth;
mod client;

pub use auth::{build_app_jwt, AppCredentials, Credentials};
pub use client::{GitHubClient, DEFAULT_API_URL};

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid repository '{0}', expected owner/repo")]
pub struct InvalidRepository(pub String);

/// `owner/repo` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self, InvalidRepository> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| InvalidRepository(raw.to_string()))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(InvalidRepository(raw.to_string()));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "client_test.rs"]
mod client_tests;
