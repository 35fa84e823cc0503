//! Incident post stored in the repository's content directory
//!
//! A post is a YAML front-matter block followed by a markdown narrative:
//!
//! ```text
//! ---
//! section: issue
//! title: Example Outage
//! date: 2026-10-15T12:30:05.000Z
//! resolved: false
//! ...
//! ---
//! *Investigating* - We are investigating an issue ... {{< track "2026-10-15 12:30:05" >}}
//! ```
//!
//! The front matter is parsed into [`FrontMatter`]; keys the status page adds
//! by hand are carried through in `extra` so a resolve never drops them.
//! Narrative updates are added newest-first and existing text is never rewritten.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const DELIMITER: &str = "---";

/// Front matter `section` for incident posts
pub const SECTION_ISSUE: &str = "issue";

/// Front matter `severity` for a full outage
pub const SEVERITY_DOWN: &str = "down";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document does not start with a front matter block")]
    MissingFrontMatter,

    #[error("front matter block is not terminated by '---'")]
    UnterminatedFrontMatter,

    #[error("invalid front matter: {0}")]
    InvalidFrontMatter(#[source] serde_yaml::Error),

    #[error("failed to render front matter: {0}")]
    Render(#[source] serde_yaml::Error),

    #[error("incident is already resolved (resolvedWhen: {resolved_when})")]
    AlreadyResolved { resolved_when: String },
}

/// Typed front matter of an incident post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontMatter {
    pub section: String,
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub informational: bool,
    #[serde(default)]
    pub pin: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub resolved_when: String,
    #[serde(default)]
    pub affected: Vec<String>,
    pub severity: String,
    /// Keys not managed here, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// An incident post: front matter plus free-text narrative
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentDocument {
    pub front_matter: FrontMatter,
    pub narrative: String,
}

impl IncidentDocument {
    /// Build the post for a freshly detected outage of `service`
    pub fn open_outage(service: &str, started_at: DateTime<Utc>) -> Self {
        IncidentDocument {
            front_matter: FrontMatter {
                section: SECTION_ISSUE.to_string(),
                title: format!("{} Outage", service),
                date: iso_timestamp(started_at),
                resolved: false,
                draft: false,
                informational: false,
                pin: false,
                resolved_when: String::new(),
                affected: vec![service.to_string()],
                severity: SEVERITY_DOWN.to_string(),
                extra: BTreeMap::new(),
            },
            narrative: format!(
                "*Investigating* - We are investigating an issue that has shut down {}. \
                 We are sorry for any inconvenience this may cause you. \
                 This incident post will be updated once we have more information. {}",
                service,
                track_marker(started_at)
            ),
        }
    }

    /// Parse a post as fetched from the repository
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let rest = text
            .strip_prefix(DELIMITER)
            .ok_or(DocumentError::MissingFrontMatter)?;
        let rest = rest
            .strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))
            .ok_or(DocumentError::MissingFrontMatter)?;

        let mut offset = 0;
        for line in rest.split_inclusive('\n') {
            if line.trim_end() == DELIMITER {
                let yaml = &rest[..offset];
                let narrative = &rest[offset + line.len()..];
                let front_matter =
                    serde_yaml::from_str(yaml).map_err(DocumentError::InvalidFrontMatter)?;
                return Ok(IncidentDocument {
                    front_matter,
                    narrative: narrative.to_string(),
                });
            }
            offset += line.len();
        }

        Err(DocumentError::UnterminatedFrontMatter)
    }

    /// Render the post back to its on-disk text form
    pub fn render(&self) -> Result<String, DocumentError> {
        let yaml = serde_yaml::to_string(&self.front_matter).map_err(DocumentError::Render)?;
        Ok(format!(
            "{DELIMITER}\n{yaml}{DELIMITER}\n{}",
            self.narrative
        ))
    }

    pub fn is_resolved(&self) -> bool {
        self.front_matter.resolved
    }

    /// Mark the incident resolved at `resolved_at`
    ///
    /// Flips `resolved`, stamps `resolvedWhen` and adds a resolution entry
    /// above the existing narrative. Fails if the post is already resolved so
    /// the flag only ever flips once.
    pub fn resolve(&mut self, service: &str, resolved_at: DateTime<Utc>) -> Result<(), DocumentError> {
        if self.front_matter.resolved {
            return Err(DocumentError::AlreadyResolved {
                resolved_when: self.front_matter.resolved_when.clone(),
            });
        }

        self.front_matter.resolved = true;
        self.front_matter.resolved_when = iso_timestamp(resolved_at);

        let entry = format!(
            "*Resolved* - The issue has been resolved, and {} is back online. \
             A full postmortem will be posted soon. {}",
            service,
            track_marker(resolved_at)
        );
        self.narrative = if self.narrative.trim().is_empty() {
            format!("{}\n", entry)
        } else {
            format!("{}\n\n{}", entry, self.narrative)
        };

        Ok(())
    }
}

/// File name for an outage post: `{date}-{service}-outage-{time}.md`
pub fn outage_filename(service: &str, started_at: DateTime<Utc>) -> String {
    format!(
        "{}-{}-outage-{}.md",
        started_at.format("%Y-%m-%d"),
        slugify(service),
        slugify(&started_at.format("%H:%M:%S").to_string())
    )
}

/// Lowercase and collapse every run of non-alphanumeric characters into one `-`
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Millisecond RFC3339 timestamp with a `Z` suffix
fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Hugo shortcode the status page uses to render update times
fn track_marker(at: DateTime<Utc>) -> String {
    format!("{{{{< track \"{}\" >}}}}", at.format("%Y-%m-%d %H:%M:%S"))
}
