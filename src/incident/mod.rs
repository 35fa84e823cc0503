//! Incident data model
//!
//! - `document` - the public incident post (front matter + narrative)
//! - `linkage` - the JSON block embedded in a ticket body that points back at the post

pub mod document;
pub mod linkage;

pub use document::{outage_filename, slugify, DocumentError, FrontMatter, IncidentDocument};
pub use linkage::{IssueLinkage, LinkageError};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "document_test.rs"]
mod document_tests;
