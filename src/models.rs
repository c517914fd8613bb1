//! Data models shared across the ingestion pipeline.
//!
//! This module defines the core data structures:
//! - [`SourceDescriptor`]: One configured feed, channel page or mirrored handle
//! - [`CandidateItem`]: A raw fetched item before any gating
//! - [`FetchOutcome`]: What a single fetcher hands back to the orchestrator
//! - [`StoryFingerprint`]: The dedup engine's memory unit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::stable_id;

/// The shape of an upstream source.
///
/// The class decides which fetcher handles the descriptor and how strict the
/// relevance filter is (feeds need both sides of the conflict mentioned,
/// social-style sources need only one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    /// RSS or Atom document fetched directly.
    Feed,
    /// Public HTML mirror of a message channel.
    ScrapedPage,
    /// Short-post handle reached through the proxy pool.
    ProxiedMirror,
}

impl SourceClass {
    /// Channel pages and mirrored handles are treated as social sources.
    pub fn is_social(self) -> bool {
        !matches!(self, SourceClass::Feed)
    }
}

/// An immutable record describing one source to poll.
///
/// # Fields
///
/// * `label` - Display name used in logs and downstream rendering
/// * `class` - Which fetcher handles it
/// * `endpoint` - Feed URL, channel handle/URL, or mirrored handle
/// * `official` - Embassy/official sources that may bypass some relevance rules
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceDescriptor {
    pub label: String,
    pub class: SourceClass,
    pub endpoint: String,
    #[serde(default)]
    pub official: bool,
}

/// One raw fetched unit, produced by a fetcher and consumed once by the
/// filtering pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateItem {
    /// Stable identifier: content hash of the link, or of the title when there is no link.
    pub id: String,
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    /// `None` means the source gave no timestamp; the freshness gate treats it as fresh.
    pub published: Option<DateTime<Utc>>,
    pub source: SourceDescriptor,
}

impl CandidateItem {
    pub fn new(
        source: &SourceDescriptor,
        title: String,
        summary: String,
        link: Option<String>,
        published: Option<DateTime<Utc>>,
    ) -> Self {
        let id = stable_id(link.as_deref().unwrap_or(&title));
        Self {
            id,
            title,
            summary,
            link,
            published,
            source: source.clone(),
        }
    }

    /// Title and summary joined for keyword matching.
    pub fn match_text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

/// Result of fetching a single source.
///
/// Fetchers never return errors: transport and parse failures become
/// `Unavailable` so one dead source cannot abort the run.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(Vec<CandidateItem>),
    Unavailable { reason: String },
}

impl FetchOutcome {
    pub fn unavailable(reason: impl ToString) -> Self {
        FetchOutcome::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn into_items(self) -> Vec<CandidateItem> {
        match self {
            FetchOutcome::Fetched(items) => items,
            FetchOutcome::Unavailable { .. } => Vec::new(),
        }
    }
}

/// A normalized title plus the moment it was first accepted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoryFingerprint {
    pub text: String,
    pub first_seen: DateTime<Utc>,
}
