//! RSS 2.0 and Atom parsing into flat [`FeedEntry`] records.
//!
//! Both the direct feed fetcher and the proxied-mirror fetcher read
//! syndication documents; this module is the one place that knows their shape.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use quick_xml::escape::resolve_html5_entity;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::IngestError;
use crate::text::clean_html;

/// One entry of a syndication document, already stripped of markup.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

static RE_AMPERSAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+;|#[xX][0-9a-fA-F]+;|[A-Za-z][A-Za-z0-9]*;)?").expect("entity regex"));

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

/// Parse an RFC 2822 (RSS) or RFC 3339 (Atom) timestamp.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an RSS or Atom document.
///
/// Entries with neither a title nor a summary are dropped. A document that
/// is neither RSS nor Atom is a parse error.
pub fn parse_syndication(body: &str) -> Result<Vec<FeedEntry>, IngestError> {
    let xml = escape_stray_ampersands(body);
    let head: String = xml.chars().take(2048).collect();

    let entries = if head.contains("<rss") {
        let rss: Rss = from_str(&xml)?;
        rss.channel.items.into_iter().map(rss_entry).collect::<Vec<_>>()
    } else if head.contains("<feed") {
        let feed: AtomFeed = from_str(&xml)?;
        feed.entries.into_iter().map(atom_entry).collect::<Vec<_>>()
    } else {
        return Err(IngestError::Parse("not an RSS or Atom document".to_string()));
    };

    Ok(entries
        .into_iter()
        .filter(|e| !e.title.is_empty() || !e.summary.is_empty())
        .collect())
}

fn rss_entry(item: RssItem) -> FeedEntry {
    FeedEntry {
        title: clean_html(item.title.as_deref().unwrap_or_default()),
        summary: clean_html(item.description.as_deref().unwrap_or_default()),
        link: item.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
        published: item.pub_date.as_deref().and_then(parse_timestamp),
    }
}

fn atom_entry(entry: AtomEntry) -> FeedEntry {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().is_none_or(|r| r == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|l| !l.is_empty());
    let summary = entry.summary.or(entry.content).map(|t| t.value);
    FeedEntry {
        title: clean_html(&entry.title.map(|t| t.value).unwrap_or_default()),
        summary: clean_html(&summary.unwrap_or_default()),
        link,
        published: entry
            .published
            .or(entry.updated)
            .as_deref()
            .and_then(parse_timestamp),
    }
}

// The reader resolves every HTML5 named entity. Anything else after an `&`
// (an unknown name, a bare ampersand in "AT&T") would fail the whole
// document, so it is escaped to a literal ampersand first.
fn escape_stray_ampersands(s: &str) -> std::borrow::Cow<'_, str> {
    RE_AMPERSAND.replace_all(s, |caps: &Captures| match caps.get(1) {
        Some(m) if m.as_str().starts_with('#') => caps[0].to_string(),
        Some(m) if resolve_html5_entity(m.as_str().trim_end_matches(';')).is_some() => caps[0].to_string(),
        Some(m) => format!("&amp;{}", m.as_str()),
        None => "&amp;".to_string(),
    })
}
