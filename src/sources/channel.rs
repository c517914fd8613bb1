//! Public message-channel page scraper.
//!
//! Channels are read through their public web preview
//! (`https://t.me/s/<handle>`), which renders the latest posts as HTML
//! blocks, oldest first. This source class is high-volume, so posts older
//! than [`CHANNEL_MAX_AGE_SECS`] are dropped here, before the run-wide
//! freshness gate ever sees them.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use crate::http::{HttpClient, PAGE_TIMEOUT};
use crate::models::{CandidateItem, FetchOutcome, SourceDescriptor};
use crate::sources::syndication::parse_timestamp;
use crate::text::{clean_html, headline};

pub const CHANNEL_MIRROR_BASE: &str = "https://t.me/s/";
pub const CHANNEL_MAX_POSTS: usize = 20;
pub const CHANNEL_MIN_TEXT_CHARS: usize = 15;
pub const CHANNEL_MAX_AGE_SECS: i64 = 3600;

static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("br regex"));

static SEL_MESSAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".tgme_widget_message[data-post]").expect("message selector"));
static SEL_TEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".tgme_widget_message_text").expect("text selector"));
static SEL_TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("time selector"));

/// Page URL for a channel endpoint: full URLs pass through, handles go to the public mirror.
pub fn channel_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!(
            "{}{}",
            CHANNEL_MIRROR_BASE,
            urlencoding::encode(endpoint.trim_start_matches('@'))
        )
    }
}

/// Fetch a channel page and extract its recent posts.
#[instrument(level = "info", skip_all, fields(source = %source.label))]
pub async fn fetch_channel<C: HttpClient>(http: &C, source: &SourceDescriptor) -> FetchOutcome {
    let url = channel_url(&source.endpoint);
    let body = match http.get(&url, PAGE_TIMEOUT).await {
        Ok(resp) => match resp.into_success_body() {
            Ok(b) => b,
            Err(e) => {
                debug!(%url, error = %e, "Channel page returned an error status");
                return FetchOutcome::unavailable(e);
            }
        },
        Err(e) => {
            debug!(%url, error = %e, "Channel page request failed");
            return FetchOutcome::unavailable(e);
        }
    };

    let items = parse_channel_page(&body, source, Utc::now());
    debug!(count = items.len(), "Parsed channel page");
    FetchOutcome::Fetched(items)
}

/// Extract the most recent posts from a channel page.
///
/// Posts shorter than [`CHANNEL_MIN_TEXT_CHARS`] and posts timestamped
/// before `now - CHANNEL_MAX_AGE_SECS` are dropped. Posts without a
/// timestamp are kept.
pub fn parse_channel_page(
    html: &str,
    source: &SourceDescriptor,
    now: DateTime<Utc>,
) -> Vec<CandidateItem> {
    let document = Html::parse_document(html);
    let cutoff = now - Duration::seconds(CHANNEL_MAX_AGE_SECS);

    let blocks: Vec<ElementRef> = document.select(&SEL_MESSAGE).collect();
    let start = blocks.len().saturating_sub(CHANNEL_MAX_POSTS);

    blocks[start..]
        .iter()
        .filter_map(|block| {
            let text = block
                .select(&SEL_TEXT)
                .next()
                .map(|t| message_text(&t.inner_html()))
                .unwrap_or_default();
            if text.chars().count() < CHANNEL_MIN_TEXT_CHARS {
                return None;
            }

            let published = block
                .select(&SEL_TIME)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .and_then(parse_timestamp);
            if published.is_some_and(|ts| ts < cutoff) {
                return None;
            }

            let link = block
                .value()
                .attr("data-post")
                .map(|post| format!("https://t.me/{}", post.trim_matches('/')));

            let title = headline(&text, 160);
            let summary = text.replace('\n', " ");
            Some(CandidateItem::new(source, title, summary, link, published))
        })
        .collect()
}

// Keep line breaks from <br>, flatten everything else.
fn message_text(inner_html: &str) -> String {
    RE_BR
        .replace_all(inner_html, "\n")
        .lines()
        .map(clean_html)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
