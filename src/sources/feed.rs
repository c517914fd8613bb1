//! Direct RSS/Atom feed fetcher.

use tracing::{debug, instrument};

use crate::http::{HttpClient, PAGE_TIMEOUT};
use crate::models::{CandidateItem, FetchOutcome, SourceDescriptor};
use crate::sources::syndication::{FeedEntry, parse_syndication};

/// Fetch one feed and turn every entry into a [`CandidateItem`].
///
/// Transport, status and parse failures come back as
/// [`FetchOutcome::Unavailable`].
#[instrument(level = "info", skip_all, fields(source = %source.label))]
pub async fn fetch_feed<C: HttpClient>(http: &C, source: &SourceDescriptor) -> FetchOutcome {
    let body = match http.get(&source.endpoint, PAGE_TIMEOUT).await {
        Ok(resp) => match resp.into_success_body() {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, "Feed returned an error status");
                return FetchOutcome::unavailable(e);
            }
        },
        Err(e) => {
            debug!(error = %e, "Feed request failed");
            return FetchOutcome::unavailable(e);
        }
    };

    match parse_syndication(&body) {
        Ok(entries) => {
            let items = entries_to_items(source, entries);
            debug!(count = items.len(), "Parsed feed");
            FetchOutcome::Fetched(items)
        }
        Err(e) => {
            debug!(error = %e, "Feed did not parse");
            FetchOutcome::unavailable(e)
        }
    }
}

/// Map parsed entries onto candidates tagged with `source`.
pub fn entries_to_items(source: &SourceDescriptor, entries: Vec<FeedEntry>) -> Vec<CandidateItem> {
    entries
        .into_iter()
        .map(|e| {
            let title = if e.title.is_empty() {
                crate::text::headline(&e.summary, 160)
            } else {
                e.title
            };
            CandidateItem::new(source, title, e.summary, e.link, e.published)
        })
        .collect()
}
