//! Proxied-mirror fetcher for short-post handles.
//!
//! Every handle starts at its own deterministic offset into the proxy pool
//! (a hash of the handle), so repeated runs spread load across origins
//! instead of always hammering the first one. Up to [`MAX_ORIGIN_ATTEMPTS`]
//! origins are tried in rotation; the first usable document wins.

use tracing::{debug, instrument};
use url::Url;

use crate::http::HttpClient;
use crate::models::{FetchOutcome, SourceDescriptor};
use crate::proxy_pool::PoolManager;
use crate::sources::feed::entries_to_items;
use crate::sources::syndication::parse_syndication;
use crate::utils::stable_offset;

pub const MAX_ORIGIN_ATTEMPTS: usize = 5;
pub const MIN_TITLE_CHARS: usize = 5;
pub const CANONICAL_HOST: &str = "https://x.com";

fn feed_path(handle: &str) -> String {
    format!("/{}/rss", urlencoding::encode(handle.trim().trim_start_matches('@')))
}

/// Rewrite a mirror permalink onto the canonical upstream host, dropping the fragment.
pub fn canonical_link(link: &str) -> String {
    match Url::parse(link) {
        Ok(url) => format!("{}{}", CANONICAL_HOST, url.path()),
        Err(_) => link.to_string(),
    }
}

/// Fetch a handle's feed through the proxy pool.
#[instrument(level = "info", skip_all, fields(source = %source.label, handle = %source.endpoint))]
pub async fn fetch_mirror<C: HttpClient>(
    pool: &PoolManager<C>,
    source: &SourceDescriptor,
) -> FetchOutcome {
    let origins = pool.ensure_pool().await;
    if origins.is_empty() {
        return FetchOutcome::unavailable("proxy pool is empty");
    }

    let path = feed_path(&source.endpoint);
    let offset = stable_offset(&source.endpoint, origins.len());
    let attempts = MAX_ORIGIN_ATTEMPTS.min(origins.len());

    for i in 0..attempts {
        let origin = &origins[(offset + i) % origins.len()];
        let Some(body) = pool.rate_limited_get(origin, &path).await else {
            continue;
        };
        let entries = match parse_syndication(&body) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(%origin, error = %e, "Mirror returned an unparseable document");
                continue;
            }
        };
        // One real post makes the document usable; the whole document is kept.
        if !entries.iter().any(|e| e.title.chars().count() > MIN_TITLE_CHARS) {
            debug!(%origin, "Mirror document had no usable entries");
            continue;
        }
        let entries: Vec<_> = entries
            .into_iter()
            .map(|mut e| {
                e.link = e.link.as_deref().map(canonical_link);
                e
            })
            .collect();
        debug!(%origin, attempt = i + 1, count = entries.len(), "Mirror fetch succeeded");
        return FetchOutcome::Fetched(entries_to_items(source, entries));
    }

    FetchOutcome::unavailable(format!("no usable mirror after {attempts} attempts"))
}
