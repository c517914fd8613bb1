//! Concurrent fan-out over all configured sources, fan-in of whatever came back.
//!
//! Direct fetches (feeds and channel pages) start immediately. Proxied-mirror
//! fetches wait for the proxy pool warm-up, which itself runs concurrently
//! with the direct fetches. Each fetch is its own failure domain: an
//! unavailable source, or even a panicking fetcher, only removes that
//! source's items from the run.

use futures::FutureExt;
use futures::future::join_all;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::http::HttpClient;
use crate::models::{CandidateItem, FetchOutcome, SourceClass, SourceDescriptor};
use crate::proxy_pool::PoolManager;
use crate::sources::{channel, feed, mirror};

/// Per-source result line for the run log.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub label: String,
    pub class: SourceClass,
    /// Item count on success, reason on failure.
    pub result: Result<usize, String>,
}

/// Everything the fan-in collected.
#[derive(Debug, Default)]
pub struct FetchResults {
    pub items: Vec<CandidateItem>,
    pub reports: Vec<SourceReport>,
}

impl FetchResults {
    pub fn responded(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_ok()).count()
    }
}

async fn isolated<F>(source: &SourceDescriptor, fut: F) -> (SourceDescriptor, FetchOutcome)
where
    F: std::future::Future<Output = FetchOutcome>,
{
    let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => FetchOutcome::unavailable("fetcher panicked"),
    };
    (source.clone(), outcome)
}

/// Fetch every source concurrently and collect the results.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn fetch_all<C: HttpClient>(
    http: &C,
    pool: &PoolManager<C>,
    sources: &[SourceDescriptor],
) -> FetchResults {
    let t0 = Instant::now();

    let direct = join_all(sources.iter().filter_map(|s| match s.class {
        SourceClass::Feed => Some(isolated(s, feed::fetch_feed(http, s)).boxed_local()),
        SourceClass::ScrapedPage => Some(isolated(s, channel::fetch_channel(http, s)).boxed_local()),
        SourceClass::ProxiedMirror => None,
    }));

    let mirrored = async {
        let handles: Vec<&SourceDescriptor> = sources
            .iter()
            .filter(|s| s.class == SourceClass::ProxiedMirror)
            .collect();
        if handles.is_empty() {
            return Vec::new();
        }
        let origins = pool.ensure_pool().await.len();
        debug!(origins, handles = handles.len(), "Proxy pool ready");
        join_all(
            handles
                .into_iter()
                .map(|s| isolated(s, mirror::fetch_mirror(pool, s))),
        )
        .await
    };

    let (direct, mirrored) = tokio::join!(direct, mirrored);

    let mut results = FetchResults::default();
    for (source, outcome) in direct.into_iter().chain(mirrored) {
        let result = match &outcome {
            FetchOutcome::Fetched(items) => Ok(items.len()),
            FetchOutcome::Unavailable { reason } => {
                debug!(source = %source.label, %reason, "Source unavailable");
                Err(reason.clone())
            }
        };
        results.reports.push(SourceReport {
            label: source.label,
            class: source.class,
            result,
        });
        results.items.extend(outcome.into_items());
    }

    let responded = results.responded();
    if responded == 0 && !sources.is_empty() {
        warn!(sources = sources.len(), "No source responded this run");
    }
    info!(
        responded,
        unavailable = results.reports.len() - responded,
        items = results.items.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Fetch fan-in complete"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub::StubHttp;

    const HEALTH: &str = "https://health.example/api";

    fn src(label: &str, class: SourceClass, endpoint: &str) -> SourceDescriptor {
        SourceDescriptor {
            label: label.to_string(),
            class,
            endpoint: endpoint.to_string(),
            official: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_still_collects() {
        let dir = tempfile::tempdir().unwrap();
        let feed_body = r#"<rss version="2.0"><channel>
            <item><title>Strike reported near the port</title><link>https://a.example/1</link></item>
        </channel></rss>"#;
        let http = StubHttp::new()
            .route(HEALTH, 503, "")
            .route("https://a.example/rss", 200, feed_body)
            .route("https://b.example/rss", 500, "oops");
        let pool = PoolManager::new(http.clone(), HEALTH, dir.path(), None);
        let sources = vec![
            src("A", SourceClass::Feed, "https://a.example/rss"),
            src("B", SourceClass::Feed, "https://b.example/rss"),
            src("C", SourceClass::ScrapedPage, "deadchannel"),
            src("D", SourceClass::ProxiedMirror, "nobody"),
        ];

        let results = fetch_all(&http, &pool, &sources).await;
        assert_eq!(results.items.len(), 1);
        assert_eq!(results.items[0].source.label, "A");
        assert_eq!(results.reports.len(), 4);
        assert_eq!(results.responded(), 1);
    }

    #[tokio::test]
    async fn test_no_mirrors_skips_pool_warmup() {
        let dir = tempfile::tempdir().unwrap();
        let http = StubHttp::new();
        let pool = PoolManager::new(http.clone(), HEALTH, dir.path(), None);
        let sources = vec![src("A", SourceClass::Feed, "https://a.example/rss")];
        let results = fetch_all(&http, &pool, &sources).await;
        assert!(results.items.is_empty());
        assert!(!http.requested().contains(&HEALTH.to_string()));
    }

    #[tokio::test]
    async fn test_panicking_fetch_is_isolated() {
        let s = src("Boom", SourceClass::Feed, "x");
        let explode = true;
        let (_, outcome) = isolated(&s, async move {
            if explode {
                panic!("bad fetcher");
            }
            FetchOutcome::Fetched(Vec::new())
        })
        .await;
        assert!(matches!(outcome, FetchOutcome::Unavailable { .. }));
    }
}
