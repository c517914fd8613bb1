//! Proxy pool discovery, ranking and rate-limited access.
//!
//! The proxied-mirror fetchers reach their upstream through a pool of
//! interchangeable mirror origins. [`PoolManager`] owns everything the pool
//! needs for one run:
//!
//! - the ranked origin list ([`PoolManager::ensure_pool`]), built once per
//!   process from a disk cache younger than [`POOL_CACHE_TTL_SECS`] or from the
//!   public health-ranking service, always followed by a fixed fallback list
//! - a process-wide concurrency gate ([`MAX_IN_FLIGHT`] permits)
//! - one [`OriginGate`] per origin enforcing [`MIN_ORIGIN_INTERVAL`] between dispatches
//!
//! # Origin gate states
//!
//! ```text
//!   Idle ──dispatch──▶ Throttled ──interval elapses──▶ Ready ──dispatch──▶ Throttled
//! ```
//!
//! A caller that finds its origin `Throttled` reserves the next slot and
//! sleeps the remainder before dispatching, so back-to-back callers queue up
//! at exact interval spacing instead of racing.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use crate::http::HttpClient;
use crate::utils::write_atomic;

/// Public health-ranking service for the mirror network.
pub const DEFAULT_HEALTH_URL: &str = "https://status.d420.de/api/v1/instances";

/// Fallback origins appended after the ranked list when not already present.
pub const FALLBACK_ORIGINS: &[&str] = &[
    "https://nitter.net",
    "https://xcancel.com",
    "https://nitter.poast.org",
    "https://nitter.privacydev.net",
    "https://nitter.tiekoetter.com",
    "https://nitter.space",
];

pub const MAX_IN_FLIGHT: usize = 4;
pub const MIN_ORIGIN_INTERVAL: Duration = Duration::from_millis(800);
pub const PROXY_TIMEOUT: Duration = Duration::from_secs(7);
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
pub const POOL_CACHE_TTL_SECS: i64 = 3600;
pub const TOP_RANKED: usize = 10;

pub const POOL_CACHE_FILE: &str = "proxy_pool.json";

/// One ranked entry from the health service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProxyInstance {
    pub url: String,
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub healthy: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HealthReport {
    Wrapped { hosts: Vec<ProxyInstance> },
    List(Vec<ProxyInstance>),
}

#[derive(Debug, Serialize, Deserialize)]
struct PoolCache {
    fetched_at: DateTime<Utc>,
    origins: Vec<String>,
}

/// Observable state of a single origin's rate gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Never dispatched to in this run.
    Idle,
    /// Dispatched too recently; the remaining wait is attached.
    Throttled(Duration),
    /// The minimum interval has elapsed since the last dispatch.
    Ready,
}

/// Per-origin minimum-interval gate. The stored instant is the last
/// dispatch, or a reserved future dispatch slot.
#[derive(Debug, Default, Clone)]
pub struct OriginGate {
    last_dispatch: Option<Instant>,
}

impl OriginGate {
    pub fn state(&self, now: Instant, min_interval: Duration) -> GateState {
        match self.last_dispatch {
            None => GateState::Idle,
            Some(last) => {
                let remaining = (last + min_interval).saturating_duration_since(now);
                if remaining.is_zero() {
                    GateState::Ready
                } else {
                    GateState::Throttled(remaining)
                }
            }
        }
    }

    /// Claim the next dispatch slot and return how long to wait for it.
    pub fn reserve(&mut self, now: Instant, min_interval: Duration) -> Duration {
        let wait = match self.state(now, min_interval) {
            GateState::Throttled(remaining) => remaining,
            GateState::Idle | GateState::Ready => Duration::ZERO,
        };
        self.last_dispatch = Some(now + wait);
        wait
    }
}

/// Owner of the proxy pool and its rate-limit state for one run.
#[derive(Debug)]
pub struct PoolManager<C> {
    http: C,
    health_url: String,
    cache_path: PathBuf,
    fallback: Vec<String>,
    pool: OnceCell<Vec<String>>,
    gate: Semaphore,
    origins: Mutex<HashMap<String, OriginGate>>,
    min_interval: Duration,
}

impl<C: HttpClient> PoolManager<C> {
    /// Create a manager caching its pool under `state_dir`.
    ///
    /// `fallback` defaults to [`FALLBACK_ORIGINS`] when `None`.
    pub fn new(
        http: C,
        health_url: impl Into<String>,
        state_dir: impl Into<PathBuf>,
        fallback: Option<Vec<String>>,
    ) -> Self {
        let fallback = fallback
            .unwrap_or_else(|| FALLBACK_ORIGINS.iter().map(|s| s.to_string()).collect());
        Self {
            http,
            health_url: health_url.into(),
            cache_path: state_dir.into().join(POOL_CACHE_FILE),
            fallback: fallback.iter().map(|o| normalize_origin(o)).collect(),
            pool: OnceCell::new(),
            gate: Semaphore::new(MAX_IN_FLIGHT),
            origins: Mutex::new(HashMap::new()),
            min_interval: MIN_ORIGIN_INTERVAL,
        }
    }

    /// The ranked origin list. Built once; later callers get the same list.
    pub async fn ensure_pool(&self) -> &[String] {
        self.pool.get_or_init(|| self.build_pool(Utc::now())).await
    }

    #[instrument(level = "info", skip_all, fields(health_url = %self.health_url))]
    async fn build_pool(&self, now: DateTime<Utc>) -> Vec<String> {
        if let Some(cached) = self.read_cache(now).await {
            info!(count = cached.len(), "Using cached proxy pool");
            return cached;
        }

        let ranked = match self.query_health().await {
            Some(instances) => {
                let ranked = rank_instances(instances, TOP_RANKED);
                info!(ranked = ranked.len(), "Ranked proxy instances from health service");
                Some(ranked)
            }
            None => {
                warn!("Proxy health service unavailable; using fallback origins only");
                None
            }
        };

        let pool = merge_with_fallback(ranked.clone().unwrap_or_default(), &self.fallback);

        // A pool with nothing ranked is the fallback list; retry the service next run.
        if ranked.as_ref().is_some_and(|r| !r.is_empty()) {
            self.write_cache(now, &pool).await;
        }
        pool
    }

    async fn read_cache(&self, now: DateTime<Utc>) -> Option<Vec<String>> {
        let body = tokio::fs::read_to_string(&self.cache_path).await.ok()?;
        let cache: PoolCache = match serde_json::from_str(&body) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable proxy pool cache");
                return None;
            }
        };
        let age = now - cache.fetched_at;
        let ttl = ChronoDuration::seconds(POOL_CACHE_TTL_SECS);
        if age < ChronoDuration::zero() || age >= ttl || cache.origins.is_empty() {
            debug!(age_secs = age.num_seconds(), "Proxy pool cache is stale");
            return None;
        }
        Some(cache.origins)
    }

    async fn write_cache(&self, now: DateTime<Utc>, origins: &[String]) {
        let cache = PoolCache {
            fetched_at: now,
            origins: origins.to_vec(),
        };
        let bytes = match serde_json::to_vec_pretty(&cache) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Could not serialize proxy pool cache");
                return;
            }
        };
        if let Err(e) = write_atomic(&self.cache_path, &bytes).await {
            warn!(path = %self.cache_path.display(), error = %e, "Could not write proxy pool cache");
        }
    }

    async fn query_health(&self) -> Option<Vec<ProxyInstance>> {
        let resp = match self.http.get(&self.health_url, HEALTH_TIMEOUT).await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Health service request failed");
                return None;
            }
        };
        let body = match resp.into_success_body() {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, "Health service returned an error status");
                return None;
            }
        };
        match serde_json::from_str::<HealthReport>(&body) {
            Ok(HealthReport::Wrapped { hosts }) => Some(hosts),
            Ok(HealthReport::List(list)) => Some(list),
            Err(e) => {
                debug!(error = %e, "Health service returned malformed JSON");
                None
            }
        }
    }

    /// GET `origin` + `path` under the concurrency gate and the origin's
    /// minimum interval.
    ///
    /// Returns `None` on any transport error or non-2xx status; callers move
    /// on to the next origin.
    #[instrument(level = "debug", skip(self))]
    pub async fn rate_limited_get(&self, origin: &str, path: &str) -> Option<String> {
        let _permit = self.gate.acquire().await.ok()?;

        let wait = {
            let mut table = self.origins.lock().await;
            table
                .entry(origin.to_string())
                .or_default()
                .reserve(Instant::now(), self.min_interval)
        };
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Origin throttled; waiting");
            sleep(wait).await;
        }

        let url = format!("{}{}", origin.trim_end_matches('/'), path);
        match self.http.get(&url, PROXY_TIMEOUT).await {
            Ok(resp) if resp.is_success() => Some(resp.body),
            Ok(resp) => {
                debug!(%url, status = resp.status, "Proxy returned non-success status");
                None
            }
            Err(e) => {
                debug!(%url, error = %e, "Proxy request failed");
                None
            }
        }
    }

    /// Current gate state of `origin`, for diagnostics.
    #[cfg(test)]
    pub async fn gate_state(&self, origin: &str) -> GateState {
        let table = self.origins.lock().await;
        table
            .get(origin)
            .map(|g| g.state(Instant::now(), self.min_interval))
            .unwrap_or(GateState::Idle)
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_string()
}

/// Drop unhealthy entries, sort by points (highest first), keep the top `keep`.
pub fn rank_instances(mut instances: Vec<ProxyInstance>, keep: usize) -> Vec<String> {
    instances.retain(|i| i.healthy != Some(false) && !i.url.trim().is_empty());
    instances.sort_by(|a, b| {
        let pa = a.points.unwrap_or(0.0);
        let pb = b.points.unwrap_or(0.0);
        pb.total_cmp(&pa)
    });
    let mut out: Vec<String> = Vec::with_capacity(keep);
    for inst in instances {
        let origin = normalize_origin(&inst.url);
        if !out.contains(&origin) {
            out.push(origin);
        }
        if out.len() == keep {
            break;
        }
    }
    out
}

/// Append fallback origins not already in `ranked`.
pub fn merge_with_fallback(mut ranked: Vec<String>, fallback: &[String]) -> Vec<String> {
    for origin in fallback {
        if !ranked.contains(origin) {
            ranked.push(origin.clone());
        }
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub::StubHttp;
    use std::sync::atomic::Ordering;

    const HEALTH: &str = "https://health.example/api";

    fn fallback() -> Vec<String> {
        FALLBACK_ORIGINS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rank_instances_orders_and_filters() {
        let instances = vec![
            ProxyInstance { url: "https://a.example/".into(), points: Some(10.0), healthy: Some(true) },
            ProxyInstance { url: "https://b.example".into(), points: Some(90.0), healthy: Some(true) },
            ProxyInstance { url: "https://c.example".into(), points: Some(99.0), healthy: Some(false) },
            ProxyInstance { url: "https://d.example".into(), points: None, healthy: None },
        ];
        let ranked = rank_instances(instances, 2);
        assert_eq!(ranked, vec!["https://b.example", "https://a.example"]);
    }

    #[test]
    fn test_merge_with_fallback_skips_present() {
        let merged = merge_with_fallback(
            vec!["https://nitter.net".to_string(), "https://x.example".to_string()],
            &fallback(),
        );
        assert_eq!(merged[0], "https://nitter.net");
        assert_eq!(merged[1], "https://x.example");
        assert_eq!(merged.iter().filter(|o| *o == "https://nitter.net").count(), 1);
        assert_eq!(merged.len(), 2 + FALLBACK_ORIGINS.len() - 1);
    }

    #[test]
    fn test_origin_gate_state_machine() {
        let t0 = Instant::now();
        let min = Duration::from_millis(800);
        let mut gate = OriginGate::default();
        assert_eq!(gate.state(t0, min), GateState::Idle);

        assert_eq!(gate.reserve(t0, min), Duration::ZERO);
        assert_eq!(
            gate.state(t0 + Duration::from_millis(300), min),
            GateState::Throttled(Duration::from_millis(500))
        );
        assert_eq!(gate.state(t0 + min, min), GateState::Ready);

        // two reservations inside the interval queue one after another
        let wait = gate.reserve(t0 + Duration::from_millis(100), min);
        assert_eq!(wait, Duration::from_millis(700));
        let wait = gate.reserve(t0 + Duration::from_millis(100), min);
        assert_eq!(wait, Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_health_failure_yields_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let http = StubHttp::new().route(HEALTH, 503, "unavailable");
        let pool = PoolManager::new(http, HEALTH, dir.path(), None);
        assert_eq!(pool.ensure_pool().await, fallback().as_slice());
        // fallback-only pools are not cached
        assert!(!dir.path().join(POOL_CACHE_FILE).exists());
    }

    #[tokio::test]
    async fn test_nothing_healthy_is_not_cached() {
        for body in ["[]", r#"{"hosts":[{"url":"https://dead.example","points":99,"healthy":false}]}"#] {
            let dir = tempfile::tempdir().unwrap();
            let http = StubHttp::new().route(HEALTH, 200, body);
            let pool = PoolManager::new(http, HEALTH, dir.path(), None);
            assert_eq!(pool.ensure_pool().await, fallback().as_slice());
            assert!(!dir.path().join(POOL_CACHE_FILE).exists(), "cached for {body}");
        }
    }

    #[tokio::test]
    async fn test_unreachable_health_yields_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let pool = PoolManager::new(StubHttp::new(), HEALTH, dir.path(), None);
        assert!(!pool.ensure_pool().await.is_empty());
    }

    #[tokio::test]
    async fn test_health_ranking_then_cache() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"hosts":[
            {"url":"https://low.example","points":5,"healthy":true},
            {"url":"https://high.example","points":80,"healthy":true},
            {"url":"https://dead.example","points":99,"healthy":false}
        ]}"#;
        let http = StubHttp::new().route(HEALTH, 200, body);
        let pool = PoolManager::new(http.clone(), HEALTH, dir.path(), None);
        let origins = pool.ensure_pool().await.to_vec();
        assert_eq!(&origins[..2], &["https://high.example", "https://low.example"]);
        assert!(!origins.contains(&"https://dead.example".to_string()));
        assert_eq!(origins.len(), 2 + FALLBACK_ORIGINS.len());

        // first caller wins: a second call does not hit the network again
        let again = pool.ensure_pool().await.to_vec();
        assert_eq!(origins, again);
        assert_eq!(http.requested().len(), 1);

        // a fresh manager reads the disk cache instead of the health service
        let http2 = StubHttp::new();
        let pool2 = PoolManager::new(http2.clone(), HEALTH, dir.path(), None);
        assert_eq!(pool2.ensure_pool().await, origins.as_slice());
        assert!(http2.requested().is_empty());
    }

    #[tokio::test]
    async fn test_stale_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let stale = PoolCache {
            fetched_at: Utc::now() - ChronoDuration::hours(2),
            origins: vec!["https://old.example".to_string()],
        };
        std::fs::write(
            dir.path().join(POOL_CACHE_FILE),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();
        let http = StubHttp::new().route(HEALTH, 200, r#"[{"url":"https://new.example","points":1}]"#);
        let pool = PoolManager::new(http, HEALTH, dir.path(), None);
        let origins = pool.ensure_pool().await;
        assert_eq!(origins[0], "https://new.example");
        assert!(!origins.contains(&"https://old.example".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_origin_requests_are_spaced() {
        let dir = tempfile::tempdir().unwrap();
        let http = StubHttp::new()
            .route("https://m.example/a/rss", 200, "one")
            .route("https://m.example/b/rss", 200, "two");
        let pool = PoolManager::new(http.clone(), HEALTH, dir.path(), None);

        let (a, b) = tokio::join!(
            pool.rate_limited_get("https://m.example", "/a/rss"),
            pool.rate_limited_get("https://m.example", "/b/rss"),
        );
        assert_eq!(a.as_deref(), Some("one"));
        assert_eq!(b.as_deref(), Some("two"));

        let calls = http.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        let gap = calls[1].1.duration_since(calls[0].1);
        assert!(gap >= MIN_ORIGIN_INTERVAL, "gap was {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_origins_are_not_throttled() {
        let dir = tempfile::tempdir().unwrap();
        let http = StubHttp::new()
            .route("https://one.example/x", 200, "1")
            .route("https://two.example/x", 200, "2");
        let pool = PoolManager::new(http.clone(), HEALTH, dir.path(), None);
        let t0 = Instant::now();
        let _ = pool.rate_limited_get("https://one.example", "/x").await;
        let _ = pool.rate_limited_get("https://two.example", "/x").await;
        assert!(t0.elapsed() < MIN_ORIGIN_INTERVAL);
        assert!(matches!(
            pool.gate_state("https://one.example").await,
            GateState::Throttled(_)
        ));
        assert_eq!(pool.gate_state("https://never.example").await, GateState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_gate_caps_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let mut http = StubHttp::with_latency(Duration::from_millis(200));
        for i in 0..10 {
            http = http.route(&format!("https://o{i}.example/x"), 200, "ok");
        }
        let pool = PoolManager::new(http.clone(), HEALTH, dir.path(), None);
        let origins: Vec<String> = (0..10).map(|i| format!("https://o{i}.example")).collect();
        let results = futures::future::join_all(
            origins.iter().map(|o| pool.rate_limited_get(o, "/x")),
        )
        .await;
        assert!(results.iter().all(|r| r.is_some()));
        assert!(http.max_in_flight.load(Ordering::SeqCst) <= MAX_IN_FLIGHT);
    }

    #[tokio::test]
    async fn test_errors_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let http = StubHttp::new().route("https://m.example/gone", 404, "nope");
        let pool = PoolManager::new(http, HEALTH, dir.path(), None);
        assert!(pool.rate_limited_get("https://m.example", "/gone").await.is_none());
        assert!(pool.rate_limited_get("https://m.example", "/unrouted").await.is_none());
    }
}
