//! # Conflict Wire
//!
//! A one-shot ingestion run that pulls short-form conflict news from
//! syndication feeds, public channel pages and proxied mirrors of
//! short-post handles, keeps only fresh, on-topic, never-seen stories, and
//! hands a bounded batch to a downstream publication stage.
//!
//! ## Usage
//!
//! ```sh
//! conflict_wire --state-dir ./state --sources config/sources.yaml
//! ```
//!
//! The binary is meant to be launched by an external scheduler (cron, a CI
//! schedule, a systemd timer). Each invocation runs exactly one cycle and exits.
//!
//! ## Architecture
//!
//! 1. **Load**: source list, vocabulary and the previous run's state
//! 2. **Fetch**: every source concurrently; proxied mirrors after the proxy pool warms up
//! 3. **Gate**: freshness, relevance, delivered-id and story dedup, capped per run
//! 4. **Output**: atomic JSON outbox, then one atomic save of the run state

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dedup;
mod error;
mod freshness;
mod http;
mod models;
mod orchestrator;
mod outputs;
mod pipeline;
mod proxy_pool;
mod relevance;
mod sources;
mod state;
mod text;
mod utils;

use cli::Cli;
use config::{Vocabulary, load_sources};
use dedup::DedupEngine;
use freshness::FreshnessGate;
use http::ReqwestClient;
use outputs::json;
use pipeline::Gates;
use proxy_pool::PoolManager;
use relevance::RelevanceFilter;
use state::RunStateStore;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let run_started = Utc::now();
    info!("conflict_wire starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Early check: everything persisted lives under the state dir
    if let Err(e) = ensure_writable_dir(&args.state_dir).await {
        error!(
            path = %args.state_dir.display(),
            error = %e,
            "State directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Configuration ----
    let sources = load_sources(&args.sources, Some(args.extra_sources.as_path())).await?;
    if sources.is_empty() {
        warn!(path = %args.sources.display(), "No sources configured; the run will accept nothing");
    }
    let vocab = Vocabulary::load(args.vocabulary.as_deref()).await?;

    let http = ReqwestClient::new()?;
    let pool = PoolManager::new(
        http.clone(),
        args.health_url.clone(),
        args.state_dir.clone(),
        vocab.fallback_origins.clone(),
    );

    // ---- Previous run ----
    let store = RunStateStore::new(args.state_dir.clone());
    let mut state = store.load(run_started).await;
    let prior_window = state.fingerprints.clone();

    // ---- Fetch ----
    let fetched = orchestrator::fetch_all(&http, &pool, &sources).await;
    let responded = fetched.responded();
    for report in &fetched.reports {
        match &report.result {
            Ok(count) => debug!(source = %report.label, class = ?report.class, count, "Fetched"),
            Err(reason) => debug!(source = %report.label, class = ?report.class, %reason, "Unavailable"),
        }
    }

    // ---- Gate ----
    let relevance = RelevanceFilter::new(&vocab.relevance);
    let mut dedup = DedupEngine::new(&vocab.dedup, std::mem::take(&mut state.fingerprints));
    let (accepted, counts) = pipeline::select(
        fetched.items,
        Gates {
            freshness: FreshnessGate::new(state.last_run, run_started),
            relevance: &relevance,
            delivered: &state.delivered,
            dedup: &mut dedup,
            max_items: args.max_items,
            now: run_started,
        },
    );

    // ---- Output ----
    let outbox = args.outbox_path();
    let handed_off = match json::write_batch(&accepted, &outbox, run_started).await {
        Ok(()) => true,
        Err(e) => {
            error!(path = %outbox.display(), error = %e, "Failed to write outbox");
            false
        }
    };

    // ---- Persist ----
    state::finish_run(&mut state, &accepted, dedup, prior_window, handed_off, run_started);
    if let Err(e) = store.save(&state).await {
        error!(dir = %store.dir().display(), error = %e, "Failed to save run state");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        sources = sources.len(),
        responded,
        accepted = counts.accepted,
        "Execution complete"
    );

    Ok(())
}
