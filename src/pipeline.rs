//! Per-item gate chain between the fetch fan-in and the outbox.
//!
//! Candidates are ordered newest first (untimestamped items count as newest),
//! exact id repeats collapse to their first occurrence, and every remaining
//! item runs through freshness, relevance, the delivered-id set and the dedup
//! engine in that order. Accepted items fill a bounded queue; once it is full
//! the rest of the batch is left for the next run.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::{debug, info, instrument};

use crate::dedup::DedupEngine;
use crate::freshness::FreshnessGate;
use crate::models::CandidateItem;
use crate::relevance::RelevanceFilter;
use crate::state::DeliveredIds;
use crate::utils::truncate_for_log;

pub const DEFAULT_MAX_ITEMS: usize = 30;

/// Where each candidate ended up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GateCounts {
    pub fetched: usize,
    pub repeated_ids: usize,
    pub stale: usize,
    pub irrelevant: usize,
    pub already_delivered: usize,
    pub duplicate: usize,
    pub accepted: usize,
    pub deferred: usize,
}

/// Everything the gate chain needs, borrowed from the driver for one run.
pub struct Gates<'a> {
    pub freshness: FreshnessGate,
    pub relevance: &'a RelevanceFilter,
    pub delivered: &'a DeliveredIds,
    pub dedup: &'a mut DedupEngine,
    pub max_items: usize,
    pub now: DateTime<Utc>,
}

/// Run `candidates` through the gates and return the accepted batch in order.
#[instrument(level = "info", skip_all, fields(candidates = candidates.len()))]
pub fn select(candidates: Vec<CandidateItem>, gates: Gates<'_>) -> (Vec<CandidateItem>, GateCounts) {
    let mut counts = GateCounts {
        fetched: candidates.len(),
        ..GateCounts::default()
    };

    let mut ordered = candidates;
    ordered.sort_by_key(|item| std::cmp::Reverse(item.published.unwrap_or(DateTime::<Utc>::MAX_UTC)));
    let unique: Vec<CandidateItem> = ordered.into_iter().unique_by(|item| item.id.clone()).collect();
    counts.repeated_ids = counts.fetched - unique.len();

    let mut accepted = Vec::with_capacity(gates.max_items.min(unique.len()));
    let total = unique.len();
    for (idx, item) in unique.into_iter().enumerate() {
        if accepted.len() >= gates.max_items {
            counts.deferred = total - idx;
            break;
        }
        if !gates.freshness.is_fresh(item.published) {
            counts.stale += 1;
            continue;
        }
        if !gates.relevance.accepts(&item) {
            counts.irrelevant += 1;
            continue;
        }
        if gates.delivered.contains(&item.id) {
            counts.already_delivered += 1;
            continue;
        }
        if !gates.dedup.check_and_record(&item.title, gates.now) {
            counts.duplicate += 1;
            continue;
        }
        debug!(
            source = %item.source.label,
            title = %truncate_for_log(&item.title, 120),
            "Accepted item"
        );
        accepted.push(item);
    }
    counts.accepted = accepted.len();

    info!(
        fetched = counts.fetched,
        repeated_ids = counts.repeated_ids,
        stale = counts.stale,
        irrelevant = counts.irrelevant,
        already_delivered = counts.already_delivered,
        duplicate = counts.duplicate,
        accepted = counts.accepted,
        deferred = counts.deferred,
        cutoff = %gates.freshness.cutoff(),
        "Gate chain complete"
    );
    (accepted, counts)
}
