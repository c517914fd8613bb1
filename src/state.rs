//! Run state persisted between runs.
//!
//! Three JSON files under the state directory:
//!
//! | File | Content |
//! |------|---------|
//! | `delivered_ids.json` | delivered item ids, oldest first, capped at [`MAX_DELIVERED_IDS`] |
//! | `story_window.json` | story fingerprints, capped at [`MAX_FINGERPRINTS`] |
//! | `last_run.json` | `{ "last_run": <RFC 3339> }` |
//!
//! Loading never fails: a missing or corrupt file means "start fresh" for that
//! part. Saving stages every file first and only renames once all of them are
//! on disk, so a failure while staging leaves the previous state untouched.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::dedup::{DedupEngine, FINGERPRINT_RETENTION_SECS};
use crate::error::IngestError;
use crate::models::{CandidateItem, StoryFingerprint};
use crate::utils::stage_file;

pub const MAX_DELIVERED_IDS: usize = 2000;
pub const MAX_FINGERPRINTS: usize = 500;

const DELIVERED_FILE: &str = "delivered_ids.json";
const WINDOW_FILE: &str = "story_window.json";
const LAST_RUN_FILE: &str = "last_run.json";

/// Insertion-ordered id set that evicts its oldest entries past a cap.
#[derive(Debug, Clone, Default)]
pub struct DeliveredIds {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl DeliveredIds {
    pub fn from_ids(ids: Vec<String>) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.insert(id);
        }
        set.truncate(MAX_DELIVERED_IDS);
        set
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Returns `false` when the id was already present.
    pub fn insert(&mut self, id: String) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);
        true
    }

    /// Keep only the `cap` most recent ids.
    pub fn truncate(&mut self, cap: usize) {
        while self.order.len() > cap {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub delivered: DeliveredIds,
    pub fingerprints: Vec<StoryFingerprint>,
    pub last_run: Option<DateTime<Utc>>,
}

/// Fold the outcome of one run into `state` before it is saved.
///
/// Accepted ids and the pruned story window only count once the outbox
/// holds the batch. When it does not, the window loaded at start
/// (`prior_window`) is restored and the delivered set is left alone. The run
/// timestamp advances either way.
pub fn finish_run(
    state: &mut RunState,
    accepted: &[CandidateItem],
    mut dedup: DedupEngine,
    prior_window: Vec<StoryFingerprint>,
    handed_off: bool,
    now: DateTime<Utc>,
) {
    if handed_off {
        for item in accepted {
            state.delivered.insert(item.id.clone());
        }
        dedup.prune(now);
        debug!(window = dedup.len(), "Story window after pruning");
        state.fingerprints = dedup.into_fingerprints();
    } else {
        state.fingerprints = prior_window;
    }
    state.last_run = Some(now);
}

#[derive(Debug, Serialize, Deserialize)]
struct LastRunFile {
    last_run: DateTime<Utc>,
}

pub struct RunStateStore {
    dir: PathBuf,
}

impl RunStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.dir.join(name);
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read state file; starting fresh");
                return None;
            }
        };
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt state file; starting fresh");
                None
            }
        }
    }

    /// Read the persisted state. Never fails.
    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display()))]
    pub async fn load(&self, now: DateTime<Utc>) -> RunState {
        let delivered = DeliveredIds::from_ids(
            self.read_json::<Vec<String>>(DELIVERED_FILE)
                .await
                .unwrap_or_default(),
        );

        let retention = Duration::seconds(FINGERPRINT_RETENTION_SECS);
        let fingerprints: Vec<StoryFingerprint> = self
            .read_json::<Vec<StoryFingerprint>>(WINDOW_FILE)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|f| now - f.first_seen <= retention)
            .collect();

        let last_run = self
            .read_json::<LastRunFile>(LAST_RUN_FILE)
            .await
            .map(|f| f.last_run);

        info!(
            delivered = delivered.len(),
            fingerprints = fingerprints.len(),
            last_run = ?last_run,
            "Loaded run state"
        );
        RunState {
            delivered,
            fingerprints,
            last_run,
        }
    }

    /// Persist `state` atomically, applying the caps.
    ///
    /// All files are staged before any is renamed into place.
    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display()))]
    pub async fn save(&self, state: &RunState) -> Result<(), IngestError> {
        let skip = state.delivered.len().saturating_sub(MAX_DELIVERED_IDS);
        let ids: Vec<&String> = state.delivered.iter().skip(skip).collect();

        let skip = state.fingerprints.len().saturating_sub(MAX_FINGERPRINTS);
        let window = &state.fingerprints[skip..];

        let mut documents = vec![
            (DELIVERED_FILE, serde_json::to_vec_pretty(&ids)?),
            (WINDOW_FILE, serde_json::to_vec_pretty(window)?),
        ];
        if let Some(last_run) = state.last_run {
            documents.push((
                LAST_RUN_FILE,
                serde_json::to_vec_pretty(&LastRunFile { last_run })?,
            ));
        }

        let mut staged = Vec::with_capacity(documents.len());
        for (name, bytes) in &documents {
            staged.push(stage_file(&self.dir.join(name), bytes).await?);
        }
        for file in staged {
            file.commit().await?;
        }

        debug!(
            delivered = ids.len(),
            fingerprints = window.len(),
            "Saved run state"
        );
        Ok(())
    }
}
