//! JSON outbox for the downstream publication stage.
//!
//! The accepted batch of a run is serialized into a single file that the
//! translation/rendering/delivery collaborators pick up.
//!
//! # Output Structure
//!
//! ```text
//! state_dir/
//! └── outbox.json   { "generated_at": ..., "count": N, "items": [...] }
//! ```
//!
//! The file is replaced atomically, so a consumer polling it never reads a
//! half-written batch. An empty run still writes an empty batch so a stale
//! outbox is never re-published.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument};

use crate::models::CandidateItem;
use crate::utils::write_atomic;

#[derive(Debug, Serialize)]
struct Outbox<'a> {
    generated_at: DateTime<Utc>,
    count: usize,
    items: &'a [CandidateItem],
}

/// Write the accepted batch to `path`.
///
/// # Arguments
///
/// * `items` - Accepted items, in delivery order
/// * `path` - Outbox file to replace
/// * `generated_at` - Run timestamp recorded in the document
///
/// # Returns
///
/// `Ok(())` on success, or an error if serialization or the atomic write fails.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = items.len()))]
pub async fn write_batch(
    items: &[CandidateItem],
    path: &Path,
    generated_at: DateTime<Utc>,
) -> Result<(), Box<dyn Error>> {
    let outbox = Outbox {
        generated_at,
        count: items.len(),
        items,
    };
    let json = serde_json::to_vec_pretty(&outbox)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    write_atomic(path, &json).await?;
    info!("Wrote outbox");
    Ok(())
}
