//! Command-line interface definitions for Conflict Wire.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option has a default, so a scheduler can invoke the binary bare;
//! the state directory can also come from the environment.

use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::DEFAULT_MAX_ITEMS;
use crate::proxy_pool::DEFAULT_HEALTH_URL;

/// Command-line arguments for one ingestion run.
///
/// # Examples
///
/// ```sh
/// # Defaults: ./state, config/sources.yaml, built-in vocabulary
/// conflict_wire
///
/// # Custom state directory and vocabulary override
/// conflict_wire -s /var/lib/conflict_wire --vocabulary config/vocabulary.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding run state, the proxy pool cache and the outbox
    #[arg(short, long, env = "CONFLICT_WIRE_STATE_DIR", default_value = "state")]
    pub state_dir: PathBuf,

    /// Versioned source list
    #[arg(long, default_value = "config/sources.yaml")]
    pub sources: PathBuf,

    /// Supplementary source list appended by the discovery job (optional file)
    #[arg(long, default_value = "config/sources.discovered.yaml")]
    pub extra_sources: PathBuf,

    /// YAML override for the relevance and dedup vocabulary tables
    #[arg(long)]
    pub vocabulary: Option<PathBuf>,

    /// Proxy health-ranking endpoint
    #[arg(long, default_value = DEFAULT_HEALTH_URL)]
    pub health_url: String,

    /// Outbox file for the accepted batch (defaults to `<state-dir>/outbox.json`)
    #[arg(short, long)]
    pub outbox: Option<PathBuf>,

    /// Maximum number of items accepted per run
    #[arg(long, default_value_t = DEFAULT_MAX_ITEMS)]
    pub max_items: usize,
}

impl Cli {
    pub fn outbox_path(&self) -> PathBuf {
        self.outbox
            .clone()
            .unwrap_or_else(|| self.state_dir.join("outbox.json"))
    }
}
