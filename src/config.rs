//! Source list and filter vocabulary loading.
//!
//! Both documents are YAML. The source list is versioned with the code in
//! `config/sources.yaml`; a discovery job may append a supplementary file
//! with the same shape. The vocabulary document is optional: every table has
//! a built-in default, and a file only needs to name the tables it overrides.

use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::error::IngestError;
use crate::models::SourceDescriptor;

#[derive(Debug, Deserialize)]
struct SourceFile {
    #[serde(default)]
    sources: Vec<SourceDescriptor>,
}

/// Parse a YAML source list document.
pub fn parse_sources(yaml: &str) -> Result<Vec<SourceDescriptor>, IngestError> {
    let file: SourceFile = serde_yaml::from_str(yaml)?;
    Ok(file.sources)
}

/// Load the primary source list, then append the supplementary list when present.
///
/// The primary list must exist and parse. A missing or malformed supplementary
/// file is logged and ignored. Entries are de-duplicated on (class, endpoint);
/// the first occurrence wins.
#[instrument(level = "info", skip_all, fields(primary = %primary.display()))]
pub async fn load_sources(
    primary: &Path,
    supplementary: Option<&Path>,
) -> Result<Vec<SourceDescriptor>, IngestError> {
    let body = tokio::fs::read_to_string(primary).await?;
    let mut sources = parse_sources(&body)?;
    let primary_count = sources.len();

    if let Some(extra) = supplementary {
        match tokio::fs::read_to_string(extra).await {
            Ok(body) => match parse_sources(&body) {
                Ok(more) => sources.extend(more),
                Err(e) => warn!(path = %extra.display(), error = %e, "Ignoring malformed supplementary source list"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %extra.display(), error = %e, "Could not read supplementary source list"),
        }
    }

    let merged: Vec<SourceDescriptor> = sources
        .into_iter()
        .filter(|s| !s.endpoint.trim().is_empty())
        .unique_by(|s| (s.class, s.endpoint.trim().to_lowercase()))
        .collect();

    info!(
        primary = primary_count,
        total = merged.len(),
        "Loaded source descriptors"
    );
    Ok(merged)
}

/// How many sides of the conflict a text has to mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideRequirement {
    /// A first-party keyword or an opponent keyword.
    Either,
    /// A first-party keyword and an opponent keyword.
    Both,
}

/// Keyword tables and thresholds for the relevance filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelevanceVocabulary {
    pub exclude: Vec<String>,
    pub official_alert: Vec<String>,
    pub first_party: Vec<String>,
    pub opponent: Vec<String>,
    pub action: Vec<String>,
    pub feed_sides: SideRequirement,
    pub social_sides: SideRequirement,
}

impl Default for RelevanceVocabulary {
    fn default() -> Self {
        Self {
            exclude: strings(&[
                "football", "soccer", "nba", "nfl", "tennis", "cricket", "olympic*",
                "world cup", "fifa", "match report", "box office", "movie*", "oscar*",
                "grammy*", "celebrity", "concert", "album", "recipe*", "horoscope",
                "weather forecast", "fashion", "video game*",
            ]),
            official_alert: strings(&[
                "evacuat*", "airspace", "shelter in place", "leave the country",
                "depart immediately", "ordered departure", "travel advisory",
            ]),
            first_party: strings(&[
                "iran", "iranian*", "irgc", "tehran", "khamenei", "hezbollah", "houthi*",
                "ansarallah", "quds force", "basij", "islamic republic",
            ]),
            opponent: strings(&[
                "united states", "us", "u.s", "usa", "american*", "pentagon", "centcom",
                "washington", "white house", "israel", "israeli*", "idf", "netanyahu",
                "tel aviv", "mossad",
            ]),
            action: strings(&[
                "missile*", "strike*", "airstrike*", "attack*", "drone*", "rocket*",
                "bomb*", "explosion*", "blast*", "kill*", "dead", "intercept*",
                "launch*", "fire*", "shell*", "retaliat*", "war", "raid*", "clash*",
                "assassinat*",
            ]),
            feed_sides: SideRequirement::Both,
            social_sides: SideRequirement::Either,
        }
    }
}

/// Vocabulary and thresholds for the dedup engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupVocabulary {
    /// Actor code to keyword list (nation/faction codes).
    pub actors: BTreeMap<String, Vec<String>>,
    /// Action code to keyword list.
    pub actions: BTreeMap<String, Vec<String>>,
    pub stopwords: Vec<String>,
    pub jaccard_threshold: f64,
    /// Both titles need at least this many codes for the code path to apply.
    pub min_codes: usize,
    /// Code sets must share at least this many codes.
    pub min_shared_codes: usize,
}

impl Default for DedupVocabulary {
    fn default() -> Self {
        let actors = [
            ("IR", &["iran*", "irgc", "tehran", "islamic republic"][..]),
            ("US", &["us", "u s", "usa", "united states", "american*", "pentagon", "centcom"][..]),
            ("IL", &["israel*", "idf", "tel aviv", "jerusalem"][..]),
            ("HZ", &["hezbollah"][..]),
            ("HT", &["houthi*", "ansarallah"][..]),
            ("IQ", &["iraq*", "baghdad", "erbil"][..]),
            ("SY", &["syria*", "damascus"][..]),
            ("LB", &["lebanon", "lebanese", "beirut"][..]),
            ("GCC", &["saudi*", "qatar*", "uae", "emirat*", "bahrain*", "kuwait*"][..]),
        ];
        let actions = [
            ("MSL", &["missile*", "ballistic", "rocket*"][..]),
            ("STK", &["strike*", "airstrike*", "bomb*", "raid*"][..]),
            ("ATK", &["attack*", "assault*"][..]),
            ("DRN", &["drone*", "uav*", "shahed*"][..]),
            ("KIA", &["kill*", "dead", "death*", "casualt*"][..]),
            ("EXP", &["explosion*", "blast*", "explode*"][..]),
            ("INT", &["intercept*", "air defense", "air defence"][..]),
        ];
        Self {
            actors: code_table(&actors),
            actions: code_table(&actions),
            stopwords: strings(&[
                "the", "and", "for", "with", "from", "that", "this", "after", "into",
                "over", "amid", "says", "said", "will", "has", "have", "was", "were",
                "are", "its", "their", "about", "new", "news", "report", "reports",
                "breaking", "update", "live", "via",
            ]),
            jaccard_threshold: 0.38,
            min_codes: 2,
            min_shared_codes: 1,
        }
    }
}

/// The full vocabulary document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub relevance: RelevanceVocabulary,
    pub dedup: DedupVocabulary,
    /// Origins appended to the health-ranked proxy pool.
    pub fallback_origins: Option<Vec<String>>,
}

impl Vocabulary {
    pub fn parse(yaml: &str) -> Result<Self, IngestError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load from `path`, or use the built-in tables when no path is given.
    #[instrument(level = "info", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<Self, IngestError> {
        match path {
            Some(p) => {
                let body = tokio::fs::read_to_string(p).await?;
                let vocab = Self::parse(&body)?;
                info!(path = %p.display(), "Loaded vocabulary override");
                Ok(vocab)
            }
            None => Ok(Self::default()),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn code_table(rows: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    rows.iter()
        .map(|(code, words)| (code.to_string(), strings(words)))
        .collect()
}
