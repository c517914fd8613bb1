//! Story-level duplicate detection against a rolling window of recent titles.
//!
//! Two OR-combined paths decide whether two titles tell the same story:
//!
//! 1. **Code match.** Each title is reduced to coarse actor codes (`IR`,
//!    `US`, ...) and action codes (`MSL`, `STK`, ...) from the vocabulary. If
//!    both titles carry at least `min_codes` codes and share at least
//!    `min_shared_codes` of them, they are duplicates.
//! 2. **Token overlap.** Normalized token sets (stopwords and tokens of two
//!    characters or fewer dropped) with a Jaccard similarity at or above the
//!    threshold are duplicates. An empty token set never matches.
//!
//! Accepted titles join the window immediately, so near-duplicates later in
//! the same batch are caught as well as repeats of earlier runs.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::config::DedupVocabulary;
use crate::models::StoryFingerprint;
use crate::text::{KeywordSet, jaccard, normalize_title, title_tokens};

/// Fingerprints older than this are never matched and are pruned on save.
pub const FINGERPRINT_RETENTION_SECS: i64 = 2 * 60 * 60;

#[derive(Debug, Clone)]
struct Signature {
    codes: BTreeSet<String>,
    tokens: HashSet<String>,
}

#[derive(Debug, Clone)]
struct WindowEntry {
    fingerprint: StoryFingerprint,
    signature: Signature,
}

#[derive(Debug)]
pub struct DedupEngine {
    codebook: Vec<(String, KeywordSet)>,
    stopwords: HashSet<String>,
    jaccard_threshold: f64,
    min_codes: usize,
    min_shared_codes: usize,
    window: Vec<WindowEntry>,
}

impl DedupEngine {
    pub fn new(vocab: &DedupVocabulary, fingerprints: Vec<StoryFingerprint>) -> Self {
        let codebook = vocab
            .actors
            .iter()
            .chain(vocab.actions.iter())
            .map(|(code, words)| (code.clone(), KeywordSet::new(words)))
            .collect();
        let stopwords = vocab.stopwords.iter().map(|s| s.to_lowercase()).collect();

        let mut engine = Self {
            codebook,
            stopwords,
            jaccard_threshold: vocab.jaccard_threshold,
            min_codes: vocab.min_codes,
            min_shared_codes: vocab.min_shared_codes.max(1),
            window: Vec::with_capacity(fingerprints.len()),
        };
        for fingerprint in fingerprints {
            let signature = engine.signature(&fingerprint.text);
            engine.window.push(WindowEntry {
                fingerprint,
                signature,
            });
        }
        engine
    }

    /// Actor and action codes found in `title`.
    pub fn codes(&self, title: &str) -> BTreeSet<String> {
        let normalized = normalize_title(title);
        self.codebook
            .iter()
            .filter(|(_, words)| words.is_match(&normalized))
            .map(|(code, _)| code.clone())
            .collect()
    }

    fn signature(&self, title: &str) -> Signature {
        Signature {
            codes: self.codes(title),
            tokens: title_tokens(title, &self.stopwords),
        }
    }

    fn matches(&self, a: &Signature, b: &Signature) -> bool {
        let code_path = a.codes.len() >= self.min_codes
            && b.codes.len() >= self.min_codes
            && a.codes.intersection(&b.codes).count() >= self.min_shared_codes;
        code_path || jaccard(&a.tokens, &b.tokens) >= self.jaccard_threshold
    }

    /// Pairwise decision. Symmetric in its arguments.
    #[cfg(test)]
    pub fn is_duplicate(&self, a: &str, b: &str) -> bool {
        self.matches(&self.signature(a), &self.signature(b))
    }

    fn is_live(fingerprint: &StoryFingerprint, now: DateTime<Utc>) -> bool {
        now - fingerprint.first_seen <= Duration::seconds(FINGERPRINT_RETENTION_SECS)
    }

    /// Whether `title` repeats any live fingerprint in the window.
    pub fn is_duplicate_story(&self, title: &str, now: DateTime<Utc>) -> bool {
        let candidate = self.signature(title);
        self.window
            .iter()
            .filter(|e| Self::is_live(&e.fingerprint, now))
            .any(|e| self.matches(&candidate, &e.signature))
    }

    /// Check `title` and, if novel, append it to the window. Returns `true` when novel.
    pub fn check_and_record(&mut self, title: &str, now: DateTime<Utc>) -> bool {
        if self.is_duplicate_story(title, now) {
            debug!(title, "Duplicate story");
            return false;
        }
        let candidate = self.signature(title);
        self.window.push(WindowEntry {
            fingerprint: StoryFingerprint {
                text: normalize_title(title),
                first_seen: now,
            },
            signature: candidate,
        });
        true
    }

    /// Drop fingerprints past the retention window.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.window.retain(|e| Self::is_live(&e.fingerprint, now));
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// The window in insertion order, for persistence.
    pub fn into_fingerprints(self) -> Vec<StoryFingerprint> {
        self.window.into_iter().map(|e| e.fingerprint).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn engine() -> DedupEngine {
        DedupEngine::new(&DedupVocabulary::default(), Vec::new())
    }

    #[test]
    fn test_codes_from_vocabulary() {
        let e = engine();
        let codes = e.codes("IRGC missile strike hits U.S. base");
        let expected: BTreeSet<String> = ["IR", "US", "MSL", "STK"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(codes, expected);
    }

    #[test]
    fn test_triple_match() {
        let e = engine();
        let a = "IRGC missile strike hits US base";
        let b = "Iran launches missile attack on American base";
        assert!(e.is_duplicate(a, b));

        let mut e = engine();
        assert!(e.check_and_record(a, now()));
        assert!(e.is_duplicate_story(b, now()));
    }

    #[test]
    fn test_single_code_titles_use_overlap_only() {
        let e = engine();
        // one code each, no shared vocabulary
        assert!(!e.is_duplicate("Missile seen over desert", "Lebanon cabinet meets tonight"));
    }

    #[test]
    fn test_jaccard_only_above_threshold() {
        let e = engine();
        let a = "Volcano eruption forces village closures";
        let b = "Volcano eruption forces airport warnings";
        assert!(e.codes(a).is_empty());
        assert!(e.codes(b).is_empty());
        // 3 shared of 7 distinct tokens
        assert!(e.is_duplicate(a, b));
    }

    #[test]
    fn test_jaccard_only_below_threshold() {
        let e = engine();
        // 2 shared of 8 distinct tokens
        assert!(!e.is_duplicate(
            "Volcano eruption forces village closures",
            "Volcano eruption prompts airport warnings"
        ));
    }

    #[test]
    fn test_symmetry_and_reflexivity() {
        let e = engine();
        let titles = [
            "IRGC missile strike hits US base",
            "Iran launches missile attack on American base",
            "Volcano eruption forces village closures",
            "Hezbollah drone intercepted over Haifa",
            "Markets rally",
        ];
        for a in titles {
            assert!(e.is_duplicate(a, a), "{a} should match itself");
            for b in titles {
                assert_eq!(e.is_duplicate(a, b), e.is_duplicate(b, a), "{a} / {b}");
            }
        }
    }

    #[test]
    fn test_empty_tokens_never_match() {
        let e = engine();
        assert!(!e.is_duplicate("", ""));
        assert!(!e.is_duplicate("!!!", "the and"));
    }

    #[test]
    fn test_expired_fingerprints_never_match() {
        let old = StoryFingerprint {
            text: normalize_title("IRGC missile strike hits US base"),
            first_seen: now() - Duration::hours(2) - Duration::seconds(1),
        };
        let fresh = StoryFingerprint {
            text: normalize_title("Volcano eruption forces village closures"),
            first_seen: now() - Duration::minutes(119),
        };
        let mut e = DedupEngine::new(&DedupVocabulary::default(), vec![old, fresh]);
        assert!(!e.is_duplicate_story("IRGC missile strike hits US base", now()));
        assert!(e.is_duplicate_story("Volcano eruption forces village closures", now()));

        e.prune(now());
        assert_eq!(e.len(), 1);
    }

    #[test]
    fn test_within_batch_duplicates_caught() {
        let mut e = engine();
        assert!(e.check_and_record("Iran launches missile attack on American base", now()));
        assert!(!e.check_and_record("IRGC missile strike hits US base", now()));
        assert!(e.check_and_record("Volcano eruption forces village closures", now()));
        let kept = e.into_fingerprints();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].text, "iran launches missile attack on american base");
    }
}
