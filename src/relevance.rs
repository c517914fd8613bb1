//! Topical relevance filter.
//!
//! A pure predicate over the lowercased title and summary. Rules, in order:
//!
//! 1. any exclude keyword rejects (sports, entertainment, weather, ...)
//! 2. official sources pass outright on an evacuation/airspace keyword
//! 3. otherwise the text needs the side keywords its source class requires
//!    (feeds: first party *and* opponent; social sources: either) plus an
//!    action keyword
//!
//! Feeds get the stricter triangulation because they are higher-volume and
//! lower-signal. The requirement per class is configuration, not code.

use crate::config::{RelevanceVocabulary, SideRequirement};
use crate::models::{CandidateItem, SourceClass};
use crate::text::KeywordSet;

/// Compiled form of a [`RelevanceVocabulary`].
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    exclude: KeywordSet,
    official_alert: KeywordSet,
    first_party: KeywordSet,
    opponent: KeywordSet,
    action: KeywordSet,
    feed_sides: SideRequirement,
    social_sides: SideRequirement,
}

impl RelevanceFilter {
    pub fn new(vocab: &RelevanceVocabulary) -> Self {
        Self {
            exclude: KeywordSet::new(&vocab.exclude),
            official_alert: KeywordSet::new(&vocab.official_alert),
            first_party: KeywordSet::new(&vocab.first_party),
            opponent: KeywordSet::new(&vocab.opponent),
            action: KeywordSet::new(&vocab.action),
            feed_sides: vocab.feed_sides,
            social_sides: vocab.social_sides,
        }
    }

    /// Decide whether `text` from a source of `class` concerns the tracked conflict.
    pub fn is_war_relevant(&self, text: &str, class: SourceClass, official: bool) -> bool {
        let text = text.to_lowercase();

        if self.exclude.is_match(&text) {
            return false;
        }
        if official && self.official_alert.is_match(&text) {
            return true;
        }

        let requirement = if class.is_social() {
            self.social_sides
        } else {
            self.feed_sides
        };
        let first = self.first_party.is_match(&text);
        let opp = self.opponent.is_match(&text);
        let sides = match requirement {
            SideRequirement::Either => first || opp,
            SideRequirement::Both => first && opp,
        };

        sides && self.action.is_match(&text)
    }

    pub fn accepts(&self, item: &CandidateItem) -> bool {
        self.is_war_relevant(&item.match_text(), item.source.class, item.source.official)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> RelevanceFilter {
        RelevanceFilter::new(&RelevanceVocabulary::default())
    }

    #[test]
    fn test_feed_requires_both_sides() {
        let f = filter();
        let both = "Iran fires missile toward United States positions";
        let one = "Iran test-fires a new missile";
        assert!(f.is_war_relevant(both, SourceClass::Feed, false));
        assert!(!f.is_war_relevant(one, SourceClass::Feed, false));
        assert!(f.is_war_relevant(one, SourceClass::ScrapedPage, false));
        assert!(f.is_war_relevant(one, SourceClass::ProxiedMirror, false));
    }

    #[test]
    fn test_action_keyword_required() {
        let f = filter();
        assert!(!f.is_war_relevant(
            "Iran and the United States hold talks",
            SourceClass::Feed,
            false
        ));
        assert!(!f.is_war_relevant("Tehran traffic update", SourceClass::ScrapedPage, false));
    }

    #[test]
    fn test_exclude_wins() {
        let f = filter();
        assert!(!f.is_war_relevant(
            "Iran beat United States in World Cup qualifier after late strike",
            SourceClass::Feed,
            false
        ));
        // exclusion also beats the official bypass
        assert!(!f.is_war_relevant(
            "Airspace closed for the football final",
            SourceClass::ScrapedPage,
            true
        ));
    }

    #[test]
    fn test_official_evacuation_bypass() {
        let f = filter();
        let text = "Embassy urges citizens to evacuate; airspace closed";
        assert!(f.is_war_relevant(text, SourceClass::Feed, true));
        assert!(!f.is_war_relevant(text, SourceClass::Feed, false));
    }

    #[test]
    fn test_is_deterministic() {
        let f = filter();
        let text = "IRGC drone attack on Israeli vessel";
        let first = f.is_war_relevant(text, SourceClass::Feed, false);
        for _ in 0..5 {
            assert_eq!(f.is_war_relevant(text, SourceClass::Feed, false), first);
        }
    }

    #[test]
    fn test_synthetic_vocabulary_and_tunable_sides() {
        let vocab = RelevanceVocabulary {
            exclude: vec!["parade".into()],
            official_alert: vec![],
            first_party: vec!["north".into()],
            opponent: vec!["south".into()],
            action: vec!["clash*".into()],
            feed_sides: SideRequirement::Either,
            social_sides: SideRequirement::Both,
        };
        let f = RelevanceFilter::new(&vocab);
        assert!(f.is_war_relevant("North forces clashed overnight", SourceClass::Feed, false));
        assert!(!f.is_war_relevant("North forces clashed overnight", SourceClass::ScrapedPage, false));
        assert!(f.is_war_relevant("North and South clash", SourceClass::ScrapedPage, false));
        assert!(!f.is_war_relevant("North and South clash at parade", SourceClass::Feed, false));
    }
}
