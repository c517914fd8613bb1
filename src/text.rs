//! Text helpers shared by the fetchers, the relevance filter and the dedup engine.
//!
//! - [`clean_html`] turns feed/HTML fragments into plain single-line text
//! - [`normalize_title`] and [`title_tokens`] produce the dedup engine's view of a title
//! - [`KeywordSet`] compiles a configured keyword list into one matcher

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static RE_BLOCK_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|h[1-6]|tr|blockquote)>").expect("block regex")
});

// Latin, digits, Cyrillic, Hebrew and Arabic blocks survive normalization.
static RE_OUTSIDE_ALPHABET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-z0-9\u{0400}-\u{04FF}\u{0590}-\u{05FF}\u{0600}-\u{06FF}\s]")
        .expect("alphabet regex")
});

/// Collapse runs of whitespace and trim.
pub fn collapse_ws(s: &str) -> String {
    RE_WS.replace_all(s, " ").trim().to_string()
}

/// Strip tags, decode entities and collapse whitespace.
pub fn clean_html(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return collapse_ws(fragment);
    }
    let spaced = RE_BLOCK_END.replace_all(fragment, "$0 ");
    let html = Html::parse_fragment(&spaced);
    let text = html.root_element().text().collect::<String>();
    collapse_ws(&text)
}

/// First line of `text`, cut to `max` characters on a char boundary.
pub fn headline(text: &str, max: usize) -> String {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let first = collapse_ws(first);
    if first.chars().count() <= max {
        first
    } else {
        let mut cut: String = first.chars().take(max).collect();
        cut.push('…');
        cut
    }
}

/// Lowercase, replace characters outside the fixed alphabet with spaces, collapse.
pub fn normalize_title(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = RE_OUTSIDE_ALPHABET.replace_all(&lower, " ");
    collapse_ws(&stripped)
}

/// Token set of a title: normalized, stopwords and tokens of two chars or fewer dropped.
pub fn title_tokens(title: &str, stopwords: &HashSet<String>) -> HashSet<String> {
    normalize_title(title)
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .filter(|t| !stopwords.contains(*t))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets. Empty on either side yields 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    inter as f64 / union as f64
}

/// A compiled keyword list.
///
/// Entries match whole words, case-insensitively. An entry ending in `*`
/// matches any word starting with the prefix (`evacuat*` hits "evacuation").
/// Multi-word entries ("united states") match across single spaces.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    matcher: Option<Regex>,
}

impl KeywordSet {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty() && k != "*")
            .map(|k| match k.strip_suffix('*') {
                Some(prefix) => format!(r"{}\w*", regex::escape(prefix.trim())),
                None => regex::escape(&k),
            })
            .map(|k| k.replace(r"\ ", r"\s+").replace(' ', r"\s+"))
            .collect();

        if alternatives.is_empty() {
            return Self { matcher: None };
        }
        let pattern = format!(r"(?iu)\b(?:{})\b", alternatives.join("|"));
        // An escaped keyword list always compiles; a failure would only come from size limits.
        let matcher = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(error = %e, "Keyword set failed to compile; it will match nothing");
                None
            }
        };
        Self { matcher }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(text))
    }
}
