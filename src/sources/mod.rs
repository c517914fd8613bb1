//! Source fetchers, one per [`SourceClass`](crate::models::SourceClass).
//!
//! | Class | Module | Transport | Notes |
//! |-------|--------|-----------|-------|
//! | `feed` | [`feed`] | direct GET, 10s | RSS or Atom |
//! | `scraped_page` | [`channel`] | direct GET, 10s | public channel preview HTML, 1h fetch-time cutoff |
//! | `proxied_mirror` | [`mirror`] | proxy pool, 7s | up to 5 origins in rotation |
//!
//! Every fetcher has the same contract: one descriptor in, one
//! [`FetchOutcome`](crate::models::FetchOutcome) out. No fetcher returns an
//! error or panics on bad input; a dead source is `Unavailable` and the run
//! goes on.

pub mod channel;
pub mod feed;
pub mod mirror;
pub mod syndication;
