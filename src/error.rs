//! Error type shared by the fetch, parse and persistence layers.
//!
//! Nothing in here is fatal on its own. Fetchers fold every variant into
//! [`FetchOutcome::Unavailable`](crate::models::FetchOutcome), and the run
//! driver logs persistence failures and carries on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<quick_xml::DeError> for IngestError {
    fn from(e: quick_xml::DeError) -> Self {
        IngestError::Parse(e.to_string())
    }
}
