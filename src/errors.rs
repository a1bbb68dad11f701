//! Request-level error taxonomy.
//!
//! Every failure that can reach the HTTP surface is one of the [`RssGenError`]
//! variants. Each variant carries one fixed user-facing message and one HTTP
//! status; internal details only ever go to the log.

use axum::http::StatusCode;
use thiserror::Error;

use crate::cache::CacheError;
use crate::fetch::FetchError;

/// Appended to every failure message shown to a caller.
pub const USAGE_HINT: &str =
    "Please read the examples in README.md (in the git repo) to ensure the request is valid.";

/// Last-resort message for faults that escape the taxonomy.
pub const APOLOGY: &str = "Oops. Something went wrong.  (・_・)";

#[derive(Error, Debug)]
pub enum RssGenError {
    #[error("malformed request: expected /<prefix>/<source>/<target...>")]
    MalformedRequest,

    #[error("no source adapter named {0:?}")]
    UnknownSource(String),

    #[error("source {source_name} rejected target {target:?}: {reason}")]
    SourceRejectedTarget {
        source_name: String,
        target: String,
        reason: String,
    },

    #[error("listing for {url} unavailable: {source}")]
    SourceUnavailable {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("source {0} returned no usable channel")]
    EmptyResult(String),

    #[error("unsupported fetch strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("cache I/O failed: {0}")]
    CacheIo(#[from] CacheError),

    #[error("{0}")]
    Unknown(String),
}

impl From<FetchError> for RssGenError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::UnsupportedStrategy(name) => RssGenError::UnsupportedStrategy(name),
            other => RssGenError::Unknown(other.to_string()),
        }
    }
}

impl RssGenError {
    /// The plain-text message shown to the caller.
    pub fn user_message(&self) -> &'static str {
        match self {
            RssGenError::MalformedRequest => "Empty request. Nothing to do. Bye.",
            RssGenError::UnknownSource(_) => "Request not supported - No handler. Aborting. Bye.",
            RssGenError::SourceRejectedTarget { .. } => {
                "Request failed. Please ensure the requested channel name exists. Aborting. Bye."
            }
            RssGenError::SourceUnavailable { .. } => {
                "Channel page could not be retrieved, even after trying its alternate address. Aborting. Bye."
            }
            RssGenError::EmptyResult(_) => "Insufficient response from handler. Aborting. Bye.",
            RssGenError::UnsupportedStrategy(_)
            | RssGenError::CacheIo(_)
            | RssGenError::Unknown(_) => "Unknown Error. Aborting. Bye.",
        }
    }

    /// HTTP status that accompanies [`RssGenError::user_message`].
    pub fn status(&self) -> StatusCode {
        match self {
            RssGenError::MalformedRequest => StatusCode::BAD_REQUEST,
            RssGenError::UnknownSource(_) => StatusCode::NOT_FOUND,
            RssGenError::SourceRejectedTarget { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RssGenError::SourceUnavailable { .. } | RssGenError::EmptyResult(_) => {
                StatusCode::BAD_GATEWAY
            }
            RssGenError::UnsupportedStrategy(_)
            | RssGenError::CacheIo(_)
            | RssGenError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Faults that indicate a bug or an environment problem rather than a bad request.
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}
