use thiserror::Error;

/// Transport-level failure for a single request. The item is dropped for
/// this pass and picked up again on the next run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("failed to read body: {0}")]
    Body(reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_body() || e.is_decode() {
            FetchError::Body(e)
        } else {
            FetchError::Transport(e)
        }
    }
}

/// Terminal "not available" answers. Nothing is written, so the item stays
/// eligible for the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("404 not found")]
    NotFound,
    #[error("403 forbidden")]
    Forbidden,
}

impl SkipReason {
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            404 => Some(SkipReason::NotFound),
            403 => Some(SkipReason::Forbidden),
            _ => None,
        }
    }
}

/// A page parsed but did not yield a record worth storing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("missing score")]
    MissingScore,
    #[error("missing year")]
    MissingYear,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid selector for {field} ({selector:?}): {message}")]
    Selector {
        field: &'static str,
        selector: String,
        message: String,
    },
    #[error("failed to read rule file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse rule file: {0}")]
    Json(#[from] serde_json::Error),
}
