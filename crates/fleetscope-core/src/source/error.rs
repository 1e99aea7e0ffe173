//! Feed errors

use thiserror::Error;

/// Errors that can occur while fetching from the tracking provider
///
/// These are expected, recoverable conditions: the live view reports them as
/// advisories and keeps its last good state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Provider request failed: {0}")]
    Transport(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Malformed provider payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout
        } else if let Some(status) = err.status() {
            FeedError::HttpStatus(status.as_u16())
        } else if err.is_decode() {
            FeedError::Malformed(err.to_string())
        } else {
            FeedError::Transport(err.to_string())
        }
    }
}
