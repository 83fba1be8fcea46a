//! Client error types.

use thiserror::Error;

/// Result alias for all client operations.
pub type Result<T> = std::result::Result<T, GqlError>;

/// Errors surfaced by the Twitch client.
///
/// `BadAuth` is the only fatal class: the stored credentials are invalid
/// and the caller must re-authenticate. Everything else is either a normal
/// flow signal (`StreamerOffline`) or recoverable by retrying later.
#[derive(Error, Debug)]
pub enum GqlError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad auth: credentials rejected")]
    BadAuth,

    #[error("streamer does not exist")]
    StreamerNotFound,

    #[error("streamer is offline")]
    StreamerOffline,

    #[error("prediction rejected: {0}")]
    PredictionRejected(String),

    #[error("community goal contribution rejected: {0}")]
    ContributionRejected(String),

    #[error("spade url not found")]
    SpadeNotFound,

    #[error("playlist error: {0}")]
    Playlist(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GqlError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Whether this error invalidates the stored credentials.
    pub fn is_fatal_auth(&self) -> bool {
        matches!(self, Self::BadAuth)
    }
}
