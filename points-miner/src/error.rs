//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("twitch api error: {0}")]
    Gql(#[from] twitch_gql::GqlError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("pubsub error: {0}")]
    PubSub(String),

    #[error("no valid streamers configured")]
    NoStreamers,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn pubsub(msg: impl Into<String>) -> Self {
        Self::PubSub(msg.into())
    }

    /// Whether the error invalidates the stored credentials and must stop
    /// the process.
    pub fn is_fatal_auth(&self) -> bool {
        match self {
            Self::Gql(e) => e.is_fatal_auth(),
            Self::Auth(_) => true,
            _ => false,
        }
    }
}
