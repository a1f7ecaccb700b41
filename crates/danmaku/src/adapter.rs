//! Platform adapter trait and error type.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{MatchQuery, MediaCandidate, StandardDanmaku};

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors surfaced by platform integrations.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// The platform answered, but with an error payload.
    #[error("platform error: {0}")]
    Platform(String),

    #[error("operation not supported")]
    Unsupported,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AdapterError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// One platform integration: search for a title, fetch raw danmaku for a
/// platform-native episode id.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform name, also the registry key ("bilibili", "tencent", ...).
    fn platform(&self) -> &str;

    /// Search the platform for the queried title. Series hits carry their
    /// episode list.
    async fn match_media(&self, query: MatchQuery) -> AdapterResult<Vec<MediaCandidate>>;

    /// Fetch all danmaku for a platform-native episode id.
    async fn fetch_danmaku(&self, episode_id: &str) -> AdapterResult<Vec<StandardDanmaku>>;

    /// Fetch one media entry (with episodes) by its platform-native
    /// season/media id. Optional capability.
    async fn media_detail(&self, season_id: &str) -> AdapterResult<MediaCandidate> {
        let _ = season_id;
        Err(AdapterError::Unsupported)
    }
}
