//! Facade error types.

use danmaku::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DandanError {
    /// A global id absent from the reverse map.
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(i64),

    /// The decoded platform has no live adapter.
    #[error("no adapter for platform: {0}")]
    NoAdapter(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl DandanError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}
