//! Shared application state.

use std::sync::Arc;

use dandan::DandanFacade;

use crate::api::cache::CommentCache;

#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<DandanFacade>,
    /// Accepted path tokens; empty disables validation.
    pub tokens: Arc<Vec<String>>,
    pub comment_cache: Arc<CommentCache>,
}
