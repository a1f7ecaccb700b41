//! TTL cache for assembled comment responses.
//!
//! Players re-request the same episode aggressively; one successful fetch per
//! hour per id is plenty.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dandan::model::CommentResponse;
use dashmap::DashMap;

pub struct CommentCache {
    entries: DashMap<i64, CacheEntry>,
    ttl: Duration,
}

struct CacheEntry {
    stored_at: Instant,
    payload: Arc<CommentResponse>,
}

impl CommentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, id: i64) -> Option<Arc<CommentResponse>> {
        {
            let entry = self.entries.get(&id)?;
            if entry.stored_at.elapsed() < self.ttl {
                return Some(Arc::clone(&entry.payload));
            }
        }
        self.entries.remove(&id);
        None
    }

    pub fn insert(&self, id: i64, payload: Arc<CommentResponse>) {
        self.entries.insert(
            id,
            CacheEntry {
                stored_at: Instant::now(),
                payload,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(count: i64) -> Arc<CommentResponse> {
        Arc::new(CommentResponse {
            count,
            comments: Vec::new(),
        })
    }

    #[test]
    fn test_hit_and_expiry() {
        let cache = CommentCache::new(Duration::from_millis(20));
        cache.insert(1, payload(3));

        assert_eq!(cache.get(1).unwrap().count, 3);
        assert!(cache.get(2).is_none());

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(1).is_none());
    }
}
