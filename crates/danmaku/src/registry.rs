//! Registry of live platform adapters.
//!
//! Built once at startup and passed by reference into the orchestrator and
//! facade; registration order is fixed and observable.

use std::sync::Arc;

use crate::adapter::PlatformAdapter;

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Register an adapter. Order of registration is preserved.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.push(adapter);
    }

    /// All adapters in registration order.
    pub fn adapters(&self) -> &[Arc<dyn PlatformAdapter>] {
        &self.adapters
    }

    /// Find the adapter serving the given platform.
    pub fn get_by_platform(&self, platform: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.platform().eq_ignore_ascii_case(platform))
            .cloned()
    }

    /// Names of every registered platform.
    pub fn platforms(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.platform()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterResult, PlatformAdapter};
    use crate::model::{MatchQuery, MediaCandidate, StandardDanmaku};
    use async_trait::async_trait;

    struct FixedAdapter(&'static str);

    #[async_trait]
    impl PlatformAdapter for FixedAdapter {
        fn platform(&self) -> &str {
            self.0
        }

        async fn match_media(&self, _query: MatchQuery) -> AdapterResult<Vec<MediaCandidate>> {
            Ok(Vec::new())
        }

        async fn fetch_danmaku(&self, _episode_id: &str) -> AdapterResult<Vec<StandardDanmaku>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_registration_order_and_lookup() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FixedAdapter("bilibili")));
        registry.register(Arc::new(FixedAdapter("tencent")));

        assert_eq!(registry.platforms(), ["bilibili", "tencent"]);
        assert!(registry.get_by_platform("Tencent").is_some());
        assert!(registry.get_by_platform("youku").is_none());
    }
}
