//! Concurrent search orchestration across all registered adapters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::AdapterResult;
use crate::matcher;
use crate::model::{MatchQuery, MediaCandidate};
use crate::registry::AdapterRegistry;

/// Canonical metadata for a queried title, from an external library such as a
/// media server the user already curates.
#[derive(Debug, Clone)]
pub struct EnrichmentInfo {
    pub canonical_name: String,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
}

/// Optional metadata lookup collaborator, queried once per search before the
/// fan-out. Failures never abort a search.
#[async_trait]
pub trait MetadataEnrichment: Send + Sync {
    async fn search_by_title(
        &self,
        title: &str,
        season_hint: i32,
    ) -> AdapterResult<Option<EnrichmentInfo>>;
}

/// Per-platform search settings.
#[derive(Debug, Clone, Copy)]
pub struct PlatformOptions {
    /// Ascending sort key for result ordering.
    pub priority: i32,
    /// Whether this platform's search API wraps hits in highlight markup.
    pub highlight_markup: bool,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            priority: i32::MAX,
            highlight_markup: false,
        }
    }
}

/// Fans a query out to every registered adapter, aggregates the survivors and
/// orders them by configured platform priority.
pub struct SearchOrchestrator {
    registry: Arc<AdapterRegistry>,
    options: FxHashMap<String, PlatformOptions>,
    enrichment: Option<Arc<dyn MetadataEnrichment>>,
    search_timeout: Duration,
    shutdown: CancellationToken,
}

impl SearchOrchestrator {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        options: FxHashMap<String, PlatformOptions>,
        enrichment: Option<Arc<dyn MetadataEnrichment>>,
        search_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            options,
            enrichment,
            search_timeout,
            shutdown,
        }
    }

    fn priority_of(&self, platform: &str) -> i32 {
        self.options
            .get(platform)
            .map(|options| options.priority)
            .unwrap_or(i32::MAX)
    }

    fn highlight_for(&self, platform: &str) -> bool {
        self.options
            .get(platform)
            .map(|options| options.highlight_markup)
            .unwrap_or(false)
    }

    /// Run one search. Adapter failures and timeouts are logged and excluded;
    /// the aggregate never errors, an empty result is a normal outcome.
    pub async fn match_media(&self, mut query: MatchQuery) -> Vec<MediaCandidate> {
        if query.season < 0 {
            query.season = matcher::extract_season(&query.title);
        }
        query.title = matcher::normalize_title_season(&query.title);

        if let Some(enrichment) = &self.enrichment {
            match enrichment.search_by_title(&query.title, query.season).await {
                Ok(Some(info)) => {
                    debug!(
                        title = %query.title,
                        canonical = %info.canonical_name,
                        "metadata enrichment hit"
                    );
                    query.year_min = info.year_min;
                    query.year_max = info.year_max;
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(title = %query.title, error = %error, "metadata enrichment failed");
                }
            }
        }

        let adapters = self.registry.adapters();
        let deadline = tokio::time::Instant::now() + self.search_timeout;
        let mut tasks = JoinSet::new();
        for (slot, adapter) in adapters.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            let mut task_query = query.clone();
            task_query.platform = adapter.platform().to_owned();
            task_query.check_highlight = self.highlight_for(adapter.platform());
            let shutdown = self.shutdown.clone();

            tasks.spawn(async move {
                let platform = adapter.platform().to_owned();
                let started = std::time::Instant::now();
                let outcome = tokio::select! {
                    _ = shutdown.cancelled() => {
                        Err(crate::adapter::AdapterError::other("search cancelled"))
                    }
                    result = tokio::time::timeout_at(deadline, adapter.match_media(task_query)) => {
                        result.unwrap_or_else(|_| {
                            Err(crate::adapter::AdapterError::other("search deadline exceeded"))
                        })
                    }
                };
                (slot, platform, started.elapsed(), outcome)
            });
        }

        // Results land in per-adapter slots so that output order depends on
        // registration order and priority, never on completion order.
        let mut slots: Vec<Vec<MediaCandidate>> = vec![Vec::new(); adapters.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, platform, elapsed, Ok(media))) => {
                    info!(
                        platform = %platform,
                        cost_ms = elapsed.as_millis() as u64,
                        results = media.len(),
                        "adapter search done"
                    );
                    slots[slot] = media;
                }
                Ok((_, platform, _, Err(error))) => {
                    warn!(platform = %platform, error = %error, "adapter search failed");
                }
                Err(error) => {
                    warn!(error = %error, "search task aborted");
                }
            }
        }

        let mut result: Vec<MediaCandidate> = slots.into_iter().flatten().collect();
        result.sort_by_key(|media| self.priority_of(&media.platform));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterError, AdapterResult, PlatformAdapter};
    use crate::model::{MatchQuery, MediaCandidate, MediaKind, StandardDanmaku};
    use rand::RngExt;

    struct DelayedAdapter {
        platform: &'static str,
        delay_ms: u64,
        fail: bool,
    }

    #[async_trait]
    impl PlatformAdapter for DelayedAdapter {
        fn platform(&self) -> &str {
            self.platform
        }

        async fn match_media(&self, query: MatchQuery) -> AdapterResult<Vec<MediaCandidate>> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if self.fail {
                return Err(AdapterError::http("boom"));
            }
            Ok(vec![MediaCandidate {
                kind: MediaKind::Series,
                id: "1".to_owned(),
                title: query.title,
                description: String::new(),
                cover: String::new(),
                type_desc: String::new(),
                year: 2024,
                pub_time: 0,
                platform: self.platform.to_owned(),
                episodes: Vec::new(),
            }])
        }

        async fn fetch_danmaku(&self, _episode_id: &str) -> AdapterResult<Vec<StandardDanmaku>> {
            Ok(Vec::new())
        }
    }

    fn orchestrator_for(
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        options: FxHashMap<String, PlatformOptions>,
    ) -> SearchOrchestrator {
        let mut registry = AdapterRegistry::new();
        for adapter in adapters {
            registry.register(adapter);
        }
        SearchOrchestrator::new(
            Arc::new(registry),
            options,
            None,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    fn options_for(priorities: &[(&str, i32)]) -> FxHashMap<String, PlatformOptions> {
        priorities
            .iter()
            .map(|(platform, priority)| {
                (
                    (*platform).to_owned(),
                    PlatformOptions {
                        priority: *priority,
                        highlight_markup: false,
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_ordering_is_deterministic_under_random_delays() {
        for _ in 0..50 {
            let (delay_a, delay_b) = {
                let mut rng = rand::rng();
                (rng.random_range(0..5), rng.random_range(0..5))
            };
            let orchestrator = orchestrator_for(
                vec![
                    Arc::new(DelayedAdapter {
                        platform: "beta",
                        delay_ms: delay_b,
                        fail: false,
                    }),
                    Arc::new(DelayedAdapter {
                        platform: "alpha",
                        delay_ms: delay_a,
                        fail: false,
                    }),
                ],
                options_for(&[("alpha", 1), ("beta", 2)]),
            );

            let result = orchestrator.match_media(MatchQuery::new("某剧")).await;
            let platforms: Vec<&str> = result.iter().map(|m| m.platform.as_str()).collect();
            assert_eq!(platforms, ["alpha", "beta"]);
        }
    }

    #[tokio::test]
    async fn test_failing_adapter_is_excluded() {
        let orchestrator = orchestrator_for(
            vec![
                Arc::new(DelayedAdapter {
                    platform: "alpha",
                    delay_ms: 0,
                    fail: true,
                }),
                Arc::new(DelayedAdapter {
                    platform: "beta",
                    delay_ms: 0,
                    fail: false,
                }),
            ],
            options_for(&[("alpha", 1), ("beta", 2)]),
        );

        let result = orchestrator.match_media(MatchQuery::new("某剧")).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].platform, "beta");
    }

    #[tokio::test]
    async fn test_season_parsed_from_title() {
        let orchestrator = orchestrator_for(
            vec![Arc::new(DelayedAdapter {
                platform: "alpha",
                delay_ms: 0,
                fail: false,
            })],
            options_for(&[("alpha", 1)]),
        );

        // The pre-pass strips the season marker before adapters see the
        // title.
        let result = orchestrator.match_media(MatchQuery::new("某剧 第二季")).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].title, "某剧");
    }

    #[tokio::test]
    async fn test_empty_registry_yields_empty_result() {
        let orchestrator = orchestrator_for(Vec::new(), FxHashMap::default());
        let result = orchestrator.match_media(MatchQuery::new("某剧")).await;
        assert!(result.is_empty());
    }
}
