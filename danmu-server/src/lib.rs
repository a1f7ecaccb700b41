//! Application assembly.

pub mod api;
pub mod config;
pub mod lifecycle;
pub mod state;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use danmaku::search::MetadataEnrichment;
use danmaku::{AdapterRegistry, PlatformOptions, SearchOrchestrator, TitleMatcher};
use dandan::{DandanFacade, IdStore};
use platform_adapters::{BilibiliAdapter, EmbyEnrichment, PlatformHttp, TencentAdapter, bilibili, tencent};

use crate::config::{AppConfig, SNAPSHOT_FILE};
use crate::lifecycle::{Hooks, SnapshotHook};
use crate::state::AppState;

/// Fully wired application: shared state for the router plus the lifecycle
/// hooks and the shutdown token the server loop observes.
pub struct App {
    pub state: AppState,
    pub hooks: Hooks,
    pub shutdown: CancellationToken,
}

/// Wire every component from configuration. `config_dir` is where the active
/// config lives; the id snapshot goes beside it.
pub fn build(config: &AppConfig, config_dir: &Path) -> anyhow::Result<App> {
    let matcher = Arc::new(TitleMatcher::new(config.compile_rules()));

    let mut registry = AdapterRegistry::new();
    let mut options: FxHashMap<String, PlatformOptions> = FxHashMap::default();
    let mut merge_windows: FxHashMap<String, i64> = FxHashMap::default();

    let user_agent =
        (!config.search.user_agent.is_empty()).then_some(config.search.user_agent.as_str());

    // Registration order is observable; make it deterministic regardless of
    // config map iteration.
    let mut platforms: Vec<_> = config.platforms.iter().collect();
    platforms.sort_by_key(|(name, platform)| (platform.priority, (*name).clone()));

    for (name, platform) in platforms {
        if platform.priority < 0 {
            info!(platform = %name, "platform disabled");
            continue;
        }

        let mut http =
            PlatformHttp::new(Duration::from_secs(platform.timeout_secs.max(1)), user_agent)?;
        http.set_cookie(&platform.cookie);

        match name.as_str() {
            bilibili::PLATFORM => {
                registry.register(Arc::new(BilibiliAdapter::new(http, Arc::clone(&matcher))));
            }
            tencent::PLATFORM => {
                registry.register(Arc::new(TencentAdapter::new(
                    http,
                    Arc::clone(&matcher),
                    platform.max_workers,
                )));
            }
            other => {
                warn!(platform = other, "unknown platform in config");
                continue;
            }
        }

        options.insert(
            name.clone(),
            PlatformOptions {
                priority: platform.priority,
                highlight_markup: platform.highlight_markup,
            },
        );
        if platform.merge_window_ms > 0 {
            merge_windows.insert(name.clone(), platform.merge_window_ms);
        }
    }
    let registry = Arc::new(registry);
    info!(platforms = ?registry.platforms(), "adapters registered");

    let enrichment: Option<Arc<dyn MetadataEnrichment>> = if config.emby.enabled {
        Some(Arc::new(EmbyEnrichment::new(
            config.emby.url.clone(),
            config.emby.user.clone(),
            config.emby.token.clone(),
        )?))
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let orchestrator = Arc::new(SearchOrchestrator::new(
        Arc::clone(&registry),
        options,
        enrichment,
        Duration::from_secs(config.search.timeout_secs.max(1)),
        shutdown.clone(),
    ));

    let store = Arc::new(IdStore::restore(config_dir.join(SNAPSHOT_FILE)));
    let facade = Arc::new(DandanFacade::new(
        orchestrator,
        registry,
        Arc::clone(&store),
        merge_windows,
    ));

    let mut hooks = Hooks::new();
    hooks.register(Arc::new(SnapshotHook::new(store)));

    Ok(App {
        state: AppState {
            facade,
            tokens: Arc::new(config.server.tokens.clone()),
            comment_cache: Arc::new(api::cache::CommentCache::new(Duration::from_secs(3600))),
        },
        hooks,
        shutdown,
    })
}
