//! Explicit lifecycle hooks.
//!
//! Components needing startup or shutdown work register a hook when the app
//! is assembled; nothing is discovered at runtime.

use std::sync::Arc;

use async_trait::async_trait;
use dandan::IdStore;
use tracing::{error, info};

#[async_trait]
pub trait LifecycleHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_startup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Ordered hook list; failures are logged, never fatal.
#[derive(Default)]
pub struct Hooks {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
    }

    pub async fn run_startup(&self) {
        for hook in &self.hooks {
            if let Err(err) = hook.on_startup().await {
                error!(hook = hook.name(), error = %err, "startup hook failed");
            }
        }
    }

    pub async fn run_shutdown(&self) {
        for hook in &self.hooks {
            info!(hook = hook.name(), "running shutdown hook");
            if let Err(err) = hook.on_shutdown().await {
                error!(hook = hook.name(), error = %err, "shutdown hook failed");
            }
        }
    }
}

/// Persists the id snapshot at graceful shutdown.
pub struct SnapshotHook {
    store: Arc<IdStore>,
}

impl SnapshotHook {
    pub fn new(store: Arc<IdStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LifecycleHook for SnapshotHook {
    fn name(&self) -> &str {
        "id-snapshot"
    }

    async fn on_startup(&self) -> anyhow::Result<()> {
        info!(
            entries = self.store.len(),
            path = %self.store.snapshot_path().display(),
            "id store ready"
        );
        Ok(())
    }

    async fn on_shutdown(&self) -> anyhow::Result<()> {
        self.store.persist()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_hook_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::config::SNAPSHOT_FILE);
        let store = Arc::new(IdStore::new(&path));
        store.resolve("bilibili", "1", "1");

        let mut hooks = Hooks::new();
        hooks.register(Arc::new(SnapshotHook::new(Arc::clone(&store))));
        hooks.run_shutdown().await;

        assert!(path.exists());
        let restored = IdStore::restore(&path);
        assert_eq!(restored.len(), 1);
    }
}
