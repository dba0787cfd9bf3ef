use crate::domain::model::{ModelHandle, ModelStatus, RegistrySnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

/// Owns the set of ready model handles. Reads clone an `Arc`'d snapshot
/// and never block each other; a publish holds the write lock only for
/// the map rebuild and pointer swap — all model loading happened before
/// `publish` was called.
pub struct ModelRegistry {
    current: RwLock<RegistrySnapshot>,
    version_counter: AtomicU64,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(RegistrySnapshot::default()),
            version_counter: AtomicU64::new(0),
        }
    }

    /// Monotonic version for a handle about to be trained or loaded
    pub fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Bumps the counter past an externally assigned version (rehydration)
    pub fn observe_version(&self, version: u64) {
        self.version_counter.fetch_max(version, Ordering::SeqCst);
    }

    /// Point-in-time consistent view. Later publishes never mutate a
    /// snapshot already handed out.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.current.read().await.clone()
    }

    pub async fn get(&self, model_id: &str) -> Option<Arc<ModelHandle>> {
        self.current.read().await.get(model_id).cloned()
    }

    /// Atomically makes every supplied handle visible in one transition.
    /// Handles replacing an existing id win over the old handle; handles
    /// for new ids are added. Concurrent publishes serialize on the write
    /// lock; for overlapping ids the last committed publish wins.
    pub async fn publish(&self, handles: Vec<ModelHandle>) {
        if handles.is_empty() {
            return;
        }
        let mut guard = self.current.write().await;
        let mut next: HashMap<String, Arc<ModelHandle>> =
            guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for handle in handles {
            debug_assert_eq!(handle.status, ModelStatus::Ready);
            info!(
                model_id = %handle.id,
                version = handle.version,
                "Publishing model handle"
            );
            self.observe_version(handle.version);
            next.insert(handle.id.clone(), Arc::new(handle));
        }
        *guard = RegistrySnapshot::new(next);
    }

    /// Removes a model id entirely (its handle is retired with it)
    pub async fn retire(&self, model_id: &str) {
        let mut guard = self.current.write().await;
        let mut next: HashMap<String, Arc<ModelHandle>> = guard
            .iter()
            .filter(|(k, _)| k.as_str() != model_id)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        next.shrink_to_fit();
        *guard = RegistrySnapshot::new(next);
    }

    pub async fn len(&self) -> usize {
        self.current.read().await.len()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
