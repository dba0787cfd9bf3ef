use crate::domain::ports::FeatureCache;
use crate::domain::types::FeatureSet;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// In-process TTL cache for materialized features. Stands in for an
/// external key-value store; the engine only sees the `FeatureCache`
/// capability.
pub struct InMemoryFeatureCache {
    entries: RwLock<HashMap<String, (Instant, FeatureSet)>>,
    ttl: Duration,
}

impl InMemoryFeatureCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl FeatureCache for InMemoryFeatureCache {
    async fn get(&self, key: &str) -> Option<FeatureSet> {
        let entries = self.entries.read().await;
        let (inserted, features) = entries.get(key)?;
        if inserted.elapsed() > self.ttl {
            return None;
        }
        Some(features.clone())
    }

    async fn put(&self, key: String, features: FeatureSet) {
        let mut entries = self.entries.write().await;
        // Opportunistic cleanup keeps the map from growing unbounded
        if entries.len() > 1024 {
            entries.retain(|_, (inserted, _)| inserted.elapsed() <= self.ttl);
        }
        entries.insert(key, (Instant::now(), features));
    }
}

/// A cache that never stores anything, for callers that want every
/// request to hit the data provider
pub struct NoopFeatureCache;

#[async_trait]
impl FeatureCache for NoopFeatureCache {
    async fn get(&self, _key: &str) -> Option<FeatureSet> {
        None
    }

    async fn put(&self, _key: String, _features: FeatureSet) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = InMemoryFeatureCache::new(Duration::from_secs(60));
        let features = FeatureSet {
            last_price: Some(42.0),
            ..Default::default()
        };
        cache.put("features:AAPL:1d".to_string(), features).await;
        let hit = cache.get("features:AAPL:1d").await.unwrap();
        assert_eq!(hit.last_price, Some(42.0));
        assert!(cache.get("features:TSLA:1d").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = InMemoryFeatureCache::new(Duration::from_millis(10));
        cache
            .put("k".to_string(), FeatureSet::default())
            .await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.get("k").await.is_none());
    }
}
