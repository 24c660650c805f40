//! Root Id Resolution
//!
//! `add_leaf_or_attach_to_root` needs the id of the configured default
//! root. The lookup goes through an injected `ConfigurationSource` and is
//! cached by `RootIdResolver`.
//!
//! # Cache Invalidation
//!
//! The resolver uses a hybrid invalidation strategy:
//! - **Time-based**: the cached id is stale after the configured TTL
//! - **Event-driven**: `invalidate()` forces a reload on next access

use crate::models::NodeId;
use crate::services::error::TreeError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// External system configuration lookup
#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    /// Raw value stored under `group`/`key`, `None` when unset
    async fn lookup(&self, group: &str, key: &str) -> anyhow::Result<Option<String>>;
}

/// Configuration source backed by a map, for tests and fixed deployments
#[derive(Debug, Default)]
pub struct StaticConfiguration {
    values: RwLock<HashMap<(String, String), String>>,
}

impl StaticConfiguration {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source holding one value
    pub fn with_value(group: &str, key: &str, value: impl Into<String>) -> Self {
        let values = HashMap::from([((group.to_string(), key.to_string()), value.into())]);
        Self {
            values: RwLock::new(values),
        }
    }

    /// Set or replace a value
    pub async fn set(&self, group: &str, key: &str, value: impl Into<String>) {
        self.values
            .write()
            .await
            .insert((group.to_string(), key.to_string()), value.into());
    }
}

#[async_trait]
impl ConfigurationSource for StaticConfiguration {
    async fn lookup(&self, group: &str, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .values
            .read()
            .await
            .get(&(group.to_string(), key.to_string()))
            .cloned())
    }
}

/// Cached resolver of the default root id
pub struct RootIdResolver {
    source: Arc<dyn ConfigurationSource>,

    group: String,

    key: String,

    /// Resolved id and the instant it was loaded
    cached: RwLock<Option<(NodeId, Instant)>>,

    /// Set by `invalidate()`, cleared by the next reload
    invalidated: AtomicBool,

    ttl: Duration,
}

impl RootIdResolver {
    /// Create a resolver for `group`/`key` with the given cache TTL
    pub fn new(
        source: Arc<dyn ConfigurationSource>,
        group: impl Into<String>,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            group: group.into(),
            key: key.into(),
            cached: RwLock::new(None),
            invalidated: AtomicBool::new(false),
            ttl,
        }
    }

    /// Resolver using the group, key and TTL of a `TreeConfig`
    pub fn from_config(source: Arc<dyn ConfigurationSource>, config: &crate::TreeConfig) -> Self {
        Self::new(
            source,
            config.config_group.clone(),
            config.root_id_key.clone(),
            config.root_id_cache_ttl(),
        )
    }

    /// The configured root id, reloading it when the cache is stale
    pub async fn root_id(&self) -> Result<NodeId, TreeError> {
        if !self.needs_refresh().await {
            if let Some((root_id, _)) = *self.cached.read().await {
                return Ok(root_id);
            }
        }

        self.refresh().await
    }

    /// Cached value without triggering a lookup
    pub async fn cached_root_id(&self) -> Option<NodeId> {
        self.cached.read().await.map(|(root_id, _)| root_id)
    }

    /// Signal that the configuration changed; the next access reloads
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    /// Reload immediately
    pub async fn force_refresh(&self) -> Result<NodeId, TreeError> {
        self.refresh().await
    }

    async fn needs_refresh(&self) -> bool {
        if self.invalidated.load(Ordering::Acquire) {
            return true;
        }

        match *self.cached.read().await {
            None => true,
            Some((_, loaded_at)) => loaded_at.elapsed() >= self.ttl,
        }
    }

    async fn refresh(&self) -> Result<NodeId, TreeError> {
        let raw = self
            .source
            .lookup(&self.group, &self.key)
            .await
            .map_err(|e| TreeError::configuration(format!("{:#}", e)))?
            .ok_or_else(|| {
                TreeError::configuration(format!(
                    "no root id configured under {}/{}",
                    self.group, self.key
                ))
            })?;

        let root_id: NodeId = raw.trim().parse().map_err(|_| {
            TreeError::configuration(format!(
                "root id under {}/{} is not a node id: '{}'",
                self.group, self.key, raw
            ))
        })?;

        *self.cached.write().await = Some((root_id, Instant::now()));
        self.invalidated.store(false, Ordering::Release);
        tracing::debug!("Resolved root id {} from {}/{}", root_id, self.group, self.key);

        Ok(root_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::error::ErrorKind;

    const GROUP: &str = "collab.tree";
    const KEY: &str = "ROOT_ID";

    fn resolver_over(source: Arc<StaticConfiguration>, ttl: Duration) -> RootIdResolver {
        RootIdResolver::new(source, GROUP, KEY, ttl)
    }

    #[tokio::test]
    async fn test_resolves_and_caches() {
        let source = Arc::new(StaticConfiguration::with_value(GROUP, KEY, "1"));
        let resolver = resolver_over(source.clone(), Duration::from_secs(60));

        assert_eq!(resolver.cached_root_id().await, None);
        assert_eq!(resolver.root_id().await.unwrap(), 1);

        source.set(GROUP, KEY, "2").await;
        assert_eq!(resolver.root_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let source = Arc::new(StaticConfiguration::with_value(GROUP, KEY, "1"));
        let resolver = resolver_over(source.clone(), Duration::from_secs(60));
        resolver.root_id().await.unwrap();

        source.set(GROUP, KEY, "2").await;
        resolver.invalidate();
        assert_eq!(resolver.root_id().await.unwrap(), 2);
        assert_eq!(resolver.cached_root_id().await, Some(2));
    }

    #[tokio::test]
    async fn test_ttl_expiry_reloads() {
        let source = Arc::new(StaticConfiguration::with_value(GROUP, KEY, "1"));
        let resolver = resolver_over(source.clone(), Duration::from_millis(20));
        resolver.root_id().await.unwrap();

        source.set(GROUP, KEY, "3").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(resolver.root_id().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_force_refresh() {
        let source = Arc::new(StaticConfiguration::with_value(GROUP, KEY, "1"));
        let resolver = resolver_over(source.clone(), Duration::from_secs(60));
        resolver.root_id().await.unwrap();

        source.set(GROUP, KEY, " 4 ").await;
        assert_eq!(resolver.force_refresh().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_values() {
        let resolver = resolver_over(Arc::new(StaticConfiguration::new()), Duration::from_secs(60));
        assert_eq!(
            resolver.root_id().await.unwrap_err().kind(),
            ErrorKind::Configuration
        );

        let source = Arc::new(StaticConfiguration::with_value(GROUP, KEY, "root"));
        let resolver = resolver_over(source, Duration::from_secs(60));
        assert_eq!(
            resolver.root_id().await.unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }
}
