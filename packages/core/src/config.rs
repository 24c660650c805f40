//! Configuration for the tree operator

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on any configured TTL (30 days)
const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Prefix of the environment variables read by `TreeConfig::from_env`
pub const ENV_PREFIX: &str = "COLLAB_TREE_";

/// Runtime settings of the collaborator tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Configuration group holding the default root id
    pub config_group: String,

    /// Key of the default root id inside `config_group`
    pub root_id_key: String,

    /// Seconds a resolved root id stays cached
    pub root_id_cache_ttl_secs: u64,

    /// Seconds before the pivot locks taken while re-parenting expire (0 = never)
    pub reparent_lock_ttl_secs: u64,

    /// Capacity of the domain event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            config_group: "collab.tree".to_string(),
            root_id_key: "ROOT_ID".to_string(),
            root_id_cache_ttl_secs: 60,
            reparent_lock_ttl_secs: 300,
            event_channel_capacity: 256,
        }
    }
}

impl TreeConfig {
    /// Defaults overlaid with `COLLAB_TREE_*` environment variables
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from an arbitrary variable lookup
    ///
    /// Variable names are `ENV_PREFIX` followed by the upper-cased field name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let var = |field: &str| lookup(&format!("{}{}", ENV_PREFIX, field.to_uppercase()));
        let mut config = Self::default();

        if let Some(group) = var("config_group") {
            config.config_group = group;
        }
        if let Some(key) = var("root_id_key") {
            config.root_id_key = key;
        }
        if let Some(value) = var("root_id_cache_ttl_secs") {
            config.root_id_cache_ttl_secs = parse_number("root_id_cache_ttl_secs", &value)?;
        }
        if let Some(value) = var("reparent_lock_ttl_secs") {
            config.reparent_lock_ttl_secs = parse_number("reparent_lock_ttl_secs", &value)?;
        }
        if let Some(value) = var("event_channel_capacity") {
            config.event_channel_capacity = parse_number("event_channel_capacity", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("invalid tree config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.config_group.trim().is_empty() {
            return Err("config_group cannot be empty".to_string());
        }

        if self.root_id_key.trim().is_empty() {
            return Err("root_id_key cannot be empty".to_string());
        }

        if self.root_id_cache_ttl_secs > MAX_TTL_SECS {
            return Err(format!(
                "root_id_cache_ttl_secs cannot exceed {}",
                MAX_TTL_SECS
            ));
        }

        if self.reparent_lock_ttl_secs > MAX_TTL_SECS {
            return Err(format!(
                "reparent_lock_ttl_secs cannot exceed {}",
                MAX_TTL_SECS
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }

        Ok(())
    }

    /// How long a resolved root id stays cached
    pub fn root_id_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.root_id_cache_ttl_secs)
    }

    /// Lifetime of re-parenting pivot locks, `None` when they never expire
    pub fn reparent_lock_ttl(&self) -> Option<chrono::Duration> {
        (self.reparent_lock_ttl_secs > 0)
            .then(|| chrono::Duration::seconds(self.reparent_lock_ttl_secs as i64))
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{} must be a non-negative integer, got '{}'", field, value))
}
