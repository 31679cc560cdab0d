//! Cache space configuration
//!
//! Descriptors are the serde-facing shape of a cache space as written in a
//! config file; `CacheSpaceConfig` is the validated, immutable policy that a
//! cache space is built from.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::partition::{partition, TierCapacity};

/// Write routing across tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CachePriority {
    /// Single local tier
    #[default]
    #[serde(alias = "local")]
    OnlyLocal,
    /// Single remote tier
    #[serde(alias = "remote")]
    OnlyRemote,
    /// Two tiers, writes go to the local tier
    FirstLocal,
    /// Two tiers, writes go to the remote tier
    FirstRemote,
    /// Two tiers, writes go to both
    #[serde(alias = "localRemote")]
    LocalAndRemote,
}

impl CachePriority {
    /// Whether this priority needs both tiers
    pub fn is_two_tier(self) -> bool {
        !matches!(self, CachePriority::OnlyLocal | CachePriority::OnlyRemote)
    }
}

/// Trigger for moving entries between tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheChangeStrategy {
    /// Promote remote entries into the local tier once they are read often enough
    AccessThreshold,
    /// Demote entries pushed out of the full local tier into the remote tier
    #[default]
    OverflowMaxSize,
}

/// Eviction policy of the local tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocalEviction {
    #[default]
    #[serde(alias = "lfu")]
    TinyLfu,
    Lru,
}

/// One cache space as described in configuration
///
/// Every field except `name` falls back to its default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSpaceDescriptor {
    /// Cache space name; blank names are skipped during resolution
    #[serde(default)]
    pub name: String,

    /// Whether null values may be stored
    #[serde(default, alias = "allowNullValues")]
    pub allow_null_values: bool,

    /// Total entry budget across both tiers
    #[serde(default = "default_max_size", alias = "maxSize")]
    pub max_size: i64,

    /// Lifetime of an entry from its write (seconds)
    #[serde(default = "default_expire_after_write", alias = "expireDate")]
    pub expire_after_write_secs: u64,

    /// Lifetime of an entry from its last access (seconds)
    #[serde(default = "default_expire_after_access", alias = "idleDate")]
    pub expire_after_access_secs: u64,

    #[serde(default, alias = "cachePriority")]
    pub priority: CachePriority,

    #[serde(default, alias = "cacheChangeStrategy")]
    pub change_strategy: CacheChangeStrategy,

    /// Local:remote capacity ratio
    #[serde(default = "default_two_levels_ratio", alias = "twoLevelsRatio")]
    pub two_levels_ratio: f64,

    /// Remote hits needed before a key is promoted
    #[serde(default = "default_access_threshold", alias = "accessThreshold")]
    pub access_threshold: u64,

    #[serde(default)]
    pub local_eviction: LocalEviction,

    /// Upper bound for every remote call (milliseconds)
    #[serde(default)]
    pub remote_timeout_ms: Option<u64>,

    /// Treat remote failures during lookup as misses
    #[serde(default)]
    pub tolerate_remote_outage: bool,

    #[serde(default = "default_promotion_workers")]
    pub promotion_workers: usize,

    #[serde(default = "default_promotion_queue")]
    pub promotion_queue: usize,
}

impl Default for CacheSpaceDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            allow_null_values: false,
            max_size: default_max_size(),
            expire_after_write_secs: default_expire_after_write(),
            expire_after_access_secs: default_expire_after_access(),
            priority: CachePriority::default(),
            change_strategy: CacheChangeStrategy::default(),
            two_levels_ratio: default_two_levels_ratio(),
            access_threshold: default_access_threshold(),
            local_eviction: LocalEviction::default(),
            remote_timeout_ms: None,
            tolerate_remote_outage: false,
            promotion_workers: default_promotion_workers(),
            promotion_queue: default_promotion_queue(),
        }
    }
}

fn default_max_size() -> i64 {
    1_000
}

fn default_expire_after_write() -> u64 {
    3_600
}

fn default_expire_after_access() -> u64 {
    1_800
}

fn default_two_levels_ratio() -> f64 {
    0.5
}

fn default_access_threshold() -> u64 {
    10_000
}

fn default_promotion_workers() -> usize {
    4
}

fn default_promotion_queue() -> usize {
    1_000
}

impl CacheSpaceDescriptor {
    /// Descriptor with defaults for everything but the name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Validate the descriptor and turn it into an immutable config
    pub fn resolve(&self) -> CacheResult<CacheSpaceConfig> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CacheError::invalid_config("cache space name must not be blank"));
        }
        if self.max_size < 1 {
            return Err(CacheError::invalid_config(format!(
                "cache space '{}': max_size must be >= 1, got {}",
                name, self.max_size
            )));
        }
        if self.expire_after_write_secs == 0 || self.expire_after_access_secs == 0 {
            return Err(CacheError::invalid_config(format!(
                "cache space '{}': expiry durations must be > 0",
                name
            )));
        }
        if self.access_threshold == 0 {
            return Err(CacheError::invalid_config(format!(
                "cache space '{}': access_threshold must be >= 1",
                name
            )));
        }
        if self.promotion_workers == 0 || self.promotion_queue == 0 {
            return Err(CacheError::invalid_config(format!(
                "cache space '{}': promotion pool needs at least one worker and one queue slot",
                name
            )));
        }

        let config = CacheSpaceConfig {
            name: name.to_string(),
            allow_null_values: self.allow_null_values,
            max_size: self.max_size as u64,
            expire_after_write: Duration::from_secs(self.expire_after_write_secs),
            expire_after_access: Duration::from_secs(self.expire_after_access_secs),
            priority: self.priority,
            change_strategy: self.change_strategy,
            two_levels_ratio: self.two_levels_ratio,
            access_threshold: self.access_threshold,
            local_eviction: self.local_eviction,
            remote_timeout: self.remote_timeout_ms.map(Duration::from_millis),
            tolerate_remote_outage: self.tolerate_remote_outage,
            promotion_workers: self.promotion_workers,
            promotion_queue: self.promotion_queue,
        };

        // Ratio is checked by the partitioner
        config.capacities()?;
        Ok(config)
    }
}

/// Validated, immutable policy of one cache space
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSpaceConfig {
    pub name: String,
    pub allow_null_values: bool,
    pub max_size: u64,
    pub expire_after_write: Duration,
    pub expire_after_access: Duration,
    pub priority: CachePriority,
    pub change_strategy: CacheChangeStrategy,
    pub two_levels_ratio: f64,
    pub access_threshold: u64,
    pub local_eviction: LocalEviction,
    pub remote_timeout: Option<Duration>,
    pub tolerate_remote_outage: bool,
    pub promotion_workers: usize,
    pub promotion_queue: usize,
}

impl CacheSpaceConfig {
    /// Local-only space used when a registry creates caches on demand
    ///
    /// Entries live for an hour after their last access, 1000 at most.
    pub fn on_demand(name: impl Into<String>) -> CacheResult<Self> {
        CacheSpaceDescriptor {
            name: name.into(),
            expire_after_access_secs: 3_600,
            ..CacheSpaceDescriptor::default()
        }
        .resolve()
    }

    pub fn is_two_tier(&self) -> bool {
        self.priority.is_two_tier()
    }

    /// Per-tier capacities derived from `max_size` and `two_levels_ratio`
    pub fn capacities(&self) -> CacheResult<TierCapacity> {
        partition(self.max_size, self.two_levels_ratio)
    }
}

/// Resolve descriptors from one or more configuration sources
///
/// Sources are consumed in order. Blank names are skipped and the first
/// definition of a name wins; later duplicates are dropped.
pub fn resolve_spaces<I>(descriptors: I) -> CacheResult<Vec<CacheSpaceConfig>>
where
    I: IntoIterator<Item = CacheSpaceDescriptor>,
{
    let mut seen = HashSet::new();
    let mut configs = Vec::new();

    for descriptor in descriptors {
        let name = descriptor.name.trim().to_string();
        if name.is_empty() {
            debug!("Skipping cache space descriptor without a name");
            continue;
        }
        if !seen.insert(name.clone()) {
            debug!(space = %name, "Dropping duplicate cache space definition");
            continue;
        }
        configs.push(descriptor.resolve()?);
    }

    Ok(configs)
}

/// Contents of a cache spaces configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Create local-only spaces on first use of an unknown name
    #[serde(default)]
    pub dynamic_fallback: bool,

    #[serde(default)]
    pub spaces: Vec<CacheSpaceDescriptor>,
}

impl RegistryConfig {
    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse cache spaces configuration")
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file: {:?}", path))
    }

    /// Default location: `<config dir>/twotier-cache/spaces.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("twotier-cache")
            .join("spaces.toml")
    }

    /// Validate and deduplicate the configured spaces
    pub fn resolve(&self) -> CacheResult<Vec<CacheSpaceConfig>> {
        resolve_spaces(self.spaces.iter().cloned())
    }
}
