//! twotier-cache - Two-tier cache spaces
//!
//! Named cache spaces that combine a bounded in-process tier with a shared
//! remote tier. Entries are demoted to the remote tier when the local tier
//! overflows, or promoted into the local tier once they are read often
//! enough, depending on each space's configuration.

pub mod cache;
pub mod config;
pub mod error;
pub mod partition;
pub mod registry;
pub mod remote;
pub mod tier;
pub mod value;

pub use config::{
    resolve_spaces, CacheChangeStrategy, CachePriority, CacheSpaceConfig, CacheSpaceDescriptor,
    LocalEviction, RegistryConfig,
};
pub use error::{CacheError, CacheResult, RemoteError};
pub use partition::{partition, TierCapacity};
pub use registry::CacheRegistry;
pub use remote::{MemoryRemoteStore, RemoteStats, RemoteStore};
#[cfg(feature = "redis-store")]
pub use remote::RedisRemoteStore;
pub use tier::{CacheSpace, SingleTierCache, TierCoordinator, TierStats};
pub use value::{CacheKey, CacheValue, CachedValue};
