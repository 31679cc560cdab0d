//! Cache spaces
//!
//! Two-tier coordination, single-tier spaces and the worker pool that runs
//! promotion checks.

pub mod coordinator;
pub mod single;
pub mod space;
pub mod worker;

pub use coordinator::{TierCoordinator, TierStats};
pub use single::SingleTierCache;
pub use space::CacheSpace;
pub use worker::WorkerPool;
