//! Local caching layer
//!
//! The bounded in-process tier (Moka), the remote-hit accounting that
//! drives promotion into it, and the removal tombstones that keep late
//! tier moves from resurrecting evicted keys.

pub mod accounting;
pub mod local;
pub mod tombstones;

pub use accounting::{AccessAccounting, HitOutcome};
pub use local::{EvictionCause, EvictionEvent, EvictionEvents, LocalEntry, LocalSettings, LocalStore};
pub use tombstones::Tombstones;
