//! Keys and values as held by the tiers

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Bounds every cache key satisfies
pub trait CacheKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

/// Bounds every cached value satisfies
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

/// A value stored in a tier
///
/// `Null` is a cached absence: only stored by spaces that allow null values,
/// and distinct from a miss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachedValue<V> {
    Value(V),
    Null,
}

impl<V> CachedValue<V> {
    pub fn into_option(self) -> Option<V> {
        match self {
            CachedValue::Value(v) => Some(v),
            CachedValue::Null => None,
        }
    }
}

impl<V> From<Option<V>> for CachedValue<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(v) => CachedValue::Value(v),
            None => CachedValue::Null,
        }
    }
}
