//! Redis remote store
//!
//! Each cache space is a namespace `<prefix>:<space>`. An entry is a hash
//! holding the JSON-encoded value, its absolute write deadline and its idle
//! TTL. Lua scripts keep store-if-absent and read-with-idle-refresh atomic.
//! A members set per namespace tracks keys for `remove_all` and for
//! best-effort max-size enforcement.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::RemoteStore;
use crate::error::RemoteError;
use crate::value::{CacheKey, CacheValue, CachedValue};

/// KEYS: entry, members, config. ARGV: payload, ttl ms, idle ms.
const PUT_IF_ABSENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
local ttl = tonumber(ARGV[2])
local idle = tonumber(ARGV[3])
redis.call('HSET', KEYS[1], 'v', ARGV[1], 'deadline', now + ttl, 'idle', idle)
redis.call('PEXPIRE', KEYS[1], math.min(ttl, idle))
redis.call('SADD', KEYS[2], KEYS[1])
local max = tonumber(redis.call('HGET', KEYS[3], 'max') or '0')
if max > 0 then
  local excess = redis.call('SCARD', KEYS[2]) - max
  while excess > 0 do
    local victim = redis.call('SPOP', KEYS[2])
    if victim == KEYS[1] then
      redis.call('SADD', KEYS[2], victim)
      break
    end
    redis.call('DEL', victim)
    excess = excess - 1
  end
end
return 1
"#;

/// KEYS: entry, members. Returns the payload or nil.
const GET: &str = r#"
local vals = redis.call('HMGET', KEYS[1], 'v', 'deadline', 'idle')
if not vals[1] then
  redis.call('SREM', KEYS[2], KEYS[1])
  return false
end
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
local remaining = tonumber(vals[2]) - now
if remaining <= 0 then
  redis.call('DEL', KEYS[1])
  redis.call('SREM', KEYS[2], KEYS[1])
  return false
end
redis.call('PEXPIRE', KEYS[1], math.min(tonumber(vals[3]), remaining))
return vals[1]
"#;

/// KEYS: entry, members. Returns the number of deleted keys.
const REMOVE: &str = r#"
redis.call('SREM', KEYS[2], KEYS[1])
return redis.call('DEL', KEYS[1])
"#;

/// KEYS: members. Returns the number of tracked keys.
const REMOVE_ALL: &str = r#"
local members = redis.call('SMEMBERS', KEYS[1])
for _, k in ipairs(members) do
  redis.call('DEL', k)
end
redis.call('DEL', KEYS[1])
return #members
"#;

impl From<RedisError> for RemoteError {
    fn from(e: RedisError) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout(Duration::ZERO)
        } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            RemoteError::Unavailable(e.to_string())
        } else {
            RemoteError::Backend(e.to_string())
        }
    }
}

/// Remote store backed by a Redis server
pub struct RedisRemoteStore<K, V> {
    connection: ConnectionManager,
    /// `<prefix>:<space>`
    namespace: String,
    put_script: Script,
    get_script: Script,
    remove_script: Script,
    remove_all_script: Script,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> RedisRemoteStore<K, V> {
    /// Connect to `url` and bind to the namespace of one cache space
    pub async fn connect(url: &str, prefix: &str, space: &str) -> Result<Self, RemoteError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        info!(url = %url, prefix = %prefix, space = %space, "Connected to Redis");
        Ok(Self::with_connection(connection, prefix, space))
    }

    /// Bind an existing connection to the namespace of one cache space
    ///
    /// The connection manager is cheap to clone, so several spaces can
    /// share one.
    pub fn with_connection(connection: ConnectionManager, prefix: &str, space: &str) -> Self {
        Self {
            connection,
            namespace: format!("{}:{}", prefix, space),
            put_script: Script::new(PUT_IF_ABSENT),
            get_script: Script::new(GET),
            remove_script: Script::new(REMOVE),
            remove_all_script: Script::new(REMOVE_ALL),
            _types: PhantomData,
        }
    }

    fn members_key(&self) -> String {
        format!("{}:__members", self.namespace)
    }

    fn config_key(&self) -> String {
        format!("{}:__config", self.namespace)
    }
}

impl<K: Serialize, V> RedisRemoteStore<K, V> {
    /// Keys are JSON-encoded, so they never collide with the bookkeeping keys
    fn entry_key(&self, key: &K) -> Result<String, RemoteError> {
        Ok(format!("{}:{}", self.namespace, serde_json::to_string(key)?))
    }
}

fn millis(d: Duration) -> u64 {
    // PEXPIRE rejects 0
    (d.as_millis() as u64).max(1)
}

#[async_trait]
impl<K, V> RemoteStore<K, V> for RedisRemoteStore<K, V>
where
    K: CacheKey + Serialize,
    V: CacheValue + Serialize + DeserializeOwned,
{
    async fn get(&self, key: &K) -> Result<Option<CachedValue<V>>, RemoteError> {
        let entry_key = self.entry_key(key)?;
        let mut con = self.connection.clone();

        let payload: Option<String> = self
            .get_script
            .key(&entry_key)
            .key(self.members_key())
            .invoke_async(&mut con)
            .await?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_if_absent(
        &self,
        key: &K,
        value: CachedValue<V>,
        ttl: Duration,
        idle: Duration,
    ) -> Result<bool, RemoteError> {
        let entry_key = self.entry_key(key)?;
        let payload = serde_json::to_string(&value)?;
        let mut con = self.connection.clone();

        let stored: i64 = self
            .put_script
            .key(&entry_key)
            .key(self.members_key())
            .key(self.config_key())
            .arg(payload)
            .arg(millis(ttl))
            .arg(millis(idle))
            .invoke_async(&mut con)
            .await?;

        Ok(stored == 1)
    }

    async fn remove(&self, key: &K) -> Result<bool, RemoteError> {
        let entry_key = self.entry_key(key)?;
        let mut con = self.connection.clone();

        let deleted: i64 = self
            .remove_script
            .key(&entry_key)
            .key(self.members_key())
            .invoke_async(&mut con)
            .await?;

        Ok(deleted > 0)
    }

    async fn remove_all(&self) -> Result<(), RemoteError> {
        let mut con = self.connection.clone();

        let removed: i64 = self
            .remove_all_script
            .key(self.members_key())
            .invoke_async(&mut con)
            .await?;

        debug!(namespace = %self.namespace, removed = removed, "Cleared Redis namespace");
        Ok(())
    }

    async fn try_set_max_size(&self, max_size: u64) -> Result<bool, RemoteError> {
        let mut con = self.connection.clone();

        let applied: i64 = redis::cmd("HSETNX")
            .arg(self.config_key())
            .arg("max")
            .arg(max_size)
            .query_async(&mut con)
            .await?;

        Ok(applied == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_never_zero() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn test_redis_error_mapping() {
        let refused = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(RemoteError::from(refused), RemoteError::Unavailable(_)));

        let backend = RedisError::from((redis::ErrorKind::TypeError, "wrong type"));
        assert!(matches!(RemoteError::from(backend), RemoteError::Backend(_)));
    }
}
