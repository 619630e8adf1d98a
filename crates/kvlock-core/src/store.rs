//! Store contract and in-process backend
//!
//! The lock depends only on the narrow capability set below: an atomic
//! set-if-absent with expiry and the execution of one of the fixed scripts.
//! Any key-value store that serializes these per key can back the lock.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::script::{NOT_OWNED_SENTINEL, Script, ScriptKind};

/// The store capabilities the lock depends on.
///
/// The store must serialize each call per key: two simultaneous
/// `set_if_absent` calls on the same key produce exactly one winner, and
/// each script runs its compare and its action as one atomic step.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically set `key` to `value` with expiry `ttl`, only if the key is
    /// currently absent. Returns true if the key was set, false if it was
    /// already present.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Execute one of the fixed scripts atomically against `key`.
    /// `args[0]` is always the caller's token.
    async fn run_script(
        &self,
        script: &Script,
        key: &str,
        args: &[String],
    ) -> Result<i64, StoreError>;
}

#[derive(Debug)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process store backend.
///
/// Entries expire lazily: an expired entry counts as absent on every access
/// path, so a key the store never touched again still frees up for the next
/// acquirer. Conditional mutations run under the map's per-key exclusive
/// guard, which gives the same single-winner guarantee a remote store
/// provides by serializing commands.
///
/// For coordination across processes, use a shared backend such as
/// `kvlock-redis` instead.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn run_extend(&self, key: &str, token: &str, args: &[String]) -> Result<i64, StoreError> {
        let ttl_ms: u64 = args
            .get(1)
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| StoreError::new("extend script requires a millisecond ttl argument"))?;

        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) && entry.value == token => {
                entry.expires_at = now + Duration::from_millis(ttl_ms);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn run_delete(&self, key: &str, token: &str) -> i64 {
        let now = Instant::now();
        let removed = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired(now) && entry.value == token);
        if removed.is_some() { 1 } else { 0 }
    }

    fn run_read_ttl(&self, key: &str, token: &str) -> i64 {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) && entry.value == token => {
                entry.expires_at.saturating_duration_since(now).as_millis() as i64
            }
            _ => NOT_OWNED_SENTINEL,
        }
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: now + ttl,
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_expired(now) => {
                occupied.insert(stored);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                Ok(true)
            }
        }
    }

    async fn run_script(
        &self,
        script: &Script,
        key: &str,
        args: &[String],
    ) -> Result<i64, StoreError> {
        let token = args
            .first()
            .ok_or_else(|| StoreError::new("script requires a token argument"))?;

        match script.kind() {
            ScriptKind::Extend => self.run_extend(key, token, args),
            ScriptKind::Delete => Ok(self.run_delete(key, token)),
            ScriptKind::ReadTtl => Ok(self.run_read_ttl(key, token)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptSet;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_set_if_absent_single_winner() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("k", "a", TTL).await.unwrap());
        assert!(!store.set_if_absent("k", "b", TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_counts_as_absent() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("k", "a", Duration::from_millis(500)).await.unwrap());
        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(store.set_if_absent("k", "b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_requires_matching_token() {
        let store = MemoryStore::new();
        let scripts = ScriptSet::new();

        store.set_if_absent("k", "a", TTL).await.unwrap();

        let miss = store
            .run_script(&scripts.delete, "k", &["b".to_string()])
            .await
            .unwrap();
        assert_eq!(miss, 0);
        assert!(!store.set_if_absent("k", "c", TTL).await.unwrap());

        let hit = store
            .run_script(&scripts.delete, "k", &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(hit, 1);
        assert!(store.set_if_absent("k", "c", TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_resets_expiry_for_holder_only() {
        let store = MemoryStore::new();
        let scripts = ScriptSet::new();

        store.set_if_absent("k", "a", Duration::from_millis(500)).await.unwrap();

        let denied = store
            .run_script(&scripts.extend, "k", &["b".to_string(), "5000".to_string()])
            .await
            .unwrap();
        assert_eq!(denied, 0);

        let renewed = store
            .run_script(&scripts.extend, "k", &["a".to_string(), "5000".to_string()])
            .await
            .unwrap();
        assert_eq!(renewed, 1);

        // Past the original expiry, still held thanks to the renewal.
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(!store.set_if_absent("k", "b", TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_ttl_sentinel_and_remaining() {
        let store = MemoryStore::new();
        let scripts = ScriptSet::new();

        store.set_if_absent("k", "a", Duration::from_millis(2000)).await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;

        let remaining = store
            .run_script(&scripts.read_ttl, "k", &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(remaining, 1500);

        let foreign = store
            .run_script(&scripts.read_ttl, "k", &["b".to_string()])
            .await
            .unwrap();
        assert_eq!(foreign, NOT_OWNED_SENTINEL);

        let absent = store
            .run_script(&scripts.read_ttl, "missing", &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(absent, NOT_OWNED_SENTINEL);
    }

    #[tokio::test]
    async fn test_script_without_token_is_a_store_error() {
        let store = MemoryStore::new();
        let scripts = ScriptSet::new();

        let err = store.run_script(&scripts.delete, "k", &[]).await;
        assert!(err.is_err());
    }
}
