//! Mutex state machine and factory
//!
//! A `Mutex` is bound to one resource key and one randomly generated token.
//! The token, not the key alone, proves ownership: release, renewal, and
//! TTL reads only act when the value stored under the key still equals this
//! mutex's token. A mutex holds no resource of its own; all lock state
//! lives in the store.
//!
//! Per-instance lifecycle: unacquired -> held (lock/spin_lock) -> released
//! (unlock), expired (lease elapses unrenewed), or superseded (another
//! token occupies the key, observable only as a failed unlock/extend/ttl).
//! The latter three are terminal; acquiring again is a fresh lock call.
//!
//! A mutex is not internally thread-safe. Its fields are read-only after
//! construction, but issuing concurrent operations on one instance is a
//! misuse the design does not protect against.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::TryRngCore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{LockError, StoreError};
use crate::script::ScriptSet;
use crate::store::LockStore;

/// How long the store keeps a lock entry that is never renewed or released.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(10);

/// Overall deadline for `spin_lock`.
pub const DEFAULT_SPIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between `spin_lock` attempts. Fixed interval, no backoff or
/// jitter; acceptable for an advisory lock with few waiters.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Constructs mutexes bound to one store connection and script set.
///
/// The script set is injected here, at the composition point, so scripts
/// live with the store connection instead of in process-global state.
pub struct LockFactory {
    store: Arc<dyn LockStore>,
    scripts: Arc<ScriptSet>,
    lease: Duration,
    spin_timeout: Duration,
    retry_interval: Duration,
}

impl LockFactory {
    pub fn new(store: Arc<dyn LockStore>, scripts: ScriptSet) -> Self {
        Self {
            store,
            scripts: Arc::new(scripts),
            lease: DEFAULT_LEASE,
            spin_timeout: DEFAULT_SPIN_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_spin_timeout(mut self, timeout: Duration) -> Self {
        self.spin_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Create a mutex for `key` with a fresh fencing token.
    ///
    /// Does not touch the store. Fails with `LockError::RandomSource` when
    /// secure randomness is unavailable; there is no constant-token
    /// fallback, since a token shared between instances would let one
    /// mutex pass another's ownership checks.
    pub fn new_mutex(&self, key: impl Into<String>) -> Result<Mutex, LockError> {
        Ok(Mutex {
            store: self.store.clone(),
            scripts: self.scripts.clone(),
            key: key.into(),
            token: generate_token()?,
            lease: self.lease,
            spin_timeout: self.spin_timeout,
            retry_interval: self.retry_interval,
        })
    }
}

/// 16 bytes from the OS entropy source, base64-encoded.
fn generate_token() -> Result<String, LockError> {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| LockError::RandomSource(e.to_string()))?;
    Ok(BASE64.encode(bytes))
}

/// Lock handle for one resource key.
pub struct Mutex {
    store: Arc<dyn LockStore>,
    scripts: Arc<ScriptSet>,
    key: String,
    token: String,
    lease: Duration,
    spin_timeout: Duration,
    retry_interval: Duration,
}

impl Mutex {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Single-shot, non-blocking acquisition.
    ///
    /// One atomic set-if-absent round trip, with a three-way outcome:
    /// - `Ok(())`: the key was absent and is now set; the caller holds the
    ///   lock until `unlock` or lease expiry.
    /// - `Err(NotObtained)`: the key was already present.
    /// - `Err(Transport)`: the store call failed; ownership is unknown and
    ///   must be treated as not held.
    pub async fn lock(&self) -> Result<(), LockError> {
        if self.obtain().await? {
            debug!(key = %self.key, "lock acquired");
            Ok(())
        } else {
            Err(LockError::NotObtained)
        }
    }

    /// Blocking acquisition with bounded retry.
    ///
    /// Retries the atomic set-if-absent at a fixed interval until it
    /// succeeds or the configured overall deadline elapses, then fails with
    /// `SpinTimeout`. The deadline is taken from a monotonic clock and is
    /// not extendable mid-call.
    pub async fn spin_lock(&self) -> Result<(), LockError> {
        self.spin_lock_until(Instant::now() + self.spin_timeout).await
    }

    /// `spin_lock` against a caller-supplied deadline, for threading an
    /// external cancellation bound through without changing the retry
    /// contract.
    ///
    /// Contention is retried silently. Transport errors are retried too,
    /// since network blips are expected mid-wait, but they are not allowed
    /// to masquerade as contention: if the deadline expires and the latest
    /// attempt failed in transport, that error surfaces instead of
    /// `SpinTimeout`.
    pub async fn spin_lock_until(&self, deadline: Instant) -> Result<(), LockError> {
        let started = Instant::now();
        let mut last_transport: Option<StoreError> = None;

        loop {
            match self.obtain().await {
                Ok(true) => {
                    debug!(key = %self.key, waited = ?started.elapsed(), "lock acquired");
                    return Ok(());
                }
                Ok(false) => {
                    last_transport = None;
                }
                Err(err) => {
                    warn!(key = %self.key, error = %err, "store error during spin lock, retrying");
                    last_transport = Some(err);
                }
            }

            let wake = Instant::now() + self.retry_interval;
            if wake >= deadline {
                // The next attempt would land past the deadline; wait the
                // remainder out so the call fails at the deadline, not early.
                tokio::time::sleep_until(deadline).await;
                return Err(match last_transport {
                    Some(err) => LockError::Transport(err),
                    None => LockError::SpinTimeout(started.elapsed()),
                });
            }
            tokio::time::sleep_until(wake).await;
        }
    }

    /// Atomic compare-and-delete release.
    ///
    /// Runs the delete script: the key is removed only if it still holds
    /// this mutex's token, in one server-side step. Returns `NotHeld` when
    /// the key is absent or holds a different token; a store failure is
    /// reported as `Transport`, never as `NotHeld`.
    pub async fn unlock(&self) -> Result<(), LockError> {
        let deleted = self
            .store
            .run_script(&self.scripts.delete, &self.key, &[self.token.clone()])
            .await?;

        if deleted == 1 {
            debug!(key = %self.key, "lock released");
            Ok(())
        } else {
            Err(LockError::NotHeld)
        }
    }

    /// Remaining lease time, or `None` when this mutex no longer owns the
    /// key. Not owning the lock is a normal outcome for a TTL read, not an
    /// error.
    pub async fn ttl(&self) -> Result<Option<Duration>, LockError> {
        let remaining = self
            .store
            .run_script(&self.scripts.read_ttl, &self.key, &[self.token.clone()])
            .await?;

        if remaining > 0 {
            Ok(Some(Duration::from_millis(remaining as u64)))
        } else {
            Ok(None)
        }
    }

    /// Reset the key's expiry to the full lease without releasing it.
    ///
    /// Keeps the lock alive past the original lease with no window where
    /// another process could take the key. Fails with `NotObtained` when
    /// the stored token no longer matches.
    pub async fn extend(&self) -> Result<(), LockError> {
        let lease_ms = self.lease.as_millis().to_string();
        let renewed = self
            .store
            .run_script(
                &self.scripts.extend,
                &self.key,
                &[self.token.clone(), lease_ms],
            )
            .await?;

        if renewed == 1 {
            debug!(key = %self.key, lease = ?self.lease, "lock extended");
            Ok(())
        } else {
            Err(LockError::NotObtained)
        }
    }

    async fn obtain(&self) -> Result<bool, StoreError> {
        self.store
            .set_if_absent(&self.key, &self.token, self.lease)
            .await
    }
}
