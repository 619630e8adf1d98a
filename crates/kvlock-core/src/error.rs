//! Error taxonomy for lock operations
//!
//! Every non-success outcome of a lock operation is one of the five
//! `LockError` kinds; there is no catch-all variant. Store failures are
//! always surfaced as `Transport`, never folded into `NotObtained` or
//! `NotHeld`, so callers can tell "someone else owns it" apart from "the
//! store is unreachable".

use std::time::Duration;

/// Application-visible lock errors
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The key is already held under a different token. Recoverable: retry,
    /// or treat the resource as owned by another process.
    #[error("lock not obtained")]
    NotObtained,

    /// The stored token did not match this mutex's token (including key
    /// absent). The caller no longer owns the lock.
    #[error("lock not held")]
    NotHeld,

    /// The spin-lock deadline elapsed without acquisition. Carries the total
    /// time waited.
    #[error("spin lock timed out after {0:?}")]
    SpinTimeout(Duration),

    /// The store could not be reached or returned an unrecognized error.
    /// Ownership state is unknown and must be treated as not held.
    #[error("store error: {0}")]
    Transport(#[from] StoreError),

    /// Secure randomness was unavailable while generating the fencing token.
    /// Mutex construction fails rather than falling back to a shared
    /// constant token, which would break ownership uniqueness.
    #[error("secure random source unavailable: {0}")]
    RandomSource(String),
}

/// Failure reported by a store backend.
///
/// Backends wrap their client errors in this type; it reaches callers as
/// `LockError::Transport`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
