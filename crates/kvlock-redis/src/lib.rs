//! Redis store backend for kvlock
//!
//! Implements the `LockStore` contract on top of a Redis connection:
//! set-if-absent maps to `SET key value NX PX ttl`, and the three fixed
//! scripts run server-side via EVALSHA (with EVAL fallback handled by the
//! client). Redis serializes both per key, which is all the lock needs for
//! its single-winner guarantee.

pub mod config;
pub mod store;

pub use config::RedisConfig;
pub use store::RedisStore;
