//! `LockStore` implementation over a Redis connection

use std::time::Duration;

use async_trait::async_trait;
use kvlock_core::{LockStore, Script, ScriptKind, ScriptSet, StoreError};
use redis::aio::ConnectionManager;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::debug;

use crate::config::RedisConfig;

/// Redis-backed lock store.
///
/// Holds an auto-reconnecting connection manager and the three scripts
/// prepared at construction, so script identity lives with the connection
/// rather than in process-global state. Cloning is cheap; clones share the
/// underlying connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    extend: redis::Script,
    delete: redis::Script,
    read_ttl: redis::Script,
}

impl RedisStore {
    /// Connect to Redis and prepare the script set.
    pub async fn connect(config: &RedisConfig, scripts: &ScriptSet) -> Result<Self, StoreError> {
        let (host, port) = parse_addr(&config.addr)?;
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db: config.db,
                username: None,
                password: if config.password.is_empty() {
                    None
                } else {
                    Some(config.password.clone())
                },
                ..Default::default()
            },
        };

        let client = redis::Client::open(info)
            .map_err(|e| StoreError::with_source(format!("invalid redis connection info: {e}"), e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::with_source(format!("redis connect failed: {e}"), e))?;

        debug!(addr = %config.addr, db = config.db, "connected to redis lock store");
        Ok(Self::new(conn, scripts))
    }

    /// Wrap an existing connection manager.
    pub fn new(conn: ConnectionManager, scripts: &ScriptSet) -> Self {
        Self {
            conn,
            extend: redis::Script::new(scripts.extend.body()),
            delete: redis::Script::new(scripts.delete.body()),
            read_ttl: redis::Script::new(scripts.read_ttl.body()),
        }
    }

    fn script_for(&self, kind: ScriptKind) -> &redis::Script {
        match kind {
            ScriptKind::Extend => &self.extend,
            ScriptKind::Delete => &self.delete,
            ScriptKind::ReadTtl => &self.read_ttl,
        }
    }
}

#[async_trait]
impl LockStore for RedisStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        // SET NX PX replies OK when set, nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;

        Ok(reply.is_some())
    }

    async fn run_script(
        &self,
        script: &Script,
        key: &str,
        args: &[String],
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let prepared = self.script_for(script.kind());
        let mut invocation = prepared.prepare_invoke();
        invocation.key(key);
        for arg in args {
            invocation.arg(arg.as_str());
        }

        let result: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(result)
    }
}

fn transport(err: redis::RedisError) -> StoreError {
    StoreError::with_source(format!("redis: {err}"), err)
}

fn parse_addr(addr: &str) -> Result<(String, u16), StoreError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| StoreError::new(format!("invalid redis address '{addr}', expected host:port")))?;
    let port = port
        .parse()
        .map_err(|_| StoreError::new(format!("invalid redis port in '{addr}'")))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr() {
        assert_eq!(
            parse_addr("redis.internal:6380").unwrap(),
            ("redis.internal".to_string(), 6380)
        );
        assert!(parse_addr("no-port").is_err());
        assert!(parse_addr("host:nan").is_err());
    }
}
