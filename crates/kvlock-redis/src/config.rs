//! Redis connection settings

use serde::Deserialize;

/// Connection settings for the Redis store backend.
///
/// Deserializable so the host application can embed it in its own
/// configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// `host:port` of the Redis server.
    pub addr: String,
    /// Logical database index.
    pub db: i64,
    /// Password, empty for none.
    pub password: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            db: 0,
            password: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RedisConfig::default();
        assert_eq!(config.addr, "127.0.0.1:6379");
        assert_eq!(config.db, 0);
        assert!(config.password.is_empty());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RedisConfig =
            serde_json::from_str(r#"{"addr":"redis.internal:6380","db":3}"#).unwrap();
        assert_eq!(config.addr, "redis.internal:6380");
        assert_eq!(config.db, 3);
        assert!(config.password.is_empty());
    }
}
