//! Fixed server-side script set
//!
//! Three compare-then-act scripts, each atomic against a single key: the
//! store compares the key's current value with the caller's token and only
//! then renews, deletes, or reads the remaining TTL. Running the compare
//! and the action in one server-side step closes the race where the lock
//! expires and is re-acquired by another holder between a client-side read
//! and the follow-up write.
//!
//! Scripts are plain values constructed at store-client initialization and
//! injected into the lock factory; there is no process-global registry.

/// Which compare-then-act operation a script performs. Backends that do not
/// execute Lua dispatch on this instead of interpreting the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// Reset the key's expiry to a caller-supplied millisecond TTL.
    Extend,
    /// Delete the key.
    Delete,
    /// Read the key's remaining TTL in milliseconds.
    ReadTtl,
}

/// Returned by the read-ttl script when the stored value does not match the
/// caller's token, including when the key is absent. Distinguishable from
/// every value PTTL can produce (-2 missing, -1 no expiry, >= 0 remaining).
pub const NOT_OWNED_SENTINEL: i64 = -3;

const EXTEND_BODY: &str = r#"if redis.call("get", KEYS[1]) == ARGV[1] then return redis.call("pexpire", KEYS[1], ARGV[2]) else return 0 end"#;
const DELETE_BODY: &str = r#"if redis.call("get", KEYS[1]) == ARGV[1] then return redis.call("del", KEYS[1]) else return 0 end"#;
const READ_TTL_BODY: &str = r#"if redis.call("get", KEYS[1]) == ARGV[1] then return redis.call("pttl", KEYS[1]) else return -3 end"#;

/// One fixed server-side script. The body is Lua for Lua-speaking stores;
/// `kind` identifies the operation for everything else.
#[derive(Debug, Clone)]
pub struct Script {
    kind: ScriptKind,
    body: &'static str,
}

impl Script {
    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    pub fn body(&self) -> &'static str {
        self.body
    }
}

/// The three scripts a lock deployment uses. Immutable after construction;
/// torn down with the store connection.
#[derive(Debug, Clone)]
pub struct ScriptSet {
    pub extend: Script,
    pub delete: Script,
    pub read_ttl: Script,
}

impl ScriptSet {
    pub fn new() -> Self {
        Self {
            extend: Script {
                kind: ScriptKind::Extend,
                body: EXTEND_BODY,
            },
            delete: Script {
                kind: ScriptKind::Delete,
                body: DELETE_BODY,
            },
            read_ttl: Script {
                kind: ScriptKind::ReadTtl,
                body: READ_TTL_BODY,
            },
        }
    }
}

impl Default for ScriptSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_kinds() {
        let scripts = ScriptSet::new();
        assert_eq!(scripts.extend.kind(), ScriptKind::Extend);
        assert_eq!(scripts.delete.kind(), ScriptKind::Delete);
        assert_eq!(scripts.read_ttl.kind(), ScriptKind::ReadTtl);
    }

    #[test]
    fn test_script_bodies_compare_before_acting() {
        let scripts = ScriptSet::new();
        for script in [&scripts.extend, &scripts.delete, &scripts.read_ttl] {
            assert!(script.body().starts_with(r#"if redis.call("get", KEYS[1]) == ARGV[1]"#));
        }
        assert!(scripts.extend.body().contains("pexpire"));
        assert!(scripts.delete.body().contains("del"));
        assert!(scripts.read_ttl.body().contains("pttl"));
    }

    #[test]
    fn test_read_ttl_sentinel_matches_body() {
        let scripts = ScriptSet::new();
        assert!(
            scripts
                .read_ttl
                .body()
                .ends_with(&format!("return {} end", NOT_OWNED_SENTINEL))
        );
    }
}
