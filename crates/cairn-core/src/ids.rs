//! Strongly-typed identifiers for domain entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let uuid_str = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }
    };
}

define_id!(BuildId, "bld");
define_id!(EventId, "evt");

/// Identity of a build rule, conventionally `//base/path:short_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Package path of the rule: the text between the `//` cell root and the `:`.
    pub fn base_path(&self) -> &str {
        let unrooted = self.0.strip_prefix("//").unwrap_or(&self.0);
        match unrooted.rsplit_once(':') {
            Some((base, _)) => base,
            None => unrooted,
        }
    }

    /// Rule name without its package path.
    pub fn short_name(&self) -> &str {
        let unrooted = self.0.strip_prefix("//").unwrap_or(&self.0);
        match unrooted.rsplit_once(':') {
            Some((_, short)) => short,
            None => unrooted.rsplit('/').next().unwrap_or(unrooted),
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fingerprint of a build result, used to address the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_id_display() {
        let id = BuildId::new();
        let s = id.to_string();
        assert!(s.starts_with("bld_"));
    }

    #[test]
    fn test_build_id_parse() {
        let id = BuildId::new();
        let s = id.to_string();
        let parsed: BuildId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_rule_id_parts() {
        let rule = RuleId::new("//java/com/example:lib");
        assert_eq!(rule.base_path(), "java/com/example");
        assert_eq!(rule.short_name(), "lib");
    }

    #[test]
    fn test_root_rule_id_parts() {
        let rule = RuleId::new("//:root");
        assert_eq!(rule.base_path(), "");
        assert_eq!(rule.short_name(), "root");
    }

    #[test]
    fn test_rule_id_without_colon() {
        let rule = RuleId::new("//tools/gen");
        assert_eq!(rule.base_path(), "tools/gen");
        assert_eq!(rule.short_name(), "gen");
    }

    #[test]
    fn test_cache_keys_order_lexicographically() {
        let mut keys = vec![CacheKey::new("b2"), CacheKey::new("a1")];
        keys.sort();
        assert_eq!(keys[0].as_str(), "a1");
    }
}
