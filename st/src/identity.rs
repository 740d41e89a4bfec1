//! Instance identity
//!
//! An instance id is 128 random bits rendered as a hyphenated UUID. It is
//! minted once per instance and must never be regenerated while the instance
//! lives, or the instance would stop recognizing its own claim.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Opaque, globally unique identity of one instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Mint a fresh id from 128 bits of randomness
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        let id = Self(Uuid::from_bytes(bytes).hyphenated().to_string());
        debug!(id = %id, "InstanceId::generate: minted");
        id
    }

    /// Wrap an id read back from a registry or signal
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for display
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

static PROCESS_IDENTITY: OnceLock<InstanceId> = OnceLock::new();

/// Identity of this process when it hosts exactly one instance
///
/// Generated on first call and returned unchanged afterwards.
pub fn process_identity() -> &'static InstanceId {
    PROCESS_IDENTITY.get_or_init(InstanceId::generate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_is_unique() {
        let ids: HashSet<InstanceId> = (0..1000).map(|_| InstanceId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_generate_is_uuid_shaped() {
        let id = InstanceId::generate();
        assert_eq!(id.as_str().len(), 36);
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_eq!(id.short().len(), 8);
    }

    #[test]
    fn test_process_identity_is_memoized() {
        let first = process_identity().clone();
        let second = process_identity().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_raw_roundtrip_and_comparison() {
        let id = InstanceId::from_raw("abc");
        assert_eq!(id.to_string(), "abc");
        assert_eq!(id, InstanceId::from_raw(String::from("abc")));
        assert_eq!(id.short(), "abc");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = InstanceId::from_raw("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
