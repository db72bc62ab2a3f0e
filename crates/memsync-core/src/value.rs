//! Keys and versioned values

use crate::clock::VersionStamp;
use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};

/// Maximum key length in bytes
pub const MAX_KEY_LEN: usize = 512;

/// Store key - opaque bytes, 1 to 512 bytes long
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Bytes);

impl Key {
    /// Create a new key, validating its length
    pub fn new(key: impl Into<Bytes>) -> Result<Self> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    pub(crate) fn validate(raw: &[u8]) -> Result<()> {
        if raw.is_empty() {
            return Err(Error::InvalidKey("Key cannot be empty".into()));
        }

        if raw.len() > MAX_KEY_LEN {
            return Err(Error::InvalidKey(format!(
                "Key exceeds {} bytes",
                MAX_KEY_LEN
            )));
        }

        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }
}

// Hash must agree with `[u8]` so lookups can borrow the key as a slice.
impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_ref().hash(state);
    }
}

impl Borrow<[u8]> for Key {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&str> for Key {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Key::new(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl TryFrom<String> for Key {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Key::new(value)
    }
}

impl TryFrom<Vec<u8>> for Key {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self> {
        Key::new(value)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// A stored value: opaque payload plus version metadata
///
/// Tombstones record a logical delete and always carry an empty payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    payload: Bytes,
    stamp: VersionStamp,
    tombstone: bool,
}

impl Value {
    pub fn live(payload: impl Into<Bytes>, stamp: VersionStamp) -> Self {
        Self {
            payload: payload.into(),
            stamp,
            tombstone: false,
        }
    }

    pub fn tombstone(stamp: VersionStamp) -> Self {
        Self {
            payload: Bytes::new(),
            stamp,
            tombstone: true,
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn stamp(&self) -> VersionStamp {
        self.stamp
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    /// Payload if this value is live
    pub fn live_payload(&self) -> Option<&Bytes> {
        if self.tombstone {
            None
        } else {
            Some(&self.payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ReplicaId;

    #[test]
    fn test_key_valid() {
        assert!(Key::try_from("test").is_ok());
        assert!(Key::try_from(vec![0u8, 255, 7]).is_ok());
    }

    #[test]
    fn test_key_invalid() {
        assert!(Key::try_from("").is_err());
        assert!(Key::try_from("k".repeat(MAX_KEY_LEN + 1)).is_err());
        assert!(Key::try_from("k".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn test_tombstone_has_no_live_payload() {
        let stamp = VersionStamp::new(ReplicaId::new(), 1);
        assert_eq!(Value::live("x", stamp).live_payload(), Some(&Bytes::from("x")));
        assert!(Value::tombstone(stamp).live_payload().is_none());
        assert!(Value::tombstone(stamp).payload().is_empty());
    }
}
