//! Deltas exchanged between replicas

use crate::clock::VersionStamp;
use crate::cursor::PeerCursor;
use crate::error::{Error, Result};
use crate::value::{Key, Value};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Highest version counter accepted from a remote entry
///
/// Observing a counter pulls the local clock up to it, so anything close to
/// `u64::MAX` would leave no room for further local writes.
pub const MAX_REMOTE_COUNTER: u64 = u64::MAX / 2;

/// One write as carried in a delta
///
/// Fields are kept loose so a structurally broken entry still decodes and
/// can be rejected on its own instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub key: Bytes,
    #[serde(default)]
    pub payload: Bytes,
    #[serde(default)]
    pub stamp: Option<VersionStamp>,
    #[serde(default)]
    pub tombstone: bool,
    /// Set by decoders that could not read the entry at all
    #[serde(skip)]
    pub decode_error: Option<String>,
}

impl DeltaEntry {
    /// Placeholder for an entry that failed to decode
    pub fn undecodable(reason: impl Into<String>) -> Self {
        Self {
            decode_error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn from_value(key: &Key, value: &Value) -> Self {
        Self {
            key: key.to_bytes(),
            payload: value.payload().clone(),
            stamp: Some(value.stamp()),
            tombstone: value.is_tombstone(),
            decode_error: None,
        }
    }

    /// Check the entry's structure and turn it into a storable pair
    pub fn validate(&self, index: usize) -> Result<(Key, Value)> {
        let malformed = |reason: String| Error::MalformedDelta { index, reason };

        if let Some(reason) = &self.decode_error {
            return Err(malformed(format!("undecodable entry: {}", reason)));
        }

        let key = Key::new(self.key.clone()).map_err(|e| malformed(e.to_string()))?;

        let stamp = self
            .stamp
            .ok_or_else(|| malformed("missing version stamp".into()))?;

        if stamp.counter == 0 {
            return Err(malformed("version counter must be positive".into()));
        }

        if stamp.counter > MAX_REMOTE_COUNTER {
            return Err(malformed(format!(
                "version counter {} exceeds {}",
                stamp.counter, MAX_REMOTE_COUNTER
            )));
        }

        if self.tombstone {
            if !self.payload.is_empty() {
                return Err(malformed("tombstone carries a payload".into()));
            }
            Ok((key, Value::tombstone(stamp)))
        } else {
            Ok((key, Value::live(self.payload.clone(), stamp)))
        }
    }
}

/// A batch of writes not yet known to be seen by a peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta {
    entries: Vec<DeltaEntry>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: DeltaEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DeltaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest counter per replica among the stamped entries
    pub fn summary(&self) -> PeerCursor {
        self.entries.iter().filter_map(|e| e.stamp).collect()
    }

    pub fn into_entries(self) -> Vec<DeltaEntry> {
        self.entries
    }
}

impl From<Vec<DeltaEntry>> for Delta {
    fn from(entries: Vec<DeltaEntry>) -> Self {
        Self { entries }
    }
}

impl FromIterator<DeltaEntry> for Delta {
    fn from_iter<I: IntoIterator<Item = DeltaEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Delta {
    type Item = DeltaEntry;
    type IntoIter = std::vec::IntoIter<DeltaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ReplicaId;

    fn entry(key: &str, stamp: Option<VersionStamp>) -> DeltaEntry {
        DeltaEntry {
            key: Bytes::copy_from_slice(key.as_bytes()),
            payload: Bytes::from_static(b"v"),
            stamp,
            tombstone: false,
            ..DeltaEntry::default()
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_entries() {
        let stamp = VersionStamp::new(ReplicaId::new(), 3);
        let (key, value) = entry("k", Some(stamp)).validate(0).unwrap();
        assert_eq!(key.as_bytes(), b"k");
        assert_eq!(value.stamp(), stamp);
    }

    #[test]
    fn test_validate_rejects_missing_stamp() {
        let err = entry("k", None).validate(4).unwrap_err();
        assert!(matches!(err, Error::MalformedDelta { index: 4, .. }));
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let stamp = VersionStamp::new(ReplicaId::new(), 1);
        assert!(entry("", Some(stamp)).validate(0).is_err());
        assert!(entry("k", Some(VersionStamp::new(stamp.replica_id, 0)))
            .validate(0)
            .is_err());

        let mut tomb = entry("k", Some(stamp));
        tomb.tombstone = true;
        assert!(tomb.validate(0).is_err());
        tomb.payload = Bytes::new();
        assert!(tomb.validate(0).unwrap().1.is_tombstone());
    }

    #[test]
    fn test_validate_rejects_exhausting_counters() {
        let replica = ReplicaId::new();
        let err = entry("k", Some(VersionStamp::new(replica, u64::MAX)))
            .validate(2)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedDelta { index: 2, .. }));

        assert!(entry("k", Some(VersionStamp::new(replica, MAX_REMOTE_COUNTER)))
            .validate(0)
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_undecodable_entry() {
        let err = DeltaEntry::undecodable("invalid type").validate(1).unwrap_err();
        assert!(err.to_string().contains("undecodable"));
    }

    #[test]
    fn test_summary_ignores_unstamped_entries() {
        let a = ReplicaId::from_u128(1);
        let delta: Delta = vec![
            entry("x", Some(VersionStamp::new(a, 2))),
            entry("y", None),
            entry("z", Some(VersionStamp::new(a, 7))),
        ]
        .into();

        assert_eq!(delta.summary().watermark(&a), 7);
    }
}
