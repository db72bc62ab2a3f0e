//! Local store - the replica's in-memory key-value map

use crate::clock::{ReplicaId, VersionClock, VersionStamp};
use crate::cursor::{CursorTable, PeerCursor};
use crate::delta::{Delta, DeltaEntry};
use crate::error::{Error, Result};
use crate::merge::{MergeEngine, MergeReport};
use crate::path::{Depth, FolderPath, KeyPath};
use crate::value::{Key, Value};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the change feed before slow subscribers start lagging
const CHANGE_FEED_CAPACITY: usize = 10_000;

/// Where a change to the store came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Local,
    /// Merged from a delta sent by this peer
    Peer(ReplicaId),
    /// Merged from a delta of unknown provenance
    Remote,
}

/// Notification published for every write that changed the store
#[derive(Debug, Clone)]
pub struct Change {
    pub key: Key,
    pub stamp: VersionStamp,
    pub origin: ChangeOrigin,
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub replica_id: ReplicaId,
    pub live_entries: usize,
    pub tombstones: usize,
    pub payload_bytes: usize,
    pub clock: u64,
    pub known_peers: usize,
    pub subscribers: usize,
}

/// A replica of the key-value store
///
/// Keys live in a sharded map, so writers of unrelated keys do not contend.
/// Every local write is stamped while its key's lock is held, which makes
/// issuance order and visibility order the same for a key.
///
/// Writes hold the scan gate shared while they stamp and insert; delta scans
/// hold it exclusively. A scan therefore never sees counter `n + 1` while a
/// write stamped `n` is still invisible in a shard it already passed.
pub struct Store {
    clock: VersionClock,
    gate: RwLock<()>,
    entries: DashMap<Key, Value>,
    cursors: CursorTable,
    changes: broadcast::Sender<Change>,
}

impl Store {
    /// Create an empty store with a fresh replica ID
    pub fn new() -> Self {
        Self::with_replica_id(ReplicaId::new())
    }

    pub fn with_replica_id(replica_id: ReplicaId) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        Self {
            clock: VersionClock::new(replica_id),
            gate: RwLock::new(()),
            entries: DashMap::new(),
            cursors: CursorTable::new(),
            changes,
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.clock.replica_id()
    }

    pub fn clock(&self) -> &VersionClock {
        &self.clock
    }

    pub(crate) fn entries(&self) -> &DashMap<Key, Value> {
        &self.entries
    }

    /// Held by every writer; taken before any entry lock
    pub(crate) fn write_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read()
    }

    /// Watermarks of every peer this replica synchronized with
    pub fn cursors(&self) -> &CursorTable {
        &self.cursors
    }

    /// Read the current payload of a key
    ///
    /// Returns `None` when the key was never written or has been deleted.
    pub async fn read(&self, key: impl AsRef<[u8]>) -> Option<Bytes> {
        self.entries
            .get(key.as_ref())
            .and_then(|entry| entry.value().live_payload().cloned())
    }

    /// Create or overwrite a key
    pub async fn insert(
        &self,
        key: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Result<VersionStamp> {
        let key = Key::new(key)?;
        let payload = payload.into();
        self.write_local(key, |stamp| Value::live(payload, stamp))
    }

    /// Logically delete a key by writing a tombstone
    pub async fn delete(&self, key: impl Into<Bytes>) -> Result<VersionStamp> {
        let key = Key::new(key)?;
        self.write_local(key, Value::tombstone)
    }

    /// Store a value encoded as JSON
    pub async fn insert_json<T: Serialize>(
        &self,
        key: impl Into<Bytes>,
        value: &T,
    ) -> Result<VersionStamp> {
        let payload =
            serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.insert(key, payload).await
    }

    /// Read a value previously stored as JSON
    pub async fn read_json<T: DeserializeOwned>(&self, key: impl AsRef<[u8]>) -> Result<Option<T>> {
        match self.read(key).await {
            Some(payload) => serde_json::from_slice(&payload)
                .map(Some)
                .map_err(|e| Error::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn write_local(&self, key: Key, make: impl FnOnce(VersionStamp) -> Value) -> Result<VersionStamp> {
        let gate = self.write_gate();
        let stamp = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                let stamp = self.clock.tick()?;
                slot.insert(make(stamp));
                stamp
            }
            Entry::Vacant(slot) => {
                let stamp = self.clock.tick()?;
                slot.insert(make(stamp));
                stamp
            }
        };
        drop(gate);

        debug!(key = %key, stamp = %stamp, "Local write");
        self.publish(Change {
            key,
            stamp,
            origin: ChangeOrigin::Local,
        });

        Ok(stamp)
    }

    /// Current version of a key, tombstones included
    pub fn entry(&self, key: impl AsRef<[u8]>) -> Option<Value> {
        self.entries.get(key.as_ref()).map(|r| r.value().clone())
    }

    /// Live keys matching a pattern (glob syntax)
    pub fn keys(&self, pattern: Option<&str>) -> Vec<Key> {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_tombstone())
            .filter(|entry| {
                pattern.map_or(true, |p| matches_pattern(entry.key().as_bytes(), p.as_bytes()))
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Live keys in `folder`, sorted; `Recursive` includes subfolders
    pub fn list(&self, folder: &FolderPath, depth: Depth) -> Vec<Key> {
        let mut keys: Vec<Key> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_tombstone())
            .filter(|entry| folder.holds(entry.key().as_bytes(), depth))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Writes whose counter is above the cursor's watermark for their replica
    pub fn compute_outgoing_delta(&self, cursor: &PeerCursor) -> Delta {
        self.scan(|_, value| !cursor.covers(&value.stamp()))
    }

    /// Every entry at or below `scope`, tombstones included
    ///
    /// The batch is a partial view, so its summary must not be used to
    /// advance a peer's cursor.
    pub fn scoped_delta(&self, scope: &KeyPath) -> Delta {
        self.scan(|key, _| scope.covers(key.as_bytes()))
    }

    fn scan(&self, mut keep: impl FnMut(&Key, &Value) -> bool) -> Delta {
        let _gate = self.gate.write();
        self.entries
            .iter()
            .filter(|entry| keep(entry.key(), entry.value()))
            .map(|entry| DeltaEntry::from_value(entry.key(), entry.value()))
            .collect()
    }

    /// Every entry, tombstones included
    pub fn full_delta(&self) -> Delta {
        self.compute_outgoing_delta(&PeerCursor::new())
    }

    /// Merge a remote delta into this store
    pub fn apply_delta(&self, delta: &Delta, origin: ChangeOrigin) -> MergeReport {
        MergeEngine::new(self).apply(delta, origin)
    }

    /// Subscribe to the change feed
    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    pub(crate) fn publish(&self, change: Change) {
        // No subscribers is fine: deltas are derived from the map itself.
        let _ = self.changes.send(change);
    }

    /// Ordered copy of the whole map
    pub fn snapshot(&self) -> BTreeMap<Key, Value> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let mut live_entries = 0;
        let mut tombstones = 0;
        let mut payload_bytes = 0;

        for entry in self.entries.iter() {
            if entry.value().is_tombstone() {
                tombstones += 1;
            } else {
                live_entries += 1;
                payload_bytes += entry.value().payload().len();
            }
        }

        StoreStats {
            replica_id: self.replica_id(),
            live_entries,
            tombstones,
            payload_bytes,
            clock: self.clock.current(),
            known_peers: self.cursors.len(),
            subscribers: self.changes.receiver_count(),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("replica_id", &self.replica_id())
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Simple glob pattern matching
fn matches_pattern(key: &[u8], pattern: &[u8]) -> bool {
    if pattern == b"*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix(b"*") {
        return key.starts_with(prefix);
    }

    if let Some(suffix) = pattern.strip_prefix(b"*") {
        return key.ends_with(suffix);
    }

    key == pattern
}
