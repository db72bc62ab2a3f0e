//! Anti-entropy watermarks kept per peer

use crate::clock::{ReplicaId, VersionStamp};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Highest counter per replica already exchanged with one peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCursor {
    watermarks: BTreeMap<ReplicaId, u64>,
}

impl PeerCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watermark for a replica (0 when nothing was exchanged yet)
    pub fn watermark(&self, replica_id: &ReplicaId) -> u64 {
        self.watermarks.get(replica_id).copied().unwrap_or(0)
    }

    /// Whether a stamp is at or below the watermark of its replica
    pub fn covers(&self, stamp: &VersionStamp) -> bool {
        stamp.counter <= self.watermark(&stamp.replica_id)
    }

    /// Raise the watermark of the stamp's replica to include it
    pub fn observe(&mut self, stamp: &VersionStamp) {
        let mark = self.watermarks.entry(stamp.replica_id).or_insert(0);
        *mark = (*mark).max(stamp.counter);
    }

    /// Pointwise maximum with another cursor
    pub fn merge(&mut self, other: &PeerCursor) {
        for (replica_id, &counter) in &other.watermarks {
            let mark = self.watermarks.entry(*replica_id).or_insert(0);
            *mark = (*mark).max(counter);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.watermarks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, &u64)> {
        self.watermarks.iter()
    }
}

impl FromIterator<VersionStamp> for PeerCursor {
    fn from_iter<I: IntoIterator<Item = VersionStamp>>(iter: I) -> Self {
        let mut cursor = PeerCursor::new();
        for stamp in iter {
            cursor.observe(&stamp);
        }
        cursor
    }
}

/// Cursors of every peer this replica has synchronized with
///
/// Entries outlive sessions so a reconnecting peer resumes where it left off.
#[derive(Debug, Default)]
pub struct CursorTable {
    cursors: DashMap<ReplicaId, PeerCursor>,
}

impl CursorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor of a peer (empty if the peer is unknown)
    pub fn get(&self, peer: &ReplicaId) -> PeerCursor {
        self.cursors
            .get(peer)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Merge new watermarks into a peer's cursor, returning the result
    pub fn advance(&self, peer: ReplicaId, watermarks: &PeerCursor) -> PeerCursor {
        let mut entry = self.cursors.entry(peer).or_default();
        entry.merge(watermarks);
        entry.value().clone()
    }

    /// Drop everything known about a peer
    pub fn forget(&self, peer: &ReplicaId) -> bool {
        self.cursors.remove(peer).is_some()
    }

    pub fn peers(&self) -> Vec<ReplicaId> {
        self.cursors.iter().map(|entry| *entry.key()).collect()
    }

    pub fn snapshot(&self) -> BTreeMap<ReplicaId, PeerCursor> {
        self.cursors
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}
