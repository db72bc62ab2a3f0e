//! Delta exchange with a single peer
//!
//! `PeerExchange` holds the transport-independent half of a sync session:
//! which writes still have to reach the peer, which outgoing batch awaits an
//! acknowledgement, and how the peer's cursor moves as batches flow.

use crate::clock::{ReplicaId, VersionStamp};
use crate::cursor::PeerCursor;
use crate::delta::{Delta, DeltaEntry};
use crate::merge::MergeReport;
use crate::path::KeyPath;
use crate::store::{ChangeOrigin, Store};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// An outgoing batch the peer has not acknowledged yet
#[derive(Debug, Clone)]
struct InFlight {
    seq: u64,
    summary: PeerCursor,
    entries: Vec<DeltaEntry>,
}

/// Sync state between the local store and one peer
pub struct PeerExchange {
    store: Arc<Store>,
    peer: ReplicaId,
    pending: Vec<DeltaEntry>,
    in_flight: Option<InFlight>,
    next_seq: u64,
}

impl PeerExchange {
    pub fn new(store: Arc<Store>, peer: ReplicaId) -> Self {
        Self {
            store,
            peer,
            pending: Vec::new(),
            in_flight: None,
            next_seq: 1,
        }
    }

    /// Carry over entries a previous connection never got acknowledged
    pub fn with_pending(mut self, pending: Vec<DeltaEntry>) -> Self {
        self.pending.extend(pending);
        self
    }

    pub fn peer(&self) -> ReplicaId {
        self.peer
    }

    /// The peer's cursor as currently recorded by the store
    pub fn cursor(&self) -> PeerCursor {
        self.store.cursors().get(&self.peer)
    }

    /// Build the next outgoing batch
    ///
    /// Contains every local write above the peer's watermarks (or every
    /// entry when `full` is set) plus anything still unacknowledged. An
    /// unacknowledged batch is superseded by the new one.
    pub fn compute_outgoing_delta(&mut self, full: bool) -> (u64, Delta) {
        if let Some(previous) = self.in_flight.take() {
            debug!(peer = %self.peer, seq = previous.seq, entries = previous.entries.len(), "Resending unacknowledged entries");
            self.pending.extend(previous.entries);
        }

        let scanned = if full {
            self.store.full_delta()
        } else {
            self.store.compute_outgoing_delta(&self.cursor())
        };

        let pending = std::mem::take(&mut self.pending);
        let entries = dedup_by_key(pending.into_iter().chain(scanned));
        let delta = Delta::from(entries.clone());
        let seq = self.next_seq;
        self.next_seq += 1;

        self.in_flight = Some(InFlight {
            seq,
            summary: delta.summary(),
            entries,
        });

        (seq, delta)
    }

    /// Build an on-demand batch of every entry under `scope`
    ///
    /// Unacknowledged entries under the scope ride along; the rest wait for
    /// the next cursor round. Acknowledging a scoped batch leaves the cursor
    /// where it was.
    pub fn compute_scoped_delta(&mut self, scope: &KeyPath) -> (u64, Delta) {
        if let Some(previous) = self.in_flight.take() {
            self.pending.extend(previous.entries);
        }

        let (carried, rest): (Vec<DeltaEntry>, Vec<DeltaEntry>) = self
            .pending
            .drain(..)
            .partition(|entry| scope.covers(&entry.key));
        self.pending = rest;

        let entries = dedup_by_key(carried.into_iter().chain(self.store.scoped_delta(scope)));
        let delta = Delta::from(entries.clone());
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(peer = %self.peer, seq, scope = %scope, entries = delta.len(), "Scoped delta");

        self.in_flight = Some(InFlight {
            seq,
            summary: PeerCursor::new(),
            entries,
        });

        (seq, delta)
    }

    /// Merge a batch received from the peer and advance its cursor
    pub fn apply_incoming_delta(&mut self, delta: &Delta) -> MergeReport {
        let report = self.store.apply_delta(delta, ChangeOrigin::Peer(self.peer));
        self.store.cursors().advance(self.peer, &report.watermarks);
        report
    }

    /// Merge a scoped batch without touching the peer's cursor
    pub fn apply_partial_delta(&mut self, delta: &Delta) -> MergeReport {
        self.store.apply_delta(delta, ChangeOrigin::Peer(self.peer))
    }

    /// Record the peer's acknowledgement of an outgoing batch
    ///
    /// Returns false if `seq` is not the batch currently awaiting an ack.
    pub fn acknowledge(&mut self, seq: u64) -> bool {
        match self.in_flight.take() {
            Some(batch) if batch.seq == seq => {
                self.store.cursors().advance(self.peer, &batch.summary);
                true
            }
            other => {
                warn!(peer = %self.peer, seq, "Acknowledgement for unknown batch");
                self.in_flight = other;
                false
            }
        }
    }

    pub fn has_unacknowledged(&self) -> bool {
        self.in_flight.is_some() || !self.pending.is_empty()
    }

    /// Entries that still need to reach the peer
    pub fn into_pending(mut self) -> Vec<DeltaEntry> {
        if let Some(batch) = self.in_flight.take() {
            self.pending.extend(batch.entries);
        }
        self.pending
    }
}

/// Newest entry per key, ordered by key
fn dedup_by_key(entries: impl IntoIterator<Item = DeltaEntry>) -> Vec<DeltaEntry> {
    let mut by_key: BTreeMap<Bytes, DeltaEntry> = BTreeMap::new();
    for entry in entries {
        match by_key.get(&entry.key) {
            Some(existing) if precedence(existing) >= precedence(&entry) => {}
            _ => {
                by_key.insert(entry.key.clone(), entry);
            }
        }
    }
    by_key.into_values().collect()
}

fn precedence(entry: &DeltaEntry) -> (Option<VersionStamp>, bool, &[u8]) {
    (entry.stamp, entry.tombstone, entry.payload.as_ref())
}
