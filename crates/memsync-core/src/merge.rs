//! Merge engine - reconciles remote deltas into the local store
//!
//! The winner of two versions of a key is the greater of
//! `(stamp, tombstone, payload)`, where stamps compare by
//! `(counter, replica_id)`. Being a maximum over a total order, merging is
//! commutative, associative and idempotent, so replicas converge no matter
//! in which order or how often deltas arrive.

use crate::clock::VersionStamp;
use crate::cursor::PeerCursor;
use crate::delta::Delta;
use crate::store::{Change, ChangeOrigin, Store};
use crate::value::Value;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, trace, warn};

/// Outcome of comparing a remote version against the local one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Remote version wins and replaces the local one
    Accept,
    /// Local version wins
    Keep,
    /// Both are the same write
    Duplicate,
}

fn precedence(value: &Value) -> (VersionStamp, bool, &[u8]) {
    (value.stamp(), value.is_tombstone(), value.payload().as_ref())
}

/// Decide between a local and a remote version of the same key
pub fn resolve(local: &Value, remote: &Value) -> Resolution {
    match precedence(remote).cmp(&precedence(local)) {
        Ordering::Greater => Resolution::Accept,
        Ordering::Less => Resolution::Keep,
        Ordering::Equal => Resolution::Duplicate,
    }
}

/// The winning version of two candidates
pub fn merge_values<'a>(left: &'a Value, right: &'a Value) -> &'a Value {
    match resolve(left, right) {
        Resolution::Accept => right,
        Resolution::Keep | Resolution::Duplicate => left,
    }
}

/// A delta entry that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// Position of the entry in its delta
    pub index: usize,
    /// Raw key bytes as received
    pub key: Bytes,
    pub reason: String,
}

/// Accounting for one applied delta
///
/// Every input entry lands in exactly one of `applied`, `superseded` or
/// `rejected`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub applied: usize,
    /// Entries whose local version was newer or identical
    pub superseded: usize,
    pub rejected: Vec<Rejection>,
    /// Highest counter per replica among the valid entries
    pub watermarks: PeerCursor,
}

impl MergeReport {
    pub fn total(&self) -> usize {
        self.applied + self.superseded + self.rejected.len()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Applies deltas to a store under the per-key lock
pub struct MergeEngine<'a> {
    store: &'a Store,
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Apply every entry of a delta; bad entries are skipped and reported
    pub fn apply(&self, delta: &Delta, origin: ChangeOrigin) -> MergeReport {
        let mut report = MergeReport::default();

        for (index, raw) in delta.entries().iter().enumerate() {
            let (key, remote) = match raw.validate(index) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(
                        replica = %self.store.replica_id(),
                        origin = ?origin,
                        index,
                        error = %e,
                        "Rejected delta entry"
                    );
                    report.rejected.push(Rejection {
                        index,
                        key: raw.key.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let stamp = remote.stamp();
            report.watermarks.observe(&stamp);

            // Observe before taking the key lock: any later local write to
            // this key then stamps above the value stored here.
            self.store.clock().observe(stamp.counter);

            let gate = self.store.write_gate();
            let accepted = match self.store.entries().entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(remote);
                    true
                }
                Entry::Occupied(mut slot) => match resolve(slot.get(), &remote) {
                    Resolution::Accept => {
                        slot.insert(remote);
                        true
                    }
                    Resolution::Keep => false,
                    Resolution::Duplicate => {
                        if slot.get() != &remote {
                            warn!(key = %key, stamp = %stamp, "Conflicting contents for one stamp");
                        }
                        false
                    }
                },
            };
            drop(gate);

            if accepted {
                trace!(key = %key, stamp = %stamp, "Accepted remote write");
                report.applied += 1;
                self.store.publish(Change { key, stamp, origin });
            } else {
                report.superseded += 1;
            }
        }

        debug!(
            replica = %self.store.replica_id(),
            applied = report.applied,
            superseded = report.superseded,
            rejected = report.rejected.len(),
            "Delta merged"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ReplicaId;
    use crate::delta::{DeltaEntry, MAX_REMOTE_COUNTER};
    use crate::value::Key;

    fn value(payload: &'static str, counter: u64, replica: u128) -> Value {
        Value::live(payload, VersionStamp::new(ReplicaId::from_u128(replica), counter))
    }

    #[test]
    fn test_higher_counter_wins() {
        let local = value("old", 1, 9);
        let remote = value("new", 2, 1);
        assert_eq!(resolve(&local, &remote), Resolution::Accept);
        assert_eq!(resolve(&remote, &local), Resolution::Keep);
    }

    #[test]
    fn test_tie_broken_by_replica_id() {
        let low = value("a", 5, 1);
        let high = value("b", 5, 2);
        assert_eq!(merge_values(&low, &high), &high);
        assert_eq!(merge_values(&high, &low), &high);
    }

    #[test]
    fn test_same_write_is_duplicate() {
        let v = value("same", 3, 1);
        assert_eq!(resolve(&v, &v.clone()), Resolution::Duplicate);
    }

    #[test]
    fn test_tombstone_ordered_like_values() {
        let id = ReplicaId::from_u128(1);
        let live = Value::live("x", VersionStamp::new(id, 1));
        let tomb = Value::tombstone(VersionStamp::new(id, 2));
        assert_eq!(merge_values(&live, &tomb), &tomb);

        let revived = Value::live("y", VersionStamp::new(id, 3));
        assert_eq!(merge_values(&tomb, &revived), &revived);
    }

    #[tokio::test]
    async fn test_bad_entry_does_not_abort_batch() {
        let store = Store::new();
        let remote = ReplicaId::from_u128(5);
        let delta: Delta = vec![
            DeltaEntry::from_value(&Key::try_from("first").unwrap(), &value("1", 1, 5)),
            DeltaEntry {
                key: Bytes::from_static(b"broken"),
                payload: Bytes::from_static(b"x"),
                stamp: None,
                ..DeltaEntry::default()
            },
            DeltaEntry::from_value(&Key::try_from("third").unwrap(), &value("3", 2, 5)),
        ]
        .into();

        let report = store.apply_delta(&delta, ChangeOrigin::Peer(remote));

        assert_eq!(report.applied, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].index, 1);
        assert_eq!(report.rejected[0].key, Bytes::from_static(b"broken"));
        assert_eq!(report.total(), delta.len());
        assert_eq!(report.watermarks.watermark(&remote), 2);
        assert_eq!(store.read("first").await, Some(Bytes::from("1")));
        assert_eq!(store.read("third").await, Some(Bytes::from("3")));
        assert!(store.entry("broken").is_none());
    }

    #[tokio::test]
    async fn test_exhausting_counter_leaves_local_writes_working() {
        let store = Store::new();
        let poisoned = VersionStamp::new(ReplicaId::from_u128(6), u64::MAX);
        let delta: Delta = vec![DeltaEntry::from_value(
            &Key::try_from("k").unwrap(),
            &Value::live("poison", poisoned),
        )]
        .into();

        let report = store.apply_delta(&delta, ChangeOrigin::Remote);
        assert_eq!(report.applied, 0);
        assert_eq!(report.rejected.len(), 1);
        assert!(store.clock().current() < MAX_REMOTE_COUNTER);

        store.insert("k", "fine").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.read("k").await, None);
    }

    #[test]
    fn test_merge_laws() {
        let a = value("a", 4, 1);
        let b = value("b", 4, 2);
        let c = Value::tombstone(VersionStamp::new(ReplicaId::from_u128(3), 2));

        // commutative
        assert_eq!(merge_values(&a, &b), merge_values(&b, &a));
        // associative
        let left = merge_values(merge_values(&a, &b), &c);
        let right = merge_values(&a, merge_values(&b, &c));
        assert_eq!(left, right);
        // idempotent
        assert_eq!(merge_values(&a, &a), &a);
    }
}
