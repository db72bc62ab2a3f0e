//! Replica identity and the per-replica version clock

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Identifier of one replica, assigned when its store is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    /// Generate a fresh random replica ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ReplicaId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Version attached to every stored value
///
/// Stamps are totally ordered by `(counter, replica_id)`. That order is the
/// conflict rule: the greater stamp wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    pub replica_id: ReplicaId,
    pub counter: u64,
}

impl VersionStamp {
    pub fn new(replica_id: ReplicaId, counter: u64) -> Self {
        Self { replica_id, counter }
    }
}

impl Ord for VersionStamp {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.replica_id.cmp(&other.replica_id))
    }
}

impl PartialOrd for VersionStamp {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.counter, self.replica_id)
    }
}

/// Logical clock owned by a single replica
///
/// Counters never wrap. Observing a remote counter lifts the local one so
/// the next local write orders after everything this replica has seen.
#[derive(Debug)]
pub struct VersionClock {
    replica_id: ReplicaId,
    counter: AtomicU64,
}

impl VersionClock {
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            counter: AtomicU64::new(0),
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Last counter issued or observed
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Issue the next stamp for a local write
    pub fn tick(&self) -> Result<VersionStamp> {
        let previous = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_add(1))
            .map_err(|_| Error::ClockOverflow {
                replica_id: self.replica_id,
            })?;

        Ok(VersionStamp::new(self.replica_id, previous + 1))
    }

    /// Record a counter seen on a remote write
    pub fn observe(&self, counter: u64) {
        self.counter.fetch_max(counter, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_strictly_increasing() {
        let clock = VersionClock::new(ReplicaId::new());
        let a = clock.tick().unwrap();
        let b = clock.tick().unwrap();
        assert_eq!(a.counter, 1);
        assert_eq!(b.counter, 2);
        assert!(b > a);
    }

    #[test]
    fn test_observe_lifts_counter() {
        let clock = VersionClock::new(ReplicaId::new());
        clock.tick().unwrap();
        clock.observe(41);
        assert_eq!(clock.tick().unwrap().counter, 42);

        // Observing an older counter never moves the clock back
        clock.observe(3);
        assert_eq!(clock.current(), 42);
    }

    #[test]
    fn test_overflow_is_reported() {
        let id = ReplicaId::new();
        let clock = VersionClock::new(id);
        clock.observe(u64::MAX);

        match clock.tick() {
            Err(Error::ClockOverflow { replica_id }) => assert_eq!(replica_id, id),
            other => panic!("expected overflow, got {:?}", other),
        }
        assert_eq!(clock.current(), u64::MAX);
    }

    #[test]
    fn test_stamp_order_counter_then_replica() {
        let low = ReplicaId::from_u128(1);
        let high = ReplicaId::from_u128(2);

        assert!(VersionStamp::new(low, 2) > VersionStamp::new(high, 1));
        assert!(VersionStamp::new(high, 1) > VersionStamp::new(low, 1));
    }

    #[test]
    fn test_replica_id_roundtrip_display() {
        let id = ReplicaId::new();
        let parsed: ReplicaId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
