//! memsync Core - replicated in-memory key-value store
//!
//! This crate provides the replica itself:
//! - The local store with versioned values and tombstones
//! - Per-replica version clocks and per-peer cursors
//! - The merge engine and the delta exchange used by sync sessions

pub mod blob;
pub mod clock;
pub mod cursor;
pub mod delta;
pub mod error;
pub mod exchange;
pub mod merge;
pub mod path;
pub mod store;
pub mod value;

pub use blob::{BlobError, BlobSource, MemoryBlobSource};
pub use clock::{ReplicaId, VersionClock, VersionStamp};
pub use cursor::{CursorTable, PeerCursor};
pub use delta::{Delta, DeltaEntry, MAX_REMOTE_COUNTER};
pub use error::{Error, Result};
pub use exchange::PeerExchange;
pub use merge::{merge_values, resolve, MergeEngine, MergeReport, Rejection, Resolution};
pub use path::{Depth, FolderPath, KeyPath};
pub use store::{Change, ChangeOrigin, Store, StoreStats};
pub use value::{Key, Value, MAX_KEY_LEN};

/// Create an empty store with a fresh replica ID
pub fn create_store() -> Store {
    Store::new()
}
