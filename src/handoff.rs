//! Game thread -> render thread snapshot hand-off
//!
//! One publisher, one reader. Each publish swaps in a whole immutable
//! snapshot, so the reader sees either the previous value or the new one.
//! The lock is held only for the pointer swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

struct Shared<T> {
    slot: Mutex<Option<Arc<T>>>,
    version: AtomicU64,
}

/// Create a connected publisher/reader pair with nothing published yet.
pub fn snapshot_channel<T>() -> (SnapshotPublisher<T>, SnapshotReader<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(None),
        version: AtomicU64::new(0),
    });
    (
        SnapshotPublisher {
            shared: shared.clone(),
        },
        SnapshotReader {
            shared,
            last_version: 0,
        },
    )
}

/// Writing end, owned by the game thread
pub struct SnapshotPublisher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SnapshotPublisher<T> {
    /// Publish a new snapshot and return its version (starting at 1).
    pub fn publish(&self, snapshot: T) -> u64 {
        let snapshot = Arc::new(snapshot);
        let mut slot = self.shared.slot.lock();
        *slot = Some(snapshot);
        self.shared.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Most recently published snapshot, as seen from the writer side
    pub fn current(&self) -> Option<Arc<T>> {
        self.shared.slot.lock().clone()
    }

    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }
}

/// Reading end, owned by the render thread
pub struct SnapshotReader<T> {
    shared: Arc<Shared<T>>,
    last_version: u64,
}

impl<T> SnapshotReader<T> {
    pub fn latest(&self) -> Option<Arc<T>> {
        self.shared.slot.lock().clone()
    }

    /// The latest snapshot if it was published since the previous call
    pub fn take_update(&mut self) -> Option<Arc<T>> {
        let slot = self.shared.slot.lock();
        let version = self.shared.version.load(Ordering::Acquire);
        if version == self.last_version {
            return None;
        }
        self.last_version = version;
        slot.clone()
    }
}
