//! The current-snapshot cell shared by the refresher and the readers.
//!
//! [`snapshot_channel`] splits the cell into a unique [`SnapshotPublisher`]
//! and any number of [`SnapshotReader`]s. Readers take a lock-free `Arc`
//! of whatever snapshot is current; the publisher replaces it in a single
//! atomic swap. Readers holding an older `Arc` keep it alive until they
//! drop it.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::index::Snapshot;

/// Create a publisher/reader pair around an initial snapshot.
pub fn snapshot_channel(initial: Snapshot) -> (SnapshotPublisher, SnapshotReader) {
    let cell = Arc::new(ArcSwap::from_pointee(initial));
    (
        SnapshotPublisher { cell: cell.clone() },
        SnapshotReader { cell },
    )
}

/// Exclusive write handle. Not `Clone`: only one owner may publish.
pub struct SnapshotPublisher {
    cell: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotPublisher {
    /// Atomically install `next`, returning the retired snapshot.
    pub fn publish(&self, next: Arc<Snapshot>) -> Arc<Snapshot> {
        self.cell.swap(next)
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.cell.load_full()
    }

    /// A new read handle onto the same cell.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            cell: self.cell.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SnapshotReader {
    cell: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotReader {
    /// The snapshot current at the time of the call.
    pub fn load(&self) -> Arc<Snapshot> {
        self.cell.load_full()
    }

    pub fn version(&self) -> u64 {
        self.cell.load().version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::build_snapshot;
    use crate::models::Chunk;

    #[test]
    fn publish_swaps_and_returns_previous() {
        let (publisher, reader) = snapshot_channel(Snapshot::empty());
        let held = reader.load();
        assert_eq!(held.version(), 0);

        let next = build_snapshot(
            vec![Chunk::new(vec!["Setup".into()], 0, "Connect wallet")],
            &HashEmbedder::new(16),
            1,
        )
        .unwrap();
        let retired = publisher.publish(Arc::new(next));

        assert!(Arc::ptr_eq(&retired, &held));
        assert_eq!(reader.version(), 1);
        assert_eq!(reader.clone().load().len(), 1);
        // The earlier Arc is still valid.
        assert_eq!(held.version(), 0);
    }

    #[test]
    fn readers_share_one_cell() {
        let (publisher, reader) = snapshot_channel(Snapshot::empty());
        let other = publisher.reader();
        assert!(Arc::ptr_eq(&reader.load(), &other.load()));
        assert!(Arc::ptr_eq(&publisher.current(), &reader.load()));
    }
}
