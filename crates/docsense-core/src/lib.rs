//! # Docsense Core
//!
//! Pure, synchronous logic for Docsense: the chunk data model, text
//! normalization, section chunking, the embedding trait, the two-stage
//! categorizer, the immutable snapshot indexer, and the hybrid retrieval
//! engine.
//!
//! This crate contains no tokio, no HTTP client, and no logging. Network
//! access, scheduling, and configuration live in the `docsense` app crate.
//!
//! ## Data Flow
//!
//! ```text
//! sections ──▶ chunk ──▶ categorize ──▶ build_snapshot ──▶ SnapshotPublisher
//!                                                              │ (atomic swap)
//!                                                              ▼
//!                              query ◀── RetrievalEngine ◀── SnapshotReader
//! ```

pub mod categorize;
pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod normalize;
pub mod search;
pub mod snapshot;
pub mod stats;

pub use categorize::Categorizer;
pub use embedding::{CachedEmbedder, EmbedError, Embedder, HashEmbedder};
pub use index::{build_snapshot, IndexError, Snapshot};
pub use models::{Category, Chunk, Hit, QueryOutcome, QueryResult, Taxonomy};
pub use search::{QueryError, RetrievalEngine, RetrievalParams};
pub use snapshot::{snapshot_channel, SnapshotPublisher, SnapshotReader};
pub use stats::{MemoryStats, NoopStats, QueryObservation, StatsSink};
