//! docrank-hybrid
//!
//! The retrieval engine proper: a snapshot-swapped composite index over the
//! vector and lexical halves, weighted score fusion, heuristic reranking with
//! near-duplicate suppression, and the [`Retriever`] callers talk to.

pub mod classify;
pub mod format;
pub mod fusion;
pub mod index;
pub mod ingest;
pub mod persist;
pub mod rerank;
pub mod retriever;

pub use classify::classify;
pub use format::{citations, format_context, NO_RESULTS};
pub use fusion::Fusion;
pub use index::{Index, IndexStats, Snapshot};
pub use ingest::{IngestReport, Ingestor, SkippedDocument};
pub use persist::{load_index, save_index};
pub use rerank::{jaccard, Reranker};
pub use retriever::{DebugSearch, Retrieval, Retriever};
