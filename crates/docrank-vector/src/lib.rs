//! docrank-vector
//!
//! Vector half of the index (exact cosine search over in-memory vectors) and
//! the LanceDB-backed corpus store used to persist chunks with their vectors.

pub mod index;
pub mod schema;
pub mod store;

pub use index::{IndexedVector, VectorIndex, VectorMatch};
pub use store::{content_hash, CorpusStore, StoredChunk};
