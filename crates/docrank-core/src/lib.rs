//! docrank-core
//!
//! Shared data model, error taxonomy, configuration and the markdown chunker
//! used by every other docrank crate.

#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use chunker::{ChunkStatistics, MarkdownChunker};
pub use error::{Error, Result};
pub use loader::{DocumentLoader, SourceDocument};
pub use traits::Embedder;
pub use types::{
    Chunk, ChunkId, ChunkMetadata, LexicalScoring, MetadataFilter, QueryContext, RankedResult,
    SearchHit, SearchStrategy,
};
