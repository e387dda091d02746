//! docrank-text
//!
//! Lexical half of the index: tantivy's analyzer chain for tokenization and an
//! in-memory inverted index scored by (optionally IDF-weighted) term overlap.

pub mod analyzer;
pub mod index;
pub mod search;

pub use analyzer::{build_analyzer, Analyzer};
pub use index::LexicalIndex;
pub use search::LexicalMatch;
