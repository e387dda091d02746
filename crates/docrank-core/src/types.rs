//! Domain types used by the chunker, both index halves and the retriever.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;

/// Build the identifier of the `seq`-th chunk of `source`.
pub fn chunk_id(source: &str, seq: usize) -> ChunkId {
    format!("{source}:chunk{seq:05}")
}

/// Provenance attached to every chunk.
///
/// Named fields cover what the chunker always knows; `extra` keeps any other
/// key/value pairs (e.g. from a newer persisted layout) without loss.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub document: String,
    pub section: String,
    pub h1: Option<String>,
    pub h2: Option<String>,
    pub h3: Option<String>,
    pub chunk_num: usize,
    pub char_count: usize,
    pub key_terms: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

impl ChunkMetadata {
    /// Look up a field by its flat key name.
    pub fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        match key {
            "source" => Some(Cow::Borrowed(&self.source)),
            "document" => Some(Cow::Borrowed(&self.document)),
            "section" => Some(Cow::Borrowed(&self.section)),
            "h1" => self.h1.as_deref().map(Cow::Borrowed),
            "h2" => self.h2.as_deref().map(Cow::Borrowed),
            "h3" => self.h3.as_deref().map(Cow::Borrowed),
            "chunk_num" => Some(Cow::Owned(self.chunk_num.to_string())),
            "char_count" => Some(Cow::Owned(self.char_count.to_string())),
            "key_terms" if !self.key_terms.is_empty() => Some(Cow::Owned(self.key_terms.join(", "))),
            other => self.extra.get(other).map(|v| Cow::Borrowed(v.as_str())),
        }
    }

    /// Flatten into the ordered string map used by the persisted layout.
    /// Absent optional fields are omitted rather than stored empty.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.extra.clone();
        map.insert("source".into(), self.source.clone());
        map.insert("document".into(), self.document.clone());
        map.insert("section".into(), self.section.clone());
        map.insert("chunk_num".into(), self.chunk_num.to_string());
        map.insert("char_count".into(), self.char_count.to_string());
        for (key, value) in [("h1", &self.h1), ("h2", &self.h2), ("h3", &self.h3)] {
            if let Some(v) = value {
                map.insert(key.into(), v.clone());
            }
        }
        if !self.key_terms.is_empty() {
            map.insert("key_terms".into(), self.key_terms.join(", "));
        }
        map
    }

    /// Inverse of [`ChunkMetadata::to_map`]. Unknown keys land in `extra`.
    pub fn from_map(mut map: BTreeMap<String, String>) -> Self {
        let parse_num = |v: Option<String>| v.and_then(|s| s.parse().ok()).unwrap_or_default();
        let key_terms = map
            .remove("key_terms")
            .map(|s| s.split(", ").filter(|t| !t.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            source: map.remove("source").unwrap_or_default(),
            document: map.remove("document").unwrap_or_default(),
            section: map.remove("section").unwrap_or_default(),
            h1: map.remove("h1"),
            h2: map.remove("h2"),
            h3: map.remove("h3"),
            chunk_num: parse_num(map.remove("chunk_num")),
            char_count: parse_num(map.remove("char_count")),
            key_terms,
            extra: map,
        }
    }
}

/// An immutable retrievable unit of document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(seq: usize, content: String, metadata: ChunkMetadata) -> Self {
        Self { id: chunk_id(&metadata.source, seq), content, metadata }
    }
}

/// Exact key/value equality on one or more metadata fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter(BTreeMap<String, String>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(source: impl Into<String>) -> Self {
        Self::new().with("source", source)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The pinned `source` value, if the filter has one.
    pub fn source_value(&self) -> Option<&str> {
        self.0.get("source").map(String::as_str)
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.0.iter().all(|(key, want)| metadata.get(key).is_some_and(|have| have == want.as_str()))
    }
}

/// Result of a single search pass. `score` is strategy-specific; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

impl SearchHit {
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self { chunk_id: chunk.id.clone(), content: chunk.content.clone(), metadata: chunk.metadata.clone(), score }
    }
}

/// A hit after fusion and reranking, ready to be cited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk_id: ChunkId,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub relevance_score: f32,
    pub original_score: f32,
    /// 1-based position within one response.
    pub citation_key: String,
}

impl RankedResult {
    /// Render this result as one block of a prompt context.
    pub fn format_for_context(&self) -> String {
        format!(
            "[{}] {} \u{2014} {}\n\n{}\n",
            self.citation_key, self.metadata.source, self.metadata.section, self.content
        )
    }

    pub fn format_citation(&self) -> String {
        format!("[{}] {} ({})", self.citation_key, self.metadata.section, self.metadata.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Semantic,
    Lexical,
    Hybrid,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchStrategy::Semantic => "semantic",
            SearchStrategy::Lexical => "lexical",
            SearchStrategy::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

impl FromStr for SearchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" | "vector" => Ok(SearchStrategy::Semantic),
            "lexical" | "keyword" => Ok(SearchStrategy::Lexical),
            "hybrid" => Ok(SearchStrategy::Hybrid),
            other => Err(Error::InvalidArgument(format!("unknown search strategy '{other}'"))),
        }
    }
}

/// How lexical matches are scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalScoring {
    /// Fraction of distinct query terms present in the chunk.
    Overlap,
    /// Same fraction, each term weighted by its inverse document frequency.
    #[default]
    IdfWeighted,
}

/// The current query plus prior conversational turns, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    pub query: String,
    pub history: Vec<String>,
}

impl QueryContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), history: Vec::new() }
    }

    pub fn with_history<I, S>(mut self, turns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.history.extend(turns.into_iter().map(Into::into));
        self
    }

    /// Text used for searching: up to `turns` most recent prior turns, then the query.
    pub fn search_text(&self, turns: usize) -> String {
        let start = self.history.len().saturating_sub(turns);
        self.history[start..]
            .iter()
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .chain(std::iter::once(self.query.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
