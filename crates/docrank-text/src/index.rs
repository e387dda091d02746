use std::collections::HashMap;

use docrank_core::LexicalScoring;
use tracing::debug;

use crate::analyzer::Analyzer;

/// Immutable inverted index over a fixed, ordered set of documents.
///
/// Documents are addressed by their ordinal (position in the build input);
/// callers keep the ordinal -> chunk mapping.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    pub(crate) analyzer: Analyzer,
    /// term -> ascending ordinals of documents containing it
    pub(crate) postings: HashMap<String, Vec<u32>>,
    pub(crate) num_docs: usize,
    pub(crate) scoring: LexicalScoring,
}

impl LexicalIndex {
    pub fn build<'a, I>(docs: I, scoring: LexicalScoring) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let analyzer = Analyzer::default();
        let mut postings: HashMap<String, Vec<u32>> = HashMap::new();
        let mut num_docs = 0usize;
        for (ordinal, text) in docs.into_iter().enumerate() {
            for term in analyzer.distinct_terms(text) {
                postings.entry(term).or_default().push(ordinal as u32);
            }
            num_docs += 1;
        }
        debug!(docs = num_docs, terms = postings.len(), "built lexical index");
        Self { analyzer, postings, num_docs, scoring }
    }

    pub fn empty(scoring: LexicalScoring) -> Self {
        Self::build(std::iter::empty(), scoring)
    }

    pub fn len(&self) -> usize {
        self.num_docs
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs == 0
    }

    pub fn scoring(&self) -> LexicalScoring {
        self.scoring
    }

    /// Number of documents containing `term` (already analyzed).
    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    /// BM25-style inverse document frequency; always positive.
    pub fn idf(&self, term: &str) -> f32 {
        let n = self.num_docs as f32;
        let df = self.doc_freq(term) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }
}
