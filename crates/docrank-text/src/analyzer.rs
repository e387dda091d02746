use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

pub const ANALYZER_NAME: &str = "text_with_stopwords";

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its",
    "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they",
    "them", "their", "there", "then", "than", "so", "if", "when", "where", "why", "how", "what", "which",
    "who", "whom", "whose", "can", "could", "should", "would", "may", "might", "must", "shall", "do",
    "does", "did", "have", "had", "having",
];

/// Case-folding, punctuation-splitting, stop-word-removing analyzer.
pub fn build_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
        .build()
}

/// Owns a tantivy analyzer and turns text into terms.
#[derive(Clone)]
pub struct Analyzer {
    inner: TextAnalyzer,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self { inner: build_analyzer() }
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").field("name", &ANALYZER_NAME).finish()
    }
}

impl Analyzer {
    /// All terms in order of appearance, duplicates included.
    pub fn terms(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.inner.clone();
        let mut stream = analyzer.token_stream(text);
        let mut terms = Vec::new();
        while stream.advance() {
            terms.push(stream.token().text.clone());
        }
        terms
    }

    /// Distinct terms in order of first appearance.
    pub fn distinct_terms(&self, text: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.terms(text).into_iter().filter(|t| seen.insert(t.clone())).collect()
    }
}
