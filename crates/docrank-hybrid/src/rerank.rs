//! Heuristic boosts and near-duplicate suppression applied after fusion.

use std::collections::HashSet;

use docrank_core::config::RerankSettings;
use docrank_core::{RankedResult, SearchHit};

#[derive(Debug, Clone, Default)]
pub struct Reranker {
    settings: RerankSettings,
}

fn word_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the lower-cased whitespace token sets.
pub fn jaccard(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let sa: HashSet<&str> = a.split_whitespace().collect();
    let sb: HashSet<&str> = b.split_whitespace().collect();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    sa.intersection(&sb).count() as f32 / union as f32
}

/// Number results `1..=n` in their current order.
pub fn assign_citations(results: &mut [RankedResult]) {
    for (i, r) in results.iter_mut().enumerate() {
        r.citation_key = (i + 1).to_string();
    }
}

impl Reranker {
    pub fn new(settings: RerankSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RerankSettings {
        &self.settings
    }

    /// Product of every boost that applies to `hit` for `query`.
    pub fn boost(&self, query: &str, hit: &SearchHit) -> f32 {
        let query_lower = query.trim().to_lowercase();
        let mut factor = 1.0;

        let topic_match = self
            .settings
            .topic_keywords
            .iter()
            .any(|(keyword, source)| query_lower.contains(keyword.as_str()) && hit.metadata.source == *source);
        if topic_match {
            factor *= self.settings.topic_boost;
        }

        let query_terms = word_tokens(&query_lower);
        let section_terms = word_tokens(&hit.metadata.section);
        if !query_terms.is_disjoint(&section_terms) {
            factor *= self.settings.header_boost;
        }

        if !query_lower.is_empty() && hit.content.to_lowercase().contains(&query_lower) {
            factor *= self.settings.phrase_boost;
        }
        factor
    }

    /// Boost, re-sort (ties by chunk id) and number the hits.
    pub fn rerank(&self, query: &str, hits: Vec<SearchHit>) -> Vec<RankedResult> {
        let mut ranked: Vec<RankedResult> = hits
            .into_iter()
            .map(|hit| {
                let relevance_score = hit.score * self.boost(query, &hit);
                RankedResult {
                    chunk_id: hit.chunk_id,
                    content: hit.content,
                    metadata: hit.metadata,
                    relevance_score,
                    original_score: hit.score,
                    citation_key: String::new(),
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        assign_citations(&mut ranked);
        ranked
    }

    /// Drop every result too similar to a higher-ranked one that was kept.
    /// Renumbers the survivors.
    pub fn dedup(&self, results: Vec<RankedResult>) -> Vec<RankedResult> {
        let threshold = self.settings.dedup_threshold;
        let mut kept: Vec<RankedResult> = Vec::with_capacity(results.len());
        for r in results {
            if kept.iter().all(|k| jaccard(&k.content, &r.content) <= threshold) {
                kept.push(r);
            }
        }
        assign_citations(&mut kept);
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrank_core::ChunkMetadata;
    use std::collections::BTreeMap;

    fn hit(id: &str, source: &str, section: &str, content: &str, score: f32) -> SearchHit {
        let metadata = ChunkMetadata { source: source.into(), section: section.into(), ..Default::default() };
        SearchHit { chunk_id: id.into(), content: content.into(), metadata, score }
    }

    fn reranker() -> Reranker {
        let mut topic_keywords = BTreeMap::new();
        topic_keywords.insert("fault".to_string(), "codes.md".to_string());
        Reranker::new(RerankSettings { topic_keywords, ..Default::default() })
    }

    #[test]
    fn boosts_compose_multiplicatively() {
        let r = reranker();
        let h = hit("x", "codes.md", "Codes > P0420", "fault p0420 means catalyst trouble", 1.0);
        let expected = 1.2 * 1.1 * 1.15;
        assert!((r.boost("fault p0420", &h) - expected).abs() < 1e-6);
        assert!((r.boost("catalyst", &h) - 1.15).abs() < 1e-6);
        assert!((r.boost("nothing here", &h) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn topic_boost_needs_matching_source() {
        let r = reranker();
        let h = hit("x", "other.md", "Other", "unrelated", 1.0);
        assert!((r.boost("fault", &h) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn header_boost_ignores_punctuation() {
        let r = Reranker::default();
        let h = hit("x", "a.md", "Guide > P0420", "body", 1.0);
        assert!((r.boost("What is P0420?", &h) - 1.1).abs() < 1e-6);
    }

    #[test]
    fn rerank_sorts_and_numbers() {
        let r = Reranker::default();
        let ranked = r.rerank(
            "oil",
            vec![hit("a", "s", "Tires", "tires", 0.5), hit("b", "s", "Oil", "oil", 0.5), hit("c", "s", "X", "x", 0.9)],
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
        assert_eq!(ranked.iter().map(|r| r.citation_key.as_str()).collect::<Vec<_>>(), ["1", "2", "3"]);
        assert_eq!(ranked[1].original_score, 0.5);
    }

    #[test]
    fn dedup_drops_near_copies_and_is_idempotent() {
        let r = Reranker::default();
        let text = "replace the oil filter and check the drain plug gasket for leaks today";
        let ranked = r.rerank(
            "oil",
            vec![
                hit("a", "s", "A", text, 0.9),
                hit("b", "s", "B", &format!("{text} please"), 0.8),
                hit("c", "s", "C", "rotate the tires", 0.7),
            ],
        );
        let once = r.dedup(ranked);
        assert_eq!(once.iter().map(|r| r.chunk_id.as_str()).collect::<Vec<_>>(), ["a", "c"]);
        assert_eq!(once[1].citation_key, "2");
        let twice = r.dedup(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn jaccard_of_disjoint_and_identical_text() {
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert_eq!(jaccard("A b", "a B"), 1.0);
        assert_eq!(jaccard("", ""), 0.0);
    }
}
