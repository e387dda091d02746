use std::collections::HashMap;

use docrank_core::LexicalScoring;

use crate::index::LexicalIndex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalMatch {
    pub ordinal: usize,
    /// In `[0, 1]`: weighted share of the query's terms found in the document.
    pub score: f32,
}

impl LexicalIndex {
    /// Top `k` documents sharing at least one term with `query`, restricted to
    /// ordinals accepted by `accept`. Ties keep ascending ordinal order.
    pub fn search<F>(&self, query: &str, k: usize, accept: F) -> Vec<LexicalMatch>
    where
        F: Fn(usize) -> bool,
    {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let terms = self.analyzer.distinct_terms(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let weights: Vec<f32> = match self.scoring {
            LexicalScoring::Overlap => vec![1.0; terms.len()],
            LexicalScoring::IdfWeighted => terms.iter().map(|t| self.idf(t)).collect(),
        };
        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            return Vec::new();
        }

        let mut acc: HashMap<u32, f32> = HashMap::new();
        for (term, weight) in terms.iter().zip(&weights) {
            let Some(docs) = self.postings.get(term) else { continue };
            for &doc in docs {
                if accept(doc as usize) {
                    *acc.entry(doc).or_default() += weight;
                }
            }
        }

        let mut matches: Vec<LexicalMatch> = acc
            .into_iter()
            .map(|(doc, sum)| LexicalMatch { ordinal: doc as usize, score: sum / total })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.ordinal.cmp(&b.ordinal)));
        matches.truncate(k);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCS: [&str; 4] = [
        "P0420 catalyst efficiency below threshold",
        "Oil change: replace the oil filter",
        "Tire rotation every oil change",
        "Catalyst replacement cost",
    ];

    fn index(scoring: LexicalScoring) -> LexicalIndex {
        LexicalIndex::build(DOCS, scoring)
    }

    #[test]
    fn overlap_scores_are_term_fractions() {
        let hits = index(LexicalScoring::Overlap).search("oil filter", 10, |_| true);
        assert_eq!(hits[0], LexicalMatch { ordinal: 1, score: 1.0 });
        assert_eq!(hits[1], LexicalMatch { ordinal: 2, score: 0.5 });
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn idf_weighting_favours_rare_terms() {
        let idx = index(LexicalScoring::IdfWeighted);
        let hits = idx.search("catalyst p0420", 10, |_| true);
        assert_eq!(hits[0].ordinal, 0);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        // "catalyst" is in two docs, "p0420" in one, so catalyst alone is worth less than half.
        assert_eq!(hits[1].ordinal, 3);
        assert!(hits[1].score < 0.5);
    }

    #[test]
    fn unknown_terms_and_stop_words_match_nothing() {
        let idx = index(LexicalScoring::IdfWeighted);
        assert!(idx.search("nonexistent topic xyz", 5, |_| true).is_empty());
        assert!(idx.search("what is the", 5, |_| true).is_empty());
    }

    #[test]
    fn accept_filter_and_k_are_applied() {
        let idx = index(LexicalScoring::Overlap);
        let hits = idx.search("oil", 10, |ord| ord != 1);
        assert_eq!(hits.iter().map(|h| h.ordinal).collect::<Vec<_>>(), [2]);
        assert_eq!(idx.search("oil", 1, |_| true).len(), 1);
        assert!(idx.search("oil", 0, |_| true).is_empty());
    }

    #[test]
    fn empty_index_returns_nothing() {
        assert!(LexicalIndex::empty(LexicalScoring::Overlap).search("oil", 3, |_| true).is_empty());
    }
}
