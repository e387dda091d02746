use std::collections::BTreeMap;

use docrank_core::config::FusionSettings;
use docrank_core::{ChunkId, Error, MetadataFilter, Result, SearchHit};

use crate::index::Snapshot;

/// Weighted linear fusion of vector and lexical scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fusion {
    vector_weight: f32,
}

impl Default for Fusion {
    fn default() -> Self {
        Self::new(&FusionSettings::default())
    }
}

impl Fusion {
    pub fn new(settings: &FusionSettings) -> Self {
        Self { vector_weight: settings.vector_weight.clamp(0.0, 1.0) }
    }

    pub fn vector_weight(&self) -> f32 {
        self.vector_weight
    }

    /// `w * v + (1 - w) * l`; a side the chunk did not appear in counts as 0.
    pub fn combine(&self, vector: Option<f32>, lexical: Option<f32>) -> f32 {
        let w = self.vector_weight;
        w * vector.unwrap_or(0.0) + (1.0 - w) * lexical.unwrap_or(0.0)
    }

    /// Merge two result lists by chunk id into one list of at most `k`,
    /// highest combined score first, ties by chunk id.
    pub fn fuse(&self, vector: Vec<SearchHit>, lexical: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
        let mut merged: BTreeMap<ChunkId, (SearchHit, Option<f32>, Option<f32>)> = BTreeMap::new();
        for hit in vector {
            let score = hit.score;
            merged.entry(hit.chunk_id.clone()).or_insert_with(|| (hit, None, None)).1 = Some(score);
        }
        for hit in lexical {
            let score = hit.score;
            merged.entry(hit.chunk_id.clone()).or_insert_with(|| (hit, None, None)).2 = Some(score);
        }
        let mut fused: Vec<SearchHit> = merged
            .into_values()
            .map(|(mut hit, v, l)| {
                hit.score = self.combine(v, l);
                hit
            })
            .collect();
        fused.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        fused.truncate(k);
        fused
    }

    /// Hybrid search over one snapshot, over-fetching `2k` from each side.
    ///
    /// Without a query vector only the lexical side runs and its scores are
    /// returned unweighted.
    pub fn search(
        &self,
        snapshot: &Snapshot,
        query_vector: Option<&[f32]>,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be positive".into()));
        }
        let fetch = k.saturating_mul(2);
        let mut lexical = snapshot.lexical_search(query, fetch, filter)?;
        let Some(qv) = query_vector else {
            lexical.truncate(k);
            return Ok(lexical);
        };
        let vector = snapshot.vector_search(qv, fetch, filter)?;
        Ok(self.fuse(vector, lexical, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrank_core::ChunkMetadata;

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit { chunk_id: id.into(), content: id.into(), metadata: ChunkMetadata::default(), score }
    }

    fn scores(hits: &[SearchHit]) -> Vec<(&str, f32)> {
        hits.iter().map(|h| (h.chunk_id.as_str(), h.score)).collect()
    }

    #[test]
    fn combined_score_matches_the_weighted_sum() {
        let f = Fusion::default();
        let fused = f.fuse(vec![hit("a", 0.8), hit("b", 0.5)], vec![hit("a", 0.4), hit("c", 1.0)], 10);
        let by_id: BTreeMap<&str, f32> = scores(&fused).into_iter().collect();
        assert!((by_id["a"] - (0.7 * 0.8 + 0.3 * 0.4)).abs() < 1e-6);
        assert!((by_id["b"] - 0.7 * 0.5).abs() < 1e-6);
        assert!((by_id["c"] - 0.3 * 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_chunk_id_and_k_truncates() {
        let f = Fusion::new(&FusionSettings { vector_weight: 0.5 });
        let fused = f.fuse(vec![hit("b", 0.6), hit("a", 0.6), hit("c", 0.1)], Vec::new(), 2);
        assert_eq!(fused.iter().map(|h| h.chunk_id.as_str()).collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn weight_extremes_select_one_side() {
        let vector_only = Fusion::new(&FusionSettings { vector_weight: 1.0 });
        assert_eq!(vector_only.combine(Some(0.4), Some(0.9)), 0.4);
        let lexical_only = Fusion::new(&FusionSettings { vector_weight: 0.0 });
        assert_eq!(lexical_only.combine(Some(0.4), Some(0.9)), 0.9);
    }
}
