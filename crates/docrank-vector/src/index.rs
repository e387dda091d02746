use docrank_core::{ChunkId, ChunkMetadata, Error, MetadataFilter, Result};
use tracing::debug;

/// A chunk's embedding together with a copy of its metadata, so filters can
/// be evaluated without going back to the chunk table.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub chunk_id: ChunkId,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorMatch {
    pub ordinal: usize,
    /// `1 - cosine_distance`, i.e. cosine similarity.
    pub score: f32,
}

/// Exact nearest-neighbour search by cosine similarity.
///
/// Entries are addressed by ordinal, like the lexical index, so both halves
/// of a snapshot share one ordering.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dim: usize,
    entries: Vec<IndexedVector>,
    norms: Vec<f32>,
}

impl VectorIndex {
    pub fn empty(dim: usize) -> Self {
        Self { dim, entries: Vec::new(), norms: Vec::new() }
    }

    /// Build from entries, rejecting any vector whose length is not `dim`.
    pub fn build(dim: usize, entries: Vec<IndexedVector>) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() });
        }
        let norms = entries.iter().map(|e| l2_norm(&e.vector)).collect();
        debug!(entries = entries.len(), dim, "built vector index");
        Ok(Self { dim, entries, norms })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexedVector] {
        &self.entries
    }

    pub fn get(&self, ordinal: usize) -> Option<&IndexedVector> {
        self.entries.get(ordinal)
    }

    /// Top `k` entries by cosine similarity to `query`, restricted to ordinals
    /// accepted by `accept`. Ties keep ascending ordinal order.
    pub fn search<F>(&self, query: &[f32], k: usize, accept: F) -> Result<Vec<VectorMatch>>
    where
        F: Fn(usize) -> bool,
    {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let qn = l2_norm(query);
        let mut matches: Vec<VectorMatch> = self
            .entries
            .iter()
            .zip(&self.norms)
            .enumerate()
            .filter(|(ordinal, _)| accept(*ordinal))
            .map(|(ordinal, (entry, &norm))| {
                let denom = qn * norm;
                let score = if denom > 0.0 { dot(query, &entry.vector) / denom } else { 0.0 };
                VectorMatch { ordinal, score }
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.ordinal.cmp(&b.ordinal)));
        matches.truncate(k);
        Ok(matches)
    }

    /// [`VectorIndex::search`] restricted to entries whose own metadata
    /// matches `filter`. `None` accepts everything.
    pub fn search_matching(&self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<VectorMatch>> {
        self.search(query, k, |ordinal| filter.map_or(true, |f| f.matches(&self.entries[ordinal].metadata)))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, vector: Vec<f32>) -> IndexedVector {
        IndexedVector { chunk_id: id.into(), vector, metadata: ChunkMetadata::default() }
    }

    fn index() -> VectorIndex {
        VectorIndex::build(
            2,
            vec![entry("a", vec![1.0, 0.0]), entry("b", vec![0.0, 2.0]), entry("c", vec![1.0, 1.0]), entry("d", vec![3.0, 0.0])],
        )
        .unwrap()
    }

    #[test]
    fn ranks_by_cosine_with_ordinal_ties() {
        let hits = index().search(&[1.0, 0.0], 3, |_| true).unwrap();
        assert_eq!(hits.iter().map(|h| h.ordinal).collect::<Vec<_>>(), [0, 3, 2]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[2].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn accept_restricts_candidates() {
        let hits = index().search(&[1.0, 0.0], 10, |ord| ord == 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn metadata_filter_reads_the_entry_copy() {
        let tagged = |id: &str, source: &str, vector: Vec<f32>| IndexedVector {
            chunk_id: id.into(),
            vector,
            metadata: ChunkMetadata { source: source.into(), ..ChunkMetadata::default() },
        };
        let idx = VectorIndex::build(
            2,
            vec![tagged("a", "fleet.md", vec![1.0, 0.0]), tagged("b", "policies.md", vec![1.0, 0.1]), tagged("c", "fleet.md", vec![0.0, 1.0])],
        )
        .unwrap();
        let fleet = idx.search_matching(&[1.0, 0.0], 5, Some(&MetadataFilter::source("fleet.md"))).unwrap();
        assert_eq!(fleet.iter().map(|m| m.ordinal).collect::<Vec<_>>(), [0, 2]);
        assert_eq!(idx.search_matching(&[1.0, 0.0], 5, None).unwrap().len(), 3);
        assert!(idx.search_matching(&[1.0, 0.0], 5, Some(&MetadataFilter::source("none.md"))).unwrap().is_empty());
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        assert!(matches!(
            index().search(&[1.0, 0.0, 0.0], 1, |_| true),
            Err(Error::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(VectorIndex::build(3, vec![entry("a", vec![1.0])]).is_err());
    }

    #[test]
    fn empty_index_and_zero_k_return_nothing() {
        assert!(VectorIndex::empty(2).search(&[1.0, 0.0], 5, |_| true).unwrap().is_empty());
        assert!(index().search(&[1.0, 0.0], 0, |_| true).unwrap().is_empty());
    }
}
