//! The composite index: chunks, their vectors and a lexical index over the
//! same ordered corpus, published as immutable snapshots.
//!
//! Writers build a complete new [`Snapshot`] off to the side and swap a single
//! `Arc` under a short write lock, so a reader holding a snapshot always sees
//! one complete corpus.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use docrank_core::config::IndexSettings;
use docrank_core::{Chunk, ChunkId, Embedder, Error, LexicalScoring, MetadataFilter, Result, SearchHit};
use docrank_text::LexicalIndex;
use docrank_vector::{IndexedVector, VectorIndex};
use tracing::{debug, info};

/// One complete, immutable version of the corpus.
#[derive(Debug)]
pub struct Snapshot {
    /// Sorted by id; a chunk's position is its ordinal in both sub-indexes.
    chunks: Vec<Chunk>,
    by_id: HashMap<ChunkId, usize>,
    vectors: VectorIndex,
    lexical: LexicalIndex,
    sources: BTreeSet<String>,
}

impl Snapshot {
    pub fn empty(dim: usize, scoring: LexicalScoring) -> Self {
        Self {
            chunks: Vec::new(),
            by_id: HashMap::new(),
            vectors: VectorIndex::empty(dim),
            lexical: LexicalIndex::empty(scoring),
            sources: BTreeSet::new(),
        }
    }

    /// Build from `(chunk, vector)` pairs. A repeated id keeps its last entry.
    pub fn build<I>(entries: I, dim: usize, scoring: LexicalScoring) -> Result<Self>
    where
        I: IntoIterator<Item = (Chunk, Vec<f32>)>,
    {
        let mut latest: BTreeMap<ChunkId, (Chunk, Vec<f32>)> = BTreeMap::new();
        for (chunk, vector) in entries {
            latest.insert(chunk.id.clone(), (chunk, vector));
        }
        let (chunks, indexed): (Vec<Chunk>, Vec<IndexedVector>) = latest
            .into_values()
            .map(|(chunk, vector)| {
                let iv = IndexedVector { chunk_id: chunk.id.clone(), vector, metadata: chunk.metadata.clone() };
                (chunk, iv)
            })
            .unzip();
        let vectors = VectorIndex::build(dim, indexed)?;
        let lexical = LexicalIndex::build(chunks.iter().map(|c| c.content.as_str()), scoring);
        let by_id = chunks.iter().enumerate().map(|(i, c)| (c.id.clone(), i)).collect();
        let sources = chunks.iter().map(|c| c.metadata.source.clone()).collect();
        Ok(Self { chunks, by_id, vectors, lexical, sources })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.vectors.dim()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.by_id.get(id).map(|&i| &self.chunks[i])
    }

    pub fn has_source(&self, source: &str) -> bool {
        self.sources.contains(source)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }

    /// Every chunk with its vector, in id order.
    pub fn entries(&self) -> impl Iterator<Item = (&Chunk, &[f32])> {
        self.chunks.iter().zip(self.vectors.entries()).map(|(c, iv)| (c, iv.vector.as_slice()))
    }

    fn accepts<'a>(&'a self, filter: Option<&'a MetadataFilter>) -> impl Fn(usize) -> bool + 'a {
        move |ordinal| filter.map_or(true, |f| f.matches(&self.chunks[ordinal].metadata))
    }

    fn hits(&self, scored: impl Iterator<Item = (usize, f32)>) -> Vec<SearchHit> {
        scored.map(|(ordinal, score)| SearchHit::from_chunk(&self.chunks[ordinal], score)).collect()
    }

    /// Top `k` chunks by cosine similarity to an already-embedded query.
    pub fn vector_search(&self, query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
        check_k(k)?;
        let matches = self.vectors.search_matching(query, k, filter)?;
        Ok(self.hits(matches.into_iter().map(|m| (m.ordinal, m.score))))
    }

    /// Top `k` chunks by lexical overlap with `query`.
    pub fn lexical_search(&self, query: &str, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
        check_k(k)?;
        let matches = self.lexical.search(query, k, self.accepts(filter));
        Ok(self.hits(matches.into_iter().map(|m| (m.ordinal, m.score))))
    }
}

fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(Error::InvalidArgument("k must be positive".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub chunks: usize,
    pub dimension: usize,
    pub embedder_id: String,
    pub sources: Vec<String>,
}

pub struct Index {
    embedder: Arc<dyn Embedder>,
    settings: IndexSettings,
    current: RwLock<Arc<Snapshot>>,
    /// Serializes writers; readers never take it.
    writer: Mutex<()>,
}

impl Index {
    /// The vector dimension is fixed here from the embedder's declared `dim`.
    pub fn new(embedder: Arc<dyn Embedder>, settings: IndexSettings) -> Self {
        let empty = Snapshot::empty(embedder.dim(), settings.lexical_scoring);
        Self { embedder, settings, current: RwLock::new(Arc::new(empty)), writer: Mutex::new(()) }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn dim(&self) -> usize {
        self.embedder.dim()
    }

    /// The current corpus version. Cheap; hold it for the duration of one query.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, next: Snapshot) {
        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Embed texts in batches of `embed_batch_size`, checking every vector's length.
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.settings.embed_batch_size.max(1)) {
            let vectors = self
                .embedder
                .embed_batch(batch)
                .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;
            if vectors.len() != batch.len() {
                return Err(Error::EmbeddingUnavailable(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim()) {
                return Err(Error::DimensionMismatch { expected: self.dim(), actual: bad.len() });
            }
            debug!(batch = batch.len(), "embedded batch");
            out.extend(vectors);
        }
        Ok(out)
    }

    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("provider returned no vector".into()))
    }

    /// Embed and insert chunks. Re-adding an id replaces the earlier entry.
    pub fn add(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embed_texts(&texts)?;
        self.insert_embedded(chunks.into_iter().zip(vectors).collect())
    }

    /// Insert chunks whose vectors are already known.
    pub fn insert_embedded(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let added = entries.len();
        let merged = current
            .entries()
            .map(|(c, v)| (c.clone(), v.to_vec()))
            .chain(entries);
        let next = Snapshot::build(merged, self.dim(), self.settings.lexical_scoring)?;
        debug!(added, total = next.len(), "index updated");
        self.publish(next);
        Ok(())
    }

    /// Replace the whole corpus with `entries`.
    pub fn rebuild(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let next = Snapshot::build(entries, self.dim(), self.settings.lexical_scoring)?;
        info!(chunks = next.len(), sources = next.sources.len(), "index rebuilt");
        self.publish(next);
        Ok(())
    }

    pub fn reset(&self) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(Snapshot::empty(self.dim(), self.settings.lexical_scoring));
    }

    pub fn vector_search(&self, query: &str, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
        check_k(k)?;
        let snap = self.snapshot();
        if snap.is_empty() {
            return Ok(Vec::new());
        }
        let q = self.embed_query(query)?;
        snap.vector_search(&q, k, filter)
    }

    pub fn lexical_search(&self, query: &str, k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
        self.snapshot().lexical_search(query, k, filter)
    }

    pub fn get(&self, id: &str) -> Option<Chunk> {
        self.snapshot().get(id).cloned()
    }

    /// All chunks of one document, in id order.
    pub fn chunks_for_source(&self, source: &str) -> Vec<Chunk> {
        self.snapshot().chunks().iter().filter(|c| c.metadata.source == source).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        let snap = self.snapshot();
        IndexStats {
            chunks: snap.len(),
            dimension: self.dim(),
            embedder_id: self.embedder.embedder_id().to_string(),
            sources: snap.sources().map(str::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrank_core::ChunkMetadata;

    struct Axes;

    /// Two-dimensional embedder: [mentions oil, mentions catalyst].
    impl Embedder for Axes {
        fn embedder_id(&self) -> &str {
            "axes:d2"
        }
        fn dim(&self) -> usize {
            2
        }
        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![f32::from(u8::from(t.contains("oil"))), f32::from(u8::from(t.contains("catalyst")))]
                })
                .collect())
        }
    }

    fn chunk(source: &str, seq: usize, content: &str) -> Chunk {
        let metadata = ChunkMetadata { source: source.into(), section: format!("{source} section"), ..Default::default() };
        Chunk::new(seq, content.into(), metadata)
    }

    fn index() -> Index {
        let index = Index::new(Arc::new(Axes), IndexSettings::default());
        index
            .add(vec![
                chunk("a.md", 0, "Replace the oil filter"),
                chunk("a.md", 1, "Catalyst efficiency below threshold"),
                chunk("b.md", 0, "Check the oil level weekly"),
            ])
            .unwrap();
        index
    }

    #[test]
    fn vector_search_ranks_and_filters() {
        let idx = index();
        let hits = idx.vector_search("oil", 2, None).unwrap();
        assert_eq!(hits.iter().map(|h| h.chunk_id.as_str()).collect::<Vec<_>>(), ["a.md:chunk00000", "b.md:chunk00000"]);
        let only_b = idx.vector_search("oil", 5, Some(&MetadataFilter::source("b.md"))).unwrap();
        assert_eq!(only_b.len(), 1);
        assert!(idx.vector_search("oil", 5, Some(&MetadataFilter::source("zzz.md"))).unwrap().is_empty());
    }

    #[test]
    fn lexical_search_uses_same_corpus() {
        let hits = index().lexical_search("catalyst threshold", 3, None).unwrap();
        assert_eq!(hits[0].chunk_id, "a.md:chunk00001");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_k_is_invalid() {
        let idx = index();
        assert!(matches!(idx.lexical_search("oil", 0, None), Err(Error::InvalidArgument(_))));
        assert!(matches!(idx.vector_search("oil", 0, None), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn empty_index_returns_empty_results() {
        let idx = Index::new(Arc::new(Axes), IndexSettings::default());
        assert!(idx.vector_search("oil", 3, None).unwrap().is_empty());
        assert!(idx.lexical_search("oil", 3, None).unwrap().is_empty());
        assert!(idx.is_empty());
    }

    #[test]
    fn re_adding_an_id_replaces_it() {
        let idx = index();
        idx.add(vec![chunk("a.md", 0, "Rotate the tires")]).unwrap();
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.get("a.md:chunk00000").unwrap().content, "Rotate the tires");
        assert!(idx.lexical_search("filter", 3, None).unwrap().is_empty());
    }

    #[test]
    fn rebuild_and_reset_swap_whole_corpus() {
        let idx = index();
        let old = idx.snapshot();
        idx.rebuild(vec![(chunk("c.md", 0, "Tire pressure"), vec![0.0, 0.0])]).unwrap();
        assert_eq!(old.len(), 3);
        assert_eq!(idx.stats().sources, ["c.md"]);
        idx.reset();
        assert!(idx.is_empty());
        assert_eq!(old.len(), 3);
    }

    #[test]
    fn chunks_for_source_are_in_id_order() {
        let ids: Vec<String> = index().chunks_for_source("a.md").into_iter().map(|c| c.id).collect();
        assert_eq!(ids, ["a.md:chunk00000", "a.md:chunk00001"]);
    }

    #[derive(Default)]
    struct Recording {
        batches: Mutex<Vec<usize>>,
    }

    impl Embedder for Recording {
        fn embedder_id(&self) -> &str {
            "recording:d2"
        }
        fn dim(&self) -> usize {
            2
        }
        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[test]
    fn embedding_is_split_into_configured_batches() {
        let embedder = Arc::new(Recording::default());
        let settings = IndexSettings { embed_batch_size: 2, ..IndexSettings::default() };
        let idx = Index::new(embedder.clone(), settings);
        idx.add((0..5).map(|i| chunk("a.md", i, &format!("paragraph {i}"))).collect()).unwrap();
        assert_eq!(*embedder.batches.lock().unwrap(), [2, 2, 1]);
        assert_eq!(idx.len(), 5);
    }

    #[test]
    fn wrong_dimension_vectors_are_rejected() {
        let idx = index();
        let err = idx.insert_embedded(vec![(chunk("c.md", 0, "x"), vec![1.0])]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1 }));
        assert_eq!(idx.len(), 3);
    }
}
