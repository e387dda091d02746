//! Corpus rebuild: chunk every document, embed what is not already cached,
//! and publish the result as one new index snapshot.

use std::collections::HashMap;

use docrank_core::config::Settings;
use docrank_core::{Chunk, Error, MarkdownChunker, Result, SourceDocument};
use docrank_vector::content_hash;
use tracing::{info, warn};

use crate::index::Index;

/// A document left out of the rebuild and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// Vectors computed by the embedder during this run.
    pub embedded: usize,
    /// Vectors taken from the cache by content hash.
    pub reused_vectors: usize,
    pub skipped: Vec<SkippedDocument>,
}

#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    chunker: MarkdownChunker,
}

impl Ingestor {
    pub fn new(chunker: MarkdownChunker) -> Self {
        Self { chunker }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(MarkdownChunker::new(settings.chunker.clone()))
    }

    /// Rebuild `index` from `docs`. `cache` maps content hashes to vectors
    /// already produced by the index's embedder.
    pub fn ingest(&self, index: &Index, docs: &[SourceDocument], cache: &HashMap<String, Vec<f32>>) -> Result<IngestReport> {
        self.ingest_with_progress(index, docs, cache, |_, _| {})
    }

    /// Like [`Ingestor::ingest`], calling `progress(done, total)` after each document.
    /// A document that fails to chunk or embed is skipped and reported. When
    /// every document fails the index is left untouched and an error returned:
    /// `EmbeddingUnavailable` if any failure came from the embedder, else `NoContent`.
    pub fn ingest_with_progress<F>(
        &self,
        index: &Index,
        docs: &[SourceDocument],
        cache: &HashMap<String, Vec<f32>>,
        mut progress: F,
    ) -> Result<IngestReport>
    where
        F: FnMut(usize, usize),
    {
        let mut report = IngestReport::default();
        let mut entries: Vec<(Chunk, Vec<f32>)> = Vec::new();
        let mut embedder_failed = false;
        for (i, doc) in docs.iter().enumerate() {
            match self.prepare(index, doc, cache) {
                Ok((embedded, reused, doc_entries)) => {
                    report.documents += 1;
                    report.chunks += doc_entries.len();
                    report.embedded += embedded;
                    report.reused_vectors += reused;
                    entries.extend(doc_entries);
                }
                Err(e) => {
                    embedder_failed |= matches!(e, Error::EmbeddingUnavailable(_) | Error::DimensionMismatch { .. });
                    warn!(source = %doc.name, error = %e, "skipping document");
                    report.skipped.push(SkippedDocument { source: doc.name.clone(), reason: e.to_string() });
                }
            }
            progress(i + 1, docs.len());
        }
        if !docs.is_empty() && report.documents == 0 {
            let reasons =
                report.skipped.iter().map(|s| format!("{}: {}", s.source, s.reason)).collect::<Vec<_>>().join("; ");
            warn!(skipped = report.skipped.len(), "every document failed; keeping the current index");
            return Err(if embedder_failed { Error::EmbeddingUnavailable(reasons) } else { Error::NoContent(reasons) });
        }
        index.rebuild(entries)?;
        info!(
            documents = report.documents,
            chunks = report.chunks,
            embedded = report.embedded,
            reused = report.reused_vectors,
            skipped = report.skipped.len(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// Chunk and embed one document: `(embedded, reused, entries)`.
    fn prepare(
        &self,
        index: &Index,
        doc: &SourceDocument,
        cache: &HashMap<String, Vec<f32>>,
    ) -> Result<(usize, usize, Vec<(Chunk, Vec<f32>)>)> {
        let chunks = self.chunker.chunk_document(&doc.text, &doc.name)?;
        let cached: Vec<Option<Vec<f32>>> = chunks
            .iter()
            .map(|c| cache.get(&content_hash(&c.content)).filter(|v| v.len() == index.dim()).cloned())
            .collect();
        let missing: Vec<String> = chunks
            .iter()
            .zip(&cached)
            .filter(|(_, v)| v.is_none())
            .map(|(c, _)| c.content.clone())
            .collect();
        let mut fresh = index.embed_texts(&missing)?.into_iter();
        let embedded = missing.len();
        let reused = chunks.len() - embedded;

        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(cached) {
            match vector.or_else(|| fresh.next()) {
                Some(v) => entries.push((chunk, v)),
                None => warn!(chunk = %chunk.id, "no vector for chunk"),
            }
        }
        Ok((embedded, reused, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrank_core::config::IndexSettings;
    use docrank_core::Embedder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Embedder for Counting {
        fn embedder_id(&self) -> &str {
            "counting:d3"
        }
        fn dim(&self) -> usize {
            3
        }
        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0, 0.0]).collect())
        }
    }

    fn docs() -> Vec<SourceDocument> {
        vec![
            SourceDocument::new("a.md", "# A\n\n## Oil\n\nReplace the oil filter."),
            SourceDocument::new("empty.md", "   "),
            SourceDocument::new("b.md", "# B\n\n## Tires\n\nRotate the tires."),
        ]
    }

    #[test]
    fn bad_documents_are_reported_not_fatal() {
        let embedder = Arc::new(Counting::default());
        let index = Index::new(embedder.clone(), IndexSettings::default());
        let mut ticks = Vec::new();
        let report = Ingestor::default()
            .ingest_with_progress(&index, &docs(), &HashMap::new(), |done, total| ticks.push((done, total)))
            .unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].source, "empty.md");
        assert_eq!(ticks, [(1, 3), (2, 3), (3, 3)]);
        assert_eq!(index.stats().sources, ["a.md", "b.md"]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    struct Offline;

    impl Embedder for Offline {
        fn embedder_id(&self) -> &str {
            "offline:d3"
        }
        fn dim(&self) -> usize {
            3
        }
        fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("offline")
        }
    }

    #[test]
    fn embedder_outage_keeps_the_current_corpus() {
        let online = Index::new(Arc::new(Counting::default()), IndexSettings::default());
        Ingestor::default().ingest(&online, &docs(), &HashMap::new()).unwrap();
        let entries: Vec<(Chunk, Vec<f32>)> = online.snapshot().entries().map(|(c, v)| (c.clone(), v.to_vec())).collect();

        let index = Index::new(Arc::new(Offline), IndexSettings::default());
        index.rebuild(entries).unwrap();
        assert_eq!(index.len(), 2);

        let err = Ingestor::default().ingest(&index, &docs(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
        assert_eq!(index.len(), 2);
        assert_eq!(index.stats().sources, ["a.md", "b.md"]);
    }

    #[test]
    fn all_empty_documents_is_no_content() {
        let index = Index::new(Arc::new(Counting::default()), IndexSettings::default());
        Ingestor::default().ingest(&index, &docs(), &HashMap::new()).unwrap();
        let blank = [SourceDocument::new("empty.md", "   ")];
        let err = Ingestor::default().ingest(&index, &blank, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::NoContent(_)));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn empty_corpus_still_rebuilds_empty() {
        let index = Index::new(Arc::new(Counting::default()), IndexSettings::default());
        Ingestor::default().ingest(&index, &docs(), &HashMap::new()).unwrap();
        let report = Ingestor::default().ingest(&index, &[], &HashMap::new()).unwrap();
        assert_eq!(report.documents, 0);
        assert!(index.is_empty());
    }

    #[test]
    fn cached_vectors_skip_the_embedder() {
        let embedder = Arc::new(Counting::default());
        let index = Index::new(embedder.clone(), IndexSettings::default());
        Ingestor::default().ingest(&index, &docs(), &HashMap::new()).unwrap();
        let cache: HashMap<String, Vec<f32>> =
            index.snapshot().entries().map(|(c, v)| (content_hash(&c.content), v.to_vec())).collect();

        let report = Ingestor::default().ingest(&index, &docs(), &cache).unwrap();
        assert_eq!(report.reused_vectors, 2);
        assert_eq!(report.embedded, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(index.len(), 2);
    }
}
