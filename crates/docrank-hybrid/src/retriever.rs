//! Query entry point: strategy selection, search, fusion, reranking,
//! deduplication and context rendering.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docrank_core::config::{RetrieverSettings, Settings};
use docrank_core::{Error, MetadataFilter, QueryContext, RankedResult, Result, SearchHit, SearchStrategy};
use tracing::{debug, warn};

use crate::classify::classify;
use crate::format::{citations, format_context};
use crate::fusion::Fusion;
use crate::index::{Index, Snapshot};
use crate::rerank::{assign_citations, Reranker};

/// Ranked results plus the rendered context block for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub results: Vec<RankedResult>,
    pub context: String,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn citations(&self) -> Vec<String> {
        citations(&self.results)
    }
}

/// Raw per-strategy hits for one query, before any reranking.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugSearch {
    pub semantic: Vec<SearchHit>,
    pub lexical: Vec<SearchHit>,
    pub hybrid: Vec<SearchHit>,
    pub classified_as: SearchStrategy,
    pub embedding_available: bool,
}

pub struct Retriever {
    index: Arc<Index>,
    fusion: Fusion,
    reranker: Reranker,
    settings: RetrieverSettings,
    /// Embedding tasks that outlived their timeout and are still running.
    overdue: Arc<AtomicUsize>,
}

impl Retriever {
    pub fn new(index: Arc<Index>, settings: &Settings) -> Self {
        Self::with_parts(
            index,
            Fusion::new(&settings.fusion),
            Reranker::new(settings.rerank.clone()),
            settings.retriever.clone(),
        )
    }

    pub fn with_parts(index: Arc<Index>, fusion: Fusion, reranker: Reranker, settings: RetrieverSettings) -> Self {
        Self { index, fusion, reranker, settings, overdue: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn settings(&self) -> &RetrieverSettings {
        &self.settings
    }

    /// Full pipeline for `query`. `k` defaults to `default_k`; an unknown
    /// `source_filter` is ignored with a warning.
    pub async fn retrieve(&self, query: &str, k: Option<usize>, source_filter: Option<&str>) -> Result<Retrieval> {
        let strategy = if self.settings.auto_strategy { classify(query) } else { SearchStrategy::Hybrid };
        self.retrieve_with_strategy(query, strategy, k, source_filter).await
    }

    /// Like [`Retriever::retrieve`] with the search strategy pinned.
    pub async fn retrieve_with_strategy(
        &self,
        query: &str,
        strategy: SearchStrategy,
        k: Option<usize>,
        source_filter: Option<&str>,
    ) -> Result<Retrieval> {
        let query = require_query(query)?;
        let k = self.resolve_k(k)?;
        let snap = self.index.snapshot();
        let filter = self.resolve_filter(&snap, source_filter);
        let hits = self.candidates(&snap, query, strategy, k, filter.as_ref()).await?;
        Ok(self.finish(query, hits, k))
    }

    /// Search with recent conversation turns folded into the search text.
    /// Boosts still look only at the current query.
    pub async fn retrieve_in_context(
        &self,
        ctx: &QueryContext,
        k: Option<usize>,
        source_filter: Option<&str>,
    ) -> Result<Retrieval> {
        let query = require_query(&ctx.query)?;
        let k = self.resolve_k(k)?;
        let search_text = ctx.search_text(self.settings.history_turns);
        let strategy = if self.settings.auto_strategy { classify(query) } else { SearchStrategy::Hybrid };
        let snap = self.index.snapshot();
        let filter = self.resolve_filter(&snap, source_filter);
        let hits = self.candidates(&snap, &search_text, strategy, k, filter.as_ref()).await?;
        Ok(self.finish(query, hits, k))
    }

    /// Look up an identifier such as `p0420` in the reference document.
    pub async fn retrieve_by_exact_code(&self, code: &str) -> Result<Retrieval> {
        let code = require_query(code)?.to_uppercase();
        if self.settings.reference_source.is_none() {
            debug!(code = %code, "no reference source configured; searching all documents");
        }
        let source = self.settings.reference_source.as_deref();
        self.retrieve(&code, Some(self.settings.exact_code_k), source).await
    }

    /// Pool candidates from each preferred source in order, then rank the
    /// union once so scores are comparable across documents.
    pub async fn retrieve_by_topic(&self, topic: &str, preferred_sources: &[&str]) -> Result<Retrieval> {
        let topic = require_query(topic)?;
        let k = self.settings.default_k;
        let snap = self.index.snapshot();

        let mut pool: Vec<SearchHit> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let filters: Vec<Option<MetadataFilter>> = if preferred_sources.is_empty() {
            vec![None]
        } else {
            preferred_sources.iter().map(|s| self.resolve_filter(&snap, Some(*s))).collect()
        };
        for filter in &filters {
            let hits = self.candidates(&snap, topic, SearchStrategy::Hybrid, k, filter.as_ref()).await?;
            pool.extend(hits.into_iter().filter(|h| seen.insert(h.chunk_id.clone())));
        }
        debug!(topic, sources = preferred_sources.len(), candidates = pool.len(), "topic pool");
        Ok(self.finish(topic, pool, k))
    }

    pub async fn retrieve_from_source(&self, query: &str, source: &str, k: Option<usize>) -> Result<Retrieval> {
        self.retrieve(query, k, Some(source)).await
    }

    pub fn citations(&self, results: &[RankedResult]) -> Vec<String> {
        citations(results)
    }

    /// Run each strategy on its own for tuning. Scores are raw.
    pub async fn debug_search(&self, query: &str, k: usize) -> Result<DebugSearch> {
        let query = require_query(query)?;
        let k = self.resolve_k(Some(k))?;
        let snap = self.index.snapshot();
        let qv = self.embed_query(&snap, query).await;
        let lexical = snap.lexical_search(query, k, None)?;
        let semantic = match &qv {
            Some(v) => snap.vector_search(v, k, None)?,
            None => Vec::new(),
        };
        let hybrid = self.fusion.search(&snap, qv.as_deref(), query, k, None)?;
        Ok(DebugSearch { semantic, lexical, hybrid, classified_as: classify(query), embedding_available: qv.is_some() })
    }

    fn resolve_k(&self, k: Option<usize>) -> Result<usize> {
        match k {
            Some(0) => Err(Error::InvalidArgument("k must be positive".into())),
            Some(k) => Ok(k),
            None => Ok(self.settings.default_k),
        }
    }

    fn resolve_filter(&self, snap: &Snapshot, source: Option<&str>) -> Option<MetadataFilter> {
        let source = source?;
        if snap.has_source(source) {
            Some(MetadataFilter::source(source))
        } else {
            warn!(source, "unknown source filter; searching all documents");
            None
        }
    }

    /// Embed the query off the async runtime, bounded by `embed_timeout_ms`.
    /// `None` means the caller should fall back to lexical search.
    async fn embed_query(&self, snap: &Snapshot, text: &str) -> Option<Vec<f32>> {
        if snap.is_empty() {
            return None;
        }
        match self.embed_with_timeout(text).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "falling back to lexical-only search");
                None
            }
        }
    }

    /// A blocking embed cannot be cancelled, so a timed-out task keeps running.
    /// Until it finishes, later queries skip the embedder instead of queueing
    /// more blocked threads behind it.
    async fn embed_with_timeout(&self, text: &str) -> Result<Vec<f32>> {
        let stuck = self.overdue.load(Ordering::Acquire);
        if stuck > 0 {
            return Err(Error::EmbeddingUnavailable(format!("{stuck} earlier embedding(s) still running")));
        }
        let index = Arc::clone(&self.index);
        let text = text.to_string();
        let limit = Duration::from_millis(self.settings.embed_timeout_ms);
        // Set by whichever of the task and the caller lets go first.
        let released = Arc::new(AtomicBool::new(false));
        let task_released = Arc::clone(&released);
        let overdue = Arc::clone(&self.overdue);
        let task = tokio::task::spawn_blocking(move || {
            let _done = TaskDone { released: task_released, overdue };
            index.embed_query(&text)
        });
        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(Error::EmbeddingUnavailable(format!("embedding task failed: {join}"))),
            Err(_) => {
                self.overdue.fetch_add(1, Ordering::AcqRel);
                if released.swap(true, Ordering::AcqRel) {
                    self.overdue.fetch_sub(1, Ordering::AcqRel);
                }
                Err(Error::EmbeddingUnavailable(format!("timed out after {}ms", limit.as_millis())))
            }
        }
    }

    /// Candidate hits for one search text: `2k` of them, above `min_score`.
    async fn candidates(
        &self,
        snap: &Snapshot,
        search_text: &str,
        strategy: SearchStrategy,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        if snap.is_empty() {
            return Ok(Vec::new());
        }
        let pool = k.saturating_mul(2);
        let hits = match strategy {
            SearchStrategy::Lexical => snap.lexical_search(search_text, pool, filter)?,
            SearchStrategy::Semantic => match self.embed_query(snap, search_text).await {
                Some(v) => snap.vector_search(&v, pool, filter)?,
                None => snap.lexical_search(search_text, pool, filter)?,
            },
            SearchStrategy::Hybrid => {
                let qv = self.embed_query(snap, search_text).await;
                self.fusion.search(snap, qv.as_deref(), search_text, pool, filter)?
            }
        };
        let before = hits.len();
        let kept: Vec<SearchHit> = hits.into_iter().filter(|h| h.score >= self.settings.min_score).collect();
        debug!(%strategy, candidates = before, kept = kept.len(), "search pass");
        Ok(kept)
    }

    fn finish(&self, boost_query: &str, hits: Vec<SearchHit>, k: usize) -> Retrieval {
        let ranked = self.reranker.rerank(boost_query, hits);
        let mut results = self.reranker.dedup(ranked);
        results.truncate(k);
        assign_citations(&mut results);
        let context = format_context(&results);
        Retrieval { results, context }
    }
}

/// Runs when a blocking embed finishes or unwinds; settles the overdue count
/// if the caller already gave up on it.
struct TaskDone {
    released: Arc<AtomicBool>,
    overdue: Arc<AtomicUsize>,
}

impl Drop for TaskDone {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            self.overdue.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

fn require_query(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument("query must not be empty".into()));
    }
    Ok(trimmed)
}
