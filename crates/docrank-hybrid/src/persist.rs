//! Moving index snapshots to and from the LanceDB corpus store.

use anyhow::Result;
use docrank_vector::{CorpusStore, StoredChunk};
use tracing::{info, warn};

use crate::index::Index;

/// Replace the stored corpus with the index's current snapshot.
pub async fn save_index(index: &Index, store: &CorpusStore) -> Result<usize> {
    let snap = index.snapshot();
    let embedder_id = index.embedder().embedder_id().to_string();
    let records: Vec<StoredChunk> = snap
        .entries()
        .map(|(chunk, vector)| StoredChunk { chunk: chunk.clone(), vector: vector.to_vec(), embedder_id: embedder_id.clone() })
        .collect();
    store.replace_all(&records).await?;
    info!(rows = records.len(), table = store.table_name(), "index saved");
    Ok(records.len())
}

/// Rebuild `index` from the store. Rows written by a different embedder are
/// re-embedded rather than mixed into the vector space.
pub async fn load_index(index: &Index, store: &CorpusStore) -> Result<usize> {
    let embedder_id = index.embedder().embedder_id().to_string();
    let (usable, stale): (Vec<StoredChunk>, Vec<StoredChunk>) = store
        .load()
        .await?
        .into_iter()
        .partition(|r| r.embedder_id == embedder_id && r.vector.len() == index.dim());

    let mut entries: Vec<_> = usable.into_iter().map(|r| (r.chunk, r.vector)).collect();
    if !stale.is_empty() {
        warn!(rows = stale.len(), embedder = %embedder_id, "re-embedding rows from another embedder");
        let texts: Vec<String> = stale.iter().map(|r| r.chunk.content.clone()).collect();
        let vectors = index.embed_texts(&texts)?;
        entries.extend(stale.into_iter().map(|r| r.chunk).zip(vectors));
    }
    let n = entries.len();
    index.rebuild(entries)?;
    info!(chunks = n, table = store.table_name(), "index loaded");
    Ok(n)
}
