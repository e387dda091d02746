//! LanceDB corpus store.
//!
//! One table holds one corpus: a row per chunk with its content, flattened
//! metadata, content hash, the id of the embedder that produced its vector,
//! and the vector itself. Rows are keyed by chunk id.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use docrank_core::{Chunk, ChunkMetadata, Error};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection, Table};
use tracing::{debug, info};

use crate::schema::{build_arrow_schema, vector_dim};

/// blake3 hex digest of chunk content; the key for vector reuse.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// A chunk as persisted: the chunk, its vector and the embedder that made it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub embedder_id: String,
}

pub struct CorpusStore {
    db: Connection,
    table_name: String,
}

impl CorpusStore {
    pub async fn open(db_path: &Path, table_name: &str) -> Result<Self> {
        let db = connect(db_path.to_string_lossy().as_ref()).execute().await?;
        debug!(path = %db_path.display(), table = table_name, "opened corpus store");
        Ok(Self { db, table_name: table_name.to_string() })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn table(&self) -> Result<Option<Table>> {
        if !self.db.table_names().execute().await?.contains(&self.table_name) {
            return Ok(None);
        }
        Ok(Some(self.db.open_table(&self.table_name).execute().await?))
    }

    /// Open the table, creating it empty when missing. An existing table with
    /// a different vector length is an error rather than silently mixed.
    async fn ensure_table(&self, dim: usize) -> Result<Table> {
        if let Some(t) = self.table().await? {
            if let Some(stored) = vector_dim(&*t.schema().await?) {
                if stored != dim {
                    return Err(Error::DimensionMismatch { expected: stored, actual: dim }.into());
                }
            }
            return Ok(t);
        }
        let schema = build_arrow_schema(dim_i32(dim)?);
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
        self.db.create_table(&self.table_name, Box::new(iter)).execute().await?;
        Ok(self.db.open_table(&self.table_name).execute().await?)
    }

    /// Upsert records by chunk id.
    pub async fn save(&self, records: &[StoredChunk]) -> Result<()> {
        let Some(dim) = common_dim(records)? else { return Ok(()) };
        let t = self.ensure_table(dim).await?;
        let batch = to_record_batch(records, dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let mut mi = t.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await?;
        info!(rows = records.len(), table = %self.table_name, "saved chunks");
        Ok(())
    }

    /// Replace the whole corpus with `records`.
    pub async fn replace_all(&self, records: &[StoredChunk]) -> Result<()> {
        if let Some(t) = self.table().await? {
            t.delete("true").await?;
        }
        let Some(dim) = common_dim(records)? else { return Ok(()) };
        let t = self.ensure_table(dim).await?;
        let batch = to_record_batch(records, dim)?;
        let schema = batch.schema();
        t.add(Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema))).execute().await?;
        info!(rows = records.len(), table = %self.table_name, "replaced corpus");
        Ok(())
    }

    /// Every stored record, sorted by chunk id.
    pub async fn load(&self) -> Result<Vec<StoredChunk>> {
        let Some(t) = self.table().await? else { return Ok(Vec::new()) };
        let mut out = Vec::new();
        let mut stream = t.query().execute().await?;
        while let Some(batch) = stream.try_next().await? {
            read_batch(&batch, &mut out)?;
        }
        out.sort_by(|a, b| a.chunk.id.cmp(&b.chunk.id));
        debug!(rows = out.len(), "loaded corpus");
        Ok(out)
    }

    /// Stored vectors produced by `embedder_id`, keyed by content hash.
    pub async fn vectors_by_hash(&self, embedder_id: &str) -> Result<HashMap<String, Vec<f32>>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.embedder_id == embedder_id)
            .map(|r| (content_hash(&r.chunk.content), r.vector))
            .collect())
    }

    pub async fn count(&self) -> Result<usize> {
        match self.table().await? {
            Some(t) => Ok(t.count_rows(None).await?),
            None => Ok(0),
        }
    }
}

fn dim_i32(dim: usize) -> Result<i32> {
    i32::try_from(dim).map_err(|_| anyhow!("vector dimension {dim} too large"))
}

fn common_dim(records: &[StoredChunk]) -> Result<Option<usize>> {
    let Some(first) = records.first() else { return Ok(None) };
    let dim = first.vector.len();
    if let Some(bad) = records.iter().find(|r| r.vector.len() != dim) {
        return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() }.into());
    }
    Ok(Some(dim))
}

fn to_record_batch(records: &[StoredChunk], dim: usize) -> Result<RecordBatch> {
    let mut ids = Vec::with_capacity(records.len());
    let mut contents = Vec::with_capacity(records.len());
    let mut metadata = Vec::with_capacity(records.len());
    let mut hashes = Vec::with_capacity(records.len());
    let mut embedder_ids = Vec::with_capacity(records.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
    for r in records {
        ids.push(r.chunk.id.clone());
        contents.push(r.chunk.content.clone());
        metadata.push(serde_json::to_string(&r.chunk.metadata.to_map())?);
        hashes.push(content_hash(&r.chunk.content));
        embedder_ids.push(r.embedder_id.clone());
        vectors.push(Some(r.vector.iter().map(|&x| Some(x)).collect()));
    }
    let dim = dim_i32(dim)?;
    Ok(RecordBatch::try_new(
        build_arrow_schema(dim),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(StringArray::from(hashes)),
            Arc::new(StringArray::from(embedder_ids)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim)),
        ],
    )?)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("{name} column missing"))
}

fn read_batch(batch: &RecordBatch, out: &mut Vec<StoredChunk>) -> Result<()> {
    let ids = string_col(batch, "id")?;
    let contents = string_col(batch, "content")?;
    let metadata = string_col(batch, "metadata")?;
    let embedder_ids = string_col(batch, "embedder_id")?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| anyhow!("vector column missing"))?;
    for i in 0..batch.num_rows() {
        if vectors.is_null(i) {
            continue;
        }
        let map: BTreeMap<String, String> = serde_json::from_str(metadata.value(i))?;
        let list = vectors.value(i);
        let vector = list.as_primitive::<Float32Type>().values().iter().copied().collect();
        out.push(StoredChunk {
            chunk: Chunk {
                id: ids.value(i).to_string(),
                content: contents.value(i).to_string(),
                metadata: ChunkMetadata::from_map(map),
            },
            vector,
            embedder_id: embedder_ids.value(i).to_string(),
        });
    }
    Ok(())
}
