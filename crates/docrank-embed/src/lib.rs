//! docrank-embed
//!
//! Embedding providers behind [`docrank_core::Embedder`]: a local transformer
//! model (candle) and a deterministic hashing embedder for tests and offline use.

pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

use std::sync::Arc;

use anyhow::Result;
use docrank_core::config::{EmbeddingProvider, EmbeddingSettings};
use docrank_core::Embedder;
use tracing::info;

pub use hash::HashEmbedder;
pub use model::ModelEmbedder;
pub use pool::masked_mean_l2;

/// Build the configured provider. `APP_USE_FAKE_EMBEDDINGS=1` forces the
/// hashing embedder regardless of settings.
pub fn embedder_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake || settings.provider == EmbeddingProvider::Hash {
        info!(dim = settings.dimension, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dimension)));
    }
    let dir = model::resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Arc::new(ModelEmbedder::load(&dir, settings.max_len)?))
}

pub fn get_default_embedder() -> Result<Arc<dyn Embedder>> {
    embedder_from_settings(&EmbeddingSettings::default())
}
