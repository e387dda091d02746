/// Maps text to fixed-length vectors.
///
/// Implementations must be deterministic for identical input and return one
/// vector of exactly [`Embedder::dim`] floats per input text.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:d384`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
