//! Layered configuration and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys use `__`, e.g. `APP_RETRIEVER__DEFAULT_K=3`). Typed settings
//! come out of [`Config::settings`] with every field defaulted.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::LexicalScoring;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load `config.toml` and its per-environment overlay from `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the full typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings =
            self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunker: ChunkerSettings,
    pub index: IndexSettings,
    pub fusion: FusionSettings,
    pub rerank: RerankSettings,
    pub retriever: RetrieverSettings,
    pub storage: StorageSettings,
    pub embedding: EmbeddingSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunker;
        if c.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunker.chunk_size must be positive".into()));
        }
        if c.min_chunk_size > c.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunker.min_chunk_size ({}) exceeds chunk_size ({})",
                c.min_chunk_size, c.chunk_size
            )));
        }
        if self.index.embed_batch_size == 0 {
            return Err(Error::InvalidConfig("index.embed_batch_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.fusion.vector_weight) {
            return Err(Error::InvalidConfig(format!(
                "fusion.vector_weight must lie in [0, 1], got {}",
                self.fusion.vector_weight
            )));
        }
        let r = &self.rerank;
        for (name, factor) in [("topic_boost", r.topic_boost), ("header_boost", r.header_boost), ("phrase_boost", r.phrase_boost)] {
            if factor.is_nan() || factor <= 0.0 {
                return Err(Error::InvalidConfig(format!("rerank.{name} must be positive, got {factor}")));
            }
        }
        if r.dedup_threshold.is_nan() || r.dedup_threshold <= 0.0 || r.dedup_threshold > 1.0 {
            return Err(Error::InvalidConfig(format!(
                "rerank.dedup_threshold must lie in (0, 1], got {}",
                r.dedup_threshold
            )));
        }
        if self.retriever.default_k == 0 || self.retriever.exact_code_k == 0 {
            return Err(Error::InvalidConfig("retriever k values must be positive".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerSettings {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Trailing chunks shorter than this are dropped unless they are a section's only chunk.
    pub min_chunk_size: usize,
    /// How many key terms to record per chunk.
    pub key_terms: usize,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, min_chunk_size: 100, key_terms: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub embed_batch_size: usize,
    pub lexical_scoring: LexicalScoring,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { embed_batch_size: 32, lexical_scoring: LexicalScoring::IdfWeighted }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    /// Weight of the vector score; the lexical score gets `1 - vector_weight`.
    pub vector_weight: f32,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self { vector_weight: 0.7 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub topic_boost: f32,
    pub header_boost: f32,
    pub phrase_boost: f32,
    /// Jaccard similarity above which a lower-ranked result is dropped.
    pub dedup_threshold: f32,
    /// Query keyword (lower case) -> source document it favours.
    pub topic_keywords: BTreeMap<String, String>,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            topic_boost: 1.2,
            header_boost: 1.1,
            phrase_boost: 1.15,
            dedup_threshold: 0.85,
            topic_keywords: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverSettings {
    pub default_k: usize,
    /// Fused candidates scoring below this are discarded before reranking.
    pub min_score: f32,
    pub embed_timeout_ms: u64,
    /// Pick a single search strategy per query instead of always fusing.
    pub auto_strategy: bool,
    /// Document searched by exact-code lookups.
    pub reference_source: Option<String>,
    pub exact_code_k: usize,
    /// Prior conversational turns folded into the search text.
    pub history_turns: usize,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            default_k: 5,
            min_score: 0.15,
            embed_timeout_ms: 2000,
            auto_strategy: false,
            reference_source: None,
            exact_code_k: 3,
            history_turns: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub db_path: String,
    pub table: String,
    pub docs_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { db_path: "data/lancedb".into(), table: "chunks".into(), docs_dir: "docs".into() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic token-hashing embedder; no model files needed.
    #[default]
    Hash,
    /// Local transformer model loaded from `model_dir`.
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Vector length of the hashing embedder. Model embedders report their own.
    pub dimension: usize,
    pub model_dir: Option<String>,
    pub max_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { provider: EmbeddingProvider::Hash, dimension: 384, model_dir: None, max_len: 256 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
