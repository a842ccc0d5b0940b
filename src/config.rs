use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible embeddings endpoint. When absent the
    /// deterministic local fallback serves every call.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dims() -> usize {
    384
}
fn default_embedding_timeout() -> u64 {
    20
}
fn default_embedding_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Base URL of the vector index service. When absent every query is
    /// served by the durable-store fallback and chunks stay unindexed.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            collection: default_collection(),
            timeout_secs: default_index_timeout(),
        }
    }
}

impl IndexConfig {
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }
}

fn default_collection() -> String {
    "askdoc_chunks".to_string()
}
fn default_index_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_language")]
    pub language: String,
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
    /// Text-layer output shorter than this is treated as image-based and
    /// sent to OCR.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
    /// Cumulative OCR output shorter than this fails the document.
    #[serde(default = "default_min_ocr_chars")]
    pub min_ocr_chars: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: default_ocr_language(),
            page_timeout_secs: default_page_timeout(),
            render_dpi: default_render_dpi(),
            min_text_chars: default_min_text_chars(),
            min_ocr_chars: default_min_ocr_chars(),
        }
    }
}

fn default_ocr_language() -> String {
    "eng".to_string()
}
fn default_page_timeout() -> u64 {
    30
}
fn default_render_dpi() -> u32 {
    150
}
fn default_min_text_chars() -> usize {
    100
}
fn default_min_ocr_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            model: default_generation_model(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_endpoint() -> String {
    "http://localhost:11434/api/generate".to_string()
}
fn default_generation_model() -> String {
    "mistral".to_string()
}
fn default_generation_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_doc_history_turns")]
    pub doc_history_turns: usize,
    #[serde(default = "default_general_history_turns")]
    pub general_history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            doc_history_turns: default_doc_history_turns(),
            general_history_turns: default_general_history_turns(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_doc_history_turns() -> usize {
    6
}
fn default_general_history_turns() -> usize {
    4
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0 when an endpoint is configured");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.ocr.page_timeout_secs == 0 {
        anyhow::bail!("ocr.page_timeout_secs must be > 0");
    }
    if !(72..=600).contains(&config.ocr.render_dpi) {
        anyhow::bail!("ocr.render_dpi must be in [72, 600]");
    }

    Ok(config)
}
