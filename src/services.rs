//! Shared service context.
//!
//! All collaborators are constructed once at process start and passed to
//! the ingestion and ask flows together. There are no lazy globals: an
//! endpoint that fails at call time flips that service's recorded
//! unavailability flag instead of re-dialing on every call.

use anyhow::Result;

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::extract::TextExtractor;
use crate::generate::{Generator, OllamaGenerator};
use crate::index::IndexService;
use crate::store::ChunkStore;
use crate::{db, migrate};

pub struct Services {
    pub config: Config,
    pub store: ChunkStore,
    pub extractor: TextExtractor,
    pub embedder: EmbeddingService,
    pub index: IndexService,
    pub generator: Box<dyn Generator>,
}

impl Services {
    /// Connect the database, run migrations, and wire every collaborator.
    pub async fn init(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;
        let store = ChunkStore::new(pool);

        let extractor = TextExtractor::new(config.ocr.clone());
        let embedder = EmbeddingService::new(&config.embedding);
        let index = IndexService::new(&config.index, store.clone());
        let generator = Box::new(OllamaGenerator::new(&config.generation)?);

        Ok(Self {
            config,
            store,
            extractor,
            embedder,
            index,
            generator,
        })
    }
}
