//! Store configuration.

use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::vector_index::IndexBackend;

/// Configuration for one memory store instance.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Filesystem path of the SQLite database.
    pub db_path: PathBuf,
    /// Fixed length of every stored embedding vector.
    pub embedding_dim: usize,
    /// Which similarity-search backend to use.
    pub index_backend: IndexBackend,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("memory/db.sqlite"),
            embedding_dim: 384,
            index_backend: IndexBackend::Linear,
        }
    }
}

impl MemoryConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Reads `MEMORY_DB_PATH`, `EMBEDDING_DIM`, and `INDEX_BACKEND` after a
    /// best-effort `.env` load. Malformed values are logged and replaced by
    /// the default rather than failing the session.
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_ok() {
            info!("Loaded environment variables from .env file");
        }

        let defaults = Self::default();

        let db_path = env::var("MEMORY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let embedding_dim = match env::var("EMBEDDING_DIM") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid EMBEDDING_DIM '{}', using {}", raw, defaults.embedding_dim);
                defaults.embedding_dim
            }),
            Err(_) => defaults.embedding_dim,
        };

        let index_backend = match env::var("INDEX_BACKEND") {
            Ok(raw) => IndexBackend::parse(&raw).unwrap_or_else(|| {
                warn!(
                    "Unknown INDEX_BACKEND '{}', using {}",
                    raw,
                    defaults.index_backend.as_str()
                );
                defaults.index_backend
            }),
            Err(_) => defaults.index_backend,
        };

        Self {
            db_path,
            embedding_dim,
            index_backend,
        }
    }

    pub fn print_config(&self) {
        info!("Memory store configuration:");
        info!("- Database Path: {}", self.db_path.display());
        info!("- Embedding Dimension: {}", self.embedding_dim);
        info!("- Index Backend: {}", self.index_backend.as_str());
    }
}
