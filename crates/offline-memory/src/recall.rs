//! The retrieval facade: the single entry point a chat loop uses per turn.

use serde::Serialize;
use tracing::warn;

use crate::config::MemoryConfig;
use crate::embedder::Embedder;
use crate::error::{MemoryError, Result};
use crate::memory_db::{DatabaseStats, MemoryDatabase, Role, StoredMessage};
use crate::vector_index::VectorIndex;

/// The three context slices a caller assembles into a prompt.
///
/// No deduplication: a message surfacing in both `recent` and `semantic`
/// appears in both. Dropping the overlap is caller policy.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryContext {
    /// Most recent turns, oldest first, ready for direct concatenation.
    pub recent: Vec<StoredMessage>,
    /// Semantically closest past turns, best match first.
    pub semantic: Vec<StoredMessage>,
    /// Most recent session summaries, newest first.
    pub summaries: Vec<String>,
}

/// Owns the ledger and the derived vector index.
pub struct RecallEngine {
    pub ledger: MemoryDatabase,
    index: VectorIndex,
}

impl RecallEngine {
    /// Open the file-backed store described by `config`.
    pub fn open(config: &MemoryConfig) -> Result<Self> {
        let ledger = MemoryDatabase::open(&config.db_path, config.embedding_dim)?;
        Ok(Self {
            index: VectorIndex::new(config.embedding_dim, config.index_backend),
            ledger,
        })
    }

    /// An in-memory engine; the configured db path is ignored.
    pub fn open_in_memory(config: &MemoryConfig) -> Result<Self> {
        let ledger = MemoryDatabase::open_in_memory(config.embedding_dim)?;
        Ok(Self {
            index: VectorIndex::new(config.embedding_dim, config.index_backend),
            ledger,
        })
    }

    /// Persist one turn and its embedding; returns the new message id.
    ///
    /// The two writes are sequential inserts, not a transaction: if the
    /// embedding write fails, the message row stays behind. A message
    /// without an embedding is a representable, recoverable state — it
    /// simply never surfaces through semantic recall.
    pub fn remember_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        embedding: &[f32],
    ) -> Result<i64> {
        let message_id = self.ledger.messages.add_message(session_id, role, content)?;
        self.ledger.embeddings.add_embedding(message_id, embedding)?;
        Ok(message_id)
    }

    /// Like [`remember_turn`](Self::remember_turn), obtaining the vector
    /// from the embedder boundary.
    pub fn remember_text(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        embedder: &dyn Embedder,
    ) -> Result<i64> {
        let embedding = embedder.embed(content)?;
        self.remember_turn(session_id, role, content, &embedding)
    }

    /// Assemble the context slices for one turn.
    ///
    /// The semantic slice degrades to empty on any index failure other than
    /// a wrong-dimension query, so a turn can always proceed on recency
    /// context alone. A wrong-dimension query is a caller bug and propagates.
    pub fn context_for(
        &self,
        session_id: &str,
        query: &[f32],
        recent_limit: i64,
        top_k: usize,
        summary_limit: i64,
    ) -> Result<MemoryContext> {
        let recent = self.ledger.messages.recent_messages(session_id, recent_limit)?;
        let summaries = self.ledger.summaries.summaries(session_id, summary_limit)?;

        let semantic_ids = match self.index.search(&self.ledger.embeddings, query, top_k) {
            Ok(ids) => ids,
            Err(err @ MemoryError::DimensionMismatch { .. }) => return Err(err),
            Err(err) => {
                warn!("semantic recall degraded to empty: {err}");
                Vec::new()
            }
        };
        let semantic = self.ledger.messages.fetch_messages_by_id(&semantic_ids)?;

        Ok(MemoryContext {
            recent,
            semantic,
            summaries,
        })
    }

    /// Force an index refresh; searches otherwise rebuild lazily on demand.
    pub fn rebuild_index(&self) -> Result<()> {
        self.index.build(&self.ledger.embeddings)
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        self.ledger.stats()
    }
}
