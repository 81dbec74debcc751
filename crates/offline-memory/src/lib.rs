//! Persistent conversational memory with vector similarity recall.
//!
//! The crate has three layers:
//!
//! - [`memory_db`] — the durable ledger: append-only messages, summaries,
//!   and raw embedding vectors in SQLite, behind a connection pool.
//! - [`vector_index`] — a rebuildable in-memory snapshot of the ledger's
//!   embeddings answering top-K cosine-similarity queries.
//! - [`recall`] — the per-turn facade: persist a turn, then assemble the
//!   recent/semantic/summary context slices for the next prompt.
//!
//! Embedding computation and text generation are external collaborators;
//! see [`embedder::Embedder`] for the boundary this crate consumes.

pub mod config;
pub mod embedder;
pub mod error;
pub mod memory_db;
pub mod recall;
pub mod telemetry;
pub mod vector_index;

// Public API exports
pub use config::MemoryConfig;
pub use embedder::Embedder;
pub use error::{MemoryError, Result};
pub use memory_db::{DatabaseStats, MemoryDatabase, Role, StoredMessage, StoredSummary};
pub use recall::{MemoryContext, RecallEngine};
pub use vector_index::{IndexBackend, VectorIndex};
