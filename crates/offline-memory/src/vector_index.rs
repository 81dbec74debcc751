//! In-memory similarity index over the ledger's embeddings.
//!
//! The index is a disposable projection of the embeddings table: a snapshot
//! of L2-normalized vectors plus the parallel message-id list, rebuilt
//! wholesale and swapped in atomically. It records the ledger version it was
//! built from, so a search after new embedding writes rebuilds instead of
//! serving stale rows.
//!
//! Two backends sit behind the same surface: an exact normalized
//! inner-product scan (always available) and an optional HNSW index behind
//! the `hnsw` cargo feature. A configured-but-uncompiled backend degrades to
//! the exact scan; it never fails the session.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{MemoryError, Result};
use crate::memory_db::EmbeddingStore;

/// Which search backend a store is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Exact inner-product scan over the normalized snapshot.
    Linear,
    /// Approximate HNSW search; requires the `hnsw` feature.
    Hnsw,
}

impl IndexBackend {
    pub fn parse(s: &str) -> Option<IndexBackend> {
        match s {
            "linear" => Some(IndexBackend::Linear),
            "hnsw" => Some(IndexBackend::Hnsw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexBackend::Linear => "linear",
            IndexBackend::Hnsw => "hnsw",
        }
    }
}

/// One immutable build of the index.
///
/// `rows` is row-major: `ids[i]`'s normalized vector occupies
/// `rows[i * dim .. (i + 1) * dim]`.
struct Snapshot {
    rows: Vec<f32>,
    ids: Vec<i64>,
    version: u64,
    accel: Option<accel::Index>,
}

enum IndexState {
    Unbuilt,
    Built(Snapshot),
}

pub struct VectorIndex {
    dim: usize,
    backend: IndexBackend,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    pub fn new(dim: usize, backend: IndexBackend) -> Self {
        Self {
            dim,
            backend,
            state: RwLock::new(IndexState::Unbuilt),
        }
    }

    /// Whether a snapshot has been published (possibly with zero rows).
    pub fn is_built(&self) -> bool {
        matches!(*self.state.read().unwrap(), IndexState::Built(_))
    }

    /// Rebuild the snapshot from a full ledger scan and publish it.
    ///
    /// The ledger version is read before the scan; a write landing between
    /// scan and publish at worst triggers one extra rebuild on the next
    /// search, never a stale result going unnoticed.
    pub fn build(&self, ledger: &EmbeddingStore) -> Result<()> {
        let version = ledger.version();
        let stored = ledger.all_embeddings()?;

        let mut rows = Vec::with_capacity(stored.len() * self.dim);
        let mut ids = Vec::with_capacity(stored.len());
        for (message_id, mut vector) in stored {
            l2_normalize(&mut vector);
            rows.extend_from_slice(&vector);
            ids.push(message_id);
        }

        let accel = match self.backend {
            IndexBackend::Linear => None,
            IndexBackend::Hnsw => match accel::build(self.dim, &rows, &ids) {
                Ok(index) => Some(index),
                Err(err) => {
                    warn!("accelerated index unavailable, using exact scan: {err}");
                    None
                }
            },
        };

        info!("Built vector index over {} embeddings (version {})", ids.len(), version);
        *self.state.write().unwrap() = IndexState::Built(Snapshot {
            rows,
            ids,
            version,
            accel,
        });
        Ok(())
    }

    /// Top-`top_k` message ids by cosine similarity to `query`, best first.
    ///
    /// Builds lazily on first use and rebuilds when the ledger version has
    /// moved. Ties are broken by insertion order: the earlier row wins.
    /// Returns fewer than `top_k` ids when fewer rows exist; never pads.
    pub fn search(&self, ledger: &EmbeddingStore, query: &[f32], top_k: usize) -> Result<Vec<i64>> {
        if query.len() != self.dim {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        self.ensure_fresh(ledger)?;

        let state = self.state.read().unwrap();
        let snapshot = match &*state {
            IndexState::Built(snapshot) => snapshot,
            // ensure_fresh published a snapshot; treat a racing reset as empty
            IndexState::Unbuilt => return Ok(Vec::new()),
        };
        if snapshot.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut normalized = query.to_vec();
        l2_normalize(&mut normalized);

        if let Some(accel) = &snapshot.accel {
            return Ok(accel::search(accel, &normalized, top_k));
        }
        Ok(self.scan(snapshot, &normalized, top_k))
    }

    /// Exact search: inner product of normalized vectors is cosine
    /// similarity. All arithmetic stays in f32 to match stored precision.
    fn scan(&self, snapshot: &Snapshot, query: &[f32], top_k: usize) -> Vec<i64> {
        let mut scored: Vec<(usize, f32)> = snapshot
            .ids
            .iter()
            .enumerate()
            .map(|(row, _)| {
                let vector = &snapshot.rows[row * self.dim..(row + 1) * self.dim];
                (row, dot(vector, query))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        scored.into_iter().map(|(row, _)| snapshot.ids[row]).collect()
    }

    fn ensure_fresh(&self, ledger: &EmbeddingStore) -> Result<()> {
        let fresh = match &*self.state.read().unwrap() {
            IndexState::Built(snapshot) => {
                let current = ledger.version();
                if snapshot.version != current {
                    debug!(
                        "Vector index stale (built at {}, ledger at {})",
                        snapshot.version, current
                    );
                    false
                } else {
                    true
                }
            }
            IndexState::Unbuilt => false,
        };
        if fresh {
            return Ok(());
        }
        self.build(ledger)
    }
}

/// Normalize to unit length in place. A zero vector is left unchanged; it
/// ranks last in similarity rather than poisoning the search with a NaN.
pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let magnitude = dot(vector, vector).sqrt();
    if magnitude == 0.0 {
        return;
    }
    for v in vector.iter_mut() {
        *v /= magnitude;
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(feature = "hnsw")]
mod accel {
    use hora::core::ann_index::ANNIndex;
    use hora::core::metrics::Metric;
    use hora::index::hnsw_idx::HNSWIndex;
    use hora::index::hnsw_params::HNSWParams;

    use crate::error::{MemoryError, Result};

    pub(super) type Index = HNSWIndex<f32, i64>;

    pub(super) fn build(dim: usize, rows: &[f32], ids: &[i64]) -> Result<Index> {
        let params = HNSWParams {
            n_neighbor: 16,
            ef_build: 100,
            ef_search: 50,
            ..Default::default()
        };
        let mut index = HNSWIndex::<f32, i64>::new(dim, &params);
        for (i, id) in ids.iter().enumerate() {
            let row = rows[i * dim..(i + 1) * dim].to_vec();
            let _ = index.add(&row, *id);
        }
        index
            .build(Metric::CosineSimilarity)
            .map_err(|e| MemoryError::Index(e.to_string()))?;
        Ok(index)
    }

    pub(super) fn search(index: &Index, query: &[f32], top_k: usize) -> Vec<i64> {
        index.search(query, top_k)
    }
}

#[cfg(not(feature = "hnsw"))]
mod accel {
    use crate::error::{MemoryError, Result};

    /// Uninhabitable placeholder; `build` always reports the backend missing.
    pub(super) struct Index {
        _never: std::convert::Infallible,
    }

    pub(super) fn build(_dim: usize, _rows: &[f32], _ids: &[i64]) -> Result<Index> {
        Err(MemoryError::IndexUnavailable("hnsw"))
    }

    pub(super) fn search(index: &Index, _query: &[f32], _top_k: usize) -> Vec<i64> {
        match index._never {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::MemoryDatabase;

    fn db(dim: usize) -> MemoryDatabase {
        MemoryDatabase::open_in_memory(dim).unwrap()
    }

    fn index(dim: usize) -> VectorIndex {
        VectorIndex::new(dim, IndexBackend::Linear)
    }

    // ===== Normalization Tests =====

    #[test]
    fn test_l2_normalize_produces_unit_length() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        let magnitude = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((magnitude - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_l2_normalize_leaves_zero_vector_unchanged() {
        let mut v = vec![0.0f32, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    // ===== Search Ranking Tests =====

    #[test]
    fn test_search_ranks_by_descending_cosine_similarity() {
        let db = db(2);
        // Similarities against [1, 0]: 1.0, ~0.994, ~0.707, 0.0, -1.0
        db.embeddings.add_embedding(1, &[1.0, 0.0]).unwrap();
        db.embeddings.add_embedding(2, &[0.9, 0.1]).unwrap();
        db.embeddings.add_embedding(3, &[0.7, 0.7]).unwrap();
        db.embeddings.add_embedding(4, &[0.0, 1.0]).unwrap();
        db.embeddings.add_embedding(5, &[-1.0, 0.0]).unwrap();

        let ix = index(2);
        let hits = ix.search(&db.embeddings, &[1.0, 0.0], 3).unwrap();
        assert_eq!(hits, vec![1, 2, 3]);
    }

    #[test]
    fn test_search_two_of_three_scenario() {
        let db = db(2);
        db.embeddings.add_embedding(10, &[1.0, 0.0]).unwrap();
        db.embeddings.add_embedding(11, &[0.0, 1.0]).unwrap();
        db.embeddings.add_embedding(12, &[0.9, 0.1]).unwrap();

        let ix = index(2);
        let hits = ix.search(&db.embeddings, &[1.0, 0.0], 2).unwrap();
        assert_eq!(hits, vec![10, 12]);
    }

    #[test]
    fn test_search_tie_broken_by_insertion_order() {
        let db = db(2);
        // Same direction, different magnitude: identical once normalized
        db.embeddings.add_embedding(7, &[1.0, 0.0]).unwrap();
        db.embeddings.add_embedding(8, &[2.0, 0.0]).unwrap();

        let ix = index(2);
        let hits = ix.search(&db.embeddings, &[1.0, 0.0], 2).unwrap();
        assert_eq!(hits, vec![7, 8]);
    }

    #[test]
    fn test_search_magnitude_does_not_affect_ranking() {
        let db = db(2);
        db.embeddings.add_embedding(1, &[0.1, 0.0]).unwrap();
        db.embeddings.add_embedding(2, &[0.0, 100.0]).unwrap();

        let ix = index(2);
        let hits = ix.search(&db.embeddings, &[1.0, 0.0], 1).unwrap();
        assert_eq!(hits, vec![1]);
    }

    #[test]
    fn test_zero_vector_candidate_ranks_last() {
        let db = db(2);
        db.embeddings.add_embedding(1, &[0.0, 0.0]).unwrap();
        db.embeddings.add_embedding(2, &[1.0, 0.0]).unwrap();
        db.embeddings.add_embedding(3, &[0.5, 0.5]).unwrap();

        let ix = index(2);
        let hits = ix.search(&db.embeddings, &[1.0, 0.0], 3).unwrap();
        assert_eq!(hits, vec![2, 3, 1]);
    }

    // ===== Edge Case Tests =====

    #[test]
    fn test_search_on_empty_ledger_returns_empty() {
        let db = db(2);
        let ix = index(2);
        assert!(ix.search(&db.embeddings, &[1.0, 0.0], 5).unwrap().is_empty());
        // Zero embeddings still counts as Built, not Unbuilt
        assert!(ix.is_built());
    }

    #[test]
    fn test_search_top_k_zero_returns_empty() {
        let db = db(2);
        db.embeddings.add_embedding(1, &[1.0, 0.0]).unwrap();
        let ix = index(2);
        assert!(ix.search(&db.embeddings, &[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_top_k_beyond_rows_returns_all_without_padding() {
        let db = db(2);
        db.embeddings.add_embedding(1, &[1.0, 0.0]).unwrap();
        db.embeddings.add_embedding(2, &[0.0, 1.0]).unwrap();

        let ix = index(2);
        let hits = ix.search(&db.embeddings, &[1.0, 0.0], 50).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_rejects_wrong_query_dimension() {
        let db = db(2);
        let ix = index(2);
        let err = ix.search(&db.embeddings, &[1.0, 0.0, 0.0], 5).unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    // ===== Lifecycle Tests =====

    #[test]
    fn test_search_builds_lazily() {
        let db = db(2);
        db.embeddings.add_embedding(1, &[1.0, 0.0]).unwrap();
        let ix = index(2);
        assert!(!ix.is_built());
        ix.search(&db.embeddings, &[1.0, 0.0], 1).unwrap();
        assert!(ix.is_built());
    }

    #[test]
    fn test_stale_index_rebuilds_after_new_write() {
        let db = db(2);
        db.embeddings.add_embedding(1, &[0.0, 1.0]).unwrap();

        let ix = index(2);
        let first = ix.search(&db.embeddings, &[1.0, 0.0], 5).unwrap();
        assert_eq!(first, vec![1]);

        // A better match written after the build must be visible
        db.embeddings.add_embedding(2, &[1.0, 0.0]).unwrap();
        let second = ix.search(&db.embeddings, &[1.0, 0.0], 5).unwrap();
        assert_eq!(second, vec![2, 1]);
    }

    #[test]
    fn test_repeated_searches_without_writes_reuse_snapshot() {
        let db = db(2);
        db.embeddings.add_embedding(1, &[1.0, 0.0]).unwrap();

        let ix = index(2);
        ix.search(&db.embeddings, &[1.0, 0.0], 1).unwrap();
        let version_before = db.embeddings.version();
        ix.search(&db.embeddings, &[0.0, 1.0], 1).unwrap();
        assert_eq!(db.embeddings.version(), version_before);
    }

    #[test]
    fn test_explicit_build_forces_refresh() {
        let db = db(2);
        let ix = index(2);
        ix.build(&db.embeddings).unwrap();
        assert!(ix.is_built());
        db.embeddings.add_embedding(1, &[1.0, 0.0]).unwrap();
        ix.build(&db.embeddings).unwrap();
        let hits = ix.search(&db.embeddings, &[1.0, 0.0], 1).unwrap();
        assert_eq!(hits, vec![1]);
    }

    // ===== Backend Selection Tests =====

    #[test]
    fn test_hnsw_backend_degrades_without_feature_or_answers_with_it() {
        let db = db(2);
        db.embeddings.add_embedding(1, &[1.0, 0.0]).unwrap();

        // Either the accelerated index answers or the build falls back to
        // the exact scan; both return the sole row, neither errors.
        let ix = VectorIndex::new(2, IndexBackend::Hnsw);
        let hits = ix.search(&db.embeddings, &[1.0, 0.0], 1).unwrap();
        assert_eq!(hits, vec![1]);
    }

    #[test]
    fn test_index_backend_parse() {
        assert_eq!(IndexBackend::parse("linear"), Some(IndexBackend::Linear));
        assert_eq!(IndexBackend::parse("hnsw"), Some(IndexBackend::Hnsw));
        assert_eq!(IndexBackend::parse("faiss"), None);
    }
}
