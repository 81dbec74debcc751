//! Boundary trait for the external embedding computation.

use crate::error::Result;

/// Maps text to a fixed-length float vector.
///
/// Embedding computation lives outside this crate (an ONNX model, a remote
/// service, a hash trick in tests); the store only depends on this seam and
/// validates vector length itself before anything is persisted, regardless
/// of what `dimension()` claims.
pub trait Embedder: Send + Sync {
    /// The length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Compute the embedding for `text`.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
