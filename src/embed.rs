//! Embedding model interface and component embeddings
//!
//! The model itself lives outside this crate; callers construct it once
//! and share it by reference across images.

use image::DynamicImage;
use thiserror::Error;
use tracing::warn;

/// Error type for embedding collaborators
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Empty embedding returned")]
    Empty,

    #[error("Expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },
}

/// Image / text embedding model sharing one vector space
pub trait EmbeddingModel: Send + Sync {
    /// Embed one image
    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch of images, one vector per input in order
    fn embed_images(&self, images: &[&DynamicImage]) -> Result<Vec<Vec<f32>>, EmbedError> {
        images.iter().map(|img| self.embed_image(img)).collect()
    }

    /// Embed a text phrase
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

// ============================================================
// Vector math
// ============================================================

/// Cosine similarity; zero when either vector has no length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Embeddings must have same dimension");

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 1e-12 && norm_b > 1e-12 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Scale a vector to unit length in place
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Numerically stable softmax
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; scores.len()]
    }
}

// ============================================================
// Component embedder
// ============================================================

/// Computes unit-length embeddings for component crops in fixed-size chunks
pub struct ComponentEmbedder<'a> {
    model: &'a dyn EmbeddingModel,
    batch_size: usize,
}

impl<'a> ComponentEmbedder<'a> {
    pub fn new(model: &'a dyn EmbeddingModel, batch_size: usize) -> Self {
        Self {
            model,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed every available crop
    ///
    /// Output is aligned with `crops`. A missing crop or a failing chunk
    /// yields `None` for the affected entries.
    pub fn embed_all(&self, crops: &[Option<DynamicImage>]) -> Vec<Option<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; crops.len()];

        let present: Vec<(usize, &DynamicImage)> = crops
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|img| (i, img)))
            .collect();

        for chunk in present.chunks(self.batch_size) {
            let images: Vec<&DynamicImage> = chunk.iter().map(|(_, img)| *img).collect();
            match self.embed_chunk(&images) {
                Ok(vectors) => {
                    for ((idx, _), mut v) in chunk.iter().zip(vectors) {
                        l2_normalize(&mut v);
                        out[*idx] = Some(v);
                    }
                }
                Err(e) => warn!(chunk_len = chunk.len(), "embedding chunk failed: {e}"),
            }
        }
        out
    }

    fn embed_chunk(&self, images: &[&DynamicImage]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let vectors = self.model.embed_images(images)?;
        if vectors.len() != images.len() {
            return Err(EmbedError::CountMismatch {
                expected: images.len(),
                got: vectors.len(),
            });
        }
        if vectors.iter().any(|v| v.is_empty()) {
            return Err(EmbedError::Empty);
        }
        Ok(vectors)
    }
}
