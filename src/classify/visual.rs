//! Visual classifier collaborator
//!
//! Given a crop and the labels still in play, a visual classifier returns
//! its best label with a confidence in `[0, 1]`. [`ZeroShotClassifier`]
//! implements this over any [`EmbeddingModel`] by comparing the crop's
//! embedding with embeddings of each label's phrase.

use image::DynamicImage;
use std::collections::HashMap;
use thiserror::Error;

use super::labels::{LabelPrompt, PromptLabel};
use crate::embed::{cosine_similarity, l2_normalize, softmax, EmbedError, EmbeddingModel};

/// Error type for visual classification
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("No candidate labels offered")]
    NoLabels,

    #[error("No phrase embedding for label {0}")]
    UnknownLabel(PromptLabel),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Batch returned {got} results for {expected} requests")]
    BatchMismatch { expected: usize, got: usize },

    #[error("Classifier error: {0}")]
    Other(String),
}

/// Best label for one crop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualMatch {
    pub label: PromptLabel,
    pub confidence: f32,
}

impl VisualMatch {
    /// Reject answers outside the offered labels or the unit interval
    pub fn validated(self, offered: &[LabelPrompt]) -> Result<Self, ClassifierError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ClassifierError::Malformed(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if !offered.iter().any(|p| p.label == self.label) {
            return Err(ClassifierError::Malformed(format!(
                "label {} was not offered",
                self.label
            )));
        }
        Ok(self)
    }
}

/// One crop and the labels it may be assigned
#[derive(Debug, Clone)]
pub struct VisualRequest<'a> {
    pub crop: &'a DynamicImage,
    pub labels: Vec<LabelPrompt>,
}

/// Visual classification collaborator
///
/// Implementations must be deterministic for fixed weights and inputs and
/// must not mutate shared state per call.
pub trait VisualClassifier: Send + Sync {
    /// Classify a single crop
    fn classify(
        &self,
        crop: &DynamicImage,
        labels: &[LabelPrompt],
    ) -> Result<VisualMatch, ClassifierError>;

    /// Classify several crops; results map 1:1 onto `requests`
    ///
    /// An outer error means the whole batch failed.
    fn classify_batch(
        &self,
        requests: &[VisualRequest<'_>],
    ) -> Result<Vec<Result<VisualMatch, ClassifierError>>, ClassifierError> {
        Ok(requests
            .iter()
            .map(|r| self.classify(r.crop, &r.labels))
            .collect())
    }
}

// ============================================================
// Zero-shot classifier over an embedding model
// ============================================================

/// Softmax over cosine similarities between crop and phrase embeddings
pub struct ZeroShotClassifier<M> {
    model: M,
    phrase_embeddings: HashMap<PromptLabel, Vec<f32>>,
}

impl<M: EmbeddingModel> ZeroShotClassifier<M> {
    /// Embed every phrase once up front
    pub fn new(model: M, prompts: &[LabelPrompt]) -> Result<Self, EmbedError> {
        let mut phrase_embeddings = HashMap::with_capacity(prompts.len());
        for prompt in prompts {
            let mut v = model.embed_text(prompt.phrase)?;
            if v.is_empty() {
                return Err(EmbedError::Empty);
            }
            l2_normalize(&mut v);
            phrase_embeddings.insert(prompt.label, v);
        }
        Ok(Self {
            model,
            phrase_embeddings,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    fn score(
        &self,
        mut image_embedding: Vec<f32>,
        labels: &[LabelPrompt],
    ) -> Result<VisualMatch, ClassifierError> {
        if labels.is_empty() {
            return Err(ClassifierError::NoLabels);
        }
        l2_normalize(&mut image_embedding);

        let mut similarities = Vec::with_capacity(labels.len());
        for prompt in labels {
            let text = self
                .phrase_embeddings
                .get(&prompt.label)
                .ok_or(ClassifierError::UnknownLabel(prompt.label))?;
            if text.len() != image_embedding.len() {
                return Err(ClassifierError::Malformed(format!(
                    "embedding dimensions differ: image {} vs text {}",
                    image_embedding.len(),
                    text.len()
                )));
            }
            similarities.push(cosine_similarity(&image_embedding, text));
        }

        let probs = softmax(&similarities);
        let (best_idx, best_prob) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            });

        Ok(VisualMatch {
            label: labels[best_idx].label,
            confidence: best_prob.clamp(0.0, 1.0),
        })
    }
}

impl<M: EmbeddingModel> VisualClassifier for ZeroShotClassifier<M> {
    fn classify(
        &self,
        crop: &DynamicImage,
        labels: &[LabelPrompt],
    ) -> Result<VisualMatch, ClassifierError> {
        let embedding = self.model.embed_image(crop)?;
        self.score(embedding, labels)
    }

    fn classify_batch(
        &self,
        requests: &[VisualRequest<'_>],
    ) -> Result<Vec<Result<VisualMatch, ClassifierError>>, ClassifierError> {
        let crops: Vec<&DynamicImage> = requests.iter().map(|r| r.crop).collect();
        let embeddings = self.model.embed_images(&crops)?;
        if embeddings.len() != requests.len() {
            return Err(ClassifierError::BatchMismatch {
                expected: requests.len(),
                got: embeddings.len(),
            });
        }
        Ok(embeddings
            .into_iter()
            .zip(requests)
            .map(|(emb, req)| self.score(emb, &req.labels))
            .collect())
    }
}
