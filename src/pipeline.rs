//! Per-image component pipeline
//!
//! filter → (cluster) → classify → refine → verify → (embed) → metadata
//!
//! Stages run sequentially within an image. Batches run images in parallel
//! on a dedicated rayon pool; collaborators are shared read-only.

use image::DynamicImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::{ClassifierOptions, SemanticClassifier, VisualClassifier};
use crate::component::{
    crop_for, Candidate, Component, ComponentFilter, FilterStats, Region, SpatialClusterer,
};
use crate::config::{ConfigError, PipelineConfig};
use crate::embed::{ComponentEmbedder, EmbeddingModel};
use crate::geometry::ImageDims;
use crate::metadata::{ComponentMetadata, MetadataBuilder};
use crate::segment::{SegmentError, Segmenter};
use crate::verify::SpatialVerifier;

/// Error type for the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Image loading failed: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Segmentation failed: {0}")]
    Segment(#[from] SegmentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================
// Cancellation
// ============================================================

/// Shared flag for cooperative cancellation
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation token plus optional deadline for one image
///
/// Checked between stages; a stage already running is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: CancelToken,
    deadline: Option<(Instant, Duration)>,
}

impl RunControl {
    /// No cancellation, no deadline
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Deadline measured from now
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some((Instant::now() + timeout, timeout));
        self
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Err once cancelled or past the deadline
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some((deadline, timeout)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(PipelineError::TimedOut(timeout));
            }
        }
        Ok(())
    }
}

// ============================================================
// Output
// ============================================================

/// Everything produced for one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Hex SHA-256 of the source file, when loaded from disk
    pub image_id: Option<String>,
    pub dims: ImageDims,
    pub components: Vec<Component>,
    pub metadata: ComponentMetadata,
    pub stats: FilterStats,
}

/// Hex SHA-256 of file contents
pub fn image_id(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// One image of a batch
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub path: PathBuf,
    /// Candidates to use instead of running the segmenter
    pub candidates: Option<Vec<Candidate>>,
}

impl BatchInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            candidates: None,
        }
    }

    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = Some(candidates);
        self
    }
}

/// Result for one image of a batch
#[derive(Debug)]
pub struct BatchItem {
    pub path: PathBuf,
    pub result: Result<PipelineOutput>,
}

/// Batch progress callback
pub trait BatchProgress: Sync {
    /// Called once per finished image, from worker threads
    fn on_image_done(&self, _path: &Path, _ok: bool) {}
}

/// No-op progress
pub struct SilentProgress;

impl BatchProgress for SilentProgress {}

// ============================================================
// Pipeline
// ============================================================

/// Component pipeline bound to one configuration and set of collaborators
pub struct ComponentPipeline<'a> {
    config: PipelineConfig,
    segmenter: &'a dyn Segmenter,
    visual: Option<&'a dyn VisualClassifier>,
    embedder: Option<&'a dyn EmbeddingModel>,
}

impl<'a> ComponentPipeline<'a> {
    pub fn new(config: PipelineConfig, segmenter: &'a dyn Segmenter) -> Self {
        Self {
            config,
            segmenter,
            visual: None,
            embedder: None,
        }
    }

    #[must_use]
    pub fn with_visual(mut self, visual: &'a dyn VisualClassifier) -> Self {
        self.visual = Some(visual);
        self
    }

    #[must_use]
    pub fn with_embedder(mut self, embedder: &'a dyn EmbeddingModel) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load an image from disk, segment it and process it
    pub fn run_path(&self, path: &Path) -> Result<PipelineOutput> {
        self.run_path_with_control(path, None, &RunControl::new())
    }

    /// [`Self::run_path`] with optional precomputed candidates and a run control
    pub fn run_path_with_control(
        &self,
        path: &Path,
        candidates: Option<Vec<Candidate>>,
        control: &RunControl,
    ) -> Result<PipelineOutput> {
        if !path.exists() {
            return Err(PipelineError::InputNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let id = image_id(&bytes);
        let image = image::load_from_memory(&bytes)?;
        control.check()?;

        let candidates = match candidates {
            Some(c) => c,
            None => self.segmenter.segment(&image)?,
        };
        let mut output = self.process_with_control(&image, candidates, control)?;
        output.image_id = Some(id);
        Ok(output)
    }

    /// Segment an in-memory image and process it
    pub fn run_image(&self, image: &DynamicImage) -> Result<PipelineOutput> {
        let candidates = self.segmenter.segment(image)?;
        self.process(image, candidates)
    }

    /// Process candidates that were already segmented
    pub fn process(
        &self,
        image: &DynamicImage,
        candidates: Vec<Candidate>,
    ) -> Result<PipelineOutput> {
        self.process_with_control(image, candidates, &RunControl::new())
    }

    /// Process candidates, stopping between stages on cancellation or timeout
    ///
    /// A stopped run returns an error and no partial output.
    pub fn process_with_control(
        &self,
        image: &DynamicImage,
        candidates: Vec<Candidate>,
        control: &RunControl,
    ) -> Result<PipelineOutput> {
        let start = Instant::now();
        let dims = ImageDims::new(image.width(), image.height());
        control.check()?;

        // Step 1: filter + NMS
        let outcome = ComponentFilter::from_config(&self.config).filter(candidates, dims);
        let stats = outcome.stats;
        control.check()?;

        // Step 2: optional clustering
        let regions = if self.config.enable_clustering {
            SpatialClusterer::cluster(outcome.regions, dims)
        } else {
            outcome.regions
        };
        control.check()?;

        // Step 3: crops for the collaborators that need them
        let visual = self
            .visual
            .filter(|_| self.config.enable_visual_classifier);
        let embedder = self.embedder.filter(|_| self.config.embed_components);
        let crops = if visual.is_some() || embedder.is_some() {
            Self::crop_all(image, &regions)
        } else {
            vec![None; regions.len()]
        };
        control.check()?;

        // Step 4: classify + refine
        let mut classifier = SemanticClassifier::new(ClassifierOptions::from(&self.config));
        if let Some(v) = visual {
            classifier = classifier.with_visual(v);
        }
        let classifications = classifier.classify_all(&regions, &crops, dims);
        control.check()?;

        // Step 5: optional embeddings
        let embeddings = match embedder {
            Some(model) => {
                ComponentEmbedder::new(model, self.config.embedding_batch_size).embed_all(&crops)
            }
            None => vec![None; regions.len()],
        };
        control.check()?;

        // Step 6: assemble components with spatial scores
        let components: Vec<Component> = regions
            .into_iter()
            .zip(classifications)
            .zip(embeddings)
            .map(|((region, class), embedding)| Component {
                spatial_score: SpatialVerifier::verify(
                    class.semantic_type,
                    &region.bbox,
                    dims.width,
                    dims.height,
                ),
                bbox: region.bbox,
                bbox_norm: region.bbox_norm,
                structural_type: region.structural_type,
                semantic_type: class.semantic_type,
                confidence: region.confidence,
                num_children: region.num_children,
                embedding,
            })
            .collect();

        let metadata = MetadataBuilder::build(&components);

        info!(
            candidates = stats.total,
            components = components.len(),
            layout = %metadata.layout_signature,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "image processed"
        );

        Ok(PipelineOutput {
            image_id: None,
            dims,
            components,
            metadata,
            stats,
        })
    }

    fn crop_all(image: &DynamicImage, regions: &[Region]) -> Vec<Option<DynamicImage>> {
        regions
            .iter()
            .map(|region| match crop_for(image, region) {
                Ok(crop) => Some(crop),
                Err(e) => {
                    warn!(source_index = ?region.source_index, "crop failed, skipping visual stages: {e}");
                    None
                }
            })
            .collect()
    }

    /// Process many images in parallel
    ///
    /// Each image gets its own deadline from `image_timeout_secs`; `cancel`
    /// stops images that have not finished yet. Results keep input order.
    pub fn run_batch(
        &self,
        inputs: Vec<BatchInput>,
        cancel: &CancelToken,
        progress: &dyn BatchProgress,
    ) -> Result<Vec<BatchItem>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.effective_jobs())
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        let timeout = self.config.image_timeout_secs.map(Duration::from_secs);
        debug!(images = inputs.len(), jobs = self.config.effective_jobs(), "starting batch");

        let items = pool.install(|| {
            inputs
                .into_par_iter()
                .map(|input| {
                    let mut control = RunControl::new().with_cancel(cancel.clone());
                    if let Some(t) = timeout {
                        control = control.with_timeout(t);
                    }
                    let result =
                        self.run_path_with_control(&input.path, input.candidates, &control);
                    if let Err(e) = &result {
                        warn!(path = %input.path.display(), "image failed: {e}");
                    }
                    progress.on_image_done(&input.path, result.is_ok());
                    BatchItem {
                        path: input.path,
                        result,
                    }
                })
                .collect::<Vec<_>>()
        });

        let failed = items.iter().filter(|i| i.result.is_err()).count();
        info!(images = items.len(), failed, "batch finished");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::SemanticType;
    use crate::geometry::BBox;
    use crate::segment::PrecomputedSegmenter;

    fn white(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(w, h, image::Rgb([255, 255, 255])))
    }

    #[test]
    fn test_process_empty() {
        let seg = PrecomputedSegmenter::default();
        let pipeline = ComponentPipeline::new(PipelineConfig::default(), &seg);
        let out = pipeline.process(&white(100, 100), Vec::new()).unwrap();
        assert!(out.components.is_empty());
        assert_eq!(out.metadata.total_components, 0);
        assert_eq!(out.stats, FilterStats::default());
    }

    #[test]
    fn test_process_header() {
        let seg = PrecomputedSegmenter::default();
        let pipeline = ComponentPipeline::new(PipelineConfig::default(), &seg);
        let out = pipeline
            .process(
                &white(1000, 2000),
                vec![Candidate::new(BBox::new(0, 0, 1000, 80), 0.95, 0)],
            )
            .unwrap();
        assert_eq!(out.components.len(), 1);
        let c = &out.components[0];
        assert_eq!(c.semantic_type, SemanticType::Header);
        assert_eq!(c.spatial_score, 1.0);
        assert!(c.embedding.is_none());
        assert_eq!(out.metadata.layout_signature, "header");
    }

    #[test]
    fn test_cancelled_before_start() {
        let seg = PrecomputedSegmenter::default();
        let pipeline = ComponentPipeline::new(PipelineConfig::default(), &seg);
        let token = CancelToken::new();
        token.cancel();
        let control = RunControl::new().with_cancel(token);
        let err = pipeline
            .process_with_control(&white(10, 10), Vec::new(), &control)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[test]
    fn test_zero_timeout() {
        let control = RunControl::new().with_timeout(Duration::ZERO);
        assert!(matches!(control.check(), Err(PipelineError::TimedOut(_))));
        assert!(RunControl::new().check().is_ok());
    }

    #[test]
    fn test_image_id_is_sha256_hex() {
        assert_eq!(
            image_id(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_run_path_missing() {
        let seg = PrecomputedSegmenter::default();
        let pipeline = ComponentPipeline::new(PipelineConfig::default(), &seg);
        assert!(matches!(
            pipeline.run_path(Path::new("/definitely/not/here.png")),
            Err(PipelineError::InputNotFound(_))
        ));
    }
}
