//! Segmentation collaborators
//!
//! A segmenter turns a screenshot into raw candidate regions. Model-backed
//! segmenters live outside this crate; two in-crate implementations cover
//! precomputed candidates and a GPU-free edge-based fallback.

use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::morphology::dilate;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::component::Candidate;
use crate::geometry::BBox;

/// Error type for segmentation
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Image has no pixels")]
    EmptyImage,

    #[error("Segmentation model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Candidate file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SegmentError>;

/// Produces raw candidate regions for an image
///
/// Output order is unspecified.
pub trait Segmenter: Send + Sync {
    fn segment(&self, image: &DynamicImage) -> Result<Vec<Candidate>>;
}

// ============================================================
// Precomputed candidates
// ============================================================

/// Returns candidates produced elsewhere, such as a mask generator export
#[derive(Debug, Clone, Default)]
pub struct PrecomputedSegmenter {
    candidates: Vec<Candidate>,
}

impl PrecomputedSegmenter {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// Parse a JSON array of `{bbox, confidence | predicted_iou}` records
    pub fn from_json(json: &str) -> Result<Self> {
        let mut candidates: Vec<Candidate> = serde_json::from_str(json)?;
        for (i, c) in candidates.iter_mut().enumerate() {
            c.source_index = i;
        }
        Ok(Self { candidates })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }
}

impl Segmenter for PrecomputedSegmenter {
    fn segment(&self, _image: &DynamicImage) -> Result<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }
}

// ============================================================
// Rule-based segmenter
// ============================================================

/// Options for [`RuleBasedSegmenter`]
#[derive(Debug, Clone)]
pub struct RuleBasedOptions {
    /// Header band as a fraction of image height (default: 0.15)
    pub header_ratio: f64,
    /// Footer band as a fraction of image height (default: 0.10)
    pub footer_ratio: f64,
    /// Bands no taller than this are not emitted (default: 50)
    pub min_band_height: u32,
    /// Minimum card width in pixels (default: 100)
    pub min_card_width: u32,
    /// Minimum card height in pixels (default: 100)
    pub min_card_height: u32,
    /// Canny low threshold (default: 50.0)
    pub canny_low: f32,
    /// Canny high threshold (default: 150.0)
    pub canny_high: f32,
    /// Number of 3x3 dilation passes (default: 2)
    pub dilate_iterations: u32,
}

impl Default for RuleBasedOptions {
    fn default() -> Self {
        Self {
            header_ratio: 0.15,
            footer_ratio: 0.10,
            min_band_height: 50,
            min_card_width: 100,
            min_card_height: 100,
            canny_low: 50.0,
            canny_high: 150.0,
            dilate_iterations: 2,
        }
    }
}

/// Header / footer / body bands plus edge-detected cards in the body
#[derive(Debug, Clone, Default)]
pub struct RuleBasedSegmenter {
    options: RuleBasedOptions,
}

impl RuleBasedSegmenter {
    pub fn new(options: RuleBasedOptions) -> Self {
        Self { options }
    }

    fn detect_cards(&self, body: &GrayImage, y_offset: u32) -> Vec<BBox> {
        let edges = canny(body, self.options.canny_low, self.options.canny_high);

        let mut dilated = edges;
        for _ in 0..self.options.dilate_iterations {
            dilated = dilate(&dilated, Norm::LInf, 1);
        }

        let contours = find_contours::<u32>(&dilated);
        let mut cards = Vec::new();

        for contour in &contours {
            // External contours only
            if contour.border_type == BorderType::Hole || contour.parent.is_some() {
                continue;
            }
            if contour.points.is_empty() {
                continue;
            }

            let mut min_x = u32::MAX;
            let mut min_y = u32::MAX;
            let mut max_x = 0u32;
            let mut max_y = 0u32;
            for p in &contour.points {
                min_x = min_x.min(p.x);
                min_y = min_y.min(p.y);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }

            let w = max_x - min_x + 1;
            let h = max_y - min_y + 1;
            if w >= self.options.min_card_width && h >= self.options.min_card_height {
                cards.push(BBox::new(min_x, y_offset + min_y, w, h));
            }
        }
        cards
    }
}

impl Segmenter for RuleBasedSegmenter {
    fn segment(&self, image: &DynamicImage) -> Result<Vec<Candidate>> {
        let (w, h) = (image.width(), image.height());
        if w == 0 || h == 0 {
            return Err(SegmentError::EmptyImage);
        }

        let header_h = (h as f64 * self.options.header_ratio) as u32;
        let footer_start = (h as f64 * (1.0 - self.options.footer_ratio)) as u32;
        let footer_h = h - footer_start.min(h);

        let mut boxes = Vec::new();
        if header_h > self.options.min_band_height {
            boxes.push(BBox::new(0, 0, w, header_h));
        }
        if footer_h > self.options.min_band_height {
            boxes.push(BBox::new(0, footer_start, w, footer_h));
        }

        if footer_start > header_h {
            let body_h = footer_start - header_h;
            boxes.push(BBox::new(0, header_h, w, body_h));

            let body = image.crop_imm(0, header_h, w, body_h).to_luma8();
            boxes.extend(self.detect_cards(&body, header_h));
        }

        debug!(width = w, height = h, regions = boxes.len(), "rule-based segmentation");

        Ok(boxes
            .into_iter()
            .enumerate()
            .map(|(i, bbox)| Candidate::new(bbox, 1.0, i))
            .collect())
    }
}
