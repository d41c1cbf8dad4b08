//! Spatial plausibility scoring
//!
//! Judges whether a label makes sense for where its box sits on the page.
//! The score is advisory: the classifier never filters on it.

use crate::component::SemanticType;
use crate::geometry::BBox;

/// Every value [`SpatialVerifier::verify`] can return
pub const SPATIAL_SCORE_TIERS: [f32; 7] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.9, 1.0];

/// Score for labels without a positional constraint
pub const UNCONSTRAINED_SCORE: f32 = 0.9;

/// Positional plausibility scorer
pub struct SpatialVerifier;

impl SpatialVerifier {
    /// Tiered plausibility of `semantic_type` at `bbox` in an `img_w` x `img_h` image
    pub fn verify(semantic_type: SemanticType, bbox: &BBox, img_w: u32, img_h: u32) -> f32 {
        let (cx, cy) = bbox.center();
        let norm_x = cx / img_w.max(1) as f64;
        let norm_y = cy / img_h.max(1) as f64;

        match semantic_type {
            SemanticType::Header | SemanticType::Navigation => {
                if norm_y < 0.45 {
                    1.0
                } else if norm_y < 0.6 {
                    0.5
                } else {
                    0.1
                }
            }
            SemanticType::Footer => {
                if norm_y > 0.7 {
                    1.0
                } else if norm_y > 0.5 {
                    0.5
                } else {
                    0.1
                }
            }
            SemanticType::Sidebar => {
                let height_ratio = bbox.height as f64 / img_h.max(1) as f64;
                if height_ratio < 0.4 {
                    0.3
                } else if norm_x < 0.25 || norm_x > 0.75 {
                    1.0
                } else {
                    0.2
                }
            }
            SemanticType::Hero => {
                if norm_y < 0.6 {
                    1.0
                } else {
                    0.4
                }
            }
            _ => UNCONSTRAINED_SCORE,
        }
    }
}
