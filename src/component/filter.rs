//! Candidate filtering and non-max suppression
//!
//! Rejects implausible raw regions (noise, background captures, low
//! confidence, slivers) and then keeps the most confident box of every
//! heavily overlapping group.

use tracing::{debug, warn};

use super::crop::validate_mask;
use super::types::{Candidate, FilterStats, Region};
use crate::config::PipelineConfig;
use crate::geometry::{BBox, ImageDims};

/// Thresholds used by [`ComponentFilter`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOptions {
    /// Smallest kept area as a fraction of the image (default: 0.0005)
    pub min_area_ratio: f64,
    /// Largest kept area as a fraction of the image (default: 0.85)
    pub max_area_ratio: f64,
    /// Candidates below this confidence are dropped (default: 0.70)
    pub confidence_floor: f32,
    /// Maximum of w/h and h/w (default: 15.0)
    pub max_aspect_ratio: f64,
    /// NMS suppresses boxes overlapping a kept one above this IoU (default: 0.7)
    pub iou_threshold: f64,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for FilterOptions {
    fn from(c: &PipelineConfig) -> Self {
        Self {
            min_area_ratio: c.min_area_ratio,
            max_area_ratio: c.max_area_ratio,
            confidence_floor: c.confidence_floor,
            max_aspect_ratio: c.max_aspect_ratio,
            iou_threshold: c.iou_threshold,
        }
    }
}

/// Result of filtering one image's candidates
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Surviving regions, most confident first
    pub regions: Vec<Region>,
    pub stats: FilterStats,
}

/// Why a single candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooSmall,
    TooLarge,
    LowConfidence,
    BadAspect,
}

/// Candidate filter
pub struct ComponentFilter {
    options: FilterOptions,
}

impl ComponentFilter {
    pub fn new(options: FilterOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(FilterOptions::from(config))
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Filter raw candidates into regions
    ///
    /// Boxes are clamped to the image first; anything left degenerate is
    /// dropped and counted. Candidates whose mask cannot be indexed with
    /// image coordinates are dropped with a warning. No cap is put on the
    /// number of survivors.
    pub fn filter(&self, candidates: Vec<Candidate>, dims: ImageDims) -> FilterOutcome {
        let mut stats = FilterStats {
            total: candidates.len(),
            ..Default::default()
        };
        let image_area = dims.area();

        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(bbox) = candidate.bbox.clamp_to(dims) else {
                stats.degenerate += 1;
                continue;
            };

            if let Some(mask) = &candidate.mask {
                if let Err(e) = validate_mask(mask, dims) {
                    warn!(source_index = candidate.source_index, "dropping candidate: {e}");
                    stats.mask_errors += 1;
                    continue;
                }
            }

            match self.check(&bbox, candidate.clamped_confidence(), image_area) {
                Some(Rejection::TooSmall) => stats.too_small += 1,
                Some(Rejection::TooLarge) => stats.too_large += 1,
                Some(Rejection::LowConfidence) => stats.low_confidence += 1,
                Some(Rejection::BadAspect) => stats.bad_aspect += 1,
                None => kept.push(Region::from_candidate(candidate, bbox, dims)),
            }
        }

        let before_nms = kept.len();
        let regions = non_max_suppression(kept, self.options.iou_threshold);
        stats.suppressed = before_nms - regions.len();
        stats.survivors = regions.len();

        debug!(
            total = stats.total,
            survivors = stats.survivors,
            suppressed = stats.suppressed,
            "filtered candidates"
        );

        FilterOutcome { regions, stats }
    }

    /// Apply the rejection rules to one clamped box
    ///
    /// Each rule is independent; the first failing one is reported.
    pub fn check(&self, bbox: &BBox, confidence: f32, image_area: f64) -> Option<Rejection> {
        let area = bbox.area() as f64;
        let o = &self.options;

        if area < image_area * o.min_area_ratio {
            Some(Rejection::TooSmall)
        } else if area > image_area * o.max_area_ratio {
            Some(Rejection::TooLarge)
        } else if confidence < o.confidence_floor {
            Some(Rejection::LowConfidence)
        } else if bbox.elongation() > o.max_aspect_ratio {
            Some(Rejection::BadAspect)
        } else {
            None
        }
    }
}

/// Greedy non-max suppression
///
/// Regions are ordered by confidence (stable for ties); each is kept only
/// if its IoU with every already kept region is at most `iou_threshold`.
/// Running it again on its own output changes nothing.
pub fn non_max_suppression(mut regions: Vec<Region>, iou_threshold: f64) -> Vec<Region> {
    regions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        let overlaps = keep
            .iter()
            .any(|kept| region.bbox.iou(&kept.bbox) > iou_threshold);
        if !overlaps {
            keep.push(region);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn cand(x: u32, y: u32, w: u32, h: u32, conf: f32, idx: usize) -> Candidate {
        Candidate::new(BBox::new(x, y, w, h), conf, idx)
    }

    fn count(options: FilterOptions, cands: &[Candidate], dims: ImageDims) -> usize {
        ComponentFilter::new(options)
            .filter(cands.to_vec(), dims)
            .regions
            .len()
    }

    fn mixed_candidates() -> Vec<Candidate> {
        vec![
            cand(0, 0, 1000, 80, 0.95, 0),
            cand(10, 10, 990, 75, 0.90, 1),
            cand(100, 300, 300, 200, 0.80, 2),
            cand(120, 310, 300, 200, 0.72, 3),
            cand(600, 300, 40, 40, 0.99, 4),
            cand(700, 700, 20, 20, 0.85, 5),
            cand(0, 900, 900, 50, 0.75, 6),
            cand(50, 50, 900, 900, 0.98, 7),
        ]
    }

    #[test]
    fn test_nms_keeps_most_confident() {
        // IoU of these two boxes is 0.8
        let dims = ImageDims::new(1000, 1000);
        let a = cand(0, 0, 100, 100, 0.9, 0);
        let b = cand(0, 0, 100, 80, 0.6, 1);
        assert!((a.bbox.iou(&b.bbox) - 0.8).abs() < 1e-6);

        let options = FilterOptions {
            confidence_floor: 0.5,
            ..Default::default()
        };
        let out = ComponentFilter::new(options).filter(vec![b, a], dims);
        assert_eq!(out.regions.len(), 1);
        assert_eq!(out.regions[0].confidence, 0.9);
        assert_eq!(out.stats.suppressed, 1);
    }

    #[test]
    fn test_nms_idempotent() {
        let dims = ImageDims::new(1000, 1000);
        let regions: Vec<Region> = mixed_candidates()
            .into_iter()
            .map(|c| {
                let b = c.bbox.clamp_to(dims).unwrap();
                Region::from_candidate(c, b, dims)
            })
            .collect();

        let once = non_max_suppression(regions, 0.3);
        let boxes_once: Vec<BBox> = once.iter().map(|r| r.bbox).collect();
        let twice = non_max_suppression(once, 0.3);
        let boxes_twice: Vec<BBox> = twice.iter().map(|r| r.bbox).collect();
        assert_eq!(boxes_once, boxes_twice);
    }

    #[test]
    fn test_min_area_ratio() {
        // 0.2% of a 1000x1000 image
        let dims = ImageDims::new(1000, 1000);
        let c = vec![cand(100, 100, 50, 40, 0.9, 0)];

        let permissive = FilterOptions {
            min_area_ratio: 0.0005,
            ..Default::default()
        };
        assert_eq!(count(permissive, &c, dims), 1);

        let strict = FilterOptions {
            min_area_ratio: 0.01,
            ..Default::default()
        };
        assert_eq!(count(strict, &c, dims), 0);
    }

    #[test]
    fn test_rejection_reasons() {
        let filter = ComponentFilter::new(FilterOptions::default());
        let area = 1_000_000.0;
        assert_eq!(
            filter.check(&BBox::new(0, 0, 10, 10), 0.9, area),
            Some(Rejection::TooSmall)
        );
        assert_eq!(
            filter.check(&BBox::new(0, 0, 1000, 900), 0.9, area),
            Some(Rejection::TooLarge)
        );
        assert_eq!(
            filter.check(&BBox::new(0, 0, 100, 100), 0.5, area),
            Some(Rejection::LowConfidence)
        );
        assert_eq!(
            filter.check(&BBox::new(0, 0, 800, 40), 0.9, area),
            Some(Rejection::BadAspect)
        );
        assert_eq!(filter.check(&BBox::new(0, 0, 100, 100), 0.9, area), None);
    }

    #[test]
    fn test_degenerate_boxes_counted() {
        let dims = ImageDims::new(100, 100);
        let cands = vec![cand(150, 10, 20, 20, 0.9, 0), cand(10, 10, 0, 20, 0.9, 1)];
        let out = ComponentFilter::new(FilterOptions::default()).filter(cands, dims);
        assert!(out.regions.is_empty());
        assert_eq!(out.stats.degenerate, 2);
    }

    #[test]
    fn test_mask_mismatch_dropped() {
        let dims = ImageDims::new(100, 100);
        let bad = cand(10, 10, 30, 30, 0.9, 0).with_mask(GrayImage::new(50, 50));
        let good = cand(50, 50, 30, 30, 0.9, 1).with_mask(GrayImage::new(100, 100));
        let out = ComponentFilter::new(FilterOptions::default()).filter(vec![bad, good], dims);
        assert_eq!(out.regions.len(), 1);
        assert_eq!(out.regions[0].source_index, Some(1));
        assert_eq!(out.stats.mask_errors, 1);
    }

    #[test]
    fn test_empty_input() {
        let out = ComponentFilter::new(FilterOptions::default())
            .filter(Vec::new(), ImageDims::new(800, 600));
        assert!(out.regions.is_empty());
        assert_eq!(out.stats, FilterStats::default());
    }

    #[test]
    fn test_tightening_never_increases_survivors() {
        let dims = ImageDims::new(1000, 1000);
        let cands = mixed_candidates();
        let base = FilterOptions::default();
        let base_count = count(base, &cands, dims);

        let tightened = [
            FilterOptions {
                min_area_ratio: 0.01,
                ..base
            },
            FilterOptions {
                max_area_ratio: 0.5,
                ..base
            },
            FilterOptions {
                confidence_floor: 0.9,
                ..base
            },
            FilterOptions {
                max_aspect_ratio: 5.0,
                ..base
            },
            FilterOptions {
                iou_threshold: 0.3,
                ..base
            },
        ];
        for opts in tightened {
            assert!(count(opts, &cands, dims) <= base_count, "{opts:?}");
        }
    }

    #[test]
    fn test_stats_add_up() {
        let dims = ImageDims::new(1000, 1000);
        let out = ComponentFilter::new(FilterOptions::default()).filter(mixed_candidates(), dims);
        let s = &out.stats;
        assert_eq!(
            s.total,
            s.degenerate
                + s.mask_errors
                + s.too_small
                + s.too_large
                + s.low_confidence
                + s.bad_aspect
                + s.suppressed
                + s.survivors
        );
    }
}
