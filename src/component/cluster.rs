//! Hierarchical grouping of filtered regions
//!
//! Splits regions into header / footer / body bands, folds the bands into
//! single envelopes where they are plausible, and clusters the body into
//! card-like groups by centroid proximity.

use tracing::debug;

use super::types::{Region, StructuralType};
use crate::geometry::ImageDims;

// ============================================================
// Constants
// ============================================================

/// Regions whose vertical center is above this ratio belong to the header band
pub const HEADER_BAND_RATIO: f64 = 0.25;

/// Regions whose vertical center is below this ratio may belong to the footer
pub const FOOTER_BAND_RATIO: f64 = 0.95;

/// Minimum width ratio for a footer candidate
pub const FOOTER_CANDIDATE_WIDTH_RATIO: f64 = 0.7;

/// At least one footer member must span this width ratio
pub const FOOTER_FULL_WIDTH_RATIO: f64 = 0.9;

/// Header envelope must start above this height ratio
pub const HEADER_MAX_TOP_RATIO: f64 = 0.3;

/// Merge distance as a fraction of the shorter image side
pub const CLUSTER_DISTANCE_RATIO: f64 = 0.15;

/// Vertical band a region falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Header,
    FooterCandidate,
    Body,
}

/// Classify a region into a vertical band
pub fn band_of(region: &Region, dims: ImageDims) -> Band {
    let (_, cy) = region.bbox.center();
    let y_ratio = cy / dims.height.max(1) as f64;

    if y_ratio < HEADER_BAND_RATIO {
        Band::Header
    } else if y_ratio > FOOTER_BAND_RATIO
        && region.bbox.width as f64 > dims.width as f64 * FOOTER_CANDIDATE_WIDTH_RATIO
    {
        Band::FooterCandidate
    } else {
        Band::Body
    }
}

/// Spatial clusterer
pub struct SpatialClusterer;

impl SpatialClusterer {
    /// Group regions into header, footer and card sections
    ///
    /// Output order is header, footer, then body clusters in order of their
    /// first member. Every output region has `num_children >= 1`.
    pub fn cluster(regions: Vec<Region>, dims: ImageDims) -> Vec<Region> {
        if regions.is_empty() {
            return Vec::new();
        }

        let mut header = Vec::new();
        let mut footer = Vec::new();
        let mut body = Vec::new();

        for region in regions {
            match band_of(&region, dims) {
                Band::Header => header.push(region),
                Band::FooterCandidate => footer.push(region),
                Band::Body => body.push(region),
            }
        }

        // A footer needs at least one near full-width member
        let has_real_footer = footer
            .iter()
            .any(|r| r.bbox.width as f64 > dims.width as f64 * FOOTER_FULL_WIDTH_RATIO);
        if !has_real_footer {
            body.append(&mut footer);
        }

        let mut grouped = Vec::new();

        if let Some(envelope) = Region::merged(&header, StructuralType::Header, dims) {
            if (envelope.bbox.y as f64) < dims.height as f64 * HEADER_MAX_TOP_RATIO {
                grouped.push(envelope);
            } else {
                body.append(&mut header);
            }
        }

        if let Some(envelope) = Region::merged(&footer, StructuralType::Footer, dims) {
            grouped.push(envelope);
        }

        let threshold = dims.min_side() as f64 * CLUSTER_DISTANCE_RATIO;
        for members in Self::agglomerate(body, threshold) {
            if let Some(card) = Region::merged(&members, StructuralType::Card, dims) {
                grouped.push(card);
            }
        }

        debug!(sections = grouped.len(), "clustered regions");
        grouped
    }

    /// Merge clusters until a full pass makes no merge
    ///
    /// Two clusters merge when the closest pair of member centers is nearer
    /// than `threshold` (single linkage).
    pub fn agglomerate(regions: Vec<Region>, threshold: f64) -> Vec<Vec<Region>> {
        let mut clusters: Vec<Vec<Region>> = regions.into_iter().map(|r| vec![r]).collect();

        let mut merged = true;
        while merged {
            merged = false;
            let mut i = 0;
            while i < clusters.len() {
                let mut j = i + 1;
                while j < clusters.len() {
                    if Self::cluster_distance(&clusters[i], &clusters[j]) < threshold {
                        let absorbed = clusters.remove(j);
                        clusters[i].extend(absorbed);
                        merged = true;
                    } else {
                        j += 1;
                    }
                }
                i += 1;
            }
        }

        clusters
    }

    /// Minimum center distance between any two members
    fn cluster_distance(a: &[Region], b: &[Region]) -> f64 {
        a.iter()
            .flat_map(|ra| b.iter().map(move |rb| ra.bbox.center_distance(&rb.bbox)))
            .fold(f64::INFINITY, f64::min)
    }
}
