//! Geometric rule stages
//!
//! Each stage returns `None` when it has no opinion so the classifier can
//! fall through to the next one.

use crate::component::SemanticType;
use crate::geometry::{BBox, ImageDims};

/// Strong header rule: top band ratio
pub const STRONG_HEADER_MAX_Y: f64 = 0.08;
/// Strong header rule: minimum width ratio
pub const STRONG_HEADER_MIN_WIDTH: f64 = 0.90;
/// Strong header rule: absolute top offset in pixels
pub const STRONG_HEADER_MAX_Y_PX: u32 = 100;

/// Chat widget corner thresholds
pub const CHAT_MIN_X: f64 = 0.90;
pub const CHAT_MIN_Y: f64 = 0.85;
pub const CHAT_MAX_AREA: f64 = 0.02;

/// Area fallback: above this ratio a region is a `section`
pub const SECTION_MIN_AREA: f64 = 0.15;
/// Area fallback: above this ratio a region is a `widget`
pub const WIDGET_MIN_AREA: f64 = 0.05;

/// Only the unmistakable cases
///
/// Footers are never assigned here: screenshots are usually cropped to the
/// viewport and rarely contain a real footer band.
pub fn strong_rules(bbox: &BBox, dims: ImageDims) -> Option<SemanticType> {
    let r = bbox.ratios(dims);

    if r.y < STRONG_HEADER_MAX_Y && r.width > STRONG_HEADER_MIN_WIDTH && bbox.y < STRONG_HEADER_MAX_Y_PX
    {
        return Some(SemanticType::Header);
    }

    if r.x > CHAT_MIN_X && r.y > CHAT_MIN_Y && r.area < CHAT_MAX_AREA {
        return Some(SemanticType::ChatWidget);
    }

    None
}

/// Looser heuristics, checked in order
pub fn weak_rules(bbox: &BBox, dims: ImageDims) -> Option<SemanticType> {
    let r = bbox.ratios(dims);

    // Header with a relaxed band
    if r.y < 0.20 && r.width > 0.6 {
        return Some(SemanticType::Header);
    }

    // Thin, wide strip near the top
    if r.y < 0.25 && r.height < 0.05 && r.width > 0.3 && r.aspect > 5.0 {
        return Some(SemanticType::Breadcrumb);
    }

    // Narrow and tall
    if r.width < 0.30 && r.height > 0.35 {
        return Some(SemanticType::Sidebar);
    }

    // Small to medium block in the upper-middle band
    if r.y > 0.15 && r.y < 0.5 && r.area > 0.01 && r.area < 0.08 {
        return Some(SemanticType::CtaButton);
    }

    // Thin horizontal band
    if r.height < 0.08 && r.width > 0.25 && r.aspect > 4.0 {
        return Some(SemanticType::Form);
    }

    None
}

/// Last resort: label by size alone
pub fn area_fallback(bbox: &BBox, dims: ImageDims) -> SemanticType {
    let area = bbox.ratios(dims).area;
    if area > SECTION_MIN_AREA {
        SemanticType::Section
    } else if area > WIDGET_MIN_AREA {
        SemanticType::Widget
    } else {
        SemanticType::Element
    }
}
