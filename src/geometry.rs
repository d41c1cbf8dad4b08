//! Bounding-box geometry
//!
//! Pixel-space boxes, their normalized counterparts and the overlap /
//! distance measures used by filtering, clustering and classification.

use serde::{Deserialize, Serialize};

// ============================================================
// Constants
// ============================================================

/// Added to IoU denominators so two empty boxes never divide by zero
pub const IOU_EPSILON: f64 = 1e-6;

/// Added to the short side when computing aspect ratios
pub const ASPECT_EPSILON: f64 = 1e-6;

// ============================================================
// Image dimensions
// ============================================================

/// Width and height of the source screenshot in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDims {
    pub width: u32,
    pub height: u32,
}

impl ImageDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel area
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    /// True when either side is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Shorter of the two sides
    pub fn min_side(&self) -> u32 {
        self.width.min(self.height)
    }
}

// ============================================================
// Pixel bounding box
// ============================================================

/// Axis-aligned bounding box `[x, y, w, h]` in pixels
///
/// Serialized as a four element array so records read the same as the
/// segmentation output they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl From<[u32; 4]> for BBox {
    fn from(v: [u32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [u32; 4] {
    fn from(b: BBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

impl BBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge (exclusive)
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Bottom edge (exclusive)
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Area in pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width divided by height (`w / (h + eps)`)
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / (self.height as f64 + ASPECT_EPSILON)
    }

    /// Long side over short side, orientation independent
    pub fn elongation(&self) -> f64 {
        let long = self.width.max(self.height) as f64;
        let short = self.width.min(self.height) as f64;
        long / (short + ASPECT_EPSILON)
    }

    /// Center point in pixels
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Euclidean distance between the centers of two boxes
    pub fn center_distance(&self, other: &BBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// True when width or height is zero
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection area with another box
    pub fn intersection_area(&self, other: &BBox) -> u64 {
        let x1 = self.x.max(other.x) as u64;
        let y1 = self.y.max(other.y) as u64;
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        x2.saturating_sub(x1) * y2.saturating_sub(y1)
    }

    /// Intersection over union, in `[0, 1]`
    pub fn iou(&self, other: &BBox) -> f64 {
        let inter = self.intersection_area(other) as f64;
        let union = self.area() as f64 + other.area() as f64 - inter;
        inter / (union + IOU_EPSILON)
    }

    /// Smallest box containing both boxes
    pub fn union(&self, other: &BBox) -> BBox {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        BBox::new(x1, y1, (x2 - x1 as u64) as u32, (y2 - y1 as u64) as u32)
    }

    /// Envelope of a set of boxes, `None` for an empty set
    pub fn envelope<'a, I>(boxes: I) -> Option<BBox>
    where
        I: IntoIterator<Item = &'a BBox>,
    {
        boxes.into_iter().fold(None, |acc, b| match acc {
            None => Some(*b),
            Some(env) => Some(env.union(b)),
        })
    }

    /// Clip the box to the image bounds
    ///
    /// Returns `None` when nothing of positive width and height remains.
    pub fn clamp_to(&self, dims: ImageDims) -> Option<BBox> {
        if self.x >= dims.width || self.y >= dims.height {
            return None;
        }
        let w = (self.right().min(dims.width as u64) - self.x as u64) as u32;
        let h = (self.bottom().min(dims.height as u64) - self.y as u64) as u32;
        let clamped = BBox::new(self.x, self.y, w, h);
        (!clamped.is_degenerate()).then_some(clamped)
    }

    /// True when the box lies fully inside the image
    pub fn is_within(&self, dims: ImageDims) -> bool {
        self.right() <= dims.width as u64 && self.bottom() <= dims.height as u64
    }

    /// Normalize against the image dimensions
    pub fn normalize(&self, dims: ImageDims) -> NormBox {
        if dims.is_empty() {
            return NormBox::default();
        }
        let w = dims.width as f64;
        let h = dims.height as f64;
        NormBox {
            x: (self.x as f64 / w).clamp(0.0, 1.0),
            y: (self.y as f64 / h).clamp(0.0, 1.0),
            width: (self.width as f64 / w).clamp(0.0, 1.0),
            height: (self.height as f64 / h).clamp(0.0, 1.0),
        }
    }

    /// Position and size ratios relative to the image
    pub fn ratios(&self, dims: ImageDims) -> BoxRatios {
        let w = dims.width.max(1) as f64;
        let h = dims.height.max(1) as f64;
        BoxRatios {
            x: self.x as f64 / w,
            y: self.y as f64 / h,
            width: self.width as f64 / w,
            height: self.height as f64 / h,
            area: self.area() as f64 / (w * h),
            aspect: self.aspect_ratio(),
        }
    }
}

/// Image-relative measurements of a box, precomputed once per rule pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxRatios {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub area: f64,
    pub aspect: f64,
}

// ============================================================
// Normalized bounding box
// ============================================================

/// Bounding box relative to the image, each field in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct NormBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<[f64; 4]> for NormBox {
    fn from(v: [f64; 4]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            width: v[2],
            height: v[3],
        }
    }
}

impl From<NormBox> for [f64; 4] {
    fn from(b: NormBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

impl NormBox {
    /// Normalized area (`w * h`)
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_boxes() {
        let a = BBox::new(10, 10, 100, 50);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_symmetric() {
        let a = BBox::new(0, 0, 100, 100);
        let b = BBox::new(40, 30, 120, 90);
        assert_eq!(a.iou(&b), b.iou(&a));
    }

    #[test]
    fn test_iou_disjoint_and_empty() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(20, 20, 10, 10);
        assert_eq!(a.iou(&b), 0.0);

        let empty = BBox::new(5, 5, 0, 0);
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BBox::new(0, 0, 100, 100);
        let b = BBox::new(50, 0, 100, 100);
        // 5000 / 15000
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_aspect_and_elongation() {
        let wide = BBox::new(0, 0, 1000, 80);
        assert!((wide.aspect_ratio() - 12.5).abs() < 1e-6);
        assert!((wide.elongation() - 12.5).abs() < 1e-6);

        let tall = BBox::new(0, 0, 20, 400);
        assert!(tall.aspect_ratio() < 0.06);
        assert!((tall.elongation() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_union_and_envelope() {
        let a = BBox::new(10, 20, 30, 40);
        let b = BBox::new(100, 5, 10, 10);
        assert_eq!(a.union(&b), BBox::new(10, 5, 100, 55));
        assert_eq!(BBox::envelope(&[a, b]), Some(BBox::new(10, 5, 100, 55)));
        assert_eq!(BBox::envelope(&[]), None);
    }

    #[test]
    fn test_clamp_to_image() {
        let dims = ImageDims::new(100, 100);
        assert_eq!(
            BBox::new(90, 90, 50, 50).clamp_to(dims),
            Some(BBox::new(90, 90, 10, 10))
        );
        assert_eq!(BBox::new(100, 10, 5, 5).clamp_to(dims), None);
        assert_eq!(BBox::new(10, 10, 0, 5).clamp_to(dims), None);
        assert!(BBox::new(0, 0, 100, 100).is_within(dims));
        assert!(!BBox::new(1, 0, 100, 100).is_within(dims));
    }

    #[test]
    fn test_normalize() {
        let dims = ImageDims::new(1000, 2000);
        let norm = BBox::new(100, 500, 500, 1000).normalize(dims);
        assert!((norm.x - 0.1).abs() < 1e-9);
        assert!((norm.y - 0.25).abs() < 1e-9);
        assert!((norm.width - 0.5).abs() < 1e-9);
        assert!((norm.height - 0.5).abs() < 1e-9);
        assert!((norm.area() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_center_distance() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(30, 40, 10, 10);
        assert!((a.center_distance(&b) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_serializes_as_array() {
        let json = serde_json::to_string(&BBox::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let back: BBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BBox::new(1, 2, 3, 4));
    }
}
