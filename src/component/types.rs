//! Component module core types
//!
//! Candidate regions coming out of segmentation, the intermediate regions
//! that survive filtering, and the final classified components.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::geometry::{BBox, ImageDims, NormBox};

// ============================================================
// Constants
// ============================================================

/// Structural typing: top band ratio for `header`
pub const STRUCTURAL_HEADER_Y_RATIO: f64 = 0.2;

/// Structural typing: bottom band ratio for `footer`
pub const STRUCTURAL_FOOTER_Y_RATIO: f64 = 0.85;

/// Structural typing: minimum pixel side for a `card`
pub const STRUCTURAL_CARD_MIN_SIDE: u32 = 150;

// ============================================================
// Error Types
// ============================================================

/// Errors raised while cropping a region out of the source image
#[derive(Debug, Error)]
pub enum CropError {
    #[error("Mask is {mask_w}x{mask_h} but image is {image_w}x{image_h}")]
    MaskMismatch {
        mask_w: u32,
        mask_h: u32,
        image_w: u32,
        image_h: u32,
    },

    #[error("Region {0:?} lies outside the image")]
    OutOfBounds(BBox),
}

pub type Result<T> = std::result::Result<T, CropError>;

// ============================================================
// Candidate regions
// ============================================================

/// Pixel mask covering the whole source image (non-zero = inside)
pub type Mask = GrayImage;

/// Raw region as produced by a segmenter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Pixel bounding box, may extend past the image before clamping
    pub bbox: BBox,
    /// Raw confidence or mask coverage, expected in `[0, 1]`
    #[serde(alias = "predicted_iou", alias = "mask_area", default)]
    pub confidence: f32,
    /// Position in the segmenter's output
    #[serde(default)]
    pub source_index: usize,
    /// Optional segmentation mask
    #[serde(skip)]
    pub mask: Option<Mask>,
}

impl Candidate {
    /// Create a candidate without a mask
    pub fn new(bbox: BBox, confidence: f32, source_index: usize) -> Self {
        Self {
            bbox,
            confidence,
            source_index,
            mask: None,
        }
    }

    /// Attach a segmentation mask
    #[must_use]
    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Confidence clamped to `[0, 1]`, NaN treated as zero
    pub fn clamped_confidence(&self) -> f32 {
        if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        }
    }
}

// ============================================================
// Taxonomy
// ============================================================

/// Coarse position-derived type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralType {
    Header,
    Footer,
    Body,
    Card,
    Element,
}

impl StructuralType {
    /// Type a lone region gets from where it sits on the page
    pub fn from_position(bbox: &BBox, dims: ImageDims) -> Self {
        let y_ratio = bbox.y as f64 / dims.height.max(1) as f64;

        if y_ratio < STRUCTURAL_HEADER_Y_RATIO {
            StructuralType::Header
        } else if y_ratio > STRUCTURAL_FOOTER_Y_RATIO {
            StructuralType::Footer
        } else if bbox.width > STRUCTURAL_CARD_MIN_SIDE && bbox.height > STRUCTURAL_CARD_MIN_SIDE {
            StructuralType::Card
        } else {
            StructuralType::Element
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StructuralType::Header => "header",
            StructuralType::Footer => "footer",
            StructuralType::Body => "body",
            StructuralType::Card => "card",
            StructuralType::Element => "element",
        }
    }
}

/// Taxonomy group a semantic label belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyGroup {
    Layout,
    Content,
    Interactive,
    Social,
    Specialized,
}

/// Final UI component label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    // Layout
    Header,
    Navigation,
    Hero,
    Banner,
    PromoBanner,
    Breadcrumb,
    Sidebar,
    MainContent,
    Footer,
    Copyright,
    // Content
    Section,
    Article,
    Widget,
    Gallery,
    Testimonials,
    PricingTable,
    Faq,
    Features,
    // Interactive
    CtaButton,
    Form,
    LoginForm,
    SearchForm,
    InputField,
    // Social & support
    SocialLinks,
    ChatWidget,
    Modal,
    Popup,
    // Specialized
    ProductCard,
    Card,
    Menu,
    Logo,
    Element,
}

impl SemanticType {
    /// Every label, in declaration order
    pub const ALL: [SemanticType; 32] = [
        SemanticType::Header,
        SemanticType::Navigation,
        SemanticType::Hero,
        SemanticType::Banner,
        SemanticType::PromoBanner,
        SemanticType::Breadcrumb,
        SemanticType::Sidebar,
        SemanticType::MainContent,
        SemanticType::Footer,
        SemanticType::Copyright,
        SemanticType::Section,
        SemanticType::Article,
        SemanticType::Widget,
        SemanticType::Gallery,
        SemanticType::Testimonials,
        SemanticType::PricingTable,
        SemanticType::Faq,
        SemanticType::Features,
        SemanticType::CtaButton,
        SemanticType::Form,
        SemanticType::LoginForm,
        SemanticType::SearchForm,
        SemanticType::InputField,
        SemanticType::SocialLinks,
        SemanticType::ChatWidget,
        SemanticType::Modal,
        SemanticType::Popup,
        SemanticType::ProductCard,
        SemanticType::Card,
        SemanticType::Menu,
        SemanticType::Logo,
        SemanticType::Element,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Header => "header",
            SemanticType::Navigation => "navigation",
            SemanticType::Hero => "hero",
            SemanticType::Banner => "banner",
            SemanticType::PromoBanner => "promo_banner",
            SemanticType::Breadcrumb => "breadcrumb",
            SemanticType::Sidebar => "sidebar",
            SemanticType::MainContent => "main_content",
            SemanticType::Footer => "footer",
            SemanticType::Copyright => "copyright",
            SemanticType::Section => "section",
            SemanticType::Article => "article",
            SemanticType::Widget => "widget",
            SemanticType::Gallery => "gallery",
            SemanticType::Testimonials => "testimonials",
            SemanticType::PricingTable => "pricing_table",
            SemanticType::Faq => "faq",
            SemanticType::Features => "features",
            SemanticType::CtaButton => "cta_button",
            SemanticType::Form => "form",
            SemanticType::LoginForm => "login_form",
            SemanticType::SearchForm => "search_form",
            SemanticType::InputField => "input_field",
            SemanticType::SocialLinks => "social_links",
            SemanticType::ChatWidget => "chat_widget",
            SemanticType::Modal => "modal",
            SemanticType::Popup => "popup",
            SemanticType::ProductCard => "product_card",
            SemanticType::Card => "card",
            SemanticType::Menu => "menu",
            SemanticType::Logo => "logo",
            SemanticType::Element => "element",
        }
    }

    pub fn group(&self) -> TaxonomyGroup {
        use SemanticType::*;
        match self {
            Header | Navigation | Hero | Banner | PromoBanner | Breadcrumb | Sidebar
            | MainContent | Footer | Copyright => TaxonomyGroup::Layout,
            Section | Article | Widget | Gallery | Testimonials | PricingTable | Faq
            | Features => TaxonomyGroup::Content,
            CtaButton | Form | LoginForm | SearchForm | InputField => TaxonomyGroup::Interactive,
            SocialLinks | ChatWidget | Modal | Popup => TaxonomyGroup::Social,
            ProductCard | Card | Menu | Logo | Element => TaxonomyGroup::Specialized,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown label text
#[derive(Debug, Error)]
#[error("Unknown semantic type: {0}")]
pub struct UnknownSemanticType(pub String);

impl FromStr for SemanticType {
    type Err = UnknownSemanticType;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        SemanticType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == key)
            .ok_or_else(|| UnknownSemanticType(s.to_string()))
    }
}

// ============================================================
// Regions and components
// ============================================================

/// A region that survived filtering (or a cluster of several)
#[derive(Debug, Clone)]
pub struct Region {
    /// Pixel box, inside the image
    pub bbox: BBox,
    /// Box relative to the image
    pub bbox_norm: NormBox,
    pub structural_type: StructuralType,
    /// Confidence in `[0, 1]` (average for clusters)
    pub confidence: f32,
    /// Number of raw candidates merged into this region
    pub num_children: usize,
    /// Index of the originating candidate, `None` for merged regions
    pub source_index: Option<usize>,
    /// Mask of the originating candidate, dropped on merge
    pub mask: Option<Mask>,
}

impl Region {
    /// Build a single-candidate region; `bbox` must already be clamped
    pub fn from_candidate(candidate: Candidate, bbox: BBox, dims: ImageDims) -> Self {
        Self {
            bbox,
            bbox_norm: bbox.normalize(dims),
            structural_type: StructuralType::from_position(&bbox, dims),
            confidence: candidate.clamped_confidence(),
            num_children: 1,
            source_index: Some(candidate.source_index),
            mask: candidate.mask,
        }
    }

    /// Merge several regions into one envelope with averaged confidence
    ///
    /// Returns `None` for an empty member list.
    pub fn merged(
        members: &[Region],
        structural_type: StructuralType,
        dims: ImageDims,
    ) -> Option<Self> {
        let bbox = BBox::envelope(members.iter().map(|m| &m.bbox))?;
        let confidence =
            members.iter().map(|m| m.confidence).sum::<f32>() / members.len() as f32;
        Some(Self {
            bbox,
            bbox_norm: bbox.normalize(dims),
            structural_type,
            confidence: confidence.clamp(0.0, 1.0),
            num_children: members.len(),
            source_index: None,
            mask: None,
        })
    }
}

/// Final, classified UI component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub bbox: BBox,
    pub bbox_norm: NormBox,
    #[serde(rename = "type")]
    pub structural_type: StructuralType,
    pub semantic_type: SemanticType,
    pub confidence: f32,
    pub num_children: usize,
    /// Advisory positional plausibility of `semantic_type`
    pub spatial_score: f32,
    /// Present in every record, `null` unless embeddings were requested
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

// ============================================================
// Filter statistics
// ============================================================

/// Why candidates left the pipeline before classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub total: usize,
    pub degenerate: usize,
    pub mask_errors: usize,
    pub too_small: usize,
    pub too_large: usize,
    pub low_confidence: usize,
    pub bad_aspect: usize,
    pub suppressed: usize,
    pub survivors: usize,
}

impl FilterStats {
    /// Number of candidates removed for any reason
    pub fn rejected(&self) -> usize {
        self.total.saturating_sub(self.survivors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_type_roundtrip_str() {
        for t in SemanticType::ALL {
            assert_eq!(t.as_str().parse::<SemanticType>().unwrap(), t);
        }
        assert_eq!("CTA Button".parse::<SemanticType>().unwrap(), SemanticType::CtaButton);
        assert!("carousel".parse::<SemanticType>().is_err());
    }

    #[test]
    fn test_semantic_type_serde_snake_case() {
        let json = serde_json::to_string(&SemanticType::PricingTable).unwrap();
        assert_eq!(json, "\"pricing_table\"");
    }

    #[test]
    fn test_taxonomy_groups() {
        assert_eq!(SemanticType::Sidebar.group(), TaxonomyGroup::Layout);
        assert_eq!(SemanticType::Faq.group(), TaxonomyGroup::Content);
        assert_eq!(SemanticType::LoginForm.group(), TaxonomyGroup::Interactive);
        assert_eq!(SemanticType::ChatWidget.group(), TaxonomyGroup::Social);
        assert_eq!(SemanticType::Element.group(), TaxonomyGroup::Specialized);
    }

    #[test]
    fn test_structural_type_from_position() {
        let dims = ImageDims::new(1000, 1000);
        assert_eq!(
            StructuralType::from_position(&BBox::new(0, 50, 1000, 80), dims),
            StructuralType::Header
        );
        assert_eq!(
            StructuralType::from_position(&BBox::new(0, 900, 1000, 80), dims),
            StructuralType::Footer
        );
        assert_eq!(
            StructuralType::from_position(&BBox::new(100, 400, 200, 200), dims),
            StructuralType::Card
        );
        assert_eq!(
            StructuralType::from_position(&BBox::new(100, 400, 100, 40), dims),
            StructuralType::Element
        );
    }

    #[test]
    fn test_candidate_clamped_confidence() {
        let bbox = BBox::new(0, 0, 10, 10);
        assert_eq!(Candidate::new(bbox, 1.4, 0).clamped_confidence(), 1.0);
        assert_eq!(Candidate::new(bbox, -0.2, 0).clamped_confidence(), 0.0);
        assert_eq!(Candidate::new(bbox, f32::NAN, 0).clamped_confidence(), 0.0);
    }

    #[test]
    fn test_candidate_json_aliases() {
        let c: Candidate =
            serde_json::from_str(r#"{"bbox":[1,2,30,40],"predicted_iou":0.91}"#).unwrap();
        assert_eq!(c.bbox, BBox::new(1, 2, 30, 40));
        assert!((c.confidence - 0.91).abs() < 1e-6);
        assert_eq!(c.source_index, 0);
        assert!(c.mask.is_none());
    }

    #[test]
    fn test_region_merged() {
        let dims = ImageDims::new(1000, 1000);
        let a = Region::from_candidate(
            Candidate::new(BBox::new(0, 0, 100, 100), 0.8, 0),
            BBox::new(0, 0, 100, 100),
            dims,
        );
        let b = Region::from_candidate(
            Candidate::new(BBox::new(200, 200, 100, 100), 1.0, 1),
            BBox::new(200, 200, 100, 100),
            dims,
        );
        let merged = Region::merged(&[a, b], StructuralType::Card, dims).unwrap();
        assert_eq!(merged.bbox, BBox::new(0, 0, 300, 300));
        assert_eq!(merged.num_children, 2);
        assert!((merged.confidence - 0.9).abs() < 1e-6);
        assert!(merged.source_index.is_none());
        assert!(Region::merged(&[], StructuralType::Card, dims).is_none());
    }

    #[test]
    fn test_component_embedding_always_serialized() {
        let c = Component {
            bbox: BBox::new(0, 0, 10, 10),
            bbox_norm: NormBox::default(),
            structural_type: StructuralType::Element,
            semantic_type: SemanticType::Element,
            confidence: 0.9,
            num_children: 1,
            spatial_score: 0.9,
            embedding: None,
        };
        let json = serde_json::to_value(&c).unwrap();
        assert!(json["embedding"].is_null());
        assert!(json.as_object().unwrap().contains_key("embedding"));

        // Records written without the key still load
        let mut obj = json.as_object().unwrap().clone();
        obj.remove("embedding");
        let back: Component = serde_json::from_value(serde_json::Value::Object(obj)).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_filter_stats_rejected() {
        let stats = FilterStats {
            total: 10,
            survivors: 4,
            ..Default::default()
        };
        assert_eq!(stats.rejected(), 6);
    }
}
