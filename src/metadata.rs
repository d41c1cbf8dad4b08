//! Page-level metadata summary
//!
//! Derived, read-only view of a component list: counts and average size per
//! semantic type, a top-to-bottom layout signature, and compact component
//! records for storage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::component::{Component, SemanticType, StructuralType};
use crate::geometry::{BBox, NormBox};

/// Separator between labels in the layout signature
pub const SIGNATURE_SEPARATOR: &str = "-";

/// Count and average normalized area for one semantic type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: usize,
    /// Mean of `bbox_norm.width * bbox_norm.height`, rounded to 4 decimals
    pub avg_size: f64,
}

/// Compact component record for storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    #[serde(rename = "type")]
    pub structural_type: StructuralType,
    pub semantic_type: SemanticType,
    pub bbox: BBox,
    pub bbox_norm: NormBox,
    pub confidence: f32,
}

impl From<&Component> for ComponentRecord {
    fn from(c: &Component) -> Self {
        Self {
            structural_type: c.structural_type,
            semantic_type: c.semantic_type,
            bbox: c.bbox,
            bbox_norm: c.bbox_norm,
            confidence: c.confidence,
        }
    }
}

/// Summary of one screenshot's components
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub total_components: usize,
    pub by_type: BTreeMap<SemanticType, TypeStats>,
    pub layout_signature: String,
    /// In detection order
    pub components: Vec<ComponentRecord>,
}

impl ComponentMetadata {
    pub fn is_empty(&self) -> bool {
        self.total_components == 0
    }
}

/// Builds [`ComponentMetadata`] from final components
pub struct MetadataBuilder;

impl MetadataBuilder {
    pub fn build(components: &[Component]) -> ComponentMetadata {
        if components.is_empty() {
            return ComponentMetadata::default();
        }

        let mut totals: BTreeMap<SemanticType, (usize, f64)> = BTreeMap::new();
        for c in components {
            let entry = totals.entry(c.semantic_type).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += c.bbox_norm.area();
        }
        let by_type = totals
            .into_iter()
            .map(|(t, (count, total))| {
                let avg_size = round4(total / count as f64);
                (t, TypeStats { count, avg_size })
            })
            .collect();

        ComponentMetadata {
            total_components: components.len(),
            by_type,
            layout_signature: layout_signature(components),
            components: components.iter().map(ComponentRecord::from).collect(),
        }
    }
}

/// Semantic labels ordered by normalized top edge, joined with `-`
///
/// Ties keep detection order.
pub fn layout_signature(components: &[Component]) -> String {
    let mut ordered: Vec<&Component> = components.iter().collect();
    ordered.sort_by(|a, b| a.bbox_norm.y.total_cmp(&b.bbox_norm.y));
    ordered
        .iter()
        .map(|c| c.semantic_type.as_str())
        .collect::<Vec<_>>()
        .join(SIGNATURE_SEPARATOR)
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

// ============================================================
// Serialization and lookup helpers
// ============================================================

pub fn metadata_to_json(metadata: &ComponentMetadata) -> serde_json::Result<String> {
    serde_json::to_string(metadata)
}

/// Parse stored metadata; an empty string yields an empty summary
pub fn json_to_metadata(json: &str) -> serde_json::Result<ComponentMetadata> {
    if json.trim().is_empty() {
        return Ok(ComponentMetadata::default());
    }
    serde_json::from_str(json)
}

/// Distinct semantic types present in a summary
pub fn component_types(metadata: &ComponentMetadata) -> Vec<SemanticType> {
    metadata.by_type.keys().copied().collect()
}

pub fn filter_by_type(components: &[Component], semantic_type: SemanticType) -> Vec<&Component> {
    components
        .iter()
        .filter(|c| c.semantic_type == semantic_type)
        .collect()
}

/// Components grouped by semantic type, detection order kept within a group
pub fn group_by_type(components: &[Component]) -> BTreeMap<SemanticType, Vec<&Component>> {
    let mut groups: BTreeMap<SemanticType, Vec<&Component>> = BTreeMap::new();
    for c in components {
        groups.entry(c.semantic_type).or_default().push(c);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ImageDims;

    fn component(semantic_type: SemanticType, bbox: BBox) -> Component {
        let dims = ImageDims::new(1000, 1000);
        Component {
            bbox,
            bbox_norm: bbox.normalize(dims),
            structural_type: StructuralType::from_position(&bbox, dims),
            semantic_type,
            confidence: 0.9,
            num_children: 1,
            spatial_score: 0.9,
            embedding: None,
        }
    }

    fn sample() -> Vec<Component> {
        vec![
            component(SemanticType::Hero, BBox::new(0, 100, 1000, 400)),
            component(SemanticType::Header, BBox::new(0, 0, 1000, 80)),
            component(SemanticType::Widget, BBox::new(0, 600, 300, 300)),
            component(SemanticType::Widget, BBox::new(500, 600, 200, 200)),
        ]
    }

    #[test]
    fn test_build_empty() {
        let meta = MetadataBuilder::build(&[]);
        assert_eq!(meta.total_components, 0);
        assert!(meta.by_type.is_empty());
        assert_eq!(meta.layout_signature, "");
        assert!(meta.components.is_empty());
        assert!(meta.is_empty());
    }

    #[test]
    fn test_build_counts_and_avg_size() {
        let meta = MetadataBuilder::build(&sample());
        assert_eq!(meta.total_components, 4);
        let widget = &meta.by_type[&SemanticType::Widget];
        assert_eq!(widget.count, 2);
        // (0.09 + 0.04) / 2
        assert!((widget.avg_size - 0.065).abs() < 1e-9);
        assert_eq!(meta.by_type[&SemanticType::Header].avg_size, 0.08);
    }

    #[test]
    fn test_signature_sorted_but_records_in_detection_order() {
        let meta = MetadataBuilder::build(&sample());
        assert_eq!(meta.layout_signature, "header-hero-widget-widget");
        assert_eq!(meta.components[0].semantic_type, SemanticType::Hero);
        assert_eq!(meta.components[1].semantic_type, SemanticType::Header);
    }

    #[test]
    fn test_avg_size_rounded() {
        let comps = vec![component(SemanticType::Element, BBox::new(0, 0, 123, 457))];
        let meta = MetadataBuilder::build(&comps);
        // 0.123 * 0.457 = 0.056211
        assert_eq!(meta.by_type[&SemanticType::Element].avg_size, 0.0562);
    }

    #[test]
    fn test_json_roundtrip_and_empty_string() {
        let meta = MetadataBuilder::build(&sample());
        let json = metadata_to_json(&meta).unwrap();
        assert!(json.contains("\"layout_signature\":\"header-hero-widget-widget\""));
        assert!(json.contains("\"type\":"));
        assert_eq!(json_to_metadata(&json).unwrap(), meta);

        assert_eq!(json_to_metadata("").unwrap(), ComponentMetadata::default());
        assert!(json_to_metadata("{not json").is_err());
    }

    #[test]
    fn test_type_helpers() {
        let comps = sample();
        let meta = MetadataBuilder::build(&comps);
        assert_eq!(
            component_types(&meta),
            vec![SemanticType::Header, SemanticType::Hero, SemanticType::Widget]
        );
        assert_eq!(filter_by_type(&comps, SemanticType::Widget).len(), 2);
        assert!(filter_by_type(&comps, SemanticType::Footer).is_empty());

        let groups = group_by_type(&comps);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&SemanticType::Widget][0].bbox, BBox::new(0, 600, 300, 300));
    }
}
