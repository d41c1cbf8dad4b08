//! Component detection stages
//!
//! Raw candidates become regions through filtering and NMS, optionally get
//! grouped into sections, and are cropped for the visual classifier and the
//! embedder.

mod cluster;
mod crop;
mod filter;
mod types;

pub use cluster::{band_of, Band, SpatialClusterer};
pub use crop::{crop_for, crop_region, validate_mask};
pub use filter::{non_max_suppression, ComponentFilter, FilterOptions, FilterOutcome, Rejection};
pub use types::{
    Candidate, Component, CropError, FilterStats, Mask, Region, SemanticType, StructuralType,
    TaxonomyGroup, UnknownSemanticType,
};
