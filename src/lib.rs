//! uilayout - UI screenshot component extraction
//!
//! Turns the noisy regions a segmentation model finds on a screenshot into a
//! clean, typed list of UI components (header, footer, form, button, ...)
//! plus a metadata summary for storage and search.
//!
//! # Pipeline
//!
//! 1. [`ComponentFilter`] rejects implausible candidates and runs NMS
//! 2. [`SpatialClusterer`] optionally groups regions into sections
//! 3. [`SemanticClassifier`] labels each region
//! 4. [`SpatialVerifier`] scores label plausibility
//! 5. [`MetadataBuilder`] summarises the page
//!
//! [`ComponentPipeline`] runs all of it for one image or a batch.
//!
//! # Example
//!
//! ```no_run
//! use uilayout::{ComponentPipeline, PipelineConfig, RuleBasedSegmenter};
//! use std::path::Path;
//!
//! let segmenter = RuleBasedSegmenter::default();
//! let pipeline = ComponentPipeline::new(PipelineConfig::default(), &segmenter);
//! let output = pipeline.run_path(Path::new("screenshot.png")).unwrap();
//! println!("{}", output.metadata.layout_signature);
//! ```

pub mod classify;
pub mod cli;
pub mod component;
pub mod config;
pub mod embed;
pub mod geometry;
pub mod metadata;
pub mod pipeline;
pub mod segment;
pub mod verify;

pub use classify::{
    Classification, ClassifierError, ClassifierOptions, DecisionStage, LabelPrompt, PromptLabel,
    SemanticClassifier, VisualClassifier, VisualMatch, VisualRequest, ZeroShotClassifier,
};
pub use component::{
    Candidate, Component, ComponentFilter, CropError, FilterOptions, FilterOutcome, FilterStats,
    Mask, Region, SemanticType, SpatialClusterer, StructuralType,
};
pub use config::{load_config, ConfigError, PipelineConfig, PipelineConfigBuilder};
pub use embed::{ComponentEmbedder, EmbedError, EmbeddingModel};
pub use geometry::{BBox, ImageDims, NormBox};
pub use metadata::{
    component_types, filter_by_type, group_by_type, json_to_metadata, metadata_to_json,
    ComponentMetadata, ComponentRecord, MetadataBuilder, TypeStats,
};
pub use pipeline::{
    BatchInput, BatchItem, BatchProgress, CancelToken, ComponentPipeline, PipelineError,
    PipelineOutput, RunControl, SilentProgress,
};
pub use segment::{
    PrecomputedSegmenter, RuleBasedOptions, RuleBasedSegmenter, SegmentError, Segmenter,
};
pub use verify::SpatialVerifier;
