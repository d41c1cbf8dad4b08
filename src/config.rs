//! Pipeline configuration
//!
//! Loading order:
//! 1. TOML file (explicit path, `UILAYOUT_CONFIG`, or the user config dir)
//! 2. `UILAYOUT_*` environment variables
//! 3. Builder / CLI overrides applied by the caller
//!
//! Every field has a default, so a missing file is not an error.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

// ============================================================
// Constants
// ============================================================

/// Environment variable naming a config file
pub const CONFIG_PATH_ENV: &str = "UILAYOUT_CONFIG";

/// File name looked up under the user config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default IoU above which NMS suppresses the weaker box
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.7;

/// Default minimum area as a fraction of the image (0.05%)
pub const DEFAULT_MIN_AREA_RATIO: f64 = 0.0005;

/// Default maximum area as a fraction of the image (85%)
pub const DEFAULT_MAX_AREA_RATIO: f64 = 0.85;

/// Default minimum candidate confidence
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.70;

/// Default maximum long-side / short-side ratio
pub const DEFAULT_MAX_ASPECT_RATIO: f64 = 15.0;

/// Default visual classifier acceptance threshold
pub const DEFAULT_CLASSIFIER_THRESHOLD: f32 = 0.22;

/// Default number of crops per embedding request
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 16;

// ============================================================
// Error Types
// ============================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ============================================================
// Config
// ============================================================

/// Tunables for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Group regions into header / footer / card sections
    pub enable_clustering: bool,
    /// Consult the injected visual classifier
    pub enable_visual_classifier: bool,
    /// NMS suppression threshold
    pub iou_threshold: f64,
    /// Reject regions smaller than this fraction of the image
    pub min_area_ratio: f64,
    /// Reject regions larger than this fraction of the image
    pub max_area_ratio: f64,
    /// Reject candidates below this confidence
    pub confidence_floor: f32,
    /// Reject slivers longer than this ratio
    pub max_aspect_ratio: f64,
    /// Minimum visual classifier confidence to accept its label
    pub classifier_threshold: f32,
    /// Attach image embeddings to final components
    pub embed_components: bool,
    /// Crops per embedding request
    pub embedding_batch_size: usize,
    /// Per-image time limit for batch runs
    pub image_timeout_secs: Option<u64>,
    /// Worker threads for batch runs (defaults to CPU count)
    pub jobs: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_clustering: false,
            enable_visual_classifier: false,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            min_area_ratio: DEFAULT_MIN_AREA_RATIO,
            max_area_ratio: DEFAULT_MAX_AREA_RATIO,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            max_aspect_ratio: DEFAULT_MAX_ASPECT_RATIO,
            classifier_threshold: DEFAULT_CLASSIFIER_THRESHOLD,
            embed_components: false,
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            image_timeout_secs: None,
            jobs: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new config builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        fn unit(field: &'static str, v: f64) -> ConfigResult<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: format!("{v} is outside [0, 1]"),
                })
            }
        }

        unit("iou_threshold", self.iou_threshold)?;
        unit("min_area_ratio", self.min_area_ratio)?;
        unit("max_area_ratio", self.max_area_ratio)?;
        unit("confidence_floor", self.confidence_floor as f64)?;
        unit("classifier_threshold", self.classifier_threshold as f64)?;

        if self.min_area_ratio >= self.max_area_ratio {
            return Err(ConfigError::Invalid {
                field: "min_area_ratio",
                reason: format!(
                    "{} must be below max_area_ratio {}",
                    self.min_area_ratio, self.max_area_ratio
                ),
            });
        }
        if self.max_aspect_ratio.is_nan() || self.max_aspect_ratio < 1.0 {
            return Err(ConfigError::Invalid {
                field: "max_aspect_ratio",
                reason: format!("{} must be >= 1", self.max_aspect_ratio),
            });
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.jobs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "jobs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Worker count for batch runs
    pub fn effective_jobs(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Apply `UILAYOUT_*` environment overrides; unparsable values are ignored
    pub fn apply_env_overrides(&mut self) {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            let raw = env::var(name).ok()?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    debug!(name, raw = raw.as_str(), "ignoring unparsable override");
                    None
                }
            }
        }

        if let Some(v) = var("UILAYOUT_ENABLE_CLUSTERING") {
            self.enable_clustering = v;
        }
        if let Some(v) = var("UILAYOUT_ENABLE_VISUAL_CLASSIFIER") {
            self.enable_visual_classifier = v;
        }
        if let Some(v) = var("UILAYOUT_IOU_THRESHOLD") {
            self.iou_threshold = v;
        }
        if let Some(v) = var("UILAYOUT_MIN_AREA_RATIO") {
            self.min_area_ratio = v;
        }
        if let Some(v) = var("UILAYOUT_MAX_AREA_RATIO") {
            self.max_area_ratio = v;
        }
        if let Some(v) = var("UILAYOUT_CONFIDENCE_FLOOR") {
            self.confidence_floor = v;
        }
        if let Some(v) = var("UILAYOUT_MAX_ASPECT_RATIO") {
            self.max_aspect_ratio = v;
        }
        if let Some(v) = var("UILAYOUT_CLASSIFIER_THRESHOLD") {
            self.classifier_threshold = v;
        }
        if let Some(v) = var("UILAYOUT_JOBS") {
            self.jobs = Some(v);
        }
    }
}

// ============================================================
// Loading
// ============================================================

/// Default config location under the user's config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("uilayout").join(CONFIG_FILE_NAME))
}

/// Locate a config file
///
/// Search order: explicit path, `UILAYOUT_CONFIG`, user config dir.
/// An explicit or env-provided path that does not exist is an error;
/// a missing default file is not.
pub fn find_config_file(explicit: Option<&Path>) -> ConfigResult<Option<PathBuf>> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(Some(path.to_path_buf()))
        } else {
            Err(ConfigError::FileNotFound(path.to_path_buf()))
        };
    }

    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        return if path.exists() {
            Ok(Some(path))
        } else {
            Err(ConfigError::FileNotFound(path))
        };
    }

    Ok(default_config_path().filter(|p| p.exists()))
}

/// Load the effective configuration
pub fn load_config(explicit: Option<&Path>) -> ConfigResult<PipelineConfig> {
    let mut config = match find_config_file(explicit)? {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        }
        None => PipelineConfig::default(),
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

// ============================================================
// Builder
// ============================================================

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn enable_clustering(mut self, enable: bool) -> Self {
        self.config.enable_clustering = enable;
        self
    }

    #[must_use]
    pub fn enable_visual_classifier(mut self, enable: bool) -> Self {
        self.config.enable_visual_classifier = enable;
        self
    }

    /// Set NMS threshold (clamped to 0-1)
    #[must_use]
    pub fn iou_threshold(mut self, threshold: f64) -> Self {
        self.config.iou_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set minimum area ratio (clamped to 0-1)
    #[must_use]
    pub fn min_area_ratio(mut self, ratio: f64) -> Self {
        self.config.min_area_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Set maximum area ratio (clamped to 0-1)
    #[must_use]
    pub fn max_area_ratio(mut self, ratio: f64) -> Self {
        self.config.max_area_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Set confidence floor (clamped to 0-1)
    #[must_use]
    pub fn confidence_floor(mut self, floor: f32) -> Self {
        self.config.confidence_floor = floor.clamp(0.0, 1.0);
        self
    }

    /// Set maximum aspect ratio (at least 1)
    #[must_use]
    pub fn max_aspect_ratio(mut self, ratio: f64) -> Self {
        self.config.max_aspect_ratio = ratio.max(1.0);
        self
    }

    /// Set visual classifier threshold (clamped to 0-1)
    #[must_use]
    pub fn classifier_threshold(mut self, threshold: f32) -> Self {
        self.config.classifier_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn embed_components(mut self, enable: bool) -> Self {
        self.config.embed_components = enable;
        self
    }

    #[must_use]
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.jobs = Some(jobs.max(1));
        self
    }

    #[must_use]
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
