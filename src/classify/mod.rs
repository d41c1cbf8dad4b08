//! Semantic classification
//!
//! Assigns each filtered region a label from the UI taxonomy, using an
//! optional injected visual classifier and geometric rules as fallback.

mod classifier;
mod labels;
mod rules;
mod visual;

pub use classifier::{Classification, ClassifierOptions, DecisionStage, SemanticClassifier};
pub use labels::{
    candidate_labels, is_excluded, phrase_for, LabelPrompt, NonUiKind, PromptLabel, PROMPTS,
    TALL_MAX_ASPECT, WIDE_MIN_ASPECT,
};
pub use rules::{area_fallback, strong_rules, weak_rules};
pub use visual::{ClassifierError, VisualClassifier, VisualMatch, VisualRequest, ZeroShotClassifier};
