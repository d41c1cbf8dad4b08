//! Semantic classification engine
//!
//! Per region, stages run in priority order and the first one with an
//! opinion decides:
//!
//! 1. Shape-based exclusion narrows the label set (never decides)
//! 2. Visual classifier, when enabled and injected
//! 3. Strong geometric rules
//! 4. Weak geometric rules
//! 5. Area fallback
//!
//! A refinement pass over the whole page may then relabel groups.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::labels::{candidate_labels, PromptLabel};
use super::rules::{area_fallback, strong_rules, weak_rules};
use super::visual::{ClassifierError, VisualClassifier, VisualMatch, VisualRequest};
use crate::component::{Region, SemanticType};
use crate::config::{PipelineConfig, DEFAULT_CLASSIFIER_THRESHOLD};
use crate::geometry::{BBox, ImageDims};

/// Stage that produced a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    /// Visual classifier confidence above threshold
    Visual,
    /// Visual classifier said "not a UI element"
    NotUiElement,
    /// Unmistakable geometric rule
    StrongRule,
    /// Relaxed geometric heuristic
    WeakRule,
    /// Size-only fallback
    AreaFallback,
    /// Overwritten by the page-level refinement pass
    Refined,
}

impl DecisionStage {
    /// Get stage number (1-6)
    pub fn stage_number(&self) -> u8 {
        match self {
            DecisionStage::Visual => 1,
            DecisionStage::NotUiElement => 2,
            DecisionStage::StrongRule => 3,
            DecisionStage::WeakRule => 4,
            DecisionStage::AreaFallback => 5,
            DecisionStage::Refined => 6,
        }
    }

    /// Get stage description
    pub fn description(&self) -> &'static str {
        match self {
            DecisionStage::Visual => "Visual classifier above confidence threshold",
            DecisionStage::NotUiElement => "Visual classifier: not a UI element",
            DecisionStage::StrongRule => "Strict structural rule",
            DecisionStage::WeakRule => "Relaxed structural heuristic",
            DecisionStage::AreaFallback => "Fallback: area ratio only",
            DecisionStage::Refined => "Page-level refinement",
        }
    }
}

/// Label plus provenance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub semantic_type: SemanticType,
    pub stage: DecisionStage,
    /// Visual confidence when the visual stage decided
    pub confidence: Option<f32>,
}

impl Classification {
    fn rule(semantic_type: SemanticType, stage: DecisionStage) -> Self {
        Self {
            semantic_type,
            stage,
            confidence: None,
        }
    }
}

/// Classifier tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierOptions {
    /// Consult the visual classifier
    pub enable_visual: bool,
    /// Visual labels are accepted only above this confidence
    pub threshold: f32,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            enable_visual: false,
            threshold: DEFAULT_CLASSIFIER_THRESHOLD,
        }
    }
}

impl From<&PipelineConfig> for ClassifierOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            enable_visual: config.enable_visual_classifier,
            threshold: config.classifier_threshold,
        }
    }
}

/// Priority-ordered semantic classifier
pub struct SemanticClassifier<'a> {
    options: ClassifierOptions,
    visual: Option<&'a dyn VisualClassifier>,
}

impl<'a> SemanticClassifier<'a> {
    pub fn new(options: ClassifierOptions) -> Self {
        Self {
            options,
            visual: None,
        }
    }

    /// Inject the visual classifier collaborator
    #[must_use]
    pub fn with_visual(mut self, visual: &'a dyn VisualClassifier) -> Self {
        self.visual = Some(visual);
        self
    }

    pub fn options(&self) -> &ClassifierOptions {
        &self.options
    }

    fn active_visual(&self) -> Option<&'a dyn VisualClassifier> {
        if self.options.enable_visual {
            self.visual
        } else {
            None
        }
    }

    /// Classify one region
    ///
    /// `crop` is the region's pixels; without it the visual stage is skipped.
    pub fn classify(
        &self,
        region: &Region,
        crop: Option<&DynamicImage>,
        dims: ImageDims,
    ) -> Classification {
        let labels = candidate_labels(region.bbox.aspect_ratio());
        let visual = match (self.active_visual(), crop) {
            (Some(clf), Some(crop)) => {
                let answer = clf
                    .classify(crop, &labels)
                    .and_then(|m| m.validated(&labels));
                accept_or_warn(answer, region.source_index)
            }
            _ => None,
        };
        self.decide(&region.bbox, dims, visual)
    }

    /// Pick a label from an optional visual answer and the geometric rules
    pub fn decide(&self, bbox: &BBox, dims: ImageDims, visual: Option<VisualMatch>) -> Classification {
        if let Some(m) = visual {
            match m.label {
                PromptLabel::NotUiElement(_) => {
                    return Classification {
                        semantic_type: SemanticType::Element,
                        stage: DecisionStage::NotUiElement,
                        confidence: Some(m.confidence),
                    };
                }
                PromptLabel::Ui(t) if m.confidence > self.options.threshold => {
                    return Classification {
                        semantic_type: t,
                        stage: DecisionStage::Visual,
                        confidence: Some(m.confidence),
                    };
                }
                PromptLabel::Ui(_) => {}
            }
        }

        if let Some(t) = strong_rules(bbox, dims) {
            return Classification::rule(t, DecisionStage::StrongRule);
        }
        if let Some(t) = weak_rules(bbox, dims) {
            return Classification::rule(t, DecisionStage::WeakRule);
        }
        Classification::rule(area_fallback(bbox, dims), DecisionStage::AreaFallback)
    }

    /// Classify every region, then run the refinement pass
    ///
    /// `crops` is aligned with `regions`. Visual requests go out as one
    /// batch; if the batch fails as a whole each region is retried alone,
    /// and any single failure falls back to the rules for that region.
    pub fn classify_all(
        &self,
        regions: &[Region],
        crops: &[Option<DynamicImage>],
        dims: ImageDims,
    ) -> Vec<Classification> {
        let visual = self.visual_answers(regions, crops);

        let classifications = regions
            .iter()
            .zip(visual)
            .map(|(region, answer)| self.decide(&region.bbox, dims, answer))
            .collect();

        self.refine(regions, classifications, dims)
    }

    fn visual_answers(
        &self,
        regions: &[Region],
        crops: &[Option<DynamicImage>],
    ) -> Vec<Option<VisualMatch>> {
        let mut answers = vec![None; regions.len()];
        let Some(clf) = self.active_visual() else {
            return answers;
        };

        let mut indices = Vec::new();
        let mut requests = Vec::new();
        for (i, region) in regions.iter().enumerate() {
            if let Some(Some(crop)) = crops.get(i) {
                indices.push(i);
                requests.push(VisualRequest {
                    crop,
                    labels: candidate_labels(region.bbox.aspect_ratio()),
                });
            }
        }
        if requests.is_empty() {
            return answers;
        }

        let results = match clf.classify_batch(&requests) {
            Ok(results) if results.len() == requests.len() => results,
            Ok(results) => {
                warn!(
                    expected = requests.len(),
                    got = results.len(),
                    "visual batch size mismatch, classifying one by one"
                );
                self.classify_each(clf, &requests)
            }
            Err(e) => {
                warn!("visual batch failed, classifying one by one: {e}");
                self.classify_each(clf, &requests)
            }
        };

        for ((idx, req), result) in indices.into_iter().zip(&requests).zip(results) {
            let answer = result.and_then(|m| m.validated(&req.labels));
            answers[idx] = accept_or_warn(answer, regions[idx].source_index);
        }
        answers
    }

    fn classify_each(
        &self,
        clf: &dyn VisualClassifier,
        requests: &[VisualRequest<'_>],
    ) -> Vec<Result<VisualMatch, ClassifierError>> {
        requests
            .iter()
            .map(|r| clf.classify(r.crop, &r.labels))
            .collect()
    }

    /// Page-level relabelling of grids and input stacks
    ///
    /// The detectors currently report nothing, so this leaves every label as is.
    pub fn refine(
        &self,
        regions: &[Region],
        mut classifications: Vec<Classification>,
        dims: ImageDims,
    ) -> Vec<Classification> {
        for idx in self.detect_gallery_pattern(regions, dims) {
            if let Some(c) = classifications.get_mut(idx) {
                *c = Classification::rule(SemanticType::Gallery, DecisionStage::Refined);
            }
        }
        for idx in self.detect_form_pattern(regions, dims) {
            if let Some(c) = classifications.get_mut(idx) {
                *c = Classification::rule(SemanticType::Form, DecisionStage::Refined);
            }
        }
        classifications
    }

    /// Indices of regions forming an image grid
    pub fn detect_gallery_pattern(&self, _regions: &[Region], _dims: ImageDims) -> Vec<usize> {
        Vec::new()
    }

    /// Indices of thin boxes stacked like form inputs
    pub fn detect_form_pattern(&self, _regions: &[Region], _dims: ImageDims) -> Vec<usize> {
        Vec::new()
    }
}

fn accept_or_warn(
    answer: Result<VisualMatch, ClassifierError>,
    source_index: Option<usize>,
) -> Option<VisualMatch> {
    match answer {
        Ok(m) => {
            debug!(?source_index, label = %m.label, confidence = m.confidence, "visual answer");
            Some(m)
        }
        Err(e) => {
            warn!(?source_index, "visual classifier failed, using rules: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::labels::{LabelPrompt, NonUiKind};
    use crate::component::Candidate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const DIMS: ImageDims = ImageDims {
        width: 1000,
        height: 2000,
    };

    fn region(x: u32, y: u32, w: u32, h: u32, dims: ImageDims) -> Region {
        let bbox = BBox::new(x, y, w, h);
        Region::from_candidate(Candidate::new(bbox, 0.9, 0), bbox, dims)
    }

    fn crop() -> DynamicImage {
        DynamicImage::new_rgb8(8, 8)
    }

    /// Always answers the same thing, recording what it was offered
    struct StubClassifier {
        answer: Result<VisualMatch, String>,
        batch_fails: bool,
        offered: Mutex<Vec<Vec<LabelPrompt>>>,
        calls: AtomicUsize,
    }

    impl StubClassifier {
        fn answering(label: PromptLabel, confidence: f32) -> Self {
            Self {
                answer: Ok(VisualMatch { label, confidence }),
                batch_fails: false,
                offered: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err("timeout".into()),
                batch_fails: false,
                offered: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl VisualClassifier for StubClassifier {
        fn classify(
            &self,
            _crop: &DynamicImage,
            labels: &[LabelPrompt],
        ) -> Result<VisualMatch, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.offered.lock().unwrap().push(labels.to_vec());
            self.answer.clone().map_err(ClassifierError::Other)
        }

        fn classify_batch(
            &self,
            requests: &[VisualRequest<'_>],
        ) -> Result<Vec<Result<VisualMatch, ClassifierError>>, ClassifierError> {
            if self.batch_fails {
                return Err(ClassifierError::Other("batch down".into()));
            }
            Ok(requests
                .iter()
                .map(|r| self.classify(r.crop, &r.labels))
                .collect())
        }
    }

    fn enabled() -> ClassifierOptions {
        ClassifierOptions {
            enable_visual: true,
            threshold: 0.22,
        }
    }

    #[test]
    fn test_wide_header_strong_rule_without_visual() {
        let clf = SemanticClassifier::new(ClassifierOptions::default());
        let r = region(0, 0, 1000, 80, DIMS);
        let c = clf.classify(&r, Some(&crop()), DIMS);
        assert_eq!(c.semantic_type, SemanticType::Header);
        assert_eq!(c.stage, DecisionStage::StrongRule);
        assert!(c.confidence.is_none());
    }

    #[test]
    fn test_wide_header_label_set() {
        let stub = StubClassifier::answering(PromptLabel::Ui(SemanticType::Navigation), 0.9);
        let clf = SemanticClassifier::new(enabled()).with_visual(&stub);
        let r = region(0, 0, 1000, 80, DIMS);
        let c = clf.classify(&r, Some(&crop()), DIMS);
        assert_eq!(c.semantic_type, SemanticType::Navigation);
        assert_eq!(c.stage, DecisionStage::Visual);

        let offered = stub.offered.lock().unwrap();
        let labels: Vec<PromptLabel> = offered[0].iter().map(|p| p.label).collect();
        assert!(!labels.contains(&PromptLabel::Ui(SemanticType::Sidebar)));
        assert!(labels.contains(&PromptLabel::Ui(SemanticType::Header)));
        assert!(labels.contains(&PromptLabel::Ui(SemanticType::Navigation)));
    }

    #[test]
    fn test_large_region_area_fallback_section() {
        let dims = ImageDims::new(1000, 1000);
        let clf = SemanticClassifier::new(ClassifierOptions::default());
        let r = region(0, 400, 500, 400, dims);
        let c = clf.classify(&r, None, dims);
        assert_eq!(c.semantic_type, SemanticType::Section);
        assert_eq!(c.stage, DecisionStage::AreaFallback);
    }

    #[test]
    fn test_sentinel_maps_to_element() {
        let stub = StubClassifier::answering(PromptLabel::NotUiElement(NonUiKind::ProductPhoto), 0.05);
        let clf = SemanticClassifier::new(enabled()).with_visual(&stub);
        // Would be a strong-rule header otherwise
        let c = clf.classify(&region(0, 0, 1000, 80, DIMS), Some(&crop()), DIMS);
        assert_eq!(c.semantic_type, SemanticType::Element);
        assert_eq!(c.stage, DecisionStage::NotUiElement);
    }

    #[test]
    fn test_low_confidence_falls_through() {
        let stub = StubClassifier::answering(PromptLabel::Ui(SemanticType::Faq), 0.22);
        let clf = SemanticClassifier::new(enabled()).with_visual(&stub);
        let c = clf.classify(&region(0, 0, 1000, 80, DIMS), Some(&crop()), DIMS);
        assert_eq!(c.semantic_type, SemanticType::Header);
        assert_eq!(c.stage, DecisionStage::StrongRule);
    }

    #[test]
    fn test_disabled_visual_is_not_called() {
        let stub = StubClassifier::answering(PromptLabel::Ui(SemanticType::Faq), 0.9);
        let clf = SemanticClassifier::new(ClassifierOptions::default()).with_visual(&stub);
        let c = clf.classify(&region(0, 0, 1000, 80, DIMS), Some(&crop()), DIMS);
        assert_eq!(c.semantic_type, SemanticType::Header);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_falls_back_to_rules() {
        let stub = StubClassifier::failing();
        let clf = SemanticClassifier::new(enabled()).with_visual(&stub);
        let c = clf.classify(&region(0, 0, 1000, 80, DIMS), Some(&crop()), DIMS);
        assert_eq!(c.stage, DecisionStage::StrongRule);
    }

    #[test]
    fn test_malformed_answer_falls_back() {
        // Sidebar is never offered to a wide box
        let stub = StubClassifier::answering(PromptLabel::Ui(SemanticType::Sidebar), 0.99);
        let clf = SemanticClassifier::new(enabled()).with_visual(&stub);
        let c = clf.classify(&region(0, 0, 1000, 80, DIMS), Some(&crop()), DIMS);
        assert_eq!(c.semantic_type, SemanticType::Header);
        assert_eq!(c.stage, DecisionStage::StrongRule);
    }

    #[test]
    fn test_deterministic_with_stub() {
        let stub = StubClassifier::answering(PromptLabel::Ui(SemanticType::Hero), 0.6);
        let clf = SemanticClassifier::new(enabled()).with_visual(&stub);
        let r = region(0, 300, 1000, 600, DIMS);
        let first = clf.classify(&r, Some(&crop()), DIMS);
        for _ in 0..5 {
            assert_eq!(clf.classify(&r, Some(&crop()), DIMS), first);
        }
    }

    #[test]
    fn test_classify_all_batch_failure_degrades() {
        let mut stub = StubClassifier::answering(PromptLabel::Ui(SemanticType::Gallery), 0.7);
        stub.batch_fails = true;
        let clf = SemanticClassifier::new(enabled()).with_visual(&stub);
        let regions = vec![region(0, 300, 400, 400, DIMS), region(500, 300, 400, 400, DIMS)];
        let crops = vec![Some(crop()), None];
        let out = clf.classify_all(&regions, &crops, DIMS);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].semantic_type, SemanticType::Gallery);
        assert_eq!(out[0].stage, DecisionStage::Visual);
        // No crop, so rules decide
        assert_ne!(out[1].stage, DecisionStage::Visual);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_classify_all_matches_single_calls() {
        let stub = StubClassifier::answering(PromptLabel::Ui(SemanticType::Testimonials), 0.5);
        let clf = SemanticClassifier::new(enabled()).with_visual(&stub);
        let regions = vec![
            region(0, 0, 1000, 80, DIMS),
            region(100, 600, 300, 300, DIMS),
            region(0, 1200, 1000, 700, DIMS),
        ];
        let crops: Vec<Option<DynamicImage>> = regions.iter().map(|_| Some(crop())).collect();
        let batch = clf.classify_all(&regions, &crops, DIMS);
        for (r, c) in regions.iter().zip(&batch) {
            assert_eq!(*c, clf.classify(r, Some(&crop()), DIMS));
        }
    }

    #[test]
    fn test_classify_all_empty() {
        let clf = SemanticClassifier::new(enabled());
        assert!(clf.classify_all(&[], &[], DIMS).is_empty());
    }

    #[test]
    fn test_refine_is_noop() {
        let clf = SemanticClassifier::new(ClassifierOptions::default());
        let regions = vec![region(0, 0, 1000, 80, DIMS), region(0, 500, 200, 200, DIMS)];
        let before: Vec<Classification> = regions
            .iter()
            .map(|r| clf.classify(r, None, DIMS))
            .collect();
        let after = clf.refine(&regions, before.clone(), DIMS);
        assert_eq!(before, after);
        assert!(clf.detect_gallery_pattern(&regions, DIMS).is_empty());
        assert!(clf.detect_form_pattern(&regions, DIMS).is_empty());
    }

    #[test]
    fn test_stage_numbers() {
        assert_eq!(DecisionStage::Visual.stage_number(), 1);
        assert_eq!(DecisionStage::AreaFallback.stage_number(), 5);
        assert!(DecisionStage::AreaFallback.description().contains("Fallback"));
    }
}
