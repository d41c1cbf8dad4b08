//! Label catalogue offered to the visual classifier
//!
//! Each label carries the descriptive phrase the classifier compares a crop
//! against. Two sentinel labels describe content that is not a UI element.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::component::SemanticType;

/// Header / navigation candidacy needs a wide box
pub const WIDE_MIN_ASPECT: f64 = 2.0;

/// Sidebar candidacy needs a tall box
pub const TALL_MAX_ASPECT: f64 = 0.6;

/// Content that the visual stage recognises as "not a UI element"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonUiKind {
    ProductPhoto,
    BackgroundGraphic,
}

/// A label the visual classifier may return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptLabel {
    Ui(SemanticType),
    NotUiElement(NonUiKind),
}

impl PromptLabel {
    pub fn name(&self) -> &'static str {
        match self {
            PromptLabel::Ui(t) => t.as_str(),
            PromptLabel::NotUiElement(NonUiKind::ProductPhoto) => "product_photo",
            PromptLabel::NotUiElement(NonUiKind::BackgroundGraphic) => "background_graphic",
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, PromptLabel::NotUiElement(_))
    }
}

impl fmt::Display for PromptLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A label with its descriptive phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPrompt {
    pub label: PromptLabel,
    pub phrase: &'static str,
}

const fn ui(t: SemanticType, phrase: &'static str) -> LabelPrompt {
    LabelPrompt {
        label: PromptLabel::Ui(t),
        phrase,
    }
}

const fn not_ui(kind: NonUiKind, phrase: &'static str) -> LabelPrompt {
    LabelPrompt {
        label: PromptLabel::NotUiElement(kind),
        phrase,
    }
}

/// Full catalogue, in the order it is offered
pub const PROMPTS: [LabelPrompt; 26] = [
    // Structure & navigation
    ui(SemanticType::Header, "a website header navigation bar at the top with logo menu links and search box"),
    ui(SemanticType::Navigation, "a horizontal navigation menu bar with multiple menu links tabs and dropdown menus"),
    ui(SemanticType::Breadcrumb, "a breadcrumb navigation trail text showing page hierarchy path with arrows or slashes like Home > category > product"),
    ui(SemanticType::Sidebar, "a vertical sidebar column navigation menu on the left or right side with list of links categories filters"),
    ui(SemanticType::Footer, "a website footer section at the bottom with dark background columns links copyright contact info sitemap"),
    ui(SemanticType::Copyright, "small copyright text area at the very bottom of page showing year and company name rights reserved"),
    // Content sections
    ui(SemanticType::Hero, "a large hero banner slider section at top of page with big headline text call to action button and background image"),
    ui(SemanticType::PromoBanner, "a promotional banner advertisement strip with sale discount offer text percentage off coupon code"),
    ui(SemanticType::MainContent, "the main body content area of the web page with paragraphs text articles"),
    ui(SemanticType::Section, "a distinct content section block with heading subheading and content body"),
    ui(SemanticType::Article, "an article post or blog entry with title author date and body text paragraphs"),
    ui(SemanticType::Gallery, "an image gallery grid layout with multiple photos thumbnails arranged in rows and columns"),
    ui(SemanticType::Testimonials, "customer testimonials reviews section with user profile pictures quotes stars rating and feedback text"),
    ui(SemanticType::PricingTable, "a pricing plan comparison table with columns showing price tiers features list and subscribe buttons"),
    ui(SemanticType::Faq, "frequently asked questions FAQ section with list of questions and expandable answers"),
    ui(SemanticType::Features, "a features list section with icons and short text descriptions of product benefits"),
    // Interactive elements
    ui(SemanticType::CtaButton, "a prominent call to action button with bold text like buy now sign up get started"),
    ui(SemanticType::Form, "a form input area with text fields labels checkboxes and submit button"),
    ui(SemanticType::LoginForm, "a login or sign in form with username email password fields and login button"),
    ui(SemanticType::SearchForm, "a search input field bar with magnifying glass icon and placeholder text"),
    ui(SemanticType::Widget, "a small standalone widget box with title and content or tools"),
    ui(SemanticType::Popup, "a popup modal overlay window with message content and close button"),
    ui(SemanticType::ChatWidget, "a live chat support button floating bubble or icon in the bottom right corner"),
    ui(SemanticType::SocialLinks, "social media icons row with logos for facebook twitter instagram linkedin"),
    // Not UI
    not_ui(NonUiKind::ProductPhoto, "a plain product photograph of a physical item without any interface controls"),
    not_ui(NonUiKind::BackgroundGraphic, "a decorative background graphic texture or pattern without text or controls"),
];

/// Phrase for a label, if the catalogue has one
pub fn phrase_for(label: PromptLabel) -> Option<&'static str> {
    PROMPTS.iter().find(|p| p.label == label).map(|p| p.phrase)
}

/// True when the box shape rules the label out
///
/// Sidebars must be tall; headers and navigation bars must be wide.
pub fn is_excluded(label: PromptLabel, aspect_ratio: f64) -> bool {
    match label {
        PromptLabel::Ui(SemanticType::Sidebar) => aspect_ratio >= TALL_MAX_ASPECT,
        PromptLabel::Ui(SemanticType::Header) | PromptLabel::Ui(SemanticType::Navigation) => {
            aspect_ratio <= WIDE_MIN_ASPECT
        }
        _ => false,
    }
}

/// Labels still plausible for a box of the given aspect ratio (`w / h`)
pub fn candidate_labels(aspect_ratio: f64) -> Vec<LabelPrompt> {
    PROMPTS
        .iter()
        .filter(|p| !is_excluded(p.label, aspect_ratio))
        .copied()
        .collect()
}
