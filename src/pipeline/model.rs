//! Data model: `Instruction`, `Step`, `UIElement`, `UIDescription`,
//! `RunState`, and `CommandHistoryEntry`.
//!
//! `UIElement` is a single tagged variant rather than the duck-typed dicts
//! the prior system passed around for OCR/detector output, which is what
//! lets the resolver in [`super::resolver`] stay small.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The input string plus optional pre-detected source language. Immutable
/// once accepted; upstream STT/translation has already run by the time
/// this reaches the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub text: String,
    pub source_language: Option<String>,
}

impl Instruction {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_language: None,
        }
    }

    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.source_language = Some(lang.into());
        self
    }
}

/// A canonical 3x3-grid zone. See [`super::spatial_filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialZone {
    Top,
    Bottom,
    Left,
    Right,
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl SpatialZone {
    /// The canonical tag string used in logs and serialized steps.
    pub fn tag(&self) -> &'static str {
        match self {
            SpatialZone::Top => "top",
            SpatialZone::Bottom => "bottom",
            SpatialZone::Left => "left",
            SpatialZone::Right => "right",
            SpatialZone::Center => "center",
            SpatialZone::TopLeft => "top-left",
            SpatialZone::TopRight => "top-right",
            SpatialZone::BottomLeft => "bottom-left",
            SpatialZone::BottomRight => "bottom-right",
        }
    }
}

/// One atomic segment of the instruction, produced by the step parser and
/// filled in by the target annotator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub original: String,
    pub normalized: String,
    pub needs_visual_grounding: bool,
    pub target_fragment: Option<String>,
    /// Whether `target_fragment` came from the LLM path rather than the
    /// regex fallback; the resolver's text-match tier weighs the two
    /// differently.
    pub target_from_llm: bool,
    pub spatial_qualifier: Option<SpatialZone>,
}

impl Step {
    pub fn new(original: String, normalized: String) -> Self {
        Self {
            original,
            normalized,
            needs_visual_grounding: false,
            target_fragment: None,
            target_from_llm: false,
            spatial_qualifier: None,
        }
    }
}

/// `kind` enum for a `UIElement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Button,
    InputField,
    MenuItem,
    Checkbox,
    Link,
    Icon,
    Tab,
    Text,
    Unknown,
    /// A detector class label with no entry in the fixed mapping table;
    /// any other label passes through as-is.
    Other(String),
}

impl ElementKind {
    /// Maps a detector class label onto the fixed `kind` table.
    pub fn from_detector_label(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "button" | "btn" => ElementKind::Button,
            "input" | "textbox" | "text_field" => ElementKind::InputField,
            "menu" | "dropdown" => ElementKind::MenuItem,
            "checkbox" => ElementKind::Checkbox,
            "icon" => ElementKind::Icon,
            other => ElementKind::Other(other.to_string()),
        }
    }
}

/// `source` enum for a `UIElement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementSource {
    Ocr,
    Detector,
    Caption,
    Fallback,
}

/// Axis-aligned bounding box in screen pixels. Invariant:
/// `x1 < x2 && y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// `x1 < x2 && y1 < y2 && bbox ⊆ screen`.
    pub fn is_valid(&self, screen_size: (f64, f64)) -> bool {
        self.x1 < self.x2
            && self.y1 < self.y2
            && self.x1 >= 0.0
            && self.y1 >= 0.0
            && self.x2 <= screen_size.0
            && self.y2 <= screen_size.1
    }
}

/// One candidate on screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIElement {
    pub bbox: BBox,
    pub text: Option<String>,
    pub description: Option<String>,
    pub kind: ElementKind,
    pub confidence: f64,
    pub source: ElementSource,
}

impl UIElement {
    pub fn center(&self) -> (f64, f64) {
        self.bbox.center()
    }
}

/// The aggregated, per-run snapshot of screen elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIDescription {
    pub screen_size: (f64, f64),
    pub elements: Vec<UIElement>,
    pub captured_at: DateTime<Utc>,
}

impl UIDescription {
    /// The empty description produced when perception is skipped.
    pub fn empty(screen_size: (f64, f64)) -> Self {
        Self {
            screen_size,
            elements: Vec::new(),
            captured_at: Utc::now(),
        }
    }
}

/// One append-only command-history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub steps: Vec<String>,
    pub code: String,
    pub success: bool,
    pub screen_summary: String,
}

/// `RunState.last_action_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    DoubleClick,
    RightClick,
    Type,
    Keyboard,
    Reference,
    None,
}

/// The outcome of planning+executing one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepOutcome {
    Executed,
    Skipped { reason: String },
    Failed { error: String },
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

/// One entry of `RunState.steps_executed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub step: Step,
    pub outcome: StepOutcome,
    pub explanation: String,
    /// The primitive program's pseudo-code trace, empty when the step was
    /// skipped before any program was synthesized.
    pub code_lines: Vec<String>,
}

/// Per-run orchestrator state. Owned exclusively by the orchestrator;
/// created at entry, discarded at exit after the history append.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub last_ui_element: Option<UIElement>,
    pub last_coordinates: Option<(f64, f64)>,
    pub last_action_kind: Option<ActionKind>,
    pub steps_executed: Vec<StepExecution>,
    pub before_screenshot: Option<PathBuf>,
    pub after_screenshot: Option<PathBuf>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_target(&mut self, element: UIElement) {
        self.last_coordinates = Some(element.center());
        self.last_ui_element = Some(element);
    }
}
