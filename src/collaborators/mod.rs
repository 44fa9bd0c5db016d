//! Narrow-contract collaborators the core pipeline depends on.
//!
//! Speech-to-text, translation, OCR, the vision detector, the captioner,
//! the automation primitive library, and screenshot capture are each
//! expressed here as a trait the orchestrator is generic over, never as a
//! concrete implementation baked into the pipeline logic — the same way
//! LLM backends are abstracted behind a single `LlmProvider` trait instead
//! of hard-coding one vendor.
//!
//! [`stub`] provides deterministic, pure-Rust test doubles for every trait
//! here so the pipeline is fully testable without any real OS interaction.
//! [`input_adapter`] and [`vision_adapter`] provide one concrete, optional
//! real implementation each, gated behind the `input` / `vision` features.

pub mod stub;

#[cfg(feature = "input")]
pub mod input_adapter;
#[cfg(feature = "vision")]
pub mod vision_adapter;

pub mod llm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// `OCR(image) -> [{text, bbox, confidence}]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrRegion {
    pub text: String,
    pub bbox: (f64, f64, f64, f64),
    pub confidence: f64,
}

/// `Detect(image) -> [{kind, bbox, confidence}]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub kind: String,
    pub bbox: (f64, f64, f64, f64),
    pub confidence: f64,
}

/// `Screenshot(region?) -> {path, width, height}`
#[derive(Debug, Clone)]
pub struct ScreenshotInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// An optional capture region in screen pixels.
#[derive(Debug, Clone, Copy)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One primitive in an `Automate(primitive program)` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Primitive {
    Move { x: f64, y: f64 },
    Click,
    DoubleClick,
    RightClick,
    /// Text that has already been through the safe-text transform (curly
    /// braces doubled). The automation layer must not re-escape it.
    Type(String),
    Press(String),
    Scroll { dx: i32, dy: i32 },
    Sleep(f64),
}

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator call failed: {0}")]
    Failed(String),

    #[error("collaborator call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// `ExtractTarget(text)` and the one-shot fallback planner. Both calls go
/// through the same trait because both are "ask an LLM for one thing and
/// treat any error as empty": the resolver's scoring code never depends
/// on this trait, only the target annotator and the orchestrator's
/// fallback path do.
#[async_trait]
pub trait LlmCollaborator: Send + Sync {
    /// Returns the single most salient on-screen phrase for `step_text`, or
    /// `None` if the model declined or the call failed.
    async fn extract_target(&self, step_text: &str) -> Option<String>;

    /// Attempts to produce a single action program for the whole
    /// instruction in one shot, for use when the staged pipeline could not
    /// produce any executable action. Returns `(code_lines, explanation)`.
    async fn fallback_plan(&self, instruction: &str) -> Option<(Vec<String>, String)>;
}

#[async_trait]
pub trait Ocr: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Vec<OcrRegion>;
}

#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Vec<Detection>;
}

#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, crop: &[u8]) -> Option<String>;
}

#[async_trait]
pub trait ScreenshotSource: Send + Sync {
    async fn capture(&self, region: Option<Rect>) -> Result<ScreenshotInfo, CollaboratorError>;
}

#[async_trait]
pub trait Automation: Send + Sync {
    async fn run(&self, program: &[Primitive]) -> Result<(), CollaboratorError>;
}
