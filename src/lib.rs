//! deskpilot — natural-language to desktop-automation command processing.
//!
//! Converts one user instruction (already transcribed/translated
//! upstream) into a deterministic sequence of desktop-automation
//! actions: mouse moves, clicks, keystrokes, and text entry. The
//! [`pipeline`] module is the whole of the core: step segmentation,
//! per-step screen perception, target resolution, and execution with
//! screen-change feedback. Everything the pipeline needs from the outside
//! world — OCR, a vision detector, a captioner, screenshot capture, the
//! automation primitive library, and an LLM for target extraction — is
//! expressed as a narrow trait in [`collaborators`], never hard-coded.

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod providers;

pub use collaborators::{
    Automation, Captioner, CollaboratorError, Detection, Detector, LlmCollaborator, Ocr,
    OcrRegion, Primitive, Rect, ScreenshotInfo, ScreenshotSource,
};
pub use config::{ConfigError, ConfigManager, PipelineConfig};
pub use pipeline::error::PipelineError;
pub use pipeline::model::{Instruction, SpatialZone, Step, UIDescription, UIElement};
pub use pipeline::{run, Collaborators, RunOptions, RunOutcome};
pub use providers::{Anthropic, LlmProvider, Ollama, OpenAiCompatible, ProviderChain};

#[cfg(feature = "input")]
pub use collaborators::input_adapter::EnigoAutomation;
#[cfg(feature = "vision")]
pub use collaborators::vision_adapter::XcapScreenshot;
