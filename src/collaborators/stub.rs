//! Deterministic, pure-Rust test doubles for every collaborator trait.
//!
//! These exist so the orchestrator and every component above it can be
//! unit- and integration-tested without a real OS, screen, or network
//! call, generalizing the LLM-as-tool testability requirement to every
//! narrow-interface collaborator.

use super::{
    Automation, Captioner, CollaboratorError, Detection, Detector, LlmCollaborator, Ocr,
    OcrRegion, Primitive, Rect, ScreenshotInfo, ScreenshotSource,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Returns pre-programmed answers keyed by (case-insensitive, trimmed)
/// input text; `extract_target` falls through to `None` for unknown input
/// so callers exercise the fallback regex cascade.
#[derive(Default)]
pub struct StubLlm {
    pub targets: HashMap<String, String>,
    pub fallback: Option<(Vec<String>, String)>,
}

impl StubLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, step_text: impl Into<String>, target: impl Into<String>) -> Self {
        self.targets
            .insert(step_text.into().trim().to_lowercase(), target.into());
        self
    }
}

#[async_trait]
impl LlmCollaborator for StubLlm {
    async fn extract_target(&self, step_text: &str) -> Option<String> {
        self.targets.get(&step_text.trim().to_lowercase()).cloned()
    }

    async fn fallback_plan(&self, _instruction: &str) -> Option<(Vec<String>, String)> {
        self.fallback.clone()
    }
}

/// Returns a fixed set of regions regardless of the (ignored) image bytes.
#[derive(Default, Clone)]
pub struct StubOcr {
    pub regions: Vec<OcrRegion>,
}

impl StubOcr {
    pub fn new(regions: Vec<OcrRegion>) -> Self {
        Self { regions }
    }
}

#[async_trait]
impl Ocr for StubOcr {
    async fn recognize(&self, _image: &[u8]) -> Vec<OcrRegion> {
        self.regions.clone()
    }
}

#[derive(Default, Clone)]
pub struct StubDetector {
    pub detections: Vec<Detection>,
}

impl StubDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

#[async_trait]
impl Detector for StubDetector {
    async fn detect(&self, _image: &[u8]) -> Vec<Detection> {
        self.detections.clone()
    }
}

/// Returns a fixed caption (or none) regardless of the (ignored) crop
/// bytes, recording how many times it was invoked.
#[derive(Default)]
pub struct StubCaptioner {
    pub caption: Option<String>,
    pub calls: Mutex<u32>,
}

impl StubCaptioner {
    pub fn new(caption: Option<String>) -> Self {
        Self {
            caption,
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().expect("stub captioner lock poisoned")
    }
}

#[async_trait]
impl Captioner for StubCaptioner {
    async fn caption(&self, _crop: &[u8]) -> Option<String> {
        *self.calls.lock().expect("stub captioner lock poisoned") += 1;
        self.caption.clone()
    }
}

/// Returns a fixed path/size pair; writes nothing to disk.
pub struct StubScreenshot {
    pub width: u32,
    pub height: u32,
}

impl Default for StubScreenshot {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[async_trait]
impl ScreenshotSource for StubScreenshot {
    async fn capture(&self, _region: Option<Rect>) -> Result<ScreenshotInfo, CollaboratorError> {
        Ok(ScreenshotInfo {
            path: PathBuf::from("stub://screenshot"),
            width: self.width,
            height: self.height,
        })
    }
}

/// Records every primitive program it was asked to run, for assertions.
#[derive(Default)]
pub struct StubAutomation {
    pub calls: Mutex<Vec<Vec<Primitive>>>,
    /// When set, every call fails with this message instead of recording.
    pub fail_with: Option<String>,
}

impl StubAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Vec<Primitive>> {
        self.calls.lock().expect("stub automation lock poisoned").clone()
    }
}

#[async_trait]
impl Automation for StubAutomation {
    async fn run(&self, program: &[Primitive]) -> Result<(), CollaboratorError> {
        if let Some(ref msg) = self.fail_with {
            return Err(CollaboratorError::Failed(msg.clone()));
        }
        self.calls
            .lock()
            .expect("stub automation lock poisoned")
            .push(program.to_vec());
        Ok(())
    }
}
