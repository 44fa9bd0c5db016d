//! Real `ScreenshotSource` backed by [`xcap`], the prior system's own
//! screen-capture crate (see `vision/mod.rs` there). Gated behind the
//! `vision` feature: disabled by default — reading the screen is the one
//! thing this adapter does without a kill switch, since it has no side
//! effect on the desktop, unlike the automation collaborator.

use super::{CollaboratorError, Rect, ScreenshotInfo, ScreenshotSource};
use crate::pipeline::screenshots::{path_for, ScreenshotKind};
use async_trait::async_trait;
use std::path::PathBuf;
use xcap::Monitor;

/// Captures the primary monitor (or a sub-region of it) and writes a PNG
/// under `screenshot_dir`, named per the shared screenshot-store layout.
pub struct XcapScreenshot {
    screenshot_dir: PathBuf,
}

impl XcapScreenshot {
    pub fn new(screenshot_dir: PathBuf) -> Self {
        Self { screenshot_dir }
    }
}

#[async_trait]
impl ScreenshotSource for XcapScreenshot {
    async fn capture(&self, region: Option<Rect>) -> Result<ScreenshotInfo, CollaboratorError> {
        let dir = self.screenshot_dir.clone();
        tokio::task::spawn_blocking(move || capture_blocking(&dir, region))
            .await
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?
    }
}

fn capture_blocking(
    screenshot_dir: &std::path::Path,
    region: Option<Rect>,
) -> Result<ScreenshotInfo, CollaboratorError> {
    let monitors = Monitor::all().map_err(|e| CollaboratorError::Failed(e.to_string()))?;
    let monitor = monitors
        .first()
        .ok_or_else(|| CollaboratorError::Failed("no monitor available".to_string()))?;

    let image = monitor
        .capture_image()
        .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

    let (image, width, height) = match region {
        Some(r) => {
            let cropped = xcap::image::imageops::crop_imm(&image, r.x, r.y, r.width, r.height)
                .to_image();
            let (w, h) = (cropped.width(), cropped.height());
            (cropped, w, h)
        }
        None => {
            let (w, h) = (image.width(), image.height());
            (image, w, h)
        }
    };

    std::fs::create_dir_all(screenshot_dir).map_err(|e| CollaboratorError::Failed(e.to_string()))?;
    let path = path_for(screenshot_dir, ScreenshotKind::Screenshot, chrono::Utc::now());
    image
        .save(&path)
        .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

    Ok(ScreenshotInfo { path, width, height })
}

#[cfg(test)]
mod tests {
    // `Monitor::all()` needs a real display; exercised manually, not in CI.
    // The adapter's contract (path under screenshot_dir, PNG extension) is
    // covered indirectly by `pipeline::screenshots` path-naming tests.
}
