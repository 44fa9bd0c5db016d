//! Stability waiter.
//!
//! After a step whose action is likely to cause a UI transition, blocks
//! until the screen stops changing (consecutive-similarity check) or a
//! timeout/hard-failure limit is reached.

use super::error::WaiterError;
use crate::collaborators::{Rect, ScreenshotSource};
use crate::config::StabilityWaiterConfig;
use std::time::Duration;

/// The action class driving the hard-failure fallback sleep table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    AppOpen,
    MajorClick,
    NavKey,
    Other,
}

impl ActionClass {
    fn fallback_sleep(self) -> Duration {
        match self {
            ActionClass::AppOpen => Duration::from_secs_f64(3.0),
            ActionClass::MajorClick => Duration::from_secs_f64(1.5),
            ActionClass::NavKey => Duration::from_secs_f64(1.0),
            ActionClass::Other => Duration::from_secs_f64(0.5),
        }
    }
}

/// A decoded grayscale frame: flat row-major luminance samples.
struct GrayFrame {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

/// Captures the frame via `source` and decodes it into grayscale luminance
/// samples. In the absence of a concrete image-decoding dependency in the
/// corpus, this core treats the raw capture bytes as already-decoded
/// single-channel samples, the same shape a `ScreenshotSource` adapter
/// is expected to hand back for stability comparison; a real adapter is
/// responsible for producing them this way.
async fn capture_gray(
    source: &dyn ScreenshotSource,
    region: Option<Rect>,
) -> Result<GrayFrame, WaiterError> {
    let info = source
        .capture(region)
        .await
        .map_err(|e| WaiterError::CaptureFailed(e.to_string()))?;
    let bytes = std::fs::read(&info.path).unwrap_or_default();
    Ok(GrayFrame {
        width: info.width,
        height: info.height,
        samples: bytes,
    })
}

/// A coarse structural-similarity proxy in [0, 1]: mean absolute
/// luminance difference over the smaller of the two frames, resized by
/// nearest-neighbor sampling when resolutions differ.
fn similarity(a: &GrayFrame, b: &GrayFrame) -> f64 {
    if a.samples.is_empty() || b.samples.is_empty() {
        return 0.0;
    }

    let (w, h) = (a.width.min(b.width).max(1), a.height.min(b.height).max(1));
    let sample_at = |f: &GrayFrame, x: u32, y: u32| -> u8 {
        let sx = (x as u64 * f.width as u64 / w as u64) as u32;
        let sy = (y as u64 * f.height as u64 / h as u64) as u32;
        let idx = (sy as u64 * f.width as u64 + sx as u64) as usize;
        f.samples.get(idx).copied().unwrap_or(0)
    };

    let mut total_diff: u64 = 0;
    let mut count: u64 = 0;
    for y in 0..h {
        for x in 0..w {
            let da = sample_at(a, x, y) as i32;
            let db = sample_at(b, x, y) as i32;
            total_diff += (da - db).unsigned_abs() as u64;
            count += 1;
        }
    }
    if count == 0 {
        return 1.0;
    }
    1.0 - (total_diff as f64 / count as f64) / 255.0
}

/// Blocks until the screen is visually stable, a timeout elapses, or
/// repeated capture failures (>=3) trigger the fixed fallback sleep.
/// Never returns an error: hard failure degrades to a sleep instead.
pub async fn wait_for_stability(
    source: &dyn ScreenshotSource,
    config: &StabilityWaiterConfig,
    action_class: ActionClass,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(config.timeout_s);
    let interval = Duration::from_secs_f64(config.interval_s);

    let mut consecutive_failures = 0u32;
    let mut consecutive_stable = 0u32;

    let mut previous = match capture_gray(source, None).await {
        Ok(frame) => frame,
        Err(_) => {
            tokio::time::sleep(action_class.fallback_sleep()).await;
            return;
        }
    };

    loop {
        if tokio::time::Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(interval).await;

        match capture_gray(source, None).await {
            Ok(frame) => {
                consecutive_failures = 0;
                let sim = similarity(&previous, &frame);
                if sim >= config.threshold {
                    consecutive_stable += 1;
                } else {
                    consecutive_stable = 0;
                }
                previous = frame;
                if consecutive_stable >= config.consecutive_stable {
                    return;
                }
            }
            Err(_) => {
                consecutive_failures += 1;
                if consecutive_failures >= 3 {
                    tokio::time::sleep(action_class.fallback_sleep()).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_frames_are_fully_similar() {
        let a = GrayFrame {
            width: 2,
            height: 2,
            samples: vec![10, 20, 30, 40],
        };
        let b = GrayFrame {
            width: 2,
            height: 2,
            samples: vec![10, 20, 30, 40],
        };
        assert_eq!(similarity(&a, &b), 1.0);
    }

    #[test]
    fn fully_different_frames_are_not_similar() {
        let a = GrayFrame {
            width: 2,
            height: 2,
            samples: vec![0, 0, 0, 0],
        };
        let b = GrayFrame {
            width: 2,
            height: 2,
            samples: vec![255, 255, 255, 255],
        };
        assert_eq!(similarity(&a, &b), 0.0);
    }

    #[test]
    fn resizes_when_resolution_changes() {
        let a = GrayFrame {
            width: 4,
            height: 4,
            samples: vec![100; 16],
        };
        let b = GrayFrame {
            width: 2,
            height: 2,
            samples: vec![100; 4],
        };
        assert_eq!(similarity(&a, &b), 1.0);
    }

    #[tokio::test]
    async fn returns_by_deadline_when_frames_never_stabilize() {
        // The stub screenshot source has no real file behind its path, so
        // every captured frame decodes empty and never compares similar;
        // this exercises the timeout path rather than the stable path.
        use crate::collaborators::stub::StubScreenshot;
        let source = StubScreenshot::default();
        let config = StabilityWaiterConfig {
            timeout_s: 0.2,
            threshold: 0.99,
            interval_s: 0.05,
            consecutive_stable: 2,
        };
        let started = std::time::Instant::now();
        wait_for_stability(&source, &config, ActionClass::Other).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
