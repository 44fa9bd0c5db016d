//! Perception gate.
//!
//! Decides per pipeline run whether to capture a screenshot and invoke
//! OCR / detector / captioner, aggregating results into one
//! [`UIDescription`] shared by all visual steps.

use super::model::{ElementKind, ElementSource, Step, UIDescription, UIElement};
use crate::collaborators::{Captioner, Detector, Ocr, ScreenshotSource};
use crate::config::PerceptionConfig;

/// Whether any perception call should happen at all for this run: the
/// empty set of visually-grounded steps means zero screenshot/OCR/
/// detector calls for the whole run.
pub fn needs_perception(steps: &[Step]) -> bool {
    steps.iter().any(|s| s.needs_visual_grounding)
}

fn normalize_text(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Builds one [`UIDescription`] shared by every visual step in the run.
/// OCR and the detector run concurrently (both are pure w.r.t. the
/// screenshot) but both must complete before this returns.
pub async fn build_ui_description(
    image: &[u8],
    screen_size: (f64, f64),
    steps: &[Step],
    config: &PerceptionConfig,
    ocr: &dyn Ocr,
    detector: &dyn Detector,
    captioner: &dyn Captioner,
    ocr_min_confidence: f64,
) -> UIDescription {
    let (ocr_regions, detections) = tokio::join!(ocr.recognize(image), detector.detect(image));

    let mut elements: Vec<UIElement> = Vec::new();
    let mut detector_texts: Vec<String> = Vec::new();

    for d in detections {
        elements.push(UIElement {
            bbox: super::model::BBox::new(d.bbox.0, d.bbox.1, d.bbox.2, d.bbox.3),
            text: None,
            description: None,
            kind: ElementKind::from_detector_label(&d.kind),
            confidence: d.confidence,
            source: ElementSource::Detector,
        });
    }

    for el in &elements {
        if let Some(t) = &el.text {
            detector_texts.push(normalize_text(t));
        }
    }

    for region in ocr_regions {
        if region.confidence < ocr_min_confidence {
            continue;
        }
        let normalized = normalize_text(&region.text);
        if detector_texts.contains(&normalized) {
            continue;
        }
        elements.push(UIElement {
            bbox: super::model::BBox::new(
                region.bbox.0,
                region.bbox.1,
                region.bbox.2,
                region.bbox.3,
            ),
            text: Some(region.text),
            description: None,
            kind: ElementKind::Text,
            confidence: region.confidence,
            source: ElementSource::Ocr,
        });
    }

    if config.caption_enabled {
        let targets: Vec<&str> = steps
            .iter()
            .filter_map(|s| s.target_fragment.as_deref())
            .collect();
        let all_covered = !targets.is_empty()
            && targets.iter().all(|t| {
                let norm = normalize_text(t);
                elements
                    .iter()
                    .any(|e| e.text.as_deref().map(normalize_text).as_deref() == Some(&norm))
            });

        if !all_covered {
            for el in elements.iter_mut() {
                if el.text.is_none() && el.description.is_none() {
                    // Best-effort: captioning a full-screen crop by bbox is
                    // the caller's concern in a real adapter; here we pass
                    // the whole frame since the core has no image-cropping
                    // utility of its own.
                    el.description = captioner.caption(image).await;
                }
            }
        }
    }

    UIDescription {
        screen_size,
        elements,
        captured_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::stub::{StubCaptioner, StubDetector, StubOcr};
    use crate::collaborators::{Detection, OcrRegion};
    use crate::pipeline::model::Step;

    fn grounded_step() -> Step {
        let mut s = Step::new("click on \"X\"".into(), "click on \"X\"".into());
        s.needs_visual_grounding = true;
        s
    }

    #[test]
    fn perception_skipped_when_no_visual_steps() {
        let mut s = Step::new("type foo".into(), "type foo".into());
        s.needs_visual_grounding = false;
        assert!(!needs_perception(&[s]));
    }

    #[test]
    fn perception_needed_when_any_visual_step() {
        assert!(needs_perception(&[grounded_step()]));
    }

    #[tokio::test]
    async fn merges_ocr_and_detector_without_duplicate_text() {
        let ocr = StubOcr::new(vec![OcrRegion {
            text: "Save".into(),
            bbox: (0.0, 0.0, 10.0, 10.0),
            confidence: 0.9,
        }]);
        let detector = StubDetector::new(vec![Detection {
            kind: "button".into(),
            bbox: (20.0, 20.0, 30.0, 30.0),
            confidence: 0.8,
        }]);
        let captioner = StubCaptioner::default();
        let config = PerceptionConfig {
            caption_enabled: false,
        };
        let desc = build_ui_description(
            &[],
            (100.0, 100.0),
            &[],
            &config,
            &ocr,
            &detector,
            &captioner,
            0.4,
        )
        .await;
        assert_eq!(desc.elements.len(), 2);
    }

    #[tokio::test]
    async fn drops_low_confidence_ocr_regions() {
        let ocr = StubOcr::new(vec![OcrRegion {
            text: "Faint".into(),
            bbox: (0.0, 0.0, 10.0, 10.0),
            confidence: 0.1,
        }]);
        let detector = StubDetector::default();
        let captioner = StubCaptioner::default();
        let config = PerceptionConfig {
            caption_enabled: false,
        };
        let desc = build_ui_description(
            &[],
            (100.0, 100.0),
            &[],
            &config,
            &ocr,
            &detector,
            &captioner,
            0.4,
        )
        .await;
        assert!(desc.elements.is_empty());
    }
}
