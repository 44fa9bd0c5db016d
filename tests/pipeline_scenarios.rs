//! End-to-end coverage of representative command scenarios, driven
//! through the public crate API rather than any pipeline-internal
//! function, with deterministic stub collaborators standing in for the
//! real desktop/OCR/detector/LLM.

use deskpilot::collaborators::stub::{
    StubAutomation, StubCaptioner, StubDetector, StubLlm, StubOcr, StubScreenshot,
};
use deskpilot::collaborators::{Detection, OcrRegion, Primitive};
use deskpilot::pipeline::history::HistoryWriter;
use deskpilot::pipeline::{run, Collaborators, RunOptions};
use deskpilot::{Instruction, PipelineConfig};

async fn history() -> (tempfile::TempDir, HistoryWriter) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.csv");
    (dir, HistoryWriter::new(path))
}

/// Scenario 1: multi-step with quoted typing.
#[tokio::test]
async fn multi_step_with_quoted_typing_produces_move_click_type_press() {
    let llm = StubLlm::new().with_target("click on \"compose\"", "Compose");
    let ocr = StubOcr::new(vec![OcrRegion {
        text: "Compose".into(),
        bbox: (10.0, 10.0, 110.0, 50.0),
        confidence: 0.95,
    }]);
    let detector = StubDetector::default();
    let captioner = StubCaptioner::default();
    let screenshot = StubScreenshot::default();
    let automation = StubAutomation::new();
    let (_dir, history) = history().await;
    let config = PipelineConfig::default();

    let outcome = run(
        Instruction::new("click on \"Compose\" then type \"Hello, world\" and press enter"),
        RunOptions {
            capture_screenshots: true,
            enable_stability_wait: false,
        },
        Collaborators {
            llm: &llm,
            ocr: &ocr,
            detector: &detector,
            captioner: &captioner,
            screenshot: &screenshot,
            automation: &automation,
        },
        &config,
        &history,
        None,
    )
    .await
    .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.steps.len(), 3);
    assert!(outcome.steps.iter().all(|s| s.outcome == "executed"));

    let calls = automation.calls();
    // step 1: move + click on the resolved Compose element
    assert!(matches!(calls[0][0], Primitive::Move { .. }));
    assert!(matches!(calls[0][1], Primitive::Click));
    // step 2: typed payload is the exact safe-text
    assert!(calls[1]
        .iter()
        .any(|p| matches!(p, Primitive::Type(t) if t == "Hello, world")));
    // step 3: enter key press
    assert!(calls[2]
        .iter()
        .any(|p| matches!(p, Primitive::Press(k) if k == "enter")));
}

/// Scenario 2: Spanish spatial target restricts candidates to the
/// implied grid cell before scoring.
#[tokio::test]
async fn spanish_spatial_target_restricts_to_top_right_cell() {
    let llm = StubLlm::new();
    let ocr = StubOcr::new(vec![
        OcrRegion {
            text: "perfil".into(),
            bbox: (900.0, 10.0, 1000.0, 60.0),
            confidence: 0.9,
        },
        OcrRegion {
            text: "perfil".into(),
            bbox: (10.0, 900.0, 110.0, 950.0),
            confidence: 0.9,
        },
    ]);
    let detector = StubDetector::new(vec![Detection {
        kind: "icon".into(),
        bbox: (900.0, 10.0, 1000.0, 60.0),
        confidence: 0.9,
    }]);
    let captioner = StubCaptioner::default();
    let screenshot = StubScreenshot {
        width: 1000,
        height: 1000,
    };
    let automation = StubAutomation::new();
    let (_dir, history) = history().await;
    let config = PipelineConfig::default();

    let outcome = run(
        Instruction::new("haz clic arriba a la derecha en el icono de perfil"),
        RunOptions {
            capture_screenshots: true,
            enable_stability_wait: false,
        },
        Collaborators {
            llm: &llm,
            ocr: &ocr,
            detector: &detector,
            captioner: &captioner,
            screenshot: &screenshot,
            automation: &automation,
        },
        &config,
        &history,
        None,
    )
    .await
    .unwrap();

    assert!(outcome.success);
    let calls = automation.calls();
    match &calls[0][0] {
        Primitive::Move { x, y } => {
            assert!(*x > 500.0, "expected the top-right candidate, got x={x}");
            assert!(*y < 500.0, "expected the top-right candidate, got y={y}");
        }
        other => panic!("expected a Move primitive, got {other:?}"),
    }
}

/// Scenario 6: an ambiguous short fragment resolves to the exact-word
/// match over a within-word hit in a longer candidate.
#[tokio::test]
async fn ambiguous_short_fragment_prefers_exact_word_match() {
    let llm = StubLlm::new();
    let ocr = StubOcr::new(vec![
        OcrRegion {
            text: "Explanation".into(),
            bbox: (0.0, 0.0, 200.0, 40.0),
            confidence: 0.9,
        },
        OcrRegion {
            text: "Plan".into(),
            bbox: (0.0, 60.0, 80.0, 100.0),
            confidence: 0.9,
        },
    ]);
    let detector = StubDetector::default();
    let captioner = StubCaptioner::default();
    let screenshot = StubScreenshot::default();
    let automation = StubAutomation::new();
    let (_dir, history) = history().await;
    let config = PipelineConfig::default();

    let outcome = run(
        Instruction::new("click on plan"),
        RunOptions {
            capture_screenshots: true,
            enable_stability_wait: false,
        },
        Collaborators {
            llm: &llm,
            ocr: &ocr,
            detector: &detector,
            captioner: &captioner,
            screenshot: &screenshot,
            automation: &automation,
        },
        &config,
        &history,
        None,
    )
    .await
    .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.steps[0].outcome, "executed");
    // The element at y=60..100 is "Plan"; the one at y=0..40 is "Explanation".
    match &automation.calls()[0][0] {
        Primitive::Move { y, .. } => assert!(*y >= 60.0, "expected the Plan element, got y={y}"),
        other => panic!("expected a Move primitive, got {other:?}"),
    }
}

/// History rows are only ever whole: a reader never observes a partial
/// row even after several runs append to the same file.
#[tokio::test]
async fn history_append_is_atomic_across_several_runs() {
    let llm = StubLlm::new();
    let ocr = StubOcr::default();
    let detector = StubDetector::default();
    let captioner = StubCaptioner::default();
    let screenshot = StubScreenshot::default();
    let automation = StubAutomation::new();
    let (_dir, history) = history().await;
    let config = PipelineConfig::default();

    for i in 0..5 {
        let outcome = run(
            Instruction::new(format!("type \"message {i}\" then press tab")),
            RunOptions {
                capture_screenshots: true,
                enable_stability_wait: false,
            },
            Collaborators {
                llm: &llm,
                ocr: &ocr,
                detector: &detector,
                captioner: &captioner,
                screenshot: &screenshot,
                automation: &automation,
            },
            &config,
            &history,
            None,
        )
        .await
        .unwrap();
        assert!(outcome.success);
    }

    let rows = history.read_all().await.unwrap();
    assert_eq!(rows.len(), 5);
    for (i, row) in rows.iter().enumerate() {
        assert!(row.command.contains(&format!("message {i}")));
    }
}
