//! Pipeline orchestrator.
//!
//! Drives one end-to-end run: parse -> annotate -> perception gate ->
//! for each step {plan+execute -> stability wait} -> before/after
//! screenshots -> screen-change summary -> history append. Single-
//! threaded per run; the caller is responsible for serializing runs
//! against the shared desktop — this module only owns one run's
//! sequencing.

pub mod error;
pub mod executor;
pub mod history;
pub mod model;
pub mod perception;
pub mod quoting;
pub mod resolver;
pub mod screenshots;
pub mod spatial_filter;
pub mod stability;
pub mod step_parser;
pub mod target_annotator;
pub mod verbs;

use crate::collaborators::{Automation, Captioner, Detector, LlmCollaborator, Ocr, ScreenshotSource};
use crate::config::PipelineConfig;
use crate::logging::{self, EventKind};
use error::PipelineError;
use model::{CommandHistoryEntry, Instruction, RunState, StepOutcome, UIDescription};
use resolver::ResolverConfig as ResolverRuntimeConfig;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Bundles references to every narrow-interface collaborator the
/// orchestrator is generic over. One run borrows all six
/// for its lifetime; none are owned by the orchestrator itself.
pub struct Collaborators<'a> {
    pub llm: &'a dyn LlmCollaborator,
    pub ocr: &'a dyn Ocr,
    pub detector: &'a dyn Detector,
    pub captioner: &'a dyn Captioner,
    pub screenshot: &'a dyn ScreenshotSource,
    pub automation: &'a dyn Automation,
}

/// Per-run options passed to `run()`.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub capture_screenshots: bool,
    pub enable_stability_wait: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            capture_screenshots: true,
            enable_stability_wait: true,
        }
    }
}

/// One entry of `RunOutcome.steps`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StepReport {
    pub original: String,
    pub outcome: &'static str,
    pub reasons: Option<String>,
    pub error: Option<String>,
}

/// The result of one full pipeline run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub steps: Vec<StepReport>,
    pub action_program: String,
    pub before_path: Option<PathBuf>,
    pub after_path: Option<PathBuf>,
    pub screen_summary: Option<String>,
    pub cancelled: bool,
}

fn action_class_for(class: executor::StepClass) -> stability::ActionClass {
    match class {
        executor::StepClass::UiAction => stability::ActionClass::MajorClick,
        executor::StepClass::Keyboard => stability::ActionClass::NavKey,
        executor::StepClass::Reference => stability::ActionClass::MajorClick,
        executor::StepClass::Typing => stability::ActionClass::Other,
    }
}

fn kind_counts(ui: &UIDescription) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for el in &ui.elements {
        let key = format!("{:?}", el.kind);
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Diffs two `UIDescription`s by OCR text set and per-kind detector
/// counts.
fn screen_change_summary(before: &UIDescription, after: &UIDescription) -> String {
    use std::collections::HashSet;

    let before_texts: HashSet<String> = before
        .elements
        .iter()
        .filter_map(|e| e.text.clone())
        .collect();
    let after_texts: HashSet<String> = after
        .elements
        .iter()
        .filter_map(|e| e.text.clone())
        .collect();

    let mut added: Vec<&String> = after_texts.difference(&before_texts).collect();
    let mut removed: Vec<&String> = before_texts.difference(&after_texts).collect();
    added.sort();
    removed.sort();

    let before_counts = kind_counts(before);
    let after_counts = kind_counts(after);
    let mut kinds: Vec<String> = Vec::new();
    let mut all_kinds: Vec<&String> = before_counts.keys().chain(after_counts.keys()).collect();
    all_kinds.sort();
    all_kinds.dedup();
    for kind in all_kinds {
        let b = before_counts.get(kind).copied().unwrap_or(0);
        let a = after_counts.get(kind).copied().unwrap_or(0);
        if a != b {
            kinds.push(format!("{kind}: {b}->{a}"));
        }
    }

    let mut parts = Vec::new();
    if !added.is_empty() {
        parts.push(format!(
            "added: {}",
            added.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
    if !removed.is_empty() {
        parts.push(format!(
            "removed: {}",
            removed.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
    if !kinds.is_empty() {
        parts.push(format!("kinds: {}", kinds.join(", ")));
    }
    if parts.is_empty() {
        "no change detected".to_string()
    } else {
        parts.join("; ")
    }
}

/// Captures a screenshot and builds one `UIDescription` from it, or the
/// empty description on capture failure — perception degrades, it never
/// fails the run.
async fn capture_ui_description(
    deps: &Collaborators<'_>,
    config: &PipelineConfig,
    steps: &[model::Step],
) -> (UIDescription, Option<PathBuf>) {
    match deps.screenshot.capture(None).await {
        Ok(info) => {
            let bytes = tokio::fs::read(&info.path).await.unwrap_or_default();
            let ui = perception::build_ui_description(
                &bytes,
                (info.width as f64, info.height as f64),
                steps,
                &config.perception,
                deps.ocr,
                deps.detector,
                deps.captioner,
                config.ocr.min_confidence,
            )
            .await;
            (ui, Some(info.path))
        }
        Err(_) => (UIDescription::empty((0.0, 0.0)), None),
    }
}

/// Runs the whole pipeline for one instruction. Never panics; terminal
/// failures (empty instruction, cancellation, internal invariant
/// violation) surface as `Err(PipelineError)` and write no history row.
pub async fn run(
    instruction: Instruction,
    opts: RunOptions,
    deps: Collaborators<'_>,
    config: &PipelineConfig,
    history: &history::HistoryWriter,
    cancel: Option<CancellationToken>,
) -> Result<RunOutcome, PipelineError> {
    if instruction.text.trim().is_empty() {
        return Err(PipelineError::EmptyInstruction);
    }

    let run_id = Uuid::new_v4().to_string();
    logging::emit(
        EventKind::CommandReceived,
        &run_id,
        &json!({ "instruction": instruction.text }),
    );

    let mut steps = step_parser::parse(&instruction.text);
    logging::emit(
        EventKind::CommandStepsSplit,
        &run_id,
        &json!({ "steps": steps.iter().map(|s| s.original.clone()).collect::<Vec<_>>() }),
    );

    for step in steps.iter_mut() {
        target_annotator::annotate(step, deps.llm).await;
        logging::emit(
            EventKind::CommandStepAnnotated,
            &run_id,
            &json!({
                "original": step.original,
                "needs_visual_grounding": step.needs_visual_grounding,
                "target_fragment": step.target_fragment,
                "spatial_qualifier": step.spatial_qualifier.map(|z| z.tag()),
            }),
        );
    }

    let is_cancelled = || cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false);

    let wants_perception = opts.capture_screenshots && perception::needs_perception(&steps);
    let (ui, before_path) = if wants_perception && !is_cancelled() {
        capture_ui_description(&deps, config, &steps).await
    } else {
        (UIDescription::empty((0.0, 0.0)), None)
    };
    logging::emit(
        EventKind::CommandPerception,
        &run_id,
        &json!({ "screenshot_skipped": !wants_perception, "elements_count": ui.elements.len() }),
    );

    let mut run_state = RunState::new();
    run_state.before_screenshot = before_path.clone();

    let resolver_config = ResolverRuntimeConfig {
        min_threshold: config.resolver.min_threshold,
        runner_up_margin: config.resolver.runner_up_margin,
    };

    let mut program_lines: Vec<String> = Vec::new();
    let mut reports: Vec<StepReport> = Vec::new();
    let mut any_failed = false;
    let mut any_executed = false;
    let mut cancelled = false;

    for (idx, step) in steps.iter().enumerate() {
        if is_cancelled() {
            cancelled = true;
            break;
        }

        logging::emit(
            EventKind::CommandStepStart,
            &run_id,
            &json!({ "index": idx, "step": step.original }),
        );

        if idx > 0 {
            program_lines.push("sleep(1)".to_string());
        }

        let class = executor::classify(&step.normalized);
        let is_ui_search = class == executor::StepClass::UiAction && step.needs_visual_grounding;
        if is_ui_search {
            logging::emit(
                EventKind::UiElementSearchStart,
                &run_id,
                &json!({ "index": idx, "fragment": step.target_fragment }),
            );
        }

        let exec = executor::plan_and_execute(
            step,
            &ui,
            &mut run_state,
            resolver_config,
            deps.llm,
            deps.automation,
        )
        .await;

        program_lines.extend(exec.code_lines.iter().cloned());

        let report = match &exec.outcome {
            StepOutcome::Executed => {
                any_executed = true;
                if is_ui_search {
                    logging::emit(
                        EventKind::UiElementSearchSuccess,
                        &run_id,
                        &json!({ "index": idx }),
                    );
                }
                logging::emit(
                    EventKind::CommandStepResult,
                    &run_id,
                    &json!({ "index": idx, "outcome": "executed", "explanation": exec.explanation }),
                );
                StepReport {
                    original: step.original.clone(),
                    outcome: "executed",
                    reasons: Some(exec.explanation.clone()),
                    error: None,
                }
            }
            StepOutcome::Skipped { reason } => {
                if is_ui_search {
                    logging::emit(
                        EventKind::UiElementSearchNoMatch,
                        &run_id,
                        &json!({ "index": idx, "reason": reason }),
                    );
                }
                logging::emit(
                    EventKind::CommandStepSkipped,
                    &run_id,
                    &json!({ "index": idx, "reason": reason }),
                );
                StepReport {
                    original: step.original.clone(),
                    outcome: "skipped",
                    reasons: Some(reason.clone()),
                    error: None,
                }
            }
            StepOutcome::Failed { error } => {
                any_failed = true;
                if is_ui_search {
                    logging::emit(
                        EventKind::UiElementSearchError,
                        &run_id,
                        &json!({ "index": idx, "error": error }),
                    );
                }
                logging::emit(
                    EventKind::CommandStepResult,
                    &run_id,
                    &json!({ "index": idx, "outcome": "failed", "error": error }),
                );
                StepReport {
                    original: step.original.clone(),
                    outcome: "failed",
                    reasons: None,
                    error: Some(error.clone()),
                }
            }
        };
        reports.push(report);

        if opts.enable_stability_wait
            && matches!(exec.outcome, StepOutcome::Executed)
            && !matches!(class, executor::StepClass::Typing)
        {
            stability::wait_for_stability(
                deps.screenshot,
                &config.stability_waiter,
                action_class_for(class),
            )
            .await;
        }
    }

    let mut fallback_triggered = false;
    if !cancelled && !any_executed && !steps.is_empty() {
        fallback_triggered = true;
        logging::emit(
            EventKind::CommandFallbackTriggered,
            &run_id,
            &json!({ "reason": "no step produced an executable action" }),
        );
        if let Some((fallback_lines, explanation)) = deps.llm.fallback_plan(&instruction.text).await {
            program_lines = fallback_lines;
            reports.push(StepReport {
                original: instruction.text.clone(),
                outcome: "fallback",
                reasons: Some(explanation),
                error: None,
            });
        }
    }

    let (after_ui, after_path) = if wants_perception && !cancelled && !is_cancelled() {
        let mut after_config = config.clone();
        after_config.perception.caption_enabled = false;
        capture_ui_description(&deps, &after_config, &[]).await
    } else {
        (UIDescription::empty((0.0, 0.0)), None)
    };
    run_state.after_screenshot = after_path.clone();

    let screen_summary = if wants_perception {
        Some(screen_change_summary(&ui, &after_ui))
    } else {
        None
    };

    let success = !cancelled && !any_failed && (any_executed || fallback_triggered);
    let action_program = program_lines.join("\n");

    let entry = CommandHistoryEntry {
        timestamp: chrono::Utc::now(),
        command: instruction.text.clone(),
        steps: steps.iter().map(|s| s.original.clone()).collect(),
        code: action_program.clone(),
        success,
        screen_summary: screen_summary.clone().unwrap_or_default(),
    };
    history.append(&entry).await?;

    logging::emit(
        EventKind::CommandCompleted,
        &run_id,
        &json!({ "success": success, "cancelled": cancelled }),
    );

    Ok(RunOutcome {
        success,
        steps: reports,
        action_program,
        before_path,
        after_path,
        screen_summary,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::stub::{StubAutomation, StubCaptioner, StubDetector, StubLlm, StubOcr, StubScreenshot};
    use crate::config::PipelineConfig;

    fn deps<'a>(
        llm: &'a StubLlm,
        ocr: &'a StubOcr,
        detector: &'a StubDetector,
        captioner: &'a StubCaptioner,
        screenshot: &'a StubScreenshot,
        automation: &'a StubAutomation,
    ) -> Collaborators<'a> {
        Collaborators {
            llm,
            ocr,
            detector,
            captioner,
            screenshot,
            automation,
        }
    }

    async fn history_writer() -> (tempfile::TempDir, history::HistoryWriter) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        (dir, history::HistoryWriter::new(path))
    }

    #[tokio::test]
    async fn perception_skipped_emits_no_collaborator_calls() {
        let llm = StubLlm::new();
        let ocr = StubOcr::default();
        let detector = StubDetector::default();
        let captioner = StubCaptioner::default();
        let screenshot = StubScreenshot::default();
        let automation = StubAutomation::new();
        let (_dir, history) = history_writer().await;
        let config = PipelineConfig::default();

        let outcome = run(
            Instruction::new("type foo then press tab"),
            RunOptions {
                capture_screenshots: true,
                enable_stability_wait: false,
            },
            deps(&llm, &ocr, &detector, &captioner, &screenshot, &automation),
            &config,
            &history,
            None,
        )
        .await
        .unwrap();

        assert!(outcome.success);
        assert!(outcome.before_path.is_none());
        assert_eq!(captioner.call_count(), 0);
        assert_eq!(automation.calls().len(), 2);
    }

    #[tokio::test]
    async fn empty_instruction_is_an_error_with_no_history_write() {
        let llm = StubLlm::new();
        let ocr = StubOcr::default();
        let detector = StubDetector::default();
        let captioner = StubCaptioner::default();
        let screenshot = StubScreenshot::default();
        let automation = StubAutomation::new();
        let (_dir, history) = history_writer().await;
        let config = PipelineConfig::default();

        let result = run(
            Instruction::new("   "),
            RunOptions::default(),
            deps(&llm, &ocr, &detector, &captioner, &screenshot, &automation),
            &config,
            &history,
            None,
        )
        .await;

        assert!(matches!(result, Err(PipelineError::EmptyInstruction)));
        assert!(history.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_match_step_is_skipped_but_run_continues() {
        let llm = StubLlm::new();
        let ocr = StubOcr::default();
        let detector = StubDetector::default();
        let captioner = StubCaptioner::default();
        let screenshot = StubScreenshot::default();
        let automation = StubAutomation::new();
        let (_dir, history) = history_writer().await;
        let config = PipelineConfig::default();

        let outcome = run(
            Instruction::new("click on the Nonexistent button then press escape"),
            RunOptions {
                capture_screenshots: true,
                enable_stability_wait: false,
            },
            deps(&llm, &ocr, &detector, &captioner, &screenshot, &automation),
            &config,
            &history,
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(outcome.steps[0].outcome, "skipped");
        assert_eq!(outcome.steps[1].outcome, "executed");
    }

    #[tokio::test]
    async fn reference_chaining_reuses_previous_target() {
        let llm = StubLlm::new().with_target("click on settings", "Settings");
        let ocr = StubOcr::new(vec![crate::collaborators::OcrRegion {
            text: "Settings".into(),
            bbox: (0.0, 0.0, 100.0, 40.0),
            confidence: 0.95,
        }]);
        let detector = StubDetector::default();
        let captioner = StubCaptioner::default();
        let screenshot = StubScreenshot::default();
        let automation = StubAutomation::new();
        let (_dir, history) = history_writer().await;
        let config = PipelineConfig::default();

        let outcome = run(
            Instruction::new("click on Settings, then click it again"),
            RunOptions {
                capture_screenshots: true,
                enable_stability_wait: false,
            },
            deps(&llm, &ocr, &detector, &captioner, &screenshot, &automation),
            &config,
            &history,
            None,
        )
        .await
        .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(automation.calls().len(), 2);
    }

    #[tokio::test]
    async fn fallback_triggers_when_every_step_is_skipped() {
        let llm = StubLlm::new().with_target("click on nothing", "");
        let mut llm = llm;
        llm.fallback = Some((vec!["move_to(1, 2)".to_string()], "best effort".to_string()));
        let ocr = StubOcr::default();
        let detector = StubDetector::default();
        let captioner = StubCaptioner::default();
        let screenshot = StubScreenshot::default();
        let automation = StubAutomation::new();
        let (_dir, history) = history_writer().await;
        let config = PipelineConfig::default();

        let outcome = run(
            Instruction::new("click on nothing"),
            RunOptions {
                capture_screenshots: true,
                enable_stability_wait: false,
            },
            deps(&llm, &ocr, &detector, &captioner, &screenshot, &automation),
            &config,
            &history,
            None,
        )
        .await
        .unwrap();

        assert!(outcome.steps.iter().any(|s| s.outcome == "fallback"));
        assert_eq!(outcome.action_program, "move_to(1, 2)");
    }
}
