//! deskpilot — demo binary that drives the command processing pipeline
//! from a terminal for one instruction at a time.
//!
//! The transport surface (HTTP, voice capture, translation) stays
//! upstream of this binary, which stands in for "upstream has already
//! produced an `Instruction`" and exists so the pipeline can be
//! exercised end-to-end from the command line.

use clap::Parser;
use deskpilot::cli::{print_error, print_outcome, Cli};
use deskpilot::collaborators::stub::{StubAutomation, StubCaptioner, StubDetector, StubLlm, StubOcr, StubScreenshot};
use deskpilot::collaborators::llm::ProviderLlmCollaborator;
use deskpilot::collaborators::{Automation, Captioner, Detector, LlmCollaborator, Ocr, ScreenshotSource};
use deskpilot::pipeline::history::HistoryWriter;
use deskpilot::pipeline::{run, Collaborators, RunOptions};
use deskpilot::{ConfigManager, Instruction, ProviderChain};
use std::path::PathBuf;

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "deskpilot", "deskpilot")
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".deskpilot"))
}

#[tokio::main]
async fn main() {
    deskpilot::logging::init_tracing();
    let cli = Cli::parse();

    let config = match cli
        .config_path
        .clone()
        .map(ConfigManager::with_path)
        .unwrap_or_default()
        .load()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            print_error(format!("failed to load config, using defaults: {e}"));
            deskpilot::PipelineConfig::default()
        }
    };

    let data_dir = default_data_dir();
    let screenshot_dir = cli.screenshot_dir.unwrap_or_else(|| data_dir.join("screenshots"));
    let history_path = cli.history_path.unwrap_or_else(|| data_dir.join("history.csv"));
    if let Err(e) = std::fs::create_dir_all(&screenshot_dir) {
        print_error(format!("could not create screenshot dir: {e}"));
    }

    let llm: Box<dyn LlmCollaborator> = if cli.offline {
        Box::new(StubLlm::new())
    } else {
        Box::new(ProviderLlmCollaborator::new(ProviderChain::default_chain()))
    };
    let ocr: Box<dyn Ocr> = Box::new(StubOcr::default());
    let detector: Box<dyn Detector> = Box::new(StubDetector::default());
    let captioner: Box<dyn Captioner> = Box::new(StubCaptioner::default());

    #[cfg(feature = "vision")]
    let screenshot: Box<dyn ScreenshotSource> = if cli.offline {
        Box::new(StubScreenshot::default())
    } else {
        Box::new(deskpilot::collaborators::vision_adapter::XcapScreenshot::new(
            screenshot_dir.clone(),
        ))
    };
    #[cfg(not(feature = "vision"))]
    let screenshot: Box<dyn ScreenshotSource> = Box::new(StubScreenshot::default());

    #[cfg(feature = "input")]
    let automation: Box<dyn Automation> = if cli.offline {
        Box::new(StubAutomation::new())
    } else {
        match deskpilot::collaborators::input_adapter::EnigoAutomation::new() {
            Ok(real) => Box::new(real),
            Err(e) => {
                print_error(format!("could not initialize input automation, falling back to a no-op: {e}"));
                Box::new(StubAutomation::new())
            }
        }
    };
    #[cfg(not(feature = "input"))]
    let automation: Box<dyn Automation> = Box::new(StubAutomation::new());

    let deps = Collaborators {
        llm: llm.as_ref(),
        ocr: ocr.as_ref(),
        detector: detector.as_ref(),
        captioner: captioner.as_ref(),
        screenshot: screenshot.as_ref(),
        automation: automation.as_ref(),
    };

    let history = HistoryWriter::new(history_path);
    let instruction = match &cli.language {
        Some(lang) => Instruction::new(cli.instruction.clone()).with_language(lang.clone()),
        None => Instruction::new(cli.instruction.clone()),
    };
    let opts = RunOptions {
        capture_screenshots: !cli.no_screenshots,
        enable_stability_wait: !cli.no_stability_wait,
    };

    match run(instruction, opts, deps, &config, &history, None).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            deskpilot::pipeline::screenshots::enforce_retention(
                &screenshot_dir,
                config.screenshots.max_age_days,
                config.screenshots.max_count,
            )
            .await;
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            print_error(e);
            std::process::exit(2);
        }
    }
}
