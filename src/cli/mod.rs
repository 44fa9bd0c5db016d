//! Thin CLI wrapper around the pipeline core.
//!
//! Argument parsing and human-readable rendering of a
//! [`crate::pipeline::RunOutcome`], nothing the pipeline itself depends on.

use clap::Parser;
use std::path::PathBuf;

/// Run one natural-language instruction through the command processing
/// pipeline.
#[derive(Parser, Debug)]
#[command(name = "deskpilot")]
#[command(version, about = "Natural-language to desktop-automation command processing pipeline")]
pub struct Cli {
    /// The instruction to run, e.g. `click on "Compose" then type "hi"`.
    pub instruction: String,

    /// Pre-detected source language of `instruction` (e.g. "es", "en").
    #[arg(long)]
    pub language: Option<String>,

    /// Skip screen perception entirely, even for steps that would need it.
    #[arg(long)]
    pub no_screenshots: bool,

    /// Skip the post-step stability wait.
    #[arg(long)]
    pub no_stability_wait: bool,

    /// Directory screenshots are written under.
    #[arg(long)]
    pub screenshot_dir: Option<PathBuf>,

    /// Append-only command history CSV path.
    #[arg(long)]
    pub history_path: Option<PathBuf>,

    /// Path to a `pipeline.toml` config file; defaults to the platform
    /// config directory.
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Use deterministic stub collaborators instead of any real LLM/OCR/
    /// detector/captioner backend. Useful for dry runs and demos, and the
    /// only option when no real adapter is compiled in.
    #[arg(long)]
    pub offline: bool,
}

/// Renders a [`crate::pipeline::RunOutcome`] the way a human operator
/// reads a command's result: per-step outcome, the action program, and
/// the screen-change summary when available.
pub fn print_outcome(outcome: &crate::pipeline::RunOutcome) {
    println!(
        "run {}",
        if outcome.success { "succeeded" } else { "did not fully succeed" }
    );
    for step in &outcome.steps {
        match step.outcome {
            "executed" => println!("  [ok]      {}", step.original),
            "skipped" => println!(
                "  [skipped] {} ({})",
                step.original,
                step.reasons.as_deref().unwrap_or("no reason recorded")
            ),
            "failed" => println!(
                "  [failed]  {} ({})",
                step.original,
                step.error.as_deref().unwrap_or("unknown error")
            ),
            "fallback" => println!(
                "  [fallback] {} ({})",
                step.original,
                step.reasons.as_deref().unwrap_or("")
            ),
            other => println!("  [{other}] {}", step.original),
        }
    }
    if !outcome.action_program.is_empty() {
        println!("\naction program:\n{}", outcome.action_program);
    }
    if let Some(summary) = &outcome.screen_summary {
        println!("\nscreen change: {summary}");
    }
    if outcome.cancelled {
        println!("\n(run was cancelled)");
    }
}

pub fn print_error(message: impl std::fmt::Display) {
    eprintln!("error: {message}");
}
