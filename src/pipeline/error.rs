//! One `thiserror` enum per fallible boundary, composed the way the prior
//! system layered `GaneshaError` / `ProviderError` / `VisionError` /
//! `InputError`. There is no `ParseError`: the step parser never fails —
//! worst case it returns the whole instruction as a single step.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("resolver internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("screenshot capture failed: {0}")]
    Capture(String),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("automation primitive failed: {0}")]
    Primitive(String),
}

#[derive(Debug, Error)]
pub enum WaiterError {
    #[error("stability check capture failed: {0}")]
    CaptureFailed(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history csv error: {0}")]
    Csv(String),
}

/// Top-level error for the orchestrator's own `Result` type. Only the
/// conditions that terminate the whole run surface here; everything
/// recoverable is absorbed inside the components below (skip the step,
/// fall back, or degrade) and never reaches this type.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("instruction is empty")]
    EmptyInstruction,

    #[error("run was cancelled")]
    Cancelled,

    #[error(transparent)]
    Perception(#[from] PerceptionError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Waiter(#[from] WaiterError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("internal invariant violation: {0}")]
    Invariant(String),
}
