//! Structured log events for the pipeline.
//!
//! Every event the orchestrator and resolver emit is one JSON object
//! (via `tracing`, following this project's longstanding preference for
//! structured over free-text logs) carrying `event`, `run_id`, and `ts`,
//! plus whatever fields that event needs.

use serde::Serialize;

/// The structured event names the core must emit, verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CommandReceived,
    CommandStepsSplit,
    CommandStepAnnotated,
    CommandPerception,
    CommandStepStart,
    CommandStepResult,
    CommandStepSkipped,
    UiElementSearchStart,
    UiElementSearchSuccess,
    UiElementSearchNoMatch,
    UiElementSearchError,
    CommandFallbackTriggered,
    CommandCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CommandReceived => "command.received",
            EventKind::CommandStepsSplit => "command.steps_split",
            EventKind::CommandStepAnnotated => "command.step.annotated",
            EventKind::CommandPerception => "command.perception",
            EventKind::CommandStepStart => "command.step.start",
            EventKind::CommandStepResult => "command.step.result",
            EventKind::CommandStepSkipped => "command.step.skipped",
            EventKind::UiElementSearchStart => "ui_element_search_start",
            EventKind::UiElementSearchSuccess => "ui_element_search_success",
            EventKind::UiElementSearchNoMatch => "ui_element_search_no_match",
            EventKind::UiElementSearchError => "ui_element_search_error",
            EventKind::CommandFallbackTriggered => "command.fallback.triggered",
            EventKind::CommandCompleted => "command.completed",
        }
    }
}

/// Emits a structured event. `fields` is any serde-serializable payload
/// specific to the event (e.g. the step list for `command.steps_split`).
pub fn emit<T: Serialize>(kind: EventKind, run_id: &str, fields: &T) {
    let ts = chrono::Utc::now().to_rfc3339();
    let payload = serde_json::to_value(fields).unwrap_or(serde_json::Value::Null);
    tracing::info!(
        event = kind.as_str(),
        run_id = run_id,
        ts = %ts,
        fields = %payload,
        "{}",
        kind.as_str()
    );
}

/// Installs a JSON `tracing` subscriber. Call once from the binary entry
/// point; library code never installs a global subscriber itself.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().json().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_stable() {
        assert_eq!(EventKind::CommandReceived.as_str(), "command.received");
        assert_eq!(
            EventKind::CommandStepsSplit.as_str(),
            "command.steps_split"
        );
        assert_eq!(
            EventKind::CommandFallbackTriggered.as_str(),
            "command.fallback.triggered"
        );
        assert_eq!(EventKind::CommandCompleted.as_str(), "command.completed");
    }
}
