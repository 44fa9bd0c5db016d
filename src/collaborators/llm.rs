//! Real `LlmCollaborator` backed by [`crate::providers::LlmProvider`].
//!
//! Target extraction and the fallback one-shot planner are both single
//! generate() calls; any provider error becomes `None`, per the "LLM
//! integration is a tool, not a dependency" design note.

use super::LlmCollaborator;
use crate::providers::LlmProvider;
use async_trait::async_trait;

const EXTRACT_TARGET_SYSTEM: &str = "You locate UI targets from a spoken command. \
Given one instruction step, reply with only the single most salient on-screen phrase \
the user wants to interact with, preserving its original language and case. \
If nothing identifiable is named, reply with an empty response.";

const FALLBACK_PLAN_SYSTEM: &str = "You write a short desktop automation action program. \
Given one instruction, reply with a JSON object {\"code_lines\": [...], \"explanation\": \"...\"} \
describing the primitive steps (move, click, type, press) needed, in order.";

#[derive(serde::Deserialize)]
struct FallbackPlanResponse {
    code_lines: Vec<String>,
    explanation: String,
}

/// Adapts any [`LlmProvider`] (local or cloud) to the narrow
/// [`LlmCollaborator`] contract the pipeline core depends on.
pub struct ProviderLlmCollaborator<P: LlmProvider> {
    provider: P,
}

impl<P: LlmProvider> ProviderLlmCollaborator<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: LlmProvider> LlmCollaborator for ProviderLlmCollaborator<P> {
    async fn extract_target(&self, step_text: &str) -> Option<String> {
        let reply = self
            .provider
            .generate(EXTRACT_TARGET_SYSTEM, step_text)
            .await
            .ok()?;
        let trimmed = reply.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    async fn fallback_plan(&self, instruction: &str) -> Option<(Vec<String>, String)> {
        let reply = self
            .provider
            .generate(FALLBACK_PLAN_SYSTEM, instruction)
            .await
            .ok()?;
        let parsed: FallbackPlanResponse = serde_json::from_str(reply.trim()).ok()?;
        if parsed.code_lines.is_empty() {
            None
        } else {
            Some((parsed.code_lines, parsed.explanation))
        }
    }
}
