//! Target annotator.
//!
//! Decides whether a step needs on-screen visual grounding and, if so,
//! extracts the quoted target text.

use super::executor::key_name;
use super::model::Step;
use super::quoting::{quote_mask, words_outside_quotes};
use super::spatial_filter::{extract_spatial_qualifier, strip_spatial};
use super::verbs::{
    starts_with_any_verb, starts_with_word, CONNECTIVE_WORDS, GROUNDING_VERBS, KEY_PRESS_VERBS,
    TYPING_VERBS,
};
use crate::collaborators::LlmCollaborator;

/// Annotates `step` in place: `needs_visual_grounding`, `target_fragment`,
/// `spatial_qualifier`.
pub async fn annotate(step: &mut Step, llm: &dyn LlmCollaborator) {
    step.needs_visual_grounding = needs_visual_grounding(&step.normalized);

    if !step.needs_visual_grounding {
        return;
    }

    step.spatial_qualifier = extract_spatial_qualifier(&step.normalized);
    let stripped = strip_spatial(&step.normalized);

    match llm.extract_target(&stripped).await {
        Some(t) if !t.trim().is_empty() => {
            step.target_fragment = Some(t.trim().to_string());
            step.target_from_llm = true;
        }
        _ => {
            step.target_fragment = fallback_extract(&stripped);
            step.target_from_llm = false;
        }
    }
}

/// A step needs visual grounding iff it demands locating something on
/// screen. Pure typing/keyboard steps never do.
fn needs_visual_grounding(normalized: &str) -> bool {
    let lower = normalized.to_lowercase();

    if starts_with_any_verb(&lower, TYPING_VERBS) || starts_with_any_verb(&lower, KEY_PRESS_VERBS) {
        return false;
    }

    // "select tab" / "selecciona escape" etc.: the target names a keyboard
    // key, not an on-screen element, so no grounding is needed even though
    // "select" is otherwise a grounding verb.
    for verb in ["select", "selecciona"] {
        if starts_with_word(&lower, verb) {
            let rest = lower[verb.len()..].trim();
            if !rest.is_empty() && key_name(rest).is_some() {
                return false;
            }
        }
    }

    GROUNDING_VERBS.iter().any(|v| lower.contains(v))
}

/// Fallback extraction used when the LLM path is disabled or returns
/// empty: first quoted span, else the first remaining content word
/// (>=2 chars) after stripping the leading action verb phrase and
/// connectives.
fn fallback_extract(text: &str) -> Option<String> {
    if let Some(quoted) = first_quoted_span(text) {
        return Some(quoted);
    }

    let mask = quote_mask(text);
    let words = words_outside_quotes(text, &mask);
    let skip = leading_verb_token_count(&words);
    for (_, _, word) in words.iter().skip(skip) {
        if CONNECTIVE_WORDS.contains(&word.as_str()) {
            continue;
        }
        if word.chars().count() >= 2 {
            return Some(word.clone());
        }
    }
    None
}

/// Number of leading word tokens that make up the action verb phrase,
/// e.g. 1 for `click`/`drag`/`mueve`, 2 for `double click`/`haz clic`/
/// `hacer clic`. Falls back to 1 (the bare first content word) when no
/// table entry matches, to preserve the previous behavior for sentences
/// that don't literally start with a recognized verb.
fn leading_verb_token_count(words: &[(usize, usize, String)]) -> usize {
    let mut best = 0usize;
    for verb in GROUNDING_VERBS {
        let tokens: Vec<&str> = verb
            .split(|c: char| c == ' ' || c == '-')
            .filter(|s| !s.is_empty())
            .collect();
        if tokens.is_empty() || tokens.len() > words.len() || tokens.len() <= best {
            continue;
        }
        if tokens
            .iter()
            .zip(words.iter())
            .all(|(t, (_, _, w))| *t == w.as_str())
        {
            best = tokens.len();
        }
    }
    best.max(1)
}

fn first_quoted_span(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'"' || b == b'\'' {
            if let Some(end) = text[i + 1..].find(b as char) {
                return Some(text[i + 1..i + 1 + end].to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::stub::StubLlm;
    use crate::pipeline::step_parser;

    #[tokio::test]
    async fn click_step_needs_grounding_and_extracts_quoted_target() {
        let mut step = step_parser::parse(r#"click on "Compose""#).remove(0);
        let llm = StubLlm::new();
        annotate(&mut step, &llm).await;
        assert!(step.needs_visual_grounding);
        assert_eq!(step.target_fragment.as_deref(), Some("Compose"));
    }

    #[tokio::test]
    async fn typing_step_never_needs_grounding() {
        let mut step = step_parser::parse(r#"type "Hello, world""#).remove(0);
        let llm = StubLlm::new();
        annotate(&mut step, &llm).await;
        assert!(!step.needs_visual_grounding);
        assert!(step.target_fragment.is_none());
    }

    #[tokio::test]
    async fn keyboard_step_never_needs_grounding() {
        let mut step = step_parser::parse("press enter").remove(0);
        let llm = StubLlm::new();
        annotate(&mut step, &llm).await;
        assert!(!step.needs_visual_grounding);
    }

    #[tokio::test]
    async fn llm_target_takes_priority_over_fallback() {
        let mut step = step_parser::parse("click the llm control").remove(0);
        let llm = StubLlm::new().with_target("click the llm control", "LLM Control Panel");
        annotate(&mut step, &llm).await;
        assert_eq!(step.target_fragment.as_deref(), Some("LLM Control Panel"));
    }

    #[tokio::test]
    async fn two_word_spanish_verb_phrase_is_fully_stripped() {
        let mut step = step_parser::parse("haz clic en el icono de perfil").remove(0);
        let llm = StubLlm::new();
        annotate(&mut step, &llm).await;
        assert_eq!(step.target_fragment.as_deref(), Some("icono"));
    }

    #[tokio::test]
    async fn double_click_verb_phrase_is_fully_stripped() {
        let mut step = step_parser::parse("double click the profile icon").remove(0);
        let llm = StubLlm::new();
        annotate(&mut step, &llm).await;
        assert_eq!(step.target_fragment.as_deref(), Some("profile"));
    }

    #[tokio::test]
    async fn select_key_name_target_never_needs_grounding() {
        let mut step = step_parser::parse("select tab").remove(0);
        let llm = StubLlm::new();
        annotate(&mut step, &llm).await;
        assert!(!step.needs_visual_grounding);
    }

    #[tokio::test]
    async fn select_ui_target_still_needs_grounding() {
        let mut step = step_parser::parse("select the invoice row").remove(0);
        let llm = StubLlm::new();
        annotate(&mut step, &llm).await;
        assert!(step.needs_visual_grounding);
    }

    #[tokio::test]
    async fn spatial_qualifier_extracted_and_stripped_before_fallback() {
        let mut step = step_parser::parse("click on the top right icon").remove(0);
        let llm = StubLlm::new();
        annotate(&mut step, &llm).await;
        assert_eq!(
            step.spatial_qualifier.map(|z| z.tag()),
            Some("top-right")
        );
    }
}
