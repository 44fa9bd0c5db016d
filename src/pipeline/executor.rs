//! Step planner / executor.
//!
//! Classifies each step (reference / keyboard / typing / UI-action),
//! synthesizes its primitive action program, runs it through the
//! automation collaborator, and updates [`RunState`].

use super::model::{ActionKind, RunState, Step, StepExecution, StepOutcome, UIDescription};
use super::quoting::{quote_mask, words_outside_quotes};
use super::resolver::{self, ResolverConfig};
use super::verbs::{
    starts_with_any_verb, starts_with_word, CONNECTIVE_WORDS, KEY_PRESS_VERBS, REFERENCE_WORDS,
    TYPING_VERBS,
};
use crate::collaborators::{Automation, LlmCollaborator, Primitive};

/// One line of human-readable explanation plus the primitive program it
/// justifies. `code_lines` mirrors the primitives as a pseudo-code trace
/// the way the orchestrator's `action_program` field renders them.
pub struct ActionProgram {
    pub primitives: Vec<Primitive>,
    pub code_lines: Vec<String>,
    pub explanation_lines: Vec<String>,
}

impl ActionProgram {
    fn empty() -> Self {
        Self {
            primitives: Vec::new(),
            code_lines: Vec::new(),
            explanation_lines: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepClass {
    Reference,
    Keyboard,
    Typing,
    UiAction,
}

const CLICK_VERBS: &[&str] = &["click", "double-click", "right-click", "haz clic", "hacer clic"];

fn mentions_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Whole-word membership check: unlike `mentions_any`, a candidate word
/// that merely *contains* one of `words` as a substring (e.g. "submit",
/// "edit", "exit" all containing "it") does not count.
fn mentions_any_whole_word(text: &str, words: &[&str]) -> bool {
    let mask = quote_mask(text);
    words_outside_quotes(text, &mask)
        .iter()
        .any(|(_, _, w)| words.contains(&w.as_str()))
}

pub(crate) fn classify(normalized: &str) -> StepClass {
    let lower = normalized.to_lowercase();
    let trimmed = lower.trim();

    if trimmed == "click" || trimmed == "click on" {
        return StepClass::Reference;
    }
    if mentions_any(&lower, CLICK_VERBS) && mentions_any_whole_word(&lower, REFERENCE_WORDS) {
        return StepClass::Reference;
    }
    if starts_with_any_verb(&lower, KEY_PRESS_VERBS) && extract_key_names(&lower).iter().any(Option::is_some) {
        return StepClass::Keyboard;
    }
    if starts_with_any_verb(&lower, TYPING_VERBS) {
        if starts_with_word(&lower, "enter") {
            // Bare "enter" (no content) is ambiguous with the `enter` key
            // name; only classify as typing when content follows.
            let rest = lower.strip_prefix("enter").unwrap_or("").trim();
            if rest.is_empty() {
                return StepClass::UiAction;
            }
        }
        return StepClass::Typing;
    }
    StepClass::UiAction
}

/// Canonical key-name synonym table. Unknown spoken
/// names resolve to `None` and are dropped, never errored.
const KEY_SYNONYMS: &[(&str, &str)] = &[
    ("enter", "enter"),
    ("intro", "enter"),
    ("return", "enter"),
    ("escape", "escape"),
    ("esc", "escape"),
    ("tab", "tab"),
    ("space", "space"),
    ("espacio", "space"),
    ("up", "up"),
    ("arriba", "up"),
    ("down", "down"),
    ("abajo", "down"),
    ("left", "left"),
    ("izquierda", "left"),
    ("right", "right"),
    ("derecha", "right"),
    ("control", "ctrl"),
    ("ctrl", "ctrl"),
    ("command", "cmd"),
    ("cmd", "cmd"),
    ("win", "cmd"),
    ("windows", "cmd"),
    ("shift", "shift"),
    ("alt", "alt"),
    ("delete", "delete"),
    ("suprimir", "delete"),
    ("backspace", "backspace"),
    ("home", "home"),
    ("end", "end"),
    ("pageup", "pageup"),
    ("pagedown", "pagedown"),
];

pub(crate) fn key_name(word: &str) -> Option<&'static str> {
    KEY_SYNONYMS.iter().find(|(k, _)| *k == word).map(|(_, v)| *v)
}

/// Words of `text` outside the leading verb, each resolved to a canonical
/// key or `None` if unrecognized.
fn extract_key_names(text: &str) -> Vec<Option<&'static str>> {
    let mask = quote_mask(text);
    let words = words_outside_quotes(text, &mask);
    let mut out = Vec::new();
    let mut skipped_verb = false;
    for (_, _, word) in &words {
        if !skipped_verb {
            skipped_verb = true;
            continue;
        }
        if CONNECTIVE_WORDS.contains(&word.as_str()) || word == "and" || word == "then" {
            continue;
        }
        out.push(key_name(word));
    }
    out
}

/// Doubles curly braces, the only meta-character the typing primitive
/// treats specially; nothing else is transformed.
pub fn safe_text(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Regex-free fallback cascade for a typing step's payload: quoted span
/// after the verb -> text up to a trailing `then press`/`y presiona` ->
/// everything after the verb token.
fn fallback_typing_text(normalized: &str) -> String {
    let mask = quote_mask(normalized);
    let words = words_outside_quotes(normalized, &mask);
    let after_verb_start = words.get(1).map(|(s, _, _)| *s).unwrap_or(normalized.len());
    let remainder = normalized[after_verb_start..].trim();

    if let Some(q) = first_quoted_span(remainder) {
        return q;
    }

    let lower = remainder.to_lowercase();
    for marker in [" then press", " y presiona", "; then press"] {
        if let Some(idx) = lower.find(marker) {
            return remainder[..idx].trim().to_string();
        }
    }

    remainder.to_string()
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

async fn extract_typing_text(normalized: &str, llm: &dyn LlmCollaborator) -> String {
    match llm.extract_target(normalized).await {
        Some(t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => fallback_typing_text(normalized),
    }
}

fn kind_label(kind: &super::model::ElementKind) -> &'static str {
    use super::model::ElementKind;
    match kind {
        ElementKind::Button => "button",
        ElementKind::InputField => "input field",
        ElementKind::MenuItem => "menu item",
        ElementKind::Checkbox => "checkbox",
        ElementKind::Link => "link",
        ElementKind::Icon => "icon",
        ElementKind::Tab => "tab",
        ElementKind::Text => "text",
        ElementKind::Unknown => "element",
        ElementKind::Other(_) => "element",
    }
}

fn reference_explanation(run_state: &RunState) -> String {
    match &run_state.last_ui_element {
        Some(el) => {
            let kind = kind_label(&el.kind);
            match &el.text {
                Some(text) => format!(
                    "Clicking on the previously targeted {kind} '{text}'"
                ),
                None => format!("Clicking on the previously targeted {kind}"),
            }
        }
        None => "Clicking at the previous location".to_string(),
    }
}

fn plan_reference(run_state: &RunState) -> Result<ActionProgram, StepOutcome> {
    let Some((x, y)) = run_state.last_coordinates else {
        return Err(StepOutcome::Skipped {
            reason: "no previous target to reference".to_string(),
        });
    };
    let primitives = vec![Primitive::Move { x, y }, Primitive::Click];
    let code_lines = vec![format!("move_to({x:.0}, {y:.0})"), "click()".to_string()];
    let explanation_lines = vec![reference_explanation(run_state)];
    Ok(ActionProgram {
        primitives,
        code_lines,
        explanation_lines,
    })
}

fn plan_keyboard(normalized: &str) -> Result<ActionProgram, StepOutcome> {
    let keys = extract_key_names(normalized);
    let mut program = ActionProgram::empty();
    let mut any_recognized = false;
    for key in keys {
        match key {
            Some(k) => {
                any_recognized = true;
                program.primitives.push(Primitive::Press(k.to_string()));
                program.code_lines.push(format!("press('{k}')"));
            }
            None => {
                program
                    .explanation_lines
                    .push("dropped an unrecognized key name".to_string());
            }
        }
    }
    if !any_recognized {
        return Err(StepOutcome::Skipped {
            reason: "no recognized key name in step".to_string(),
        });
    }
    program
        .explanation_lines
        .insert(0, "Pressing the requested key(s)".to_string());
    Ok(program)
}

async fn plan_typing(
    step: &Step,
    ui: &UIDescription,
    resolver_config: ResolverConfig,
    llm: &dyn LlmCollaborator,
) -> Result<ActionProgram, StepOutcome> {
    let mut program = ActionProgram::empty();

    // Optional pre-click: a fragment named before the typing verb.
    if let Some(target) = pre_verb_fragment(&step.normalized) {
        if let Ok(Some(resolved)) = resolver::resolve(
            &target,
            &step.normalized,
            ui,
            step.spatial_qualifier,
            resolver_config,
            step.target_from_llm,
        ) {
            program.primitives.push(Primitive::Move {
                x: resolved.x,
                y: resolved.y,
            });
            program.primitives.push(Primitive::Click);
            program
                .code_lines
                .push(format!("move_to({:.0}, {:.0})", resolved.x, resolved.y));
            program.code_lines.push("click()".to_string());
            program
                .explanation_lines
                .push(format!("Clicking the '{target}' field before typing"));
        }
    }

    let raw_text = extract_typing_text(&step.normalized, llm).await;
    if raw_text.trim().is_empty() {
        return Err(StepOutcome::Skipped {
            reason: "typing step had empty text".to_string(),
        });
    }
    let text = safe_text(raw_text.trim());
    program.primitives.push(Primitive::Type(text.clone()));
    program.code_lines.push(format!("type_text(\"{text}\")"));
    program
        .explanation_lines
        .push(format!("Typing '{}'", raw_text.trim()));

    Ok(program)
}

/// A quoted or bare target phrase that appears before the typing verb,
/// e.g. `"search box" type hello` / `en el buscador escribe hola`.
fn pre_verb_fragment(normalized: &str) -> Option<String> {
    let mask = quote_mask(normalized);
    let words = words_outside_quotes(normalized, &mask);
    let verb_idx = words
        .iter()
        .position(|(_, _, w)| TYPING_VERBS.contains(&w.as_str()))?;
    if verb_idx == 0 {
        return None;
    }
    let head_end = words[verb_idx].0;
    let head = normalized[..head_end].trim();
    if head.is_empty() {
        return None;
    }
    if let Some(q) = first_quoted_span(head) {
        return Some(q);
    }
    None
}

fn plan_ui_action(
    step: &Step,
    ui: &UIDescription,
    resolver_config: ResolverConfig,
) -> Result<(ActionProgram, super::resolver::ResolvedTarget), StepOutcome> {
    let fragment = step.target_fragment.clone().unwrap_or_default();
    let resolved = resolver::resolve(
        &fragment,
        &step.normalized,
        ui,
        step.spatial_qualifier,
        resolver_config,
        step.target_from_llm,
    )
    .ok()
    .flatten();

    let Some(resolved) = resolved else {
        return Err(StepOutcome::Skipped {
            reason: format!(
                "found {} elements, none matched",
                ui.elements.len()
            ),
        });
    };

    let lower = step.normalized.to_lowercase();
    let (click_primitive, click_code, verb_label) = if mentions_any(&lower, &["double-click", "double click"]) {
        (Primitive::DoubleClick, "double_click()", "double-clicking")
    } else if mentions_any(&lower, &["right-click", "right click"]) {
        (Primitive::RightClick, "right_click()", "right-clicking")
    } else {
        (Primitive::Click, "click()", "clicking")
    };

    let primitives = vec![
        Primitive::Move {
            x: resolved.x,
            y: resolved.y,
        },
        click_primitive,
    ];
    let code_lines = vec![
        format!("move_to({:.0}, {:.0})", resolved.x, resolved.y),
        click_code.to_string(),
    ];
    let label = resolved
        .element
        .text
        .clone()
        .or_else(|| resolved.element.description.clone())
        .unwrap_or_else(|| "matched element".to_string());
    let explanation_lines = vec![format!("{verb_label} on '{label}' (score {:.1})", resolved.score)];

    Ok((
        ActionProgram {
            primitives,
            code_lines,
            explanation_lines,
        },
        resolved,
    ))
}

/// Plans and executes one step, updating `run_state` and returning its
/// recorded outcome. Never panics: every collaborator error becomes a
/// `Failed` outcome, and subsequent steps still run.
pub async fn plan_and_execute(
    step: &Step,
    ui: &UIDescription,
    run_state: &mut RunState,
    resolver_config: ResolverConfig,
    llm: &dyn LlmCollaborator,
    automation: &dyn Automation,
) -> StepExecution {
    let class = classify(&step.normalized);

    let mut resolved_element = None;
    let plan_result = match class {
        StepClass::Reference => plan_reference(run_state),
        StepClass::Keyboard => plan_keyboard(&step.normalized),
        StepClass::Typing => plan_typing(step, ui, resolver_config, llm).await,
        StepClass::UiAction => plan_ui_action(step, ui, resolver_config).map(|(p, resolved)| {
            resolved_element = Some(resolved.element);
            p
        }),
    };

    let program = match plan_result {
        Ok(p) => p,
        Err(outcome) => {
            let explanation = match &outcome {
                StepOutcome::Skipped { reason } => reason.clone(),
                _ => String::new(),
            };
            return StepExecution {
                step: step.clone(),
                outcome,
                explanation,
                code_lines: Vec::new(),
            };
        }
    };

    match automation.run(&program.primitives).await {
        Ok(()) => {
            apply_state_update(&step.normalized, class, resolved_element, run_state);
            StepExecution {
                step: step.clone(),
                outcome: StepOutcome::Executed,
                explanation: program.explanation_lines.join("; "),
                code_lines: program.code_lines,
            }
        }
        Err(err) => StepExecution {
            step: step.clone(),
            outcome: StepOutcome::Failed {
                error: err.to_string(),
            },
            explanation: program.explanation_lines.join("; "),
            code_lines: program.code_lines,
        },
    }
}

/// Writes `RunState` per the state-update rule: UI-actions
/// and references update the last target; keyboard/typing only update
/// `last_action_kind`.
fn apply_state_update(
    normalized: &str,
    class: StepClass,
    resolved_element: Option<super::model::UIElement>,
    run_state: &mut RunState,
) {
    let lower = normalized.to_lowercase();
    match class {
        StepClass::Reference => {
            run_state.last_action_kind = Some(ActionKind::Reference);
        }
        StepClass::UiAction => {
            if let Some(element) = resolved_element {
                run_state.record_target(element);
            }
            let kind = if mentions_any(&lower, &["double-click", "double click"]) {
                ActionKind::DoubleClick
            } else if mentions_any(&lower, &["right-click", "right click"]) {
                ActionKind::RightClick
            } else {
                ActionKind::Click
            };
            run_state.last_action_kind = Some(kind);
        }
        StepClass::Keyboard => {
            run_state.last_action_kind = Some(ActionKind::Keyboard);
        }
        StepClass::Typing => {
            run_state.last_action_kind = Some(ActionKind::Type);
        }
    }
}
