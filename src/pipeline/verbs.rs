//! Bilingual verb and keyword tables shared by the step parser, the
//! target annotator, and the step executor. Centralized here so every
//! component recognizes the same spoken vocabulary instead of drifting.

/// Bare action verbs/phrases recognized for the comma-to-`then` rewrite
/// and the parser's merge pass.
pub const ACTION_VERBS: &[&str] = &[
    "click", "move", "press", "type", "write", "drag", "select", "double-click",
    "right-click", "escribe", "teclea", "presiona", "pulsa", "mueve", "selecciona",
    "arrastra", "haz",
];

/// Exact bare-verb phrases the parser's merge pass looks for: a step
/// consisting of nothing else.
pub const BARE_VERB_PHRASES: &[&str] = &["click", "click on", "move to", "press"];

/// Connectors recognized both as step separators (C1) and as a leading
/// prefix stripped by `normalize_step`.
pub const CONNECTORS: &[&str] = &["then", "and", "luego", "y"];

/// Typing verbs: pure typing steps never need visual grounding, and
/// inline occurrences trigger the parser's step-5 split.
pub const TYPING_VERBS: &[&str] = &["type", "write", "escribe", "teclea", "enter"];

/// Key-press verbs: pure keyboard steps never need visual grounding, and
/// inline occurrences trigger the parser's step-5 split.
pub const KEY_PRESS_VERBS: &[&str] = &["press", "hit", "pulsa", "presiona"];

/// Verbs that imply a click/move/drag/select target and therefore need
/// visual grounding.
pub const GROUNDING_VERBS: &[&str] = &[
    "click", "double-click", "double click", "right-click", "right click", "move",
    "drag", "select", "haz clic", "hacer clic", "mueve", "arrastra", "selecciona",
];

/// Reference words: "click it"/"click that" reuses the last target
/// instead of resolving a new one. `la`/`lo` are deliberately excluded:
/// unlike `ella`/`ello`/`eso`/`esto`, they double as the ordinary
/// feminine/neuter definite article ("la ventana"), so treating them as
/// reference pronouns would misclassify any click naming a feminine
/// target noun.
pub const REFERENCE_WORDS: &[&str] = &["it", "that", "this", "eso", "esto", "ello", "ella"];

/// Common connective/filler words stripped by the annotator's fallback
/// target extraction before taking the first remaining content word.
pub const CONNECTIVE_WORDS: &[&str] = &[
    "on", "the", "a", "an", "to", "in", "el", "la", "los", "las", "un", "una", "en",
    "de", "del",
];

pub fn starts_with_word(text: &str, word: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower == word || lower.starts_with(&format!("{} ", word))
}

pub fn starts_with_any_verb(text: &str, verbs: &[&str]) -> bool {
    verbs.iter().any(|v| starts_with_word(text, v))
}
