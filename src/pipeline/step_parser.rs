//! Step parser.
//!
//! Segments a raw instruction into ordered atomic [`Step`]s. Never fails:
//! in the worst case the whole instruction comes back as a single step.

use super::model::Step;
use super::quoting::{quote_mask, words_outside_quotes};
use super::verbs::{BARE_VERB_PHRASES, CONNECTORS, KEY_PRESS_VERBS, TYPING_VERBS};
use once_cell::sync::Lazy;
use regex::Regex;

static COMMA_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    let verbs = crate::pipeline::verbs::ACTION_VERBS.join("|");
    Regex::new(&format!(r"(?i),\s*({})\b", verbs)).expect("valid comma-verb regex")
});

static EXPLICIT_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[,;]\s*(then|and)\b").expect("valid explicit separator regex"));

/// Parses `instruction` into an ordered sequence of atomic steps.
pub fn parse(instruction: &str) -> Vec<Step> {
    let trimmed = strip_trailing_period(instruction.trim());
    if trimmed.is_empty() {
        return Vec::new();
    }

    let rewritten = rewrite_comma_to_then(trimmed);
    let raw_segments = segment(&rewritten);
    let merged = merge_bare_verbs(raw_segments);
    let refined: Vec<String> = merged.iter().flat_map(|s| split_at_inline_verb(s)).collect();

    refined
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !is_standalone_punctuation(s))
        .map(make_step)
        .collect()
}

fn strip_trailing_period(s: &str) -> &str {
    s.strip_suffix('.').unwrap_or(s).trim_end()
}

/// Rewrites `", <verb>"` to `", then <verb>"` outside
/// quoted spans, so a bare action verb after a comma reads as an explicit
/// connector even when the user didn't write one.
fn rewrite_comma_to_then(s: &str) -> String {
    let mask = quote_mask(s);
    let mut out = String::with_capacity(s.len() + 8);
    let mut last = 0usize;
    for cap in COMMA_VERB_RE.captures_iter(s) {
        let m = cap.get(0).expect("group 0 always matches");
        if mask[m.start()] {
            continue;
        }
        out.push_str(&s[last..m.start()]);
        out.push_str(", then ");
        out.push_str(&cap[1]);
        last = m.end();
    }
    out.push_str(&s[last..]);
    out
}

/// Segments on, in priority order: explicit multi-word separators,
/// bare commas/semicolons, and bare connector words — all outside quotes.
fn segment(s: &str) -> Vec<String> {
    let mask = quote_mask(s);
    let mut cuts: Vec<(usize, usize)> = Vec::new();

    for m in EXPLICIT_SEPARATOR_RE.find_iter(s) {
        if !mask[m.start()] {
            cuts.push((m.start(), m.end()));
        }
    }

    for (i, b) in s.bytes().enumerate() {
        if (b == b',' || b == b';') && !mask[i] && !cuts.iter().any(|&(a, e)| i >= a && i < e) {
            cuts.push((i, i + 1));
        }
    }

    for (start, end, word) in words_outside_quotes(s, &mask) {
        if CONNECTORS.contains(&word.as_str()) && !cuts.iter().any(|&(a, e)| start >= a && start < e)
        {
            cuts.push((start, end));
        }
    }

    cuts.sort_by_key(|&(a, _)| a);
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (a, b) in cuts {
        if let Some(last) = merged.last_mut() {
            if a <= last.1 {
                last.1 = last.1.max(b);
                continue;
            }
        }
        merged.push((a, b));
    }

    let mut segments = Vec::new();
    let mut last_end = 0usize;
    for (a, b) in &merged {
        let seg = s[last_end..*a].trim();
        if !seg.is_empty() {
            segments.push(seg.to_string());
        }
        last_end = *b;
    }
    let tail = s[last_end..].trim();
    if !tail.is_empty() {
        segments.push(tail.to_string());
    }
    if segments.is_empty() {
        segments.push(s.trim().to_string());
    }
    segments
}

/// A bare action-verb step merges into the next step when that next
/// step doesn't itself start with an action verb.
fn merge_bare_verbs(segments: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut iter = segments.into_iter().peekable();
    while let Some(seg) = iter.next() {
        let lower = seg.trim().to_lowercase();
        if BARE_VERB_PHRASES.contains(&lower.as_str()) {
            if let Some(next) = iter.peek() {
                let starts_with_verb = crate::pipeline::verbs::starts_with_any_verb(
                    next,
                    crate::pipeline::verbs::ACTION_VERBS,
                );
                if !starts_with_verb {
                    let next = iter.next().expect("peeked Some");
                    out.push(format!("{} {}", seg.trim(), next.trim()));
                    continue;
                }
            }
        }
        out.push(seg);
    }
    out
}

/// Splits a step at the first inline typing/keyboard verb that begins
/// *inside* a step with earlier content, so each
/// resulting step starts with exactly one action verb.
fn split_at_inline_verb(seg: &str) -> Vec<String> {
    let mask = quote_mask(seg);
    let words = words_outside_quotes(seg, &mask);
    for (idx, (start, _end, word)) in words.iter().enumerate() {
        if idx == 0 {
            continue;
        }
        if TYPING_VERBS.contains(&word.as_str()) || KEY_PRESS_VERBS.contains(&word.as_str()) {
            let head = seg[..*start].trim();
            let tail = seg[*start..].trim();
            if !head.is_empty() && !tail.is_empty() {
                let mut result = split_at_inline_verb(head);
                result.extend(split_at_inline_verb(tail));
                return result;
            }
        }
    }
    vec![seg.trim().to_string()]
}

fn is_standalone_punctuation(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_punctuation() || c.is_whitespace())
}

fn make_step(original: String) -> Step {
    let normalized = normalize_step(&original);
    Step::new(original, normalized)
}

/// Strips leading connectors (`then`/`and`/`luego`/`y`), repeating until
/// none remain so the function is idempotent:
/// `normalize_step(normalize_step(s)) == normalize_step(s)`.
pub fn normalize_step(s: &str) -> String {
    let mut current = s.trim().to_string();
    loop {
        let lower = current.to_lowercase();
        let mut stripped = None;
        for c in CONNECTORS {
            if lower == *c {
                stripped = Some(String::new());
                break;
            }
            let prefix = format!("{} ", c);
            if lower.starts_with(&prefix) {
                stripped = Some(current[prefix.len()..].trim().to_string());
                break;
            }
        }
        match stripped {
            Some(next) if next != current => current = next,
            _ => break,
        }
    }
    current
}
