//! Target resolver: the scoring algorithm.
//!
//! Given a natural-language fragment, a [`UIDescription`], and an
//! optional spatial qualifier, chooses one element (or none) by a
//! scored, tie-broken match. Never panics or propagates an error: on
//! internal trouble it returns *no match* (see [`ResolverError`], used
//! only for the structured error-event path).

use super::error::ResolverError;
use super::model::{ElementKind, SpatialZone, UIDescription, UIElement};
use super::spatial_filter::filter_by_zone;

/// A resolved target: the chosen element plus its center point and the
/// score trail that produced the choice.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub element: UIElement,
    pub x: f64,
    pub y: f64,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    pub min_threshold: f64,
    pub runner_up_margin: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_threshold: 25.0,
            runner_up_margin: 10.0,
        }
    }
}

fn normalize_text(s: &str) -> String {
    let lower = s.to_lowercase();
    let filtered: String = lower
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn sub_fragments(fragment: &str) -> Vec<String> {
    let mut out = vec![fragment.to_string()];
    for word in fragment.split_whitespace() {
        if word.chars().count() > 2 && !out.contains(&word.to_string()) {
            out.push(word.to_string());
        }
    }
    out
}

/// Tier contribution for one candidate word against a fragment sub-word,
/// scored against the text/description match table below.
#[derive(Debug, Clone, Copy)]
struct TierHit {
    score: f64,
    within_word: bool,
}

fn singular_plural_bonus(frag_word: &str, cand_word: &str) -> f64 {
    let pair_matches = |a: &str, b: &str| a.len() > 3 && b.len() > 3 && format!("{}s", a) == b;
    if pair_matches(frag_word, cand_word) || pair_matches(cand_word, frag_word) {
        5.0
    } else {
        0.0
    }
}

/// Best tier hit of `fragment` (whole string, already normalized) against
/// one normalized `candidate_text`, using the `from_llm` weight column.
fn best_tier_hit(fragment: &str, sub_fragments: &[String], candidate_text: &str, from_llm: bool) -> Option<TierHit> {
    if candidate_text.is_empty() {
        return None;
    }

    if fragment == candidate_text {
        return Some(TierHit { score: 100.0, within_word: false });
    }

    fn consider(best: &mut Option<TierHit>, hit: TierHit) {
        if best.map(|b| hit.score > b.score).unwrap_or(true) {
            *best = Some(hit);
        }
    }

    let mut best: Option<TierHit> = None;
    let cand_words: Vec<&str> = candidate_text.split_whitespace().collect();

    for frag in sub_fragments {
        // word-boundary match: the sub-fragment appears as a whole word
        // (or sequence of whole words) inside the candidate text.
        if word_boundary_match(frag, candidate_text) {
            consider(
                &mut best,
                TierHit {
                    score: if from_llm { 90.0 } else { 70.0 },
                    within_word: false,
                },
            );
        }

        if candidate_text.starts_with(frag.as_str()) {
            consider(
                &mut best,
                TierHit {
                    score: if from_llm { 75.0 } else { 60.0 },
                    within_word: false,
                },
            );
        }

        if candidate_text.ends_with(frag.as_str()) {
            consider(
                &mut best,
                TierHit {
                    score: if from_llm { 65.0 } else { 50.0 },
                    within_word: false,
                },
            );
        }

        if candidate_text.contains(frag.as_str()) {
            let frag_len = frag.chars().count();
            let cand_len = candidate_text.chars().count();
            let narrow = (frag_len as f64) < 0.4 * (cand_len as f64)
                || (frag_len < 5 && cand_len > 2 * frag_len);
            let score = if narrow {
                if from_llm { 20.0 } else { 15.0 }
            } else if from_llm {
                40.0
            } else {
                30.0
            };
            consider(&mut best, TierHit { score, within_word: narrow });
        }

        for cand_word in &cand_words {
            for frag_word in frag.split_whitespace() {
                let bonus = singular_plural_bonus(frag_word, cand_word);
                if bonus > 0.0 {
                    if let Some(ref mut b) = best {
                        b.score += bonus;
                    }
                }
            }
        }
    }

    best
}

fn word_boundary_match(frag: &str, candidate_text: &str) -> bool {
    let cand_words: Vec<&str> = candidate_text.split_whitespace().collect();
    let frag_words: Vec<&str> = frag.split_whitespace().collect();
    if frag_words.is_empty() || frag_words.len() > cand_words.len() {
        return false;
    }
    cand_words
        .windows(frag_words.len())
        .any(|window| window == frag_words.as_slice())
}

const KIND_SYNONYMS: &[(&str, &[&str])] = &[
    ("button", &["button", "btn"]),
    ("input_field", &["field", "input", "textbox", "box"]),
    ("menu_item", &["menu", "dropdown", "option"]),
    ("checkbox", &["checkbox", "check box"]),
    ("link", &["link"]),
    ("icon", &["icon"]),
    ("tab", &["tab"]),
];

fn kind_key(kind: &ElementKind) -> &str {
    match kind {
        ElementKind::Button => "button",
        ElementKind::InputField => "input_field",
        ElementKind::MenuItem => "menu_item",
        ElementKind::Checkbox => "checkbox",
        ElementKind::Link => "link",
        ElementKind::Icon => "icon",
        ElementKind::Tab => "tab",
        ElementKind::Text => "text",
        ElementKind::Unknown => "unknown",
        ElementKind::Other(s) => s.as_str(),
    }
}

fn mentions_kind_synonym(step_text: &str, kind: &ElementKind) -> bool {
    let key = kind_key(kind);
    KIND_SYNONYMS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, syns)| syns.iter().any(|s| word_boundary_match(s, step_text)))
        .unwrap_or(false)
}

fn score_candidate(
    fragment: &str,
    subs: &[String],
    step_text: &str,
    el: &UIElement,
    zone: Option<SpatialZone>,
    in_zone: bool,
    screen_size: (f64, f64),
    fragment_from_llm: bool,
) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    if let Some(text) = &el.text {
        let cand = normalize_text(text);
        if let Some(hit) = best_tier_hit(fragment, subs, &cand, fragment_from_llm) {
            score += hit.score;
            reasons.push(format!("text match +{:.0}{}", hit.score, if hit.within_word { " (within_word)" } else { "" }));
        }
    } else if let Some(desc) = &el.description {
        let cand = normalize_text(desc);
        if let Some(hit) = best_tier_hit(fragment, subs, &cand, fragment_from_llm) {
            let scaled = hit.score * (2.0 / 3.0);
            score += scaled;
            reasons.push(format!("description match +{:.1}", scaled));
        }
    }

    if mentions_kind_synonym(step_text, &el.kind) {
        score += 30.0;
        reasons.push("kind match +30".to_string());
    }

    if let Some(_z) = zone {
        if in_zone {
            score += 30.0;
            reasons.push("spatial match +30".to_string());
        } else {
            score *= 0.3;
            reasons.push("spatial mismatch *0.3".to_string());
        }
    }

    if el.kind == ElementKind::Button {
        score += 5.0;
        reasons.push("button bonus +5".to_string());
    }

    let _ = screen_size;
    let confidence_factor = 0.7 + 0.3 * el.confidence;
    score *= confidence_factor;
    reasons.push(format!("confidence scale x{:.3}", confidence_factor));

    (score, reasons)
}

/// Resolves `fragment` against `ui` to a single element, or *no match*.
/// Deterministic for fixed inputs.
pub fn resolve(
    fragment: &str,
    step_text: &str,
    ui: &UIDescription,
    zone: Option<SpatialZone>,
    config: ResolverConfig,
    fragment_from_llm: bool,
) -> Result<Option<ResolvedTarget>, ResolverError> {
    if fragment.trim().is_empty() {
        return Ok(None);
    }

    let normalized_fragment = normalize_text(fragment);
    let subs = sub_fragments(&normalized_fragment);
    let step_text_norm = normalize_text(step_text);

    let refs: Vec<&UIElement> = ui.elements.iter().collect();
    let in_zone_indices: Option<Vec<usize>> =
        zone.map(|z| filter_by_zone(&refs, ui.screen_size, z));

    let mut scored: Vec<(usize, f64, Vec<String>)> = Vec::new();
    for (idx, el) in ui.elements.iter().enumerate() {
        let in_zone = in_zone_indices
            .as_ref()
            .map(|set| set.contains(&idx))
            .unwrap_or(true);
        let (score, reasons) = score_candidate(
            &normalized_fragment,
            &subs,
            &step_text_norm,
            el,
            zone,
            in_zone,
            ui.screen_size,
            fragment_from_llm,
        );
        scored.push((idx, score, reasons));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let Some((best_idx, best_score, best_reasons)) = scored.first().cloned() else {
        return Ok(None);
    };

    if best_score <= config.min_threshold {
        return Ok(None);
    }

    let mut winner_idx = best_idx;
    let mut winner_score = best_score;
    let mut winner_reasons = best_reasons;

    if let Some((runner_idx, runner_score, runner_reasons)) = scored.get(1).cloned() {
        let gap = winner_score - runner_score;
        let winner_is_within_word = winner_reasons.iter().any(|r| r.contains("within_word"));
        let runner_is_exact_word = !runner_reasons.iter().any(|r| r.contains("within_word"))
            && runner_reasons.iter().any(|r| r.contains("text match"));
        if gap < config.runner_up_margin && winner_is_within_word && runner_is_exact_word {
            winner_idx = runner_idx;
            winner_score = runner_score;
            winner_reasons = runner_reasons;
        }
    }

    // Tie-break remaining ties among candidates within the margin:
    // higher confidence, then larger bbox, then reading order.
    let tied: Vec<usize> = scored
        .iter()
        .filter(|(_, s, _)| (s - winner_score).abs() < f64::EPSILON)
        .map(|(i, _, _)| *i)
        .collect();
    if tied.len() > 1 {
        winner_idx = *tied
            .iter()
            .max_by(|&&a, &&b| {
                let ea = &ui.elements[a];
                let eb = &ui.elements[b];
                ea.confidence
                    .partial_cmp(&eb.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        ea.bbox
                            .area()
                            .partial_cmp(&eb.bbox.area())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| {
                        // reading order: top-to-bottom, left-to-right ->
                        // earlier in reading order wins, so reverse here
                        // since max_by picks the largest.
                        let (ax, ay) = ea.center();
                        let (bx, by) = eb.center();
                        by.partial_cmp(&ay)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| bx.partial_cmp(&ax).unwrap_or(std::cmp::Ordering::Equal))
                    })
            })
            .expect("tied is non-empty");
    }

    let el = ui.elements[winner_idx].clone();
    let (x, y) = el.center();
    Ok(Some(ResolvedTarget {
        element: el,
        x,
        y,
        score: winner_score,
        reasons: winner_reasons,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::model::{BBox, ElementSource};
    use chrono::Utc;

    fn element(text: &str, kind: ElementKind, bbox: BBox, confidence: f64) -> UIElement {
        UIElement {
            bbox,
            text: Some(text.to_string()),
            description: None,
            kind,
            confidence,
            source: ElementSource::Ocr,
        }
    }

    fn ui_with(elements: Vec<UIElement>, screen: (f64, f64)) -> UIDescription {
        UIDescription {
            screen_size: screen,
            elements,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn exact_word_beats_within_word_runner_up() {
        let ui = ui_with(
            vec![
                element("Explanation", ElementKind::Text, BBox::new(0.0, 0.0, 100.0, 20.0), 0.9),
                element("Plan", ElementKind::Text, BBox::new(0.0, 30.0, 50.0, 50.0), 0.9),
            ],
            (1000.0, 1000.0),
        );
        let result = resolve("plan", "click on plan", &ui, None, ResolverConfig::default(), true)
            .unwrap()
            .unwrap();
        assert_eq!(result.element.text.as_deref(), Some("Plan"));
    }

    #[test]
    fn below_threshold_is_no_match() {
        let ui = ui_with(
            vec![element("Zzyzx", ElementKind::Text, BBox::new(0.0, 0.0, 10.0, 10.0), 0.5)],
            (1000.0, 1000.0),
        );
        let result = resolve("nonexistent button", "click on the nonexistent button", &ui, None, ResolverConfig::default(), true)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn spatial_qualifier_restricts_candidates() {
        let ui = ui_with(
            vec![
                element("Profile", ElementKind::Icon, BBox::new(900.0, 10.0, 990.0, 90.0), 0.9),
                element("Profile", ElementKind::Icon, BBox::new(10.0, 900.0, 90.0, 990.0), 0.9),
            ],
            (1000.0, 1000.0),
        );
        let result = resolve(
            "icono de perfil",
            "haz clic arriba a la derecha en el icono de perfil",
            &ui,
            Some(SpatialZone::TopRight),
            ResolverConfig::default(),
            true,
        )
        .unwrap()
        .unwrap();
        assert!(result.x > 500.0 && result.y < 500.0);
    }

    #[test]
    fn resolver_is_deterministic() {
        let ui = ui_with(
            vec![element("Compose", ElementKind::Button, BBox::new(0.0, 0.0, 100.0, 40.0), 0.95)],
            (1000.0, 1000.0),
        );
        let r1 = resolve("compose", "click on compose", &ui, None, ResolverConfig::default(), true).unwrap();
        let r2 = resolve("compose", "click on compose", &ui, None, ResolverConfig::default(), true).unwrap();
        assert_eq!(r1.unwrap().score, r2.unwrap().score);
    }

    #[test]
    fn empty_ui_description_yields_no_match() {
        let ui = ui_with(vec![], (1000.0, 1000.0));
        let result = resolve("anything", "click on anything", &ui, None, ResolverConfig::default(), true).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn kind_synonym_bonus_does_not_match_substring_inside_unrelated_word() {
        // "inbox" contains "box" (an input_field synonym) as a substring;
        // it must not earn the kind-match bonus for an unrelated field.
        assert!(!mentions_kind_synonym("click on inbox", &ElementKind::InputField));
        assert!(mentions_kind_synonym("click on the input box", &ElementKind::InputField));
    }
}
