//! Quote-aware text scanning shared by the step parser and the spatial
//! filter. A "quoted span" is the content between a matching pair of `"`
//! or `'` delimiters; the two delimiter kinds nest independently, so an
//! apostrophe inside a double-quoted span never closes it (and vice
//! versa) — this is what lets `don't` survive untouched inside `"…"`.

/// Per-byte mask: `true` when that byte (including the delimiter itself)
/// lies inside a quoted span.
pub fn quote_mask(s: &str) -> Vec<bool> {
    let mut mask = vec![false; s.len()];
    let mut in_double = false;
    let mut in_single = false;
    for (i, ch) in s.char_indices() {
        let len = ch.len_utf8();
        let is_delim = (ch == '"' && !in_single) || (ch == '\'' && !in_double);
        let inside_before = in_double || in_single;
        if ch == '"' && !in_single {
            in_double = !in_double;
        } else if ch == '\'' && !in_double {
            in_single = !in_single;
        }
        let marked = is_delim || inside_before;
        for b in mask.iter_mut().take(i + len).skip(i) {
            *b = marked;
        }
    }
    mask
}

/// Whole words (Unicode-alphanumeric runs) lying entirely outside quoted
/// spans, as `(start_byte, end_byte, lowercase_text)`.
pub fn words_outside_quotes(s: &str, mask: &[bool]) -> Vec<(usize, usize, String)> {
    let mut out = Vec::new();
    let mut indices = s.char_indices().peekable();
    while let Some(&(i, ch)) = indices.peek() {
        if mask[i] || !ch.is_alphanumeric() {
            indices.next();
            continue;
        }
        let start = i;
        let mut end = i;
        while let Some(&(j, c)) = indices.peek() {
            if mask[j] || !c.is_alphanumeric() {
                break;
            }
            end = j + c.len_utf8();
            indices.next();
        }
        out.push((start, end, s[start..end].to_lowercase()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_double_quoted_span() {
        let s = r#"click on "Save File" now"#;
        let mask = quote_mask(s);
        let start = s.find('"').unwrap();
        let end = s.rfind('"').unwrap();
        assert!(mask[start] && mask[end]);
        assert!(!mask[0]);
    }

    #[test]
    fn apostrophe_inside_double_quotes_does_not_close() {
        let s = r#"type "don't stop""#;
        let mask = quote_mask(s);
        let apostrophe = s.find('\'').unwrap();
        assert!(mask[apostrophe]);
    }

    #[test]
    fn words_outside_quotes_skips_quoted_content() {
        let s = r#"click "Compose" then type"#;
        let mask = quote_mask(s);
        let words = words_outside_quotes(s, &mask);
        let texts: Vec<_> = words.iter().map(|(_, _, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["click", "then", "type"]);
    }
}
