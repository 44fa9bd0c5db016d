//! Spatial filter.
//!
//! Extracts ordinal/cardinal qualifiers, maps the screen to a 3x3 grid,
//! and filters candidates to the implied zones.

use super::model::{BBox, SpatialZone, UIElement};
use super::quoting::{quote_mask, words_outside_quotes};

/// (row, col) grid cell, 0-indexed, row 0 = top, col 0 = left.
type Cell = (u8, u8);

fn implied_cells(zone: SpatialZone) -> Vec<Cell> {
    match zone {
        SpatialZone::Top => vec![(0, 0), (0, 1), (0, 2)],
        SpatialZone::Bottom => vec![(2, 0), (2, 1), (2, 2)],
        SpatialZone::Left => vec![(0, 0), (1, 0), (2, 0)],
        SpatialZone::Right => vec![(0, 2), (1, 2), (2, 2)],
        SpatialZone::Center => vec![(1, 1)],
        SpatialZone::TopLeft => vec![(0, 0)],
        SpatialZone::TopRight => vec![(0, 2)],
        SpatialZone::BottomLeft => vec![(2, 0)],
        SpatialZone::BottomRight => vec![(2, 2)],
    }
}

fn cell_rect(screen_size: (f64, f64), cell: Cell) -> BBox {
    let (w, h) = screen_size;
    let cw = w / 3.0;
    let ch = h / 3.0;
    let (row, col) = cell;
    BBox::new(
        col as f64 * cw,
        row as f64 * ch,
        (col as f64 + 1.0) * cw,
        (row as f64 + 1.0) * ch,
    )
}

fn point_in_cell(point: (f64, f64), screen_size: (f64, f64), cell: Cell) -> bool {
    let rect = cell_rect(screen_size, cell);
    point.0 >= rect.x1 && point.0 < rect.x2 && point.1 >= rect.y1 && point.1 < rect.y2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vertical {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Horizontal {
    Left,
    Right,
}

/// Recognizes the closed Spanish+English keyword set and composes it into
/// a canonical zone. Order-independent; duplicates collapse. Two
/// mutually-exclusive words on the same axis (`top` + `bottom`, or
/// `left` + `right`) yield *no* qualifier.
pub fn extract_spatial_qualifier(text: &str) -> Option<SpatialZone> {
    let mask = quote_mask(text);
    let words = words_outside_quotes(text, &mask);

    let mut saw_top = false;
    let mut saw_bottom = false;
    let mut saw_left = false;
    let mut saw_right = false;
    let mut saw_center = false;

    for (_, _, word) in &words {
        match word.as_str() {
            "top" | "arriba" | "superior" => saw_top = true,
            "bottom" | "abajo" | "inferior" => saw_bottom = true,
            "left" | "izquierda" => saw_left = true,
            "right" | "derecha" => saw_right = true,
            "center" | "centro" | "middle" => saw_center = true,
            _ => {}
        }
    }

    let vertical = match (saw_top, saw_bottom) {
        (true, false) => Some(Vertical::Top),
        (false, true) => Some(Vertical::Bottom),
        (true, true) => return None, // mutually exclusive axis -> no qualifier
        (false, false) => None,
    };
    let horizontal = match (saw_left, saw_right) {
        (true, false) => Some(Horizontal::Left),
        (false, true) => Some(Horizontal::Right),
        (true, true) => return None,
        (false, false) => None,
    };

    match (vertical, horizontal) {
        (Some(Vertical::Top), Some(Horizontal::Left)) => Some(SpatialZone::TopLeft),
        (Some(Vertical::Top), Some(Horizontal::Right)) => Some(SpatialZone::TopRight),
        (Some(Vertical::Bottom), Some(Horizontal::Left)) => Some(SpatialZone::BottomLeft),
        (Some(Vertical::Bottom), Some(Horizontal::Right)) => Some(SpatialZone::BottomRight),
        (Some(Vertical::Top), None) => Some(SpatialZone::Top),
        (Some(Vertical::Bottom), None) => Some(SpatialZone::Bottom),
        (None, Some(Horizontal::Left)) => Some(SpatialZone::Left),
        (None, Some(Horizontal::Right)) => Some(SpatialZone::Right),
        (None, None) if saw_center => Some(SpatialZone::Center),
        (None, None) => None,
    }
}

/// Indices of candidates whose bbox center lies in an implied cell.
/// Candidates without a valid bbox are always retained (degrade
/// gracefully). If filtering yields the empty set, all candidates are
/// kept instead.
pub fn filter_by_zone<'a>(
    candidates: &[&'a UIElement],
    screen_size: (f64, f64),
    zone: SpatialZone,
) -> Vec<usize> {
    let cells = implied_cells(zone);
    let matched: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, el)| {
            if !el.bbox.is_valid(screen_size) {
                return true;
            }
            let center = el.bbox.center();
            cells.iter().any(|&cell| point_in_cell(center, screen_size, cell))
        })
        .map(|(i, _)| i)
        .collect();

    if matched.is_empty() {
        (0..candidates.len()).collect()
    } else {
        matched
    }
}

/// Removes recognized spatial keyword tokens from `cmd`, preserving
/// quoted spans always, and preserving a qualifier word that immediately
/// follows `en`/`on` when no other qualifier word precedes that `en`/`on`
/// — i.e. when the qualifier word is itself the target name. This is a
/// known quirk inherited from the source behavior; kept as written.
pub fn strip_spatial(cmd: &str) -> String {
    const KEYWORDS: &[&str] = &[
        "arriba", "abajo", "izquierda", "derecha", "centro", "superior", "inferior", "top",
        "bottom", "left", "right", "center", "middle",
    ];

    let mask = quote_mask(cmd);
    let words = words_outside_quotes(cmd, &mask);

    let mut first_qualifier_start: Option<usize> = None;
    let mut remove: Vec<bool> = vec![false; words.len()];

    for (idx, (start, _end, word)) in words.iter().enumerate() {
        if !KEYWORDS.contains(&word.as_str()) {
            continue;
        }
        let preceded_by_en_on = idx > 0 && matches!(words[idx - 1].2.as_str(), "en" | "on");
        let is_first_qualifier = first_qualifier_start.is_none();
        if preceded_by_en_on && is_first_qualifier {
            // known quirk: the qualifier word following en/on is
            // preserved when it is the only qualifier seen so far,
            // because it doubles as the target name.
            first_qualifier_start = Some(*start);
            continue;
        }
        if first_qualifier_start.is_none() {
            first_qualifier_start = Some(*start);
        }
        remove[idx] = true;
    }

    let mut out = String::with_capacity(cmd.len());
    let mut last_end = 0usize;
    for (idx, (start, end, _)) in words.iter().enumerate() {
        if !remove[idx] {
            continue;
        }
        out.push_str(&cmd[last_end..*start]);
        last_end = *end;
    }
    out.push_str(&cmd[last_end..]);

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_composite_top_right() {
        let zone = extract_spatial_qualifier("arriba a la derecha en el icono de perfil");
        assert_eq!(zone, Some(SpatialZone::TopRight));
    }

    #[test]
    fn conflicting_axis_yields_no_qualifier() {
        assert_eq!(extract_spatial_qualifier("top and bottom corner"), None);
        assert_eq!(extract_spatial_qualifier("left and right side"), None);
    }

    #[test]
    fn center_alone_is_middle_cell() {
        assert_eq!(extract_spatial_qualifier("click in the center"), Some(SpatialZone::Center));
    }

    #[test]
    fn no_keywords_yields_no_qualifier() {
        assert_eq!(extract_spatial_qualifier("click the submit button"), None);
    }

    #[test]
    fn strip_spatial_is_idempotent() {
        let cmd = "click the top left icon";
        let once = strip_spatial(cmd);
        let twice = strip_spatial(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strip_spatial_preserves_quoted_spans() {
        let cmd = r#"click "Top Bar" menu"#;
        let stripped = strip_spatial(cmd);
        assert!(stripped.contains("Top Bar"));
    }

    #[test]
    fn empty_zone_filter_degrades_to_all_candidates() {
        let el = UIElement {
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            text: Some("x".into()),
            description: None,
            kind: super::super::model::ElementKind::Button,
            confidence: 1.0,
            source: super::super::model::ElementSource::Ocr,
        };
        let candidates = vec![&el];
        let result = filter_by_zone(&candidates, (1000.0, 1000.0), SpatialZone::BottomRight);
        assert_eq!(result, vec![0]);
    }
}
