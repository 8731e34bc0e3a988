//! Splits a raw query into a content query plus temporal intent, using
//! stop-phrase tables and direction-cue ordering.

use crate::types::Direction;

/// Stop-phrases whose presence marks the query as temporal, paired with
/// the [`Direction`] they imply. Checked in order; the first match wins.
const DIRECTION_CUES: &[(&str, Direction)] = &[
    ("how long ago", Direction::When),
    ("when did", Direction::When),
    ("when was", Direction::When),
    ("когда", Direction::When),
    ("before", Direction::Before),
    ("до того как", Direction::Before),
    ("раньше", Direction::Before),
    ("after", Direction::After),
    ("после", Direction::After),
    ("what order", Direction::Order),
    ("in what order", Direction::Order),
    ("порядке", Direction::Order),
];

/// Phrases stripped from the content query once a temporal cue is found,
/// so the embedding/BM25 stages see the subject matter, not the temporal
/// scaffolding around it.
const STRIP_PHRASES: &[&str] = &[
    "how long ago",
    "when did",
    "when was",
    "what order",
    "in what order",
    "когда",
    "до того как",
    "раньше",
    "после",
    "порядке",
    "before",
    "after",
];

const MIN_CONTENT_LEN: usize = 5;

/// `(content_query, is_temporal, direction)`.
#[must_use]
pub fn decompose(query: &str) -> (String, bool, Direction) {
    let lower = query.to_lowercase();

    let direction = DIRECTION_CUES
        .iter()
        .find(|(cue, _)| lower.contains(cue))
        .map(|(_, dir)| *dir);

    let Some(direction) = direction else {
        return (query.to_string(), false, Direction::None);
    };

    let mut stripped = lower.clone();
    for phrase in STRIP_PHRASES {
        stripped = stripped.replace(phrase, " ");
    }
    let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let content_query = if stripped.chars().count() < MIN_CONTENT_LEN {
        query.to_string()
    } else {
        stripped
    };

    (content_query, true, direction)
}

/// Normalizes `note_ts` against the min/max of `all_ts` and returns a
/// monotone-in-`direction` score in `[0, 1]`: earlier-is-better
/// for `before`, later-is-better for `after`, flat `0.5` for `when`/`order`/
/// `none`.
#[must_use]
pub fn order_score(note_ts: i64, direction: Direction, all_ts: &[i64]) -> f32 {
    if all_ts.len() < 2 {
        return 0.5;
    }
    let min = *all_ts.iter().min().unwrap();
    let max = *all_ts.iter().max().unwrap();
    if max == min {
        return 0.5;
    }
    let normalized = (note_ts - min) as f32 / (max - min) as f32;
    match direction {
        Direction::Before => 1.0 - normalized,
        Direction::After => normalized,
        Direction::When | Direction::Order | Direction::None => 0.5,
    }
}
