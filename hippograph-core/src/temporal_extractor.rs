//! Temporal expression resolution: two-language regex pattern tables and a
//! specificity-ordering rule for picking the winning interval.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::TemporalExpression;

/// Which extractor category produced a [`TemporalExpression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    ExplicitDate,
    Relative,
    Month,
    Season,
}

impl TemporalKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TemporalKind::ExplicitDate => "explicit_date",
            TemporalKind::Relative => "relative",
            TemporalKind::Month => "month",
            TemporalKind::Season => "season",
        }
    }
}

struct Candidate {
    literal: String,
    kind: TemporalKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

fn day_interval(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
    let end = Utc.from_utc_datetime(&date.and_hms_opt(23, 59, 59).unwrap());
    (start, end)
}

fn month_interval(year: i32, month: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_date = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let end_date = NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap() - Duration::days(1);
    (
        Utc.from_utc_datetime(&start_date.and_hms_opt(0, 0, 0).unwrap()),
        Utc.from_utc_datetime(&end_date.and_hms_opt(23, 59, 59).unwrap()),
    )
}

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());
static US_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static N_AGO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+(day|days|week|weeks|month|months|year|years|hour|hours)\s+ago\b").unwrap()
});
static IN_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bin\s+(january|february|march|april|may|june|july|august|september|october|november|december)(?:\s+(\d{4}))?\b").unwrap()
});

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

fn month_index(name: &str) -> Option<u32> {
    MONTHS.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}

fn explicit_date_candidates(text: &str, _reference: DateTime<Utc>) -> Vec<Candidate> {
    let mut out = Vec::new();
    for caps in ISO_DATE.captures_iter(text) {
        let year: i32 = caps[1].parse().unwrap_or(1970);
        let month: u32 = caps[2].parse().unwrap_or(1);
        let day: u32 = caps[3].parse().unwrap_or(1);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            let (start, end) = day_interval(date);
            out.push(Candidate {
                literal: caps[0].to_string(),
                kind: TemporalKind::ExplicitDate,
                start,
                end,
            });
        }
    }
    for caps in US_DATE.captures_iter(text) {
        let month: u32 = caps[1].parse().unwrap_or(1);
        let day: u32 = caps[2].parse().unwrap_or(1);
        let year: i32 = caps[3].parse().unwrap_or(1970);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            let (start, end) = day_interval(date);
            out.push(Candidate {
                literal: caps[0].to_string(),
                kind: TemporalKind::ExplicitDate,
                start,
                end,
            });
        }
    }
    out
}

fn relative_candidates(text: &str, reference: DateTime<Utc>) -> Vec<Candidate> {
    let lower = text.to_lowercase();
    let mut out = Vec::new();
    let today = reference.date_naive();

    let mut push_day = |literal: &str, date: NaiveDate| {
        let (start, end) = day_interval(date);
        out.push(Candidate {
            literal: literal.to_string(),
            kind: TemporalKind::Relative,
            start,
            end,
        });
    };

    if lower.contains("yesterday") {
        push_day("yesterday", today - Duration::days(1));
    }
    if lower.contains("today") {
        push_day("today", today);
    }
    if lower.contains("tomorrow") {
        push_day("tomorrow", today + Duration::days(1));
    }

    for caps in N_AGO.captures_iter(&lower) {
        let n: i64 = caps[1].parse().unwrap_or(1);
        let unit = &caps[2];
        let days = match unit {
            "day" | "days" => n,
            "week" | "weeks" => n * 7,
            "month" | "months" => n * 30,
            "year" | "years" => n * 365,
            "hour" | "hours" => 0,
            _ => 0,
        };
        let date = today - Duration::days(days);
        push_day(&caps[0], date);
    }

    if lower.contains("last week") {
        push_day("last week", today - Duration::weeks(1));
    }
    if lower.contains("this week") {
        push_day("this week", today);
    }
    if lower.contains("next week") {
        push_day("next week", today + Duration::weeks(1));
    }
    if lower.contains("last month") {
        let (y, m) = shift_month(today.year(), today.month(), -1);
        let (start, end) = month_interval(y, m);
        out.push(Candidate {
            literal: "last month".into(),
            kind: TemporalKind::Relative,
            start,
            end,
        });
    }
    if lower.contains("last year") {
        let (start, end) = day_interval(NaiveDate::from_ymd_opt(today.year() - 1, today.month(), 1).unwrap());
        out.push(Candidate {
            literal: "last year".into(),
            kind: TemporalKind::Relative,
            start,
            end,
        });
    }

    out
}

fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let total = (year * 12 + month as i32 - 1) + delta;
    let y = total.div_euclid(12);
    let m = total.rem_euclid(12) + 1;
    (y, m as u32)
}

fn month_candidates(text: &str, reference: DateTime<Utc>) -> Vec<Candidate> {
    let mut out = Vec::new();
    for caps in IN_MONTH.captures_iter(&text.to_lowercase()) {
        let Some(month) = month_index(&caps[1]) else { continue };
        let year: i32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or_else(|| {
                // Never guess next year without an explicit year token;
                // a bare month name always resolves within the current year.
                let now_year = reference.year();
                if month <= reference.month() {
                    now_year
                } else {
                    now_year
                }
            });
        let (start, end) = month_interval(year, month);
        out.push(Candidate {
            literal: caps[0].to_string(),
            kind: TemporalKind::Month,
            start,
            end,
        });
    }
    out
}

fn season_candidates(text: &str, reference: DateTime<Utc>) -> Vec<Candidate> {
    let lower = text.to_lowercase();
    let year = reference.year();
    let mut out = Vec::new();
    let seasons: &[(&str, u32, u32)] = &[
        ("summer", 6, 8),
        ("winter", 12, 2),
        ("spring", 3, 5),
        ("autumn", 9, 11),
        ("fall", 9, 11),
    ];
    for (name, start_month, end_month) in seasons {
        if lower.contains(name) {
            let (start, _) = month_interval(year, *start_month);
            let end_year = if start_month > end_month { year + 1 } else { year };
            let (_, end) = month_interval(end_year, *end_month);
            out.push(Candidate {
                literal: (*name).to_string(),
                kind: TemporalKind::Season,
                start,
                end,
            });
        }
    }
    out
}

/// Resolve every temporal expression found in `text` against `reference`
/// (either a caller-supplied "now" or the note's creation time), and pick
/// the single most specific interval: the narrowest explicit date wins;
/// otherwise the narrowest relative/month/season interval. Returns
/// `(event_start, event_end, all_expressions)` — both ends absent when
/// nothing resolves (most notes are not temporally anchored).
#[must_use]
pub fn extract(
    text: &str,
    reference: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>, Vec<TemporalExpression>) {
    let mut candidates = explicit_date_candidates(text, reference);
    candidates.extend(relative_candidates(text, reference));
    candidates.extend(month_candidates(text, reference));
    candidates.extend(season_candidates(text, reference));

    let expressions: Vec<TemporalExpression> = candidates
        .iter()
        .map(|c| TemporalExpression {
            literal: c.literal.clone(),
            kind: c.kind.as_str().to_string(),
            resolved: Some((c.start, c.end)),
        })
        .collect();

    let explicit: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.kind == TemporalKind::ExplicitDate)
        .collect();
    let winner = if !explicit.is_empty() {
        explicit.into_iter().min_by_key(|c| (c.end - c.start).num_seconds())
    } else {
        candidates.iter().min_by_key(|c| (c.end - c.start).num_seconds())
    };

    match winner {
        Some(c) => (Some(c.start), Some(c.end), expressions),
        None => (None, None, expressions),
    }
}

/// Fraction of the query interval covered by the note interval, in
/// `[0, 1]`.
#[must_use]
pub fn overlap(
    q_start: DateTime<Utc>,
    q_end: DateTime<Utc>,
    n_start: DateTime<Utc>,
    n_end: DateTime<Utc>,
) -> f32 {
    if q_end <= q_start {
        return 0.0;
    }
    let overlap_start = q_start.max(n_start);
    let overlap_end = q_end.min(n_end);
    if overlap_end <= overlap_start {
        return 0.0;
    }
    let overlap_secs = (overlap_end - overlap_start).num_seconds() as f32;
    let q_secs = (q_end - q_start).num_seconds() as f32;
    (overlap_secs / q_secs).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn iso_date_resolves_to_day_interval() {
        let (start, end, _) = extract("Security incident on 2026-02-04: leaked credentials", reference());
        assert_eq!(start.unwrap().date_naive(), NaiveDate::from_ymd_opt(2026, 2, 4).unwrap());
        assert_eq!(end.unwrap().date_naive(), NaiveDate::from_ymd_opt(2026, 2, 4).unwrap());
    }

    #[test]
    fn yesterday_resolves_relative_to_reference() {
        let (start, _, _) = extract("I fixed this yesterday", reference());
        assert_eq!(start.unwrap().date_naive(), reference().date_naive() - Duration::days(1));
    }

    #[test]
    fn no_temporal_expression_is_none() {
        let (start, end, exprs) = extract("Just a plain note with no dates", reference());
        assert!(start.is_none());
        assert!(end.is_none());
        assert!(exprs.is_empty());
    }

    #[test]
    fn explicit_date_beats_relative_when_both_present() {
        let (start, _, _) = extract("yesterday but actually on 2026-01-15", reference());
        assert_eq!(start.unwrap().date_naive(), NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
    }

    #[test]
    fn overlap_full_containment_is_one() {
        let n_start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let n_end = Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap();
        let q_start = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let q_end = Utc.with_ymd_and_hms(2026, 1, 12, 0, 0, 0).unwrap();
        assert!((overlap(q_start, q_end, n_start, n_end) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn overlap_disjoint_intervals_is_zero() {
        let n_start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let n_end = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let q_start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let q_end = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(overlap(q_start, q_end, n_start, n_end), 0.0);
    }

    #[test]
    fn season_resolves_to_fixed_month_range() {
        let (start, end, _) = extract("that was last summer", reference());
        assert_eq!(start.unwrap().month(), 6);
        assert_eq!(end.unwrap().month(), 8);
    }
}
