//! Temporal query classification.
//!
//! Lexical pass over a chat message that recognizes relative-day
//! references, recency windows and explicit month/year mentions, and
//! resolves each deterministically to a date range against the current
//! date. Unrecognized phrasing classifies as `Unknown` and the caller
//! falls back to a trailing seven-day window.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Recency window used when a query reads temporal but resolves to nothing.
pub const FALLBACK_RECENCY_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemporalContext {
    /// "last Monday": a specific weekday, N weeks back.
    RelativeDay { day_of_week: String, weeks_back: u32 },
    /// "yesterday", "last week": trailing window of whole days.
    Recent { days_ago: i64 },
    /// "in July", "in 2025": explicit calendar range.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        label: String,
    },
    Unknown,
}

static LAST_N_WEEKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:last|past)\s+(\d+)\s+weeks?\b").unwrap());
static LAST_WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\blast\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .unwrap()
});
static YESTERDAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\byesterday\b").unwrap());
static LAST_WEEK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:last|past)\s+week\b").unwrap());
static LAST_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:last|past)\s+month\b").unwrap());
// A bare month name is too loose ("it may rain"); require a leading
// preposition or a trailing year before reading it as a calendar range.
static MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:(in|about|during|from)\s+)?(january|february|march|april|may|june|july|august|september|october|november|december)\b(?:\s+(\d{4}))?")
        .unwrap()
});
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").unwrap());

/// Classify a message. Pure function of the message and `now`.
pub fn parse_temporal_query(query: &str, now: DateTime<Utc>) -> TemporalContext {
    if let Some(caps) = LAST_N_WEEKS.captures(query) {
        if let Ok(n) = caps[1].parse::<i64>() {
            return TemporalContext::Recent { days_ago: n * 7 };
        }
    }
    if let Some(caps) = LAST_WEEKDAY.captures(query) {
        return TemporalContext::RelativeDay {
            day_of_week: caps[1].to_lowercase(),
            weeks_back: 1,
        };
    }
    if YESTERDAY.is_match(query) {
        return TemporalContext::Recent { days_ago: 1 };
    }
    if LAST_WEEK.is_match(query) {
        return TemporalContext::Recent { days_ago: 7 };
    }
    if LAST_MONTH.is_match(query) {
        // Calendar-approximate: trailing 30 days, not month boundaries.
        return TemporalContext::Recent { days_ago: 30 };
    }
    for caps in MONTH_NAME.captures_iter(query) {
        if caps.get(1).is_none() && caps.get(3).is_none() {
            continue;
        }
        let month = month_number(&caps[2]);
        let year = caps
            .get(3)
            .and_then(|y| y.as_str().parse::<i32>().ok())
            .unwrap_or_else(|| now.year());
        if let Some(range) = month_range(year, month) {
            return range;
        }
    }
    if let Some(caps) = YEAR.captures(query) {
        if let Ok(year) = caps[1].parse::<i32>() {
            if let Some(range) = year_range(year) {
                return range;
            }
        }
    }
    TemporalContext::Unknown
}

impl TemporalContext {
    pub fn is_temporal(&self) -> bool {
        !matches!(self, TemporalContext::Unknown)
    }

    /// Resolve to a concrete `[start, end]` window against `now`.
    /// `Unknown` resolves to nothing; callers apply the recency fallback.
    pub fn resolve_range(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            TemporalContext::RelativeDay {
                day_of_week,
                weeks_back,
            } => {
                let target = weekday_from_name(day_of_week)?;
                let today = now.date_naive();
                let mut days_back =
                    (today.weekday().num_days_from_monday() as i64
                        - target.num_days_from_monday() as i64
                        + 7)
                        % 7;
                if days_back == 0 {
                    days_back = 7; // "last Monday" on a Monday means the previous one
                }
                days_back += (*weeks_back as i64 - 1) * 7;
                let day = today - Duration::days(days_back);
                let start = day.and_hms_opt(0, 0, 0)?.and_utc();
                Some((start, start + Duration::days(1)))
            }
            TemporalContext::Recent { days_ago } => {
                let start = (now.date_naive() - Duration::days(*days_ago))
                    .and_hms_opt(0, 0, 0)?
                    .and_utc();
                Some((start, now))
            }
            TemporalContext::Range { start, end, .. } => Some((*start, *end)),
            TemporalContext::Unknown => None,
        }
    }

    /// Trailing window applied when classification found nothing usable.
    pub fn fallback_range(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - Duration::days(FALLBACK_RECENCY_DAYS), now)
    }
}

fn month_number(name: &str) -> u32 {
    match name.to_lowercase().as_str() {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        _ => 12,
    }
}

fn month_range(year: i32, month: u32) -> Option<TemporalContext> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let end = next.pred_opt()?.and_hms_opt(23, 59, 59)?.and_utc();
    Some(TemporalContext::Range {
        start: start.and_hms_opt(0, 0, 0)?.and_utc(),
        end,
        label: format!("{}-{:02}", year, month),
    })
}

fn year_range(year: i32) -> Option<TemporalContext> {
    Some(TemporalContext::Range {
        start: Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?,
        end: Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59).single()?,
        label: year.to_string(),
    })
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        // A Thursday
        Utc.with_ymd_and_hms(2026, 8, 27, 15, 0, 0).unwrap()
    }

    #[test]
    fn last_weekday_classifies_as_relative_day() {
        let ctx = parse_temporal_query("what did we do last Monday", now());
        assert_eq!(
            ctx,
            TemporalContext::RelativeDay {
                day_of_week: "monday".to_string(),
                weeks_back: 1
            }
        );
        let (start, end) = ctx.resolve_range(now()).unwrap();
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn yesterday_is_recent_one_day() {
        let ctx = parse_temporal_query("what happened yesterday?", now());
        assert_eq!(ctx, TemporalContext::Recent { days_ago: 1 });
    }

    #[test]
    fn last_week_and_month_are_trailing_windows() {
        assert_eq!(
            parse_temporal_query("how was last week", now()),
            TemporalContext::Recent { days_ago: 7 }
        );
        assert_eq!(
            parse_temporal_query("what did I do in the past month", now()),
            TemporalContext::Recent { days_ago: 30 }
        );
        assert_eq!(
            parse_temporal_query("over the last 3 weeks", now()),
            TemporalContext::Recent { days_ago: 21 }
        );
    }

    #[test]
    fn bare_month_name_defaults_to_current_year() {
        let ctx = parse_temporal_query("tell me about July", now());
        match ctx {
            TemporalContext::Range { start, end, .. } => {
                assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
                assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2026, 7, 31).unwrap());
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn explicit_year_spans_the_whole_year() {
        let ctx = parse_temporal_query("what did we talk about in 2025", now());
        match ctx {
            TemporalContext::Range { start, end, label } => {
                assert_eq!(start.to_rfc3339(), "2025-01-01T00:00:00+00:00");
                assert_eq!(end.to_rfc3339(), "2025-12-31T23:59:59+00:00");
                assert_eq!(label, "2025");
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn month_with_year_uses_that_year() {
        let ctx = parse_temporal_query("remember December 2024?", now());
        match ctx {
            TemporalContext::Range { start, .. } => {
                assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn modal_may_is_not_a_calendar_query() {
        assert_eq!(
            parse_temporal_query("it may rain tomorrow", now()),
            TemporalContext::Unknown
        );
        assert_eq!(
            parse_temporal_query("you may be right about that", now()),
            TemporalContext::Unknown
        );
        // With a year the month reading stands.
        match parse_temporal_query("May 2025 was a busy time", now()) {
            TemporalContext::Range { start, .. } => {
                assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
            }
            other => panic!("expected range, got {:?}", other),
        }
        // A modal earlier in the sentence must not shadow a real mention.
        match parse_temporal_query("it may help to revisit what we did in July", now()) {
            TemporalContext::Range { start, .. } => {
                assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn unrecognized_phrases_are_unknown() {
        let ctx = parse_temporal_query("hello there", now());
        assert_eq!(ctx, TemporalContext::Unknown);
        assert!(ctx.resolve_range(now()).is_none());

        let (start, end) = TemporalContext::fallback_range(now());
        assert_eq!(end - start, Duration::days(FALLBACK_RECENCY_DAYS));
    }

    #[test]
    fn last_weekday_on_same_weekday_goes_a_full_week_back() {
        // now() is a Thursday
        let ctx = parse_temporal_query("last thursday", now());
        let (start, _) = ctx.resolve_range(now()).unwrap();
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2026, 8, 20).unwrap());
    }
}
