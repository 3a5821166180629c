//! Academic-year-aware date, time, and day-of-week normalisation.
//!
//! Syllabi rarely spell out full dates — "Oct. 24" in a Fall 2025 course
//! means 2025-10-24, and "April 23rd" in Spring 2025 means 2025-04-23. This
//! module is the single normalisation routine shared by the rule-based
//! extractor and the validator, so both paths produce identical ISO 8601
//! strings for the same raw phrase.
//!
//! Time heuristic: syllabus times without an am/pm marker almost always
//! refer to the teaching day. Hours 1–7 are read as afternoon (a "4:00"
//! class meets at 16:00, not 04:00); 8–23 are taken literally.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::DayOfWeek;

static RE_MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)\b
        (jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|
         jul(?:y)?|aug(?:ust)?|sep(?:t|tember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)
        \.?\s+
        (\d{1,2})(?:st|nd|rd|th)?
        (?:,?\s+(\d{4}))?",
    )
    .unwrap()
});

static RE_NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").unwrap());

static RE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm|a\.m\.|p\.m\.)?\b").unwrap()
});

static RE_TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\s*(?:-|–|—|to)\s*(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b",
    )
    .unwrap()
});

static RE_TERM_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(fall|autumn|winter|spring|summer)\s+(\d{4})\b").unwrap()
});

static RE_ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?:T(\d{2}):(\d{2})(?::(\d{2}))?)?$").unwrap());

fn month_number(name: &str) -> Option<u32> {
    let m = match name.to_ascii_lowercase().chars().take(3).collect::<String>().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

/// Extract the calendar year from a term string like "Fall 2025".
///
/// Winter terms spanning a year boundary are read as the stated year; the
/// course catalogue's convention, not ours, decides which year that is.
pub fn year_from_term(term: &str) -> Option<i32> {
    RE_TERM_YEAR
        .captures(term)
        .and_then(|c| c[2].parse::<i32>().ok())
}

/// The year used when a date omits one: the configured hint, the parsed
/// term, or the current local year, in that order.
pub fn infer_year(year_hint: Option<i32>, term: Option<&str>) -> i32 {
    year_hint
        .or_else(|| term.and_then(year_from_term))
        .unwrap_or_else(|| chrono::Local::now().year())
}

/// Parse the first date-like phrase in `raw`.
///
/// Handles "October 24", "Oct. 24", "April 23rd", "Oct 24, 2025", "10/24",
/// and "10/24/25". A missing year is filled from `year`.
pub fn parse_date(raw: &str, year: i32) -> Option<NaiveDate> {
    if let Some(caps) = RE_MONTH_DAY.captures(raw) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let y = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or(year);
        return NaiveDate::from_ymd_opt(y, month, day);
    }
    if let Some(caps) = RE_NUMERIC_DATE.captures(raw) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let y = match caps.get(3) {
            Some(m) => {
                let v: i32 = m.as_str().parse().ok()?;
                if v < 100 {
                    2000 + v
                } else {
                    v
                }
            }
            None => year,
        };
        return NaiveDate::from_ymd_opt(y, month, day);
    }
    None
}

fn apply_meridiem(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    let h = match meridiem.map(|m| m.to_ascii_lowercase()) {
        Some(m) if m.starts_with('p') => {
            if hour == 12 {
                12
            } else {
                hour + 12
            }
        }
        Some(m) if m.starts_with('a') => {
            if hour == 12 {
                0
            } else {
                hour
            }
        }
        _ => {
            // No marker: read small hours as afternoon.
            if (1..=7).contains(&hour) {
                hour + 12
            } else {
                hour
            }
        }
    };
    (h < 24).then_some(h)
}

/// Parse the first clock time ("2:45pm", "14:45", "9am") in `raw`.
///
/// Bare small integers with no minutes and no am/pm marker are more likely
/// list numbering or day numbers than times, so a candidate must carry one
/// or the other ("June 11th 2:45pm" skips the "11" and reads "2:45pm").
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    for caps in RE_TIME.captures_iter(raw) {
        let meridiem = caps.get(3).map(|m| m.as_str());
        if caps.get(2).is_none() && meridiem.is_none() {
            continue;
        }
        let hour: u32 = match caps[1].parse() {
            Ok(h) => h,
            Err(_) => continue,
        };
        let minute: u32 = match caps.get(2).map_or(Ok(0), |m| m.as_str().parse()) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if let Some(h) = apply_meridiem(hour, meridiem) {
            if let Some(t) = NaiveTime::from_hms_opt(h, minute, 0) {
                return Some(t);
            }
        }
    }
    None
}

/// Parse a time range ("4:00-5:20pm", "10-10:50", "1:00pm to 2:15pm").
///
/// A meridiem on either endpoint informs the other: "4:00-5:20pm" is
/// 16:00–17:20. When the parsed start lands after the end, the start is
/// shifted into the afternoon ("11-12:15pm" → 11:00–12:15).
pub fn parse_time_range(raw: &str) -> Option<(NaiveTime, NaiveTime)> {
    let caps = RE_TIME_RANGE.captures(raw)?;
    let start_h: u32 = caps[1].parse().ok()?;
    let start_m: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let end_h: u32 = caps[4].parse().ok()?;
    let end_m: u32 = caps.get(5).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let start_mer = caps.get(3).map(|m| m.as_str());
    let end_mer = caps.get(6).map(|m| m.as_str());

    // Propagate a lone trailing/leading meridiem to the other endpoint.
    let (start_mer, end_mer) = match (start_mer, end_mer) {
        (None, Some(m)) => (Some(m), Some(m)),
        (Some(m), None) => (Some(m), Some(m)),
        other => other,
    };

    let mut sh = apply_meridiem(start_h, start_mer)?;
    let eh = apply_meridiem(end_h, end_mer)?;

    if (sh, start_m) > (eh, end_m) && sh >= 12 {
        // "11-12:15pm": the pm marker dragged 11 to 23; pull it back.
        sh -= 12;
    }

    let start = NaiveTime::from_hms_opt(sh, start_m, 0)?;
    let end = NaiveTime::from_hms_opt(eh, end_m, 0)?;
    (start <= end).then_some((start, end))
}

/// Format a time as 24-hour "HH:MM".
pub fn format_hhmm(t: NaiveTime) -> String {
    format!("{:02}:{:02}", t.hour(), t.minute())
}

/// Format a due date as the schema's ISO 8601 string.
///
/// Returns the string plus the matching `all_day` flag: date-only when no
/// time is known, seconds-precision local datetime otherwise.
pub fn format_due(date: NaiveDate, time: Option<NaiveTime>) -> (String, bool) {
    match time {
        Some(t) => (
            format!("{}T{:02}:{:02}:00", date.format("%Y-%m-%d"), t.hour(), t.minute()),
            false,
        ),
        None => (date.format("%Y-%m-%d").to_string(), true),
    }
}

/// Normalise an arbitrary date/time phrase into the schema's ISO form.
///
/// Already-valid ISO strings pass through unchanged (with a recomputed
/// `all_day`); anything else goes through [`parse_date`]/[`parse_time`].
/// Returns `None` when no date can be recognised — the caller nulls the
/// field rather than shipping a raw phrase.
pub fn normalize_datetime(raw: &str, year: i32) -> Option<(String, bool)> {
    let trimmed = raw.trim();
    if let Some(caps) = RE_ISO_DATE.captures(trimmed) {
        let all_day = caps.get(4).is_none();
        // Validate the components so "2025-13-40" doesn't slip through.
        let y: i32 = caps[1].parse().ok()?;
        let m: u32 = caps[2].parse().ok()?;
        let d: u32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(y, m, d)?;
        if let Some(h) = caps.get(4) {
            let h: u32 = h.as_str().parse().ok()?;
            let min: u32 = caps[5].parse().ok()?;
            NaiveTime::from_hms_opt(h, min, 0)?;
        }
        return Some((trimmed.to_string(), all_day));
    }
    let date = parse_date(trimmed, year)?;
    let time = parse_time(trimmed);
    Some(format_due(date, time))
}

/// Normalise a day name ("Monday", "Tues", "thu") to its two-letter code.
pub fn day_from_name(name: &str) -> Option<DayOfWeek> {
    let lower = name.trim().trim_end_matches('.').to_ascii_lowercase();
    let day = match lower.as_str() {
        "monday" | "mon" | "m" => DayOfWeek::Mo,
        "tuesday" | "tues" | "tue" | "tu" | "t" => DayOfWeek::Tu,
        "wednesday" | "wed" | "w" => DayOfWeek::We,
        "thursday" | "thurs" | "thur" | "thu" | "th" | "r" => DayOfWeek::Th,
        "friday" | "fri" | "f" => DayOfWeek::Fr,
        "saturday" | "sat" | "sa" => DayOfWeek::Sa,
        "sunday" | "sun" | "su" => DayOfWeek::Su,
        _ => return None,
    };
    Some(day)
}

/// Expand a compact multi-day abbreviation ("MWF", "TuTh", "TTh", "MTWRF")
/// into individual days, in the order written.
///
/// Two-letter tokens are matched before single letters so "Th" is Thursday,
/// not Tuesday + something. A bare "T" is Tuesday and "R" is Thursday, the
/// registrar convention.
pub fn expand_day_abbrev(abbrev: &str) -> Vec<DayOfWeek> {
    let chars: Vec<char> = abbrev.chars().collect();
    let mut days = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let matched_two = match two.to_ascii_lowercase().as_str() {
            "mo" => Some(DayOfWeek::Mo),
            "tu" => Some(DayOfWeek::Tu),
            "we" => Some(DayOfWeek::We),
            "th" => Some(DayOfWeek::Th),
            "fr" => Some(DayOfWeek::Fr),
            "sa" => Some(DayOfWeek::Sa),
            "su" => Some(DayOfWeek::Su),
            _ => None,
        };
        if let Some(day) = matched_two {
            days.push(day);
            i += 2;
            continue;
        }
        let one = match chars[i].to_ascii_uppercase() {
            'M' => Some(DayOfWeek::Mo),
            'T' => Some(DayOfWeek::Tu),
            'W' => Some(DayOfWeek::We),
            'R' => Some(DayOfWeek::Th),
            'F' => Some(DayOfWeek::Fr),
            _ => None,
        };
        match one {
            Some(day) => days.push(day),
            None => return Vec::new(), // not a day run at all
        }
        i += 1;
    }
    days
}
