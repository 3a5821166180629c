//! Rule-based extraction: pattern-match the intermediate representation
//! directly into the output schema.
//!
//! This is the default path and the fallback/merge source for hybrid mode.
//! It never calls any external service and never fails on malformed input;
//! at worst it returns a document with many null/empty fields.
//!
//! The matching is deliberately narrow and high-precision rather than
//! high-recall. A missed assessment is still visible to the user for manual
//! entry; a spurious or mistitled one requires active correction and costs
//! trust. Every guard in this file exists to keep a specific class of false
//! positive out (late-penalty percentages, grade-scale lines, prerequisite
//! strings posing as titles).
//!
//! Confidence here is fixed per match shape, not learned: an explicit
//! weight plus an explicit date is the strongest rule signal (0.9), a bare
//! weight line 0.7, a schedule-embedded mention 0.55.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::ParseConfig;
use crate::dates;
use crate::pipeline::structurer::{IntermediateDocument, TableGrid};
use crate::schema::{
    Assessment, AssessmentCategory, AssessmentType, Course, Instructor, LatePassPolicy,
    MeetingTime, MeetingType, SourceType, SyllabusDocument,
};

/// Confidence for a weight line that also carries an explicit due date.
const CONF_WEIGHT_AND_DATE: f64 = 0.9;
/// Confidence for a weight line with no date.
const CONF_WEIGHT_ONLY: f64 = 0.7;
/// Confidence for a table-row weight match.
const CONF_TABLE_ROW: f64 = 0.65;
/// Confidence for a schedule-embedded mention (date, no weight).
const CONF_SCHEDULE_MENTION: f64 = 0.55;

/// Pattern-match an [`IntermediateDocument`] into a [`SyllabusDocument`].
pub fn extract(doc: &IntermediateDocument, config: &ParseConfig) -> SyllabusDocument {
    let mut out = SyllabusDocument::empty(doc.source_type.unwrap_or(SourceType::Txt));

    extract_course(doc, config, &mut out.course);
    out.course.timezone = Some(config.timezone.clone());

    let year = config.year_for(out.course.term.as_deref());

    extract_meeting_times(doc, &mut out.course.meeting_times);
    extract_assessments(doc, config, year, &mut out);
    extract_late_policy(&doc.raw_text, &mut out.late_pass_policy);

    debug!(
        assessments = out.assessments.len(),
        meeting_times = out.course.meeting_times.len(),
        categories = out.categories.len(),
        "rule-based extraction complete"
    );
    out
}

// ── Course metadata ──────────────────────────────────────────────────────

static RE_COURSE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{2,5})\s?(\d{2,3}[A-Z]{0,2})\b").unwrap());

static RE_TERM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(fall|autumn|winter|spring|summer)\s+(\d{4})\b").unwrap());

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

static RE_INSTRUCTOR: Lazy<Regex> = Lazy::new(|| {
    // The keyword is case-insensitive but the name itself must be
    // capitalised, or prose like "instructors will post solutions" matches.
    Regex::new(
        r"\b(?i:instructor|professor|taught by)\s*[:\-]?\s*(?i:dr\.?|prof\.?)?\s*([A-Z][A-Za-z.'-]+(?:\s+[A-Z][A-Za-z.'-]+){1,3})",
    )
    .unwrap()
});

fn extract_course(doc: &IntermediateDocument, config: &ParseConfig, course: &mut Course) {
    // Code and title come from the top of the document; scanning the whole
    // text would match course codes cited in prerequisites or references.
    let head: Vec<&str> = doc.raw_text.lines().take(12).collect();

    for (i, line) in head.iter().enumerate() {
        if let Some(caps) = RE_COURSE_CODE.captures(line) {
            course.code = Some(format!("{} {}", &caps[1], &caps[2]));
            let m = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let remainder = line[m..].trim_start_matches([':', '-', '–', '—', ' ', '\t']);
            if let Some(title) = plausible_title(remainder, &config.vocabulary.title_negative) {
                course.title = Some(title);
            } else if let Some(next) = head.get(i + 1) {
                if let Some(title) = plausible_title(next, &config.vocabulary.title_negative) {
                    course.title = Some(title);
                }
            }
            break;
        }
    }

    if let Some(caps) = RE_TERM.captures(&doc.raw_text) {
        course.term = Some(format!(
            "{} {}",
            capitalize(&caps[1].to_ascii_lowercase()),
            &caps[2]
        ));
    }

    for caps in RE_INSTRUCTOR.captures_iter(&doc.raw_text) {
        let name = caps[1].trim().trim_end_matches(['.', ',']).to_string();
        let email = RE_EMAIL
            .find(&doc.raw_text[caps.get(0).map(|m| m.end()).unwrap_or(0)..])
            .filter(|m| m.start() < 80)
            .map(|m| m.as_str().to_string());
        let id = slug(&name);
        if !course.instructors.iter().any(|i| i.id == id) {
            course.instructors.push(Instructor { id, name, email });
        }
    }
}

/// Accept a candidate title line only if it reads like one: a few words of
/// mostly letters, not matching the negative vocabulary.
fn plausible_title(raw: &str, negative: &[String]) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches([':', '-']).trim();
    if trimmed.len() < 4 || trimmed.len() > 80 {
        return None;
    }
    let words = trimmed.split_whitespace().count();
    if words < 2 || words > 12 {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if negative.iter().any(|n| lower.contains(n.as_str())) {
        return None;
    }
    let letters = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    if letters * 2 < trimmed.len() {
        return None;
    }
    Some(trimmed.to_string())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Lowercase-alphanumeric-with-dashes identifier from free text.
pub(crate) fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_dash = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

// ── Meeting times ────────────────────────────────────────────────────────

static RE_MEETING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(.{0,40}?)\b(\d{1,2}(?::\d{2})?\s*(?:am|pm)?\s*(?:-|–|—|to)\s*\d{1,2}(?::\d{2})?\s*(?:am|pm)?)\b\s*(.*)$",
    )
    .unwrap()
});

fn extract_meeting_times(doc: &IntermediateDocument, out: &mut Vec<MeetingTime>) {
    for line in doc.raw_text.lines() {
        let Some(caps) = RE_MEETING_LINE.captures(line) else {
            continue;
        };
        let days = parse_day_tokens(&caps[1]);
        if days.is_empty() {
            continue;
        }
        let Some((start, end)) = dates::parse_time_range(&caps[2]) else {
            continue;
        };
        let location = plausible_location(&caps[3]);
        let meeting_type = meeting_type_of(line);
        for day in days {
            let record = MeetingTime {
                day_of_week: day,
                start_time: Some(dates::format_hhmm(start)),
                end_time: Some(dates::format_hhmm(end)),
                location: location.clone(),
                meeting_type,
            };
            if !out.contains(&record) {
                out.push(record);
            }
        }
    }
}

/// Parse the text before a time range into day-of-week tokens.
///
/// Accepts full names ("Monday, Wednesday"), abbreviations ("Tues/Thurs"),
/// and compact runs ("MWF", "TuTh"). Label words like "Lecture:" are
/// skipped; any other unrecognised word means this is not a meeting line.
fn parse_day_tokens(prefix: &str) -> Vec<crate::schema::DayOfWeek> {
    static RE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[,/&:]|\band\b|\s+").unwrap());
    const LABELS: &[&str] = &[
        "lecture", "lectures", "lab", "labs", "discussion", "class", "classes", "meets",
        "meeting", "meetings", "time", "times", "when", "section",
    ];
    let mut days = Vec::new();
    for token in RE_SPLIT.split(prefix).filter(|t| !t.trim().is_empty()) {
        let token = token.trim().trim_end_matches('.');
        if LABELS.contains(&token.to_ascii_lowercase().as_str()) {
            continue;
        }
        if let Some(day) = dates::day_from_name(token) {
            if !days.contains(&day) {
                days.push(day);
            }
            continue;
        }
        let run = dates::expand_day_abbrev(token);
        if run.is_empty() {
            return Vec::new();
        }
        for day in run {
            if !days.contains(&day) {
                days.push(day);
            }
        }
    }
    days
}

fn plausible_location(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_start_matches(['-', '–', '—', ',', '@'])
        .trim()
        .trim_start_matches("in ")
        .trim();
    if trimmed.len() < 2 || trimmed.len() > 40 {
        return None;
    }
    if !trimmed.chars().next().is_some_and(|c| c.is_alphabetic()) {
        return None;
    }
    Some(trimmed.to_string())
}

fn meeting_type_of(line: &str) -> MeetingType {
    let lower = line.to_ascii_lowercase();
    if lower.contains("lab") {
        MeetingType::Lab
    } else if lower.contains("discussion") || lower.contains("recitation") {
        MeetingType::Discussion
    } else {
        MeetingType::Lecture
    }
}

// ── Assessments ──────────────────────────────────────────────────────────

static RE_TITLE_THEN_PCT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][^:%\n]{1,48}?)\s*[:\-–—]?\s*\(?(\d{1,3})\s*%\)?(.*)$").unwrap()
});

static RE_PCT_THEN_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\(?(\d{1,3})\s*%\)?\s*[:\-–—]?\s*([A-Za-z][^%\n]{1,48}?)\s*$").unwrap()
});

static RE_PCT_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(?(\d{1,3})\s*%\)?$").unwrap());

static RE_DROP_LOWEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)drop\w*\s+(?:the\s+)?(?:(\d+)\s+)?lowest(?:\s+(\d+))?").unwrap()
});

/// Letter-grade scale lines ("90% or above: A") are cutoffs, not weights.
static RE_GRADE_SCALE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[ABCDF][+-]?\s*[:=]|or above|or better|90-100|below\b").unwrap());

fn extract_assessments(
    doc: &IntermediateDocument,
    config: &ParseConfig,
    year: i32,
    out: &mut SyllabusDocument,
) {
    for section in &doc.sections {
        let schedule_section = section
            .heading
            .as_deref()
            .map(|h| {
                let lower = h.to_ascii_lowercase();
                config
                    .vocabulary
                    .schedule_headings
                    .iter()
                    .any(|tok| lower.contains(tok.as_str()))
            })
            .unwrap_or(false);

        for line in section.content.lines() {
            extract_weight_line(line, config, year, out);
            if schedule_section {
                extract_schedule_mention(line, config, year, out);
            }
        }
        for table in &section.tables {
            extract_table_rows(table, config, year, schedule_section, out);
        }
    }
}

/// Match "Title: N%" and "N% Title" lines, with an optional trailing date.
fn extract_weight_line(line: &str, config: &ParseConfig, year: i32, out: &mut SyllabusDocument) {
    let lower = line.to_ascii_lowercase();
    if config
        .vocabulary
        .weight_negative
        .iter()
        .any(|n| lower.contains(n.as_str()))
        || RE_GRADE_SCALE.is_match(line)
    {
        return;
    }

    let (title, weight, rest) = if let Some(caps) = RE_TITLE_THEN_PCT.captures(line) {
        (
            caps[1].trim().to_string(),
            caps[2].to_string(),
            caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        )
    } else if let Some(caps) = RE_PCT_THEN_TITLE.captures(line) {
        (caps[2].trim().to_string(), caps[1].to_string(), String::new())
    } else {
        return;
    };

    let Ok(weight) = weight.parse::<f64>() else {
        return;
    };
    if !(0.0..=100.0).contains(&weight) {
        return;
    }
    let Some(assessment_type) = classify(&title, &config.vocabulary.assessment_keywords) else {
        // A percentage next to a title with no assessment keyword is as
        // likely an attendance threshold or statistic; skip it.
        return;
    };

    let mut assessment = Assessment::new(clean_title(&title), assessment_type);
    assessment.weight_percent = Some(weight);
    assessment.timezone = config.timezone.clone();
    assessment.source_excerpt = Some(line.trim().to_string());

    if let Some(date) = dates::parse_date(&rest, year).or_else(|| dates::parse_date(line, year)) {
        let time = dates::parse_time(&rest).or_else(|| dates::parse_time(line));
        let (due, all_day) = dates::format_due(date, time);
        assessment.due_datetime = Some(due);
        assessment.all_day = all_day;
        assessment.confidence = CONF_WEIGHT_AND_DATE;
    } else {
        assessment.confidence = CONF_WEIGHT_ONLY;
    }

    if let Some(caps) = RE_DROP_LOWEST.captures(line) {
        let n = caps
            .get(1)
            .or(caps.get(2))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(1);
        let id = slug(&assessment.title);
        if !out.categories.iter().any(|c| c.id == id) {
            out.categories.push(AssessmentCategory {
                id: id.clone(),
                name: assessment.title.clone(),
                weight_percent: Some(weight),
                drop_lowest: Some(n),
            });
        }
        assessment.category_id = Some(id);
    }

    out.assessments.push(assessment);
}

/// Match table rows with a name column and a weight column, and (in
/// schedule tables) rows pairing an assessment mention with a date.
fn extract_table_rows(
    table: &TableGrid,
    config: &ParseConfig,
    year: i32,
    schedule_table: bool,
    out: &mut SyllabusDocument,
) {
    for row in &table.rows {
        let weight_cell = row
            .iter()
            .find_map(|c| RE_PCT_CELL.captures(c.trim()).map(|m| m[1].to_string()));
        let name_cell = row.iter().find(|c| {
            classify(c, &config.vocabulary.assessment_keywords).is_some()
                && !RE_PCT_CELL.is_match(c.trim())
        });
        let date_cell = row
            .iter()
            .find_map(|c| dates::parse_date(c, year).map(|d| (d, dates::parse_time(c))));

        if let (Some(weight), Some(name)) = (&weight_cell, name_cell) {
            let Ok(weight) = weight.parse::<f64>() else {
                continue;
            };
            if !(0.0..=100.0).contains(&weight) {
                continue;
            }
            let assessment_type = classify(name, &config.vocabulary.assessment_keywords)
                .unwrap_or_default();
            let mut assessment = Assessment::new(clean_title(name), assessment_type);
            assessment.weight_percent = Some(weight);
            assessment.timezone = config.timezone.clone();
            assessment.confidence = CONF_TABLE_ROW;
            assessment.source_excerpt = Some(row.join(" | "));
            if let Some((date, time)) = date_cell {
                let (due, all_day) = dates::format_due(date, time);
                assessment.due_datetime = Some(due);
                assessment.all_day = all_day;
                assessment.confidence = CONF_WEIGHT_AND_DATE;
            }
            out.assessments.push(assessment);
        } else if schedule_table {
            if let (Some((date, time)), Some(name)) = (date_cell, name_cell) {
                let Some(title) = mention_title(name, &config.vocabulary.assessment_keywords)
                else {
                    continue;
                };
                let assessment_type =
                    classify(&title, &config.vocabulary.assessment_keywords).unwrap_or_default();
                let mut assessment = Assessment::new(title, assessment_type);
                assessment.timezone = config.timezone.clone();
                let (due, all_day) = dates::format_due(date, time);
                assessment.due_datetime = Some(due);
                assessment.all_day = all_day;
                assessment.confidence = CONF_SCHEDULE_MENTION;
                assessment.source_excerpt = Some(row.join(" | "));
                out.assessments.push(assessment);
            }
        }
    }
}

/// Match schedule prose like "Project 1 — due Oct 24".
fn extract_schedule_mention(
    line: &str,
    config: &ParseConfig,
    year: i32,
    out: &mut SyllabusDocument,
) {
    if line.contains('%') {
        return; // weight lines are handled by extract_weight_line
    }
    let Some(date) = dates::parse_date(line, year) else {
        return;
    };
    let Some(title) = mention_title(line, &config.vocabulary.assessment_keywords) else {
        return;
    };
    let assessment_type =
        classify(&title, &config.vocabulary.assessment_keywords).unwrap_or_default();
    let mut assessment = Assessment::new(title, assessment_type);
    assessment.timezone = config.timezone.clone();
    let (due, all_day) = dates::format_due(date, dates::parse_time(line));
    assessment.due_datetime = Some(due);
    assessment.all_day = all_day;
    assessment.confidence = CONF_SCHEDULE_MENTION;
    assessment.source_excerpt = Some(line.trim().to_string());
    out.assessments.push(assessment);
}

/// Pull a titled assessment mention ("Project 2", "Midterm", "HW 3") out of
/// surrounding text.
fn mention_title(text: &str, keywords: &[(String, AssessmentType)]) -> Option<String> {
    static RE_MENTION: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)\b(final exam|midterm exam|midterm|final|quiz|project|homework|hw|assignment|problem set|lab|exam)\s*#?\s*(\d{1,2})?\b",
        )
        .unwrap()
    });
    let caps = RE_MENTION.captures(text)?;
    let keyword = &caps[1];
    // Only surface mentions whose keyword the configuration recognises.
    if classify(keyword, keywords).is_none() {
        return None;
    }
    let mut title = capitalize(&keyword.to_ascii_lowercase());
    if let Some(num) = caps.get(2) {
        title.push(' ');
        title.push_str(num.as_str());
    }
    Some(title)
}

/// First keyword whose substring appears in `text`, in vocabulary order.
fn classify(text: &str, keywords: &[(String, AssessmentType)]) -> Option<AssessmentType> {
    let lower = text.to_ascii_lowercase();
    keywords
        .iter()
        .find(|(kw, _)| lower.contains(kw.as_str()))
        .map(|(_, t)| *t)
}

/// Trim separators and parenthetical remnants off a matched title.
fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_end_matches([':', '-', '–', '—', '(', ','])
        .trim()
        .to_string()
}

// ── Late policy ──────────────────────────────────────────────────────────

static RE_LATE_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+late\s+(?:days?|passes?)|late\s+(?:days?|passes?)\s*[:\-]?\s*(\d{1,2})\b")
        .unwrap()
});

static RE_LATE_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:extension\s+of\s+|extends?\s+(?:the\s+deadline\s+)?by\s+)(\d{1,2})\s+days?|(\d{1,2})[-\s]day\s+extension")
        .unwrap()
});

fn extract_late_policy(text: &str, policy: &mut LatePassPolicy) {
    if let Some(caps) = RE_LATE_TOTAL.captures(text) {
        policy.total_allowed = caps
            .get(1)
            .or(caps.get(2))
            .and_then(|m| m.as_str().parse().ok());
    }
    if let Some(caps) = RE_LATE_EXTENSION.captures(text) {
        policy.extension_days = caps
            .get(1)
            .or(caps.get(2))
            .and_then(|m| m.as_str().parse().ok());
    }
}
