//! Prompts for the external interpretation service.
//!
//! Centralising the prompt text here serves two purposes:
//!
//! 1. **Single source of truth** — tightening the schema instructions or the
//!    confidence grading requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the built prompt without a
//!    live service, making prompt regressions easy to catch.
//!
//! The user prompt is token-reduced: only sections whose headings match the
//! relevant vocabulary (grading, schedule, course info) are included, never
//! the full document, and the structurer's candidate dates and percentages
//! are attached as hints so the service doesn't have to re-find them.

use crate::pipeline::structurer::Section;

/// System prompt sent with every interpretation request.
pub const SYSTEM_PROMPT: &str = r#"You are a syllabus extraction service. Given excerpts from a course syllabus, return a single JSON object conforming exactly to this schema — no prose, no markdown fences, JSON only:

{
  "course": {
    "code": string|null, "title": string|null, "term": string|null,
    "timezone": string|null,
    "instructors": [{"id": string, "name": string, "email": string|null}],
    "meeting_times": [{"day_of_week": "MO"|"TU"|"WE"|"TH"|"FR"|"SA"|"SU",
                       "start_time": "HH:MM"|null, "end_time": "HH:MM"|null,
                       "location": string|null,
                       "type": "lecture"|"lab"|"discussion"|"other"}]
  },
  "categories": [{"id": string, "name": string,
                  "weight_percent": number|null, "drop_lowest": int|null}],
  "assessments": [{"id": string, "title": string, "category_id": string|null,
                   "type": "assignment"|"midterm"|"final"|"quiz"|"project"|"participation",
                   "due_datetime": string|null, "all_day": bool,
                   "timezone": string, "weight_percent": number|null,
                   "recurrence": null,
                   "confidence": number, "source_excerpt": string|null}],
  "late_pass_policy": {"total_allowed": int|null, "extension_days": int|null},
  "metadata": {"source_type": "pdf"|"docx"|"txt", "schema_version": "1.0"}
}

Rules:

1. DATES
   - due_datetime is ISO 8601: "2025-10-24" for date-only (all_day true) or
     "2025-10-24T14:45:00" when a time is stated (all_day false)
   - Never output a raw phrase like "Oct 24" in due_datetime; if you cannot
     resolve a date, use null

2. CONFIDENCE (required on every assessment, 0.0 to 1.0)
   - 0.9 or higher ONLY when both a due date and a weight are explicitly
     stated in the text
   - 0.5 to 0.7 when inferred from surrounding schedule context
   - below 0.3 when the value is a guess

3. WHAT TO IGNORE
   - Late penalties, grade-scale cutoffs ("90% = A"), and extra-credit
     percentages are not assessment weights
   - Prerequisite course codes are not the course code

4. OUTPUT
   - Every assessment needs a source_excerpt quoting the supporting text
   - Omit nothing that is graded; invent nothing that is not in the text"#;

/// Build the user prompt for one group of sections.
///
/// Layout: course term/year hints first, then each section (heading, prose,
/// tables re-flowed as pipe rows), then the candidate hints.
pub fn user_prompt(sections: &[&Section], year: i32, timezone: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Academic year for dates without one: {year}\nDefault timezone: {timezone}\n\n"
    ));

    for section in sections {
        match &section.heading {
            Some(h) => out.push_str(&format!("## {h}\n")),
            None => out.push_str("## (document start)\n"),
        }
        if !section.content.trim().is_empty() {
            out.push_str(section.content.trim());
            out.push('\n');
        }
        for table in &section.tables {
            for row in &table.rows {
                out.push_str(&row.join(" | "));
                out.push('\n');
            }
        }
        out.push('\n');
    }

    let dates: Vec<&str> = sections
        .iter()
        .flat_map(|s| s.candidate_dates.iter())
        .map(|c| c.context.as_str())
        .collect();
    if !dates.is_empty() {
        out.push_str("Date phrases found by pre-scan (with context):\n");
        for d in dates {
            out.push_str(&format!("- {d}\n"));
        }
        out.push('\n');
    }

    let pcts: Vec<&str> = sections
        .iter()
        .flat_map(|s| s.candidate_percentages.iter())
        .map(|c| c.context.as_str())
        .collect();
    if !pcts.is_empty() {
        out.push_str("Percentage phrases found by pre-scan (with context):\n");
        for p in pcts {
            out.push_str(&format!("- {p}\n"));
        }
    }

    out
}
