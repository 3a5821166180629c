//! The output schema: [`SyllabusDocument`] and its component types.
//!
//! This is the wire contract of the whole pipeline. The JSON shape produced
//! by serialising a `SyllabusDocument` is consumed by the review UI and,
//! eventually, by a scheduler and calendar exporter — field names and enum
//! spellings here must stay stable.
//!
//! Invariants the pipeline guarantees on every document it returns:
//!
//! * every `Assessment::id` and `AssessmentCategory::id` is unique within
//!   the document and non-empty
//! * a non-null `Assessment::category_id` references an existing category
//! * every `confidence` lies in `[0.0, 1.0]`
//! * `due_datetime` is a valid ISO 8601 string (date-only or full) or `None`
//!   — never a raw unparsed phrase
//!
//! These are *enforced* by [`crate::pipeline::normalize`], not merely hoped
//! for; candidate documents from the interpretation service may violate any
//! of them and are repaired there.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current schema version written into [`DocumentMetadata::schema_version`].
pub const SCHEMA_VERSION: &str = "1.0";

/// Default timezone assumed when the document states none.
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

/// The kind of source document handed to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Docx,
    Txt,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Pdf => write!(f, "pdf"),
            SourceType::Docx => write!(f, "docx"),
            SourceType::Txt => write!(f, "txt"),
        }
    }
}

/// Two-letter day-of-week codes, RFC 5545 spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    #[serde(rename = "MO")]
    Mo,
    #[serde(rename = "TU")]
    Tu,
    #[serde(rename = "WE")]
    We,
    #[serde(rename = "TH")]
    Th,
    #[serde(rename = "FR")]
    Fr,
    #[serde(rename = "SA")]
    Sa,
    #[serde(rename = "SU")]
    Su,
}

impl DayOfWeek {
    /// The two-letter code as a static string.
    pub fn code(&self) -> &'static str {
        match self {
            DayOfWeek::Mo => "MO",
            DayOfWeek::Tu => "TU",
            DayOfWeek::We => "WE",
            DayOfWeek::Th => "TH",
            DayOfWeek::Fr => "FR",
            DayOfWeek::Sa => "SA",
            DayOfWeek::Su => "SU",
        }
    }

    /// Parse a two-letter code (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "MO" => Some(DayOfWeek::Mo),
            "TU" => Some(DayOfWeek::Tu),
            "WE" => Some(DayOfWeek::We),
            "TH" => Some(DayOfWeek::Th),
            "FR" => Some(DayOfWeek::Fr),
            "SA" => Some(DayOfWeek::Sa),
            "SU" => Some(DayOfWeek::Su),
            _ => None,
        }
    }
}

/// What kind of session a [`MeetingTime`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingType {
    #[default]
    Lecture,
    Lab,
    Discussion,
    Other,
}

/// A single recurring meeting slot. A "MWF 10-10:50" line produces three of
/// these, one per day, sharing the same time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingTime {
    pub day_of_week: DayOfWeek,
    /// 24-hour "HH:MM", or `None` when the document gives days but no times.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub meeting_type: MeetingType,
}

/// A grading category ("Homework — 20%, drop lowest 2").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentCategory {
    /// Unique within the document; assigned deterministically when absent.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub weight_percent: Option<f64>,
    pub drop_lowest: Option<u32>,
}

/// The kind of an [`Assessment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentType {
    #[default]
    Assignment,
    Midterm,
    Final,
    Quiz,
    Project,
    Participation,
}

impl fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssessmentType::Assignment => "assignment",
            AssessmentType::Midterm => "midterm",
            AssessmentType::Final => "final",
            AssessmentType::Quiz => "quiz",
            AssessmentType::Project => "project",
            AssessmentType::Participation => "participation",
        };
        write!(f, "{s}")
    }
}

/// Recurrence frequency, RFC 5545 subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// RFC 5545-style recurrence for repeating assessments (weekly quizzes etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    /// Every N periods; 1 = every week/day/month.
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub by_day: Vec<DayOfWeek>,
    /// ISO 8601 date the recurrence ends on, if bounded by date.
    pub until: Option<String>,
    /// Total occurrence count, if bounded by count.
    pub count: Option<u32>,
}

/// One graded item: an assignment, exam, quiz, project, or participation bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Unique within the document; assigned deterministically when absent.
    /// Interpreter responses may omit it (serde default), the validator fills it.
    #[serde(default)]
    pub id: String,
    pub title: String,
    /// References an [`AssessmentCategory::id`], or `None`. Dangling
    /// references are nulled by the validator rather than rejected.
    pub category_id: Option<String>,
    #[serde(rename = "type", default)]
    pub assessment_type: AssessmentType,
    /// ISO 8601: `2025-10-24` (date-only, `all_day` true) or
    /// `2025-06-11T14:45:00` (full, `all_day` false).
    pub due_datetime: Option<String>,
    #[serde(default = "default_all_day")]
    pub all_day: bool,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// 0–100 when known.
    pub weight_percent: Option<f64>,
    pub recurrence: Option<Recurrence>,
    /// Always in [0, 1]. Absence is a bug, not a valid null — a missing
    /// value deserializes as 0.5 and the validator clamps from there.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Verbatim quote from the document supporting this extraction.
    pub source_excerpt: Option<String>,
}

fn default_all_day() -> bool {
    true
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_confidence() -> f64 {
    0.5
}

impl Assessment {
    /// A sparse assessment with defaults for everything but identity fields.
    pub fn new(title: impl Into<String>, assessment_type: AssessmentType) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            category_id: None,
            assessment_type,
            due_datetime: None,
            all_day: true,
            timezone: DEFAULT_TIMEZONE.to_string(),
            weight_percent: None,
            recurrence: None,
            confidence: 0.5,
            source_excerpt: None,
        }
    }
}

/// An instructor or TA listed in the course-information section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// Course-level metadata extracted from the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// e.g. "CS 303E" — letters + digits with optional trailing suffix.
    pub code: Option<String>,
    pub title: Option<String>,
    /// e.g. "Spring 2025".
    pub term: Option<String>,
    pub timezone: Option<String>,
    #[serde(default)]
    pub instructors: Vec<Instructor>,
    #[serde(default)]
    pub meeting_times: Vec<MeetingTime>,
}

/// Late-submission allowances extracted from policy prose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatePassPolicy {
    /// How many late passes/days a student gets for the term.
    pub total_allowed: Option<u32>,
    /// How many days each pass extends a deadline.
    pub extension_days: Option<u32>,
}

impl LatePassPolicy {
    pub fn is_empty(&self) -> bool {
        self.total_allowed.is_none() && self.extension_days.is_none()
    }
}

/// Provenance and versioning for a parsed document.
///
/// The pipeline overwrites this with the real source type after
/// normalization, so the lenient deserialization default never leaks out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_type: SourceType,
    pub schema_version: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            source_type: SourceType::Txt,
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

/// The normalized output of one parse invocation.
///
/// Constructed fresh per call; the pipeline holds no identity for it across
/// calls. The caller owns persistence, editing, and versioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyllabusDocument {
    #[serde(default)]
    pub course: Course,
    #[serde(default)]
    pub categories: Vec<AssessmentCategory>,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub late_pass_policy: LatePassPolicy,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl SyllabusDocument {
    /// An empty document for the given source type.
    pub fn empty(source_type: SourceType) -> Self {
        Self {
            course: Course::default(),
            categories: Vec::new(),
            assessments: Vec::new(),
            late_pass_policy: LatePassPolicy::default(),
            metadata: DocumentMetadata {
                source_type,
                schema_version: SCHEMA_VERSION.to_string(),
            },
        }
    }

    /// Whether the document carries no extracted content at all.
    ///
    /// Used by the merge policy to decide between whole-document fallback
    /// and per-category fill.
    pub fn is_empty(&self) -> bool {
        self.course.code.is_none()
            && self.course.title.is_none()
            && self.course.term.is_none()
            && self.course.instructors.is_empty()
            && self.course.meeting_times.is_empty()
            && self.categories.is_empty()
            && self.assessments.is_empty()
            && self.late_pass_policy.is_empty()
    }

    /// Sum of non-null assessment weights.
    pub fn weight_sum(&self) -> f64 {
        self.assessments
            .iter()
            .filter_map(|a| a.weight_percent)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_of_week_round_trip() {
        for code in ["MO", "TU", "WE", "TH", "FR", "SA", "SU"] {
            let day = DayOfWeek::from_code(code).unwrap();
            assert_eq!(day.code(), code);
        }
        assert!(DayOfWeek::from_code("XX").is_none());
        assert_eq!(DayOfWeek::from_code("tu"), Some(DayOfWeek::Tu));
    }

    #[test]
    fn enums_serialize_lowercase() {
        let a = Assessment::new("Midterm 1", AssessmentType::Midterm);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "midterm");
        assert_eq!(json["all_day"], true);
        let m = MeetingTime {
            day_of_week: DayOfWeek::Th,
            start_time: Some("16:00".into()),
            end_time: Some("17:20".into()),
            location: None,
            meeting_type: MeetingType::Lecture,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["day_of_week"], "TH");
        assert_eq!(json["type"], "lecture");
    }

    #[test]
    fn empty_document_is_empty() {
        let doc = SyllabusDocument::empty(SourceType::Pdf);
        assert!(doc.is_empty());
        assert_eq!(doc.metadata.source_type, SourceType::Pdf);
        assert_eq!(doc.metadata.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn weight_sum_skips_nulls() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mut a = Assessment::new("HW 1", AssessmentType::Assignment);
        a.weight_percent = Some(20.0);
        let b = Assessment::new("HW 2", AssessmentType::Assignment);
        let mut c = Assessment::new("Final", AssessmentType::Final);
        c.weight_percent = Some(40.0);
        doc.assessments = vec![a, b, c];
        assert!((doc.weight_sum() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn document_json_round_trip() {
        let mut doc = SyllabusDocument::empty(SourceType::Docx);
        doc.course.code = Some("CS 303E".into());
        doc.assessments
            .push(Assessment::new("Project 1", AssessmentType::Project));
        let json = serde_json::to_string(&doc).unwrap();
        let back: SyllabusDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }
}
