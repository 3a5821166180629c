//! Configuration types for a syllabus parse.
//!
//! All pipeline behaviour is controlled through [`ParseConfig`], built via
//! its [`ParseConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across requests and to make tests fully
//! deterministic (fixed academic year, injected interpreter, injected
//! vocabularies).
//!
//! Keyword vocabularies are configuration data rather than scattered
//! literals so they can be unit-tested and extended per locale or
//! institution without touching extractor code.

use crate::error::SyllabusError;
use crate::pipeline::interpret::Interpreter;
use crate::schema::{AssessmentType, DEFAULT_TIMEZONE};
use std::fmt;
use std::sync::Arc;

/// Which orchestrator path to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParseMode {
    /// Rule-based extraction only. Zero external calls. (default)
    #[default]
    Rule,
    /// Rule-based + interpretive extraction, merged by the validator.
    /// Degrades to `Rule` when no interpreter is configured.
    Hybrid,
}

/// The keyword tables driving section detection and rule-based extraction.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Heading tokens that open a section (case-insensitive).
    pub section_headings: Vec<String>,
    /// Heading tokens whose sections are relevant to the interpretation
    /// prompt (token reduction): grading, schedule, and course-info groups.
    pub grading_headings: Vec<String>,
    pub schedule_headings: Vec<String>,
    pub course_info_headings: Vec<String>,
    /// Keyword → assessment type, checked in order (first match wins).
    pub assessment_keywords: Vec<(String, AssessmentType)>,
    /// Substrings that disqualify a line from being the course title
    /// (prerequisite strings, section numbers, other noise).
    pub title_negative: Vec<String>,
    /// Substrings that disqualify a percentage line from being an
    /// assessment weight (late penalties, grade scales, extra credit).
    pub weight_negative: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let strs = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            section_headings: strs(&[
                "grading",
                "evaluation",
                "assessment",
                "weights",
                "schedule",
                "calendar",
                "course information",
                "course logistics",
                "assignments",
                "homework",
                "projects",
                "exams",
            ]),
            grading_headings: strs(&[
                "grading",
                "evaluation",
                "assessment",
                "weights",
                "assignments",
                "homework",
                "projects",
                "exams",
            ]),
            schedule_headings: strs(&["schedule", "calendar"]),
            course_info_headings: strs(&["course information", "course logistics"]),
            assessment_keywords: vec![
                ("midterm".to_string(), AssessmentType::Midterm),
                ("final".to_string(), AssessmentType::Final),
                ("exam".to_string(), AssessmentType::Midterm),
                ("quiz".to_string(), AssessmentType::Quiz),
                ("quizzes".to_string(), AssessmentType::Quiz),
                ("project".to_string(), AssessmentType::Project),
                ("homework".to_string(), AssessmentType::Assignment),
                ("assignment".to_string(), AssessmentType::Assignment),
                ("problem set".to_string(), AssessmentType::Assignment),
                ("lab".to_string(), AssessmentType::Assignment),
                ("participation".to_string(), AssessmentType::Participation),
                ("attendance".to_string(), AssessmentType::Participation),
            ],
            title_negative: strs(&[
                "prerequisite",
                "prereq",
                "syllabus",
                "section",
                "unique number",
                "units",
                "credit",
                "instructor",
                "office hours",
                "email",
            ]),
            weight_negative: strs(&[
                "late",
                "penalty",
                "deduct",
                "bonus",
                "extra credit",
                "curve",
                "scale",
                "per day",
            ]),
        }
    }
}

impl Vocabulary {
    /// Whether a heading belongs to any prompt-relevant group.
    pub fn is_relevant_heading(&self, heading: &str) -> bool {
        let lower = heading.to_ascii_lowercase();
        self.grading_headings
            .iter()
            .chain(self.schedule_headings.iter())
            .chain(self.course_info_headings.iter())
            .any(|tok| lower.contains(tok))
    }
}

/// Configuration for one parse invocation.
///
/// Built via [`ParseConfig::builder()`] or [`ParseConfig::default()`].
///
/// # Example
/// ```rust
/// use syllaparse::{ParseConfig, ParseMode};
///
/// let config = ParseConfig::builder()
///     .mode(ParseMode::Rule)
///     .academic_year(2025)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ParseConfig {
    /// Orchestrator path. Default: [`ParseMode::Rule`].
    pub mode: ParseMode,

    /// The external interpretation service, when the feature is enabled.
    ///
    /// `None` means the interpretive extractor is never invoked — not
    /// invoked-and-ignored, literally skipped — and `Hybrid` degrades to
    /// `Rule`. The outer application decides whether to construct one from
    /// its own feature switch and credentials.
    pub interpreter: Option<Arc<dyn Interpreter>>,

    /// Upper bound on one interpretation call. Default: 30s.
    ///
    /// Comfortably above the service's typical response time but well under
    /// any surrounding HTTP request timeout, so a hung call can never hang
    /// the whole parse. There is no retry: a timeout is a failure for this
    /// request and the rule-based result takes over.
    pub interpret_timeout_secs: u64,

    /// Prompt size above which the document is split into one call per
    /// section group, merged on return. Default: 12000 characters.
    pub max_prompt_chars: usize,

    /// Timezone stamped on assessments lacking one. Default: America/Los_Angeles.
    pub timezone: String,

    /// Calendar year for dates that omit one ("Oct. 24"). When `None`, the
    /// year is inferred from the extracted term, then the current year.
    pub academic_year: Option<i32>,

    /// Term hint ("Fall 2025") used for year inference when the document
    /// itself states no term.
    pub term_hint: Option<String>,

    /// Keyword tables for section detection and rule-based extraction.
    pub vocabulary: Vocabulary,

    /// Optional read-through result cache keyed by content hash + mode.
    /// Shared across concurrent parses; `None` disables caching.
    pub cache: Option<Arc<crate::cache::ParseCache>>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            mode: ParseMode::Rule,
            interpreter: None,
            interpret_timeout_secs: 30,
            max_prompt_chars: 12_000,
            timezone: DEFAULT_TIMEZONE.to_string(),
            academic_year: None,
            term_hint: None,
            vocabulary: Vocabulary::default(),
            cache: None,
        }
    }
}

impl fmt::Debug for ParseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseConfig")
            .field("mode", &self.mode)
            .field(
                "interpreter",
                &self.interpreter.as_ref().map(|_| "<dyn Interpreter>"),
            )
            .field("interpret_timeout_secs", &self.interpret_timeout_secs)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("timezone", &self.timezone)
            .field("academic_year", &self.academic_year)
            .field("term_hint", &self.term_hint)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl ParseConfig {
    /// Create a new builder for `ParseConfig`.
    pub fn builder() -> ParseConfigBuilder {
        ParseConfigBuilder {
            config: Self::default(),
        }
    }

    /// The year used for dates that omit one, given an optionally extracted
    /// term from the document itself.
    pub fn year_for(&self, document_term: Option<&str>) -> i32 {
        crate::dates::infer_year(
            self.academic_year,
            document_term.or(self.term_hint.as_deref()),
        )
    }
}

/// Builder for [`ParseConfig`].
pub struct ParseConfigBuilder {
    config: ParseConfig,
}

impl ParseConfigBuilder {
    pub fn mode(mut self, mode: ParseMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn interpreter(mut self, interpreter: Arc<dyn Interpreter>) -> Self {
        self.config.interpreter = Some(interpreter);
        self
    }

    pub fn interpret_timeout_secs(mut self, secs: u64) -> Self {
        self.config.interpret_timeout_secs = secs;
        self
    }

    pub fn max_prompt_chars(mut self, chars: usize) -> Self {
        self.config.max_prompt_chars = chars;
        self
    }

    pub fn timezone(mut self, tz: impl Into<String>) -> Self {
        self.config.timezone = tz.into();
        self
    }

    pub fn academic_year(mut self, year: i32) -> Self {
        self.config.academic_year = Some(year);
        self
    }

    pub fn term_hint(mut self, term: impl Into<String>) -> Self {
        self.config.term_hint = Some(term.into());
        self
    }

    pub fn vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.config.vocabulary = vocabulary;
        self
    }

    pub fn cache(mut self, cache: Arc<crate::cache::ParseCache>) -> Self {
        self.config.cache = Some(cache);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParseConfig, SyllabusError> {
        let c = &self.config;
        if c.interpret_timeout_secs == 0 {
            return Err(SyllabusError::InvalidConfig(
                "interpret_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_prompt_chars < 256 {
            return Err(SyllabusError::InvalidConfig(format!(
                "max_prompt_chars must be ≥ 256, got {}",
                c.max_prompt_chars
            )));
        }
        if c.vocabulary.section_headings.is_empty() {
            return Err(SyllabusError::InvalidConfig(
                "section heading vocabulary must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_rule_mode_without_interpreter() {
        let config = ParseConfig::default();
        assert_eq!(config.mode, ParseMode::Rule);
        assert!(config.interpreter.is_none());
        assert!(config.cache.is_none());
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
    }

    #[test]
    fn builder_validates_timeout() {
        let err = ParseConfig::builder().interpret_timeout_secs(0).build();
        assert!(matches!(err, Err(SyllabusError::InvalidConfig(_))));
    }

    #[test]
    fn builder_validates_prompt_budget() {
        let err = ParseConfig::builder().max_prompt_chars(10).build();
        assert!(matches!(err, Err(SyllabusError::InvalidConfig(_))));
    }

    #[test]
    fn builder_validates_vocabulary() {
        let mut vocab = Vocabulary::default();
        vocab.section_headings.clear();
        let err = ParseConfig::builder().vocabulary(vocab).build();
        assert!(matches!(err, Err(SyllabusError::InvalidConfig(_))));
    }

    #[test]
    fn year_inference_chain() {
        let config = ParseConfig::builder().academic_year(2025).build().unwrap();
        assert_eq!(config.year_for(None), 2025);
        // Explicit year beats the document term.
        assert_eq!(config.year_for(Some("Fall 2023")), 2025);

        let config = ParseConfig::builder().term_hint("Spring 2024").build().unwrap();
        // Document term beats the hint.
        assert_eq!(config.year_for(Some("Fall 2023")), 2023);
        assert_eq!(config.year_for(None), 2024);
    }

    #[test]
    fn relevant_heading_groups() {
        let vocab = Vocabulary::default();
        assert!(vocab.is_relevant_heading("Grading"));
        assert!(vocab.is_relevant_heading("Course Schedule"));
        assert!(vocab.is_relevant_heading("Course Information"));
        assert!(!vocab.is_relevant_heading("Academic Integrity"));
    }
}
