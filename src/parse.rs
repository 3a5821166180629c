//! Pipeline orchestration and public entry points.
//!
//! A state machine over one parse request: structure always runs first;
//! rule mode feeds the rule-based result straight into the validator;
//! hybrid mode runs both extractors concurrently (they share only read-only
//! access to the intermediate document) and falls back to the rule-based
//! result on any [`InterpretationFailure`]. The contract to every caller is
//! that a parse either fails structurally or terminates with *some* usable,
//! possibly sparse, document — never an exception mid-way.

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ParseConfig, ParseMode};
use crate::error::{InterpretationFailure, SyllabusError};
use crate::pipeline::normalize::{self, QualityFlag};
use crate::pipeline::structurer::{self, IntermediateDocument};
use crate::pipeline::{interpret, rules};
use crate::schema::{DocumentMetadata, SourceType, SyllabusDocument, SCHEMA_VERSION};

/// Assessments below this confidence are counted separately in the summary
/// so the caller can surface "N fields need review".
const LOW_CONFIDENCE: f64 = 0.5;

/// Aggregate confidence over a document's assessments.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfidenceSummary {
    /// Mean assessment confidence; 0.0 for a document with none.
    pub mean: f64,
    /// Lowest assessment confidence; 0.0 for a document with none.
    pub min: f64,
    pub assessment_count: usize,
    /// Assessments with confidence below 0.5.
    pub low_confidence_count: usize,
}

impl ConfidenceSummary {
    pub fn of(document: &SyllabusDocument) -> Self {
        let confidences: Vec<f64> = document.assessments.iter().map(|a| a.confidence).collect();
        if confidences.is_empty() {
            return Self::default();
        }
        Self {
            mean: confidences.iter().sum::<f64>() / confidences.len() as f64,
            min: confidences.iter().cloned().fold(f64::INFINITY, f64::min),
            assessment_count: confidences.len(),
            low_confidence_count: confidences.iter().filter(|c| **c < LOW_CONFIDENCE).count(),
        }
    }
}

/// Structuring statistics plus per-stage timings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseStats {
    pub raw_chars: usize,
    pub sections: usize,
    pub tables: usize,
    pub candidate_dates: usize,
    pub candidate_percentages: usize,
    pub structure_ms: u64,
    pub extract_ms: u64,
    /// Wall time of the interpretation call(s); `None` in rule mode.
    pub interpret_ms: Option<u64>,
    pub total_ms: u64,
}

impl ParseStats {
    fn of(doc: &IntermediateDocument) -> Self {
        Self {
            raw_chars: doc.raw_text.len(),
            sections: doc.sections.len(),
            tables: doc.sections.iter().map(|s| s.tables.len()).sum(),
            candidate_dates: doc.all_candidate_dates().count(),
            candidate_percentages: doc.all_candidate_percentages().count(),
            ..Self::default()
        }
    }
}

/// The result of one parse invocation: the document plus everything the
/// caller needs to present it honestly (confidence, repairs, timings).
#[derive(Debug, Clone, Serialize)]
pub struct ParseOutcome {
    pub document: SyllabusDocument,
    pub confidence: ConfidenceSummary,
    /// Every repair the validator made, in order.
    pub flags: Vec<QualityFlag>,
    pub stats: ParseStats,
    /// Set when hybrid mode fell back to the rule-based result.
    pub interpretation_failure: Option<InterpretationFailure>,
    /// Whether this outcome was served from the content-hash cache.
    pub from_cache: bool,
}

impl ParseOutcome {
    /// An outcome wrapping an empty document, used as a cache/test fixture.
    pub fn empty(source_type: SourceType) -> Self {
        Self {
            document: SyllabusDocument::empty(source_type),
            confidence: ConfidenceSummary::default(),
            flags: Vec::new(),
            stats: ParseStats::default(),
            interpretation_failure: None,
            from_cache: false,
        }
    }
}

/// Parse a syllabus document into a [`SyllabusDocument`].
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `bytes` — raw file content (PDF/DOCX/TXT per `source_type`)
/// * `source_type` — the declared format of `bytes`
/// * `config` — parse configuration
///
/// # Returns
/// `Ok(ParseOutcome)` for every readable document, including ones yielding
/// a near-empty result (image-only PDF, unrelated text). Check
/// `outcome.confidence` and `outcome.flags` before trusting fields.
///
/// # Errors
/// [`SyllabusError::CorruptDocument`] when the bytes cannot be parsed as
/// the declared format at all. Interpretation-service problems never
/// surface here; hybrid mode falls back to the rule-based result.
pub async fn parse(
    bytes: &[u8],
    source_type: SourceType,
    config: &ParseConfig,
) -> Result<ParseOutcome, SyllabusError> {
    if let Some(cache) = &config.cache {
        if let Some(mut hit) = cache.get(bytes, config.mode) {
            hit.from_cache = true;
            return Ok(hit);
        }
    }

    let total_start = Instant::now();
    info!(source = %source_type, mode = ?config.mode, bytes = bytes.len(), "starting parse");

    let structure_start = Instant::now();
    let intermediate = structurer::structure(bytes, source_type, config)?;
    let structure_ms = structure_start.elapsed().as_millis() as u64;
    let mut stats = ParseStats::of(&intermediate);
    stats.structure_ms = structure_ms;

    let interpreter = match config.mode {
        ParseMode::Hybrid => {
            let interpreter = config.interpreter.as_deref();
            if interpreter.is_none() {
                debug!("hybrid mode without an interpreter degrades to rule mode");
            }
            interpreter
        }
        ParseMode::Rule => None,
    };

    let extract_start = Instant::now();
    let (document, mut flags, interpretation_failure) = match interpreter {
        Some(interpreter) => {
            let (rule_doc, interpreted) = futures::join!(
                async { rules::extract(&intermediate, config) },
                interpret::run(&intermediate, interpreter, config)
            );
            stats.interpret_ms = Some(extract_start.elapsed().as_millis() as u64);
            match interpreted {
                Ok(candidate) => {
                    let (doc, flags) =
                        normalize::validate_and_normalize(candidate, Some(&rule_doc), config);
                    (doc, flags, None)
                }
                Err(failure) => {
                    warn!(%failure, "interpretation failed; using rule-based result");
                    let (doc, mut flags) =
                        normalize::validate_and_normalize(rule_doc, None, config);
                    flags.push(QualityFlag::InterpreterFellBack {
                        failure: failure.clone(),
                    });
                    (doc, flags, Some(failure))
                }
            }
        }
        None => {
            let rule_doc = rules::extract(&intermediate, config);
            let (doc, flags) = normalize::validate_and_normalize(rule_doc, None, config);
            (doc, flags, None)
        }
    };
    stats.extract_ms = extract_start.elapsed().as_millis() as u64;
    stats.total_ms = total_start.elapsed().as_millis() as u64;

    let mut document = document;
    // The interpretation service cannot be trusted with provenance.
    document.metadata = DocumentMetadata {
        source_type,
        schema_version: SCHEMA_VERSION.to_string(),
    };

    flags.shrink_to_fit();
    let outcome = ParseOutcome {
        confidence: ConfidenceSummary::of(&document),
        document,
        flags,
        stats,
        interpretation_failure,
        from_cache: false,
    };

    info!(
        assessments = outcome.document.assessments.len(),
        mean_confidence = outcome.confidence.mean,
        total_ms = outcome.stats.total_ms,
        "parse complete"
    );

    if let Some(cache) = &config.cache {
        cache.insert_if_absent(bytes, config.mode, outcome.clone());
    }
    Ok(outcome)
}

/// Parse already-extracted plain text.
pub async fn parse_text(
    text: &str,
    config: &ParseConfig,
) -> Result<ParseOutcome, SyllabusError> {
    parse(text.as_bytes(), SourceType::Txt, config).await
}

/// Synchronous wrapper around [`parse`].
///
/// Creates a temporary tokio runtime internally.
pub fn parse_sync(
    bytes: &[u8],
    source_type: SourceType,
    config: &ParseConfig,
) -> Result<ParseOutcome, SyllabusError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SyllabusError::Internal(format!("failed to create tokio runtime: {e}")))?
        .block_on(parse(bytes, source_type, config))
}

/// Structure a document without extracting anything.
///
/// Returns the structuring statistics (section and candidate counts) so a
/// caller can gauge what a full parse would see. Makes no external calls.
pub fn inspect(
    bytes: &[u8],
    source_type: SourceType,
    config: &ParseConfig,
) -> Result<ParseStats, SyllabusError> {
    let start = Instant::now();
    let intermediate = structurer::structure(bytes, source_type, config)?;
    let mut stats = ParseStats::of(&intermediate);
    stats.structure_ms = start.elapsed().as_millis() as u64;
    stats.total_ms = stats.structure_ms;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ParseCache;
    use std::sync::Arc;

    const SYLLABUS: &str = "CS 101: Intro to Programming\nFall 2025\nGrading\nMidterm 30% April 23rd\nFinal 40% June 11th 2:45pm\nHomework 20%\n";

    #[tokio::test]
    async fn rule_mode_end_to_end() {
        let config = ParseConfig::builder().academic_year(2025).build().unwrap();
        let outcome = parse_text(SYLLABUS, &config).await.unwrap();
        assert_eq!(outcome.document.assessments.len(), 3);
        assert_eq!(outcome.confidence.assessment_count, 3);
        assert!(outcome.confidence.mean > 0.5);
        assert!(outcome.interpretation_failure.is_none());
        assert!(!outcome.from_cache);
        assert_eq!(outcome.document.metadata.source_type, SourceType::Txt);
    }

    #[tokio::test]
    async fn hybrid_without_interpreter_degrades_to_rule() {
        let rule_config = ParseConfig::builder().academic_year(2025).build().unwrap();
        let hybrid_config = ParseConfig::builder()
            .mode(ParseMode::Hybrid)
            .academic_year(2025)
            .build()
            .unwrap();
        let rule = parse_text(SYLLABUS, &rule_config).await.unwrap();
        let hybrid = parse_text(SYLLABUS, &hybrid_config).await.unwrap();
        assert_eq!(rule.document, hybrid.document);
        assert!(hybrid.stats.interpret_ms.is_none());
    }

    #[tokio::test]
    async fn second_parse_is_served_from_cache() {
        let cache = Arc::new(ParseCache::new());
        let config = ParseConfig::builder()
            .academic_year(2025)
            .cache(Arc::clone(&cache))
            .build()
            .unwrap();
        let first = parse_text(SYLLABUS, &config).await.unwrap();
        assert!(!first.from_cache);
        let second = parse_text(SYLLABUS, &config).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(first.document, second.document);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_document() {
        let config = ParseConfig::default();
        let outcome = parse(b"", SourceType::Txt, &config).await.unwrap();
        assert!(outcome.document.assessments.is_empty());
        assert_eq!(outcome.confidence, ConfidenceSummary::default());
    }

    #[test]
    fn sync_wrapper_matches_async() {
        let config = ParseConfig::builder().academic_year(2025).build().unwrap();
        let outcome = parse_sync(SYLLABUS.as_bytes(), SourceType::Txt, &config).unwrap();
        assert_eq!(outcome.document.assessments.len(), 3);
    }

    #[test]
    fn inspect_reports_structure_only() {
        let config = ParseConfig::default();
        let stats = inspect(SYLLABUS.as_bytes(), SourceType::Txt, &config).unwrap();
        assert_eq!(stats.sections, 2); // preamble + grading
        assert!(stats.candidate_percentages >= 3);
        assert!(stats.candidate_dates >= 2);
        assert_eq!(stats.extract_ms, 0);
    }

    #[test]
    fn confidence_summary_counts_low_items() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mut a = crate::schema::Assessment::new("A", crate::schema::AssessmentType::Quiz);
        a.confidence = 0.9;
        let mut b = crate::schema::Assessment::new("B", crate::schema::AssessmentType::Quiz);
        b.confidence = 0.3;
        doc.assessments = vec![a, b];
        let summary = ConfidenceSummary::of(&doc);
        assert!((summary.mean - 0.6).abs() < 1e-9);
        assert!((summary.min - 0.3).abs() < 1e-9);
        assert_eq!(summary.low_confidence_count, 1);
    }
}
