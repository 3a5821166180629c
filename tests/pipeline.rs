//! End-to-end pipeline tests against the public API.
//!
//! Everything here goes through `parse`/`parse_text` the way a caller
//! would; extractor internals have their own unit tests.

use async_trait::async_trait;
use std::sync::Arc;
use syllaparse::{
    parse, parse_text, AssessmentType, DayOfWeek, InterpretationFailure, InterpretationRequest,
    Interpreter, MeetingType, ParseConfig, ParseMode, SourceType, SyllabusDocument,
};

fn rule_config() -> ParseConfig {
    ParseConfig::builder().academic_year(2025).build().unwrap()
}

const THREE_ASSESSMENTS: &str =
    "Grading\nMidterm 1 30% April 23rd\nFinal 40% June 11th 2:45pm\nHomework 20%\n";

#[tokio::test]
async fn three_assessment_scenario() {
    let outcome = parse_text(THREE_ASSESSMENTS, &rule_config()).await.unwrap();
    let doc = &outcome.document;
    assert_eq!(doc.assessments.len(), 3);

    let types: Vec<AssessmentType> = doc.assessments.iter().map(|a| a.assessment_type).collect();
    assert!(types.contains(&AssessmentType::Midterm));
    assert!(types.contains(&AssessmentType::Final));
    assert!(types.contains(&AssessmentType::Assignment));

    let midterm = doc
        .assessments
        .iter()
        .find(|a| a.assessment_type == AssessmentType::Midterm)
        .unwrap();
    assert_eq!(midterm.due_datetime.as_deref(), Some("2025-04-23"));
    assert!(midterm.all_day);

    let fin = doc
        .assessments
        .iter()
        .find(|a| a.assessment_type == AssessmentType::Final)
        .unwrap();
    assert_eq!(fin.due_datetime.as_deref(), Some("2025-06-11T14:45:00"));
    assert!(!fin.all_day);
}

#[tokio::test]
async fn meeting_time_scenario() {
    let outcome = parse_text("TuTh 4:00-5:20pm McKenzie 221\n", &rule_config())
        .await
        .unwrap();
    let times = &outcome.document.course.meeting_times;
    assert_eq!(times.len(), 2);
    assert_eq!(times[0].day_of_week, DayOfWeek::Tu);
    assert_eq!(times[1].day_of_week, DayOfWeek::Th);
    for t in times {
        assert_eq!(t.start_time.as_deref(), Some("16:00"));
        assert_eq!(t.end_time.as_deref(), Some("17:20"));
        assert_eq!(t.location.as_deref(), Some("McKenzie 221"));
        assert_eq!(t.meeting_type, MeetingType::Lecture);
    }
}

#[tokio::test]
async fn no_extractable_text_is_not_an_error() {
    let outcome = parse(b"", SourceType::Txt, &rule_config()).await.unwrap();
    let doc = &outcome.document;
    assert!(doc.assessments.is_empty());
    assert!(doc.course.meeting_times.is_empty());
    assert_eq!(doc.metadata.source_type, SourceType::Txt);
}

#[tokio::test]
async fn unrelated_text_yields_sparse_document() {
    let outcome = parse_text(
        "Once upon a time there was a course with no dates at all.\n",
        &rule_config(),
    )
    .await
    .unwrap();
    assert!(outcome.document.assessments.is_empty());
    assert_eq!(outcome.confidence.assessment_count, 0);
}

#[tokio::test]
async fn weight_and_schedule_mentions_dedup() {
    let text = "Grading\nProject 1: 20%\nSchedule\nProject 1 — due Oct 24\n";
    let outcome = parse_text(text, &rule_config()).await.unwrap();
    let doc = &outcome.document;
    assert_eq!(doc.assessments.len(), 1);
    let merged = &doc.assessments[0];
    assert_eq!(merged.title, "Project 1");
    assert_eq!(merged.weight_percent, Some(20.0));
    assert_eq!(merged.due_datetime.as_deref(), Some("2025-10-24"));
}

#[tokio::test]
async fn rule_mode_is_idempotent() {
    let config = rule_config();
    let first = parse_text(THREE_ASSESSMENTS, &config).await.unwrap();
    let second = parse_text(THREE_ASSESSMENTS, &config).await.unwrap();
    assert_eq!(first.document, second.document);
}

/// Interpreter that always fails, for the fallback property.
struct FailingInterpreter;

#[async_trait]
impl Interpreter for FailingInterpreter {
    async fn interpret(
        &self,
        _request: InterpretationRequest,
    ) -> Result<SyllabusDocument, InterpretationFailure> {
        Err(InterpretationFailure::Malformed {
            detail: "not json".into(),
        })
    }
}

#[tokio::test]
async fn hybrid_with_failing_interpreter_equals_rule_mode() {
    let rule = parse_text(THREE_ASSESSMENTS, &rule_config()).await.unwrap();

    let hybrid_config = ParseConfig::builder()
        .mode(ParseMode::Hybrid)
        .interpreter(Arc::new(FailingInterpreter))
        .academic_year(2025)
        .build()
        .unwrap();
    let hybrid = parse_text(THREE_ASSESSMENTS, &hybrid_config).await.unwrap();

    assert_eq!(rule.document, hybrid.document);
    assert!(matches!(
        hybrid.interpretation_failure,
        Some(InterpretationFailure::Malformed { .. })
    ));
}

/// Interpreter that returns a fixed partial document, for the merge path.
struct PartialInterpreter;

#[async_trait]
impl Interpreter for PartialInterpreter {
    async fn interpret(
        &self,
        _request: InterpretationRequest,
    ) -> Result<SyllabusDocument, InterpretationFailure> {
        // Assessments only; meeting times are missing and must come from
        // the rule-based fallback.
        serde_json::from_str(
            r#"{
                "assessments": [{
                    "title": "Reading responses",
                    "category_id": null,
                    "type": "assignment",
                    "due_datetime": null,
                    "weight_percent": 10.0,
                    "recurrence": null,
                    "confidence": 0.6,
                    "source_excerpt": "weekly reading responses (10%)"
                }]
            }"#,
        )
        .map_err(|e| InterpretationFailure::Malformed {
            detail: e.to_string(),
        })
    }
}

#[tokio::test]
async fn hybrid_fills_missing_blocks_from_rules() {
    let text = "TuTh 4:00-5:20pm McKenzie 221\nGrading\nWeekly reading responses are worth 10%.\n";
    let config = ParseConfig::builder()
        .mode(ParseMode::Hybrid)
        .interpreter(Arc::new(PartialInterpreter))
        .academic_year(2025)
        .build()
        .unwrap();
    let outcome = parse_text(text, &config).await.unwrap();
    let doc = &outcome.document;

    // Candidate assessments from the interpreter, meeting times from rules.
    assert_eq!(doc.assessments.len(), 1);
    assert_eq!(doc.assessments[0].title, "Reading responses");
    assert_eq!(doc.course.meeting_times.len(), 2);
    assert!(outcome.interpretation_failure.is_none());
}

#[tokio::test]
async fn weight_sum_never_exceeds_cap() {
    let text = "Grading\nHomework 60%\nProject 60%\nMidterm 60%\n";
    let outcome = parse_text(text, &rule_config()).await.unwrap();
    assert!(outcome.document.weight_sum() <= 110.0);
    assert!(!outcome.flags.is_empty());
}

#[tokio::test]
async fn category_references_resolve() {
    let text = "Grading\nQuizzes: 20% (drop the 2 lowest)\nFinal 40%\n";
    let outcome = parse_text(text, &rule_config()).await.unwrap();
    let doc = &outcome.document;
    assert!(!doc.categories.is_empty());
    for a in &doc.assessments {
        if let Some(cid) = &a.category_id {
            assert!(doc.categories.iter().any(|c| &c.id == cid), "dangling {cid}");
        }
    }
    let quizzes = doc.categories.iter().find(|c| c.name == "Quizzes").unwrap();
    assert_eq!(quizzes.drop_lowest, Some(2));
}

#[tokio::test]
async fn ids_unique_and_confidence_in_range() {
    let text = "CS 303E: Elements of Computers and Programming\nFall 2025\n\
        Instructor: Ada Lovelace (ada@university.edu)\n\
        MWF 10-10:50 Gates B01\n\
        Grading\nMidterm 1 30% April 23rd\nFinal 40% June 11th 2:45pm\nHomework 20%\n\
        Quizzes: 10% (drop the lowest)\n\
        Schedule\nProject 1 is due Oct 24 at 11:59pm.\n\
        You have 3 late days; each grants a 1-day extension.\n";
    let outcome = parse_text(text, &rule_config()).await.unwrap();
    let doc = &outcome.document;

    let mut ids: Vec<&str> = doc.assessments.iter().map(|a| a.id.as_str()).collect();
    ids.extend(doc.categories.iter().map(|c| c.id.as_str()));
    let before = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), before, "duplicate ids");
    assert!(ids.iter().all(|id| !id.is_empty()));

    for a in &doc.assessments {
        assert!((0.0..=1.0).contains(&a.confidence), "{}: {}", a.title, a.confidence);
    }

    assert_eq!(doc.course.code.as_deref(), Some("CS 303E"));
    assert_eq!(doc.late_pass_policy.total_allowed, Some(3));
    assert_eq!(doc.late_pass_policy.extension_days, Some(1));
}

#[tokio::test]
async fn document_round_trips_through_disk() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
    file.write_all(THREE_ASSESSMENTS.as_bytes()).unwrap();

    let bytes = std::fs::read(file.path()).unwrap();
    let outcome = parse(&bytes, SourceType::Txt, &rule_config()).await.unwrap();

    let json = serde_json::to_string(&outcome.document).unwrap();
    let back: SyllabusDocument = serde_json::from_str(&json).unwrap();
    assert_eq!(outcome.document, back);
}

#[tokio::test]
async fn docx_garbage_is_a_structural_error() {
    let err = parse(b"not a zip archive", SourceType::Docx, &rule_config()).await;
    assert!(err.is_err());
}
