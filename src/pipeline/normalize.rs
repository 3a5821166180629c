//! Validation and normalization: the last stage before a document reaches
//! the caller.
//!
//! Everything the schema promises is enforced here, not merely hoped for.
//! Candidate documents from the interpretation service may carry clamped-out
//! confidences, raw date phrases, dangling category references, duplicate
//! assessments, and missing IDs; each violation is repaired (strip, null,
//! default) rather than rejected, and each repair is recorded as a
//! [`QualityFlag`] the caller can surface.
//!
//! The merge policy is whole-category fallback only: when the candidate is
//! entirely empty the fallback document substitutes wholesale, and when the
//! candidate is missing a whole block of data (no meeting times at all, no
//! assessments at all) that block is filled from the fallback. Per-field
//! merging between the two extractors is deliberately out of scope — it
//! produces inconsistent half-merged records.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ParseConfig;
use crate::dates;
use crate::error::InterpretationFailure;
use crate::pipeline::rules::slug;
use crate::schema::{Assessment, AssessmentType, SyllabusDocument};

/// Weight sums above this are repaired. Categories may double-count a little
/// intentionally, so the cap sits above 100.
const WEIGHT_SUM_CAP: f64 = 110.0;

/// One recorded repair or anomaly from normalization.
///
/// Flags are informational; the document itself is always valid after
/// normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityFlag {
    /// Assessment weights summed above the cap before repair.
    WeightSumExceeded { sum: f64 },
    /// A weight was nulled to bring the sum under the cap.
    WeightDropped { assessment_id: String },
    /// A weight outside 0–100 was nulled.
    WeightOutOfRange { assessment_id: String },
    /// `category_id` referenced no known category and was nulled.
    DanglingCategoryRef { assessment_id: String },
    /// A due date could not be parsed and was nulled.
    UnparsedDueDate { assessment_id: String, raw: String },
    /// A confidence outside [0, 1] was clamped.
    ConfidenceClamped { assessment_id: String },
    /// A recurrence with an unparseable `until` had it nulled.
    InvalidRecurrence { assessment_id: String },
    /// The interpretation service failed; the rule-based result was used.
    InterpreterFellBack { failure: InterpretationFailure },
    /// A whole block of data came from the fallback document.
    FilledFromFallback { block: String },
}

/// Enforce the schema on `candidate`, filling gaps from `fallback`.
///
/// Always returns a valid document; never fails. The flags describe every
/// repair made.
pub fn validate_and_normalize(
    candidate: SyllabusDocument,
    fallback: Option<&SyllabusDocument>,
    config: &ParseConfig,
) -> (SyllabusDocument, Vec<QualityFlag>) {
    let mut flags = Vec::new();
    let mut doc = fill_from_fallback(candidate, fallback, &mut flags);

    let year = config.year_for(doc.course.term.as_deref());

    normalize_course(&mut doc, config);
    normalize_categories(&mut doc);
    normalize_assessments(&mut doc, year, config, &mut flags);
    dedup_assessments(&mut doc);
    assign_assessment_ids(&mut doc);
    null_dangling_category_refs(&mut doc, &mut flags);
    enforce_weight_cap(&mut doc, &mut flags);

    debug!(
        assessments = doc.assessments.len(),
        flags = flags.len(),
        "document normalized"
    );
    (doc, flags)
}

// ── Fallback merge ───────────────────────────────────────────────────────

fn fill_from_fallback(
    candidate: SyllabusDocument,
    fallback: Option<&SyllabusDocument>,
    flags: &mut Vec<QualityFlag>,
) -> SyllabusDocument {
    let Some(fallback) = fallback else {
        return candidate;
    };
    if candidate.is_empty() && !fallback.is_empty() {
        flags.push(QualityFlag::FilledFromFallback {
            block: "document".into(),
        });
        return fallback.clone();
    }

    let mut doc = candidate;
    let mut fill = |block: &str| {
        flags.push(QualityFlag::FilledFromFallback {
            block: block.into(),
        });
    };

    let course_empty =
        doc.course.code.is_none() && doc.course.title.is_none() && doc.course.term.is_none();
    let fb_course_present = fallback.course.code.is_some()
        || fallback.course.title.is_some()
        || fallback.course.term.is_some();
    if course_empty && fb_course_present {
        doc.course.code = fallback.course.code.clone();
        doc.course.title = fallback.course.title.clone();
        doc.course.term = fallback.course.term.clone();
        fill("course");
    }
    if doc.course.instructors.is_empty() && !fallback.course.instructors.is_empty() {
        doc.course.instructors = fallback.course.instructors.clone();
        fill("instructors");
    }
    if doc.course.meeting_times.is_empty() && !fallback.course.meeting_times.is_empty() {
        doc.course.meeting_times = fallback.course.meeting_times.clone();
        fill("meeting_times");
    }
    if doc.assessments.is_empty() && !fallback.assessments.is_empty() {
        doc.assessments = fallback.assessments.clone();
        if doc.categories.is_empty() {
            doc.categories = fallback.categories.clone();
        }
        fill("assessments");
    } else if doc.categories.is_empty() && !fallback.categories.is_empty() {
        doc.categories = fallback.categories.clone();
        fill("categories");
    }
    if doc.late_pass_policy.is_empty() && !fallback.late_pass_policy.is_empty() {
        doc.late_pass_policy = fallback.late_pass_policy.clone();
        fill("late_pass_policy");
    }
    doc
}

// ── Course ───────────────────────────────────────────────────────────────

fn normalize_course(doc: &mut SyllabusDocument, config: &ParseConfig) {
    if doc.course.timezone.is_none() {
        doc.course.timezone = Some(config.timezone.clone());
    }
    for mt in &mut doc.course.meeting_times {
        mt.start_time = norm_time(mt.start_time.take());
        mt.end_time = norm_time(mt.end_time.take());
    }
    let mut seen = Vec::new();
    doc.course.meeting_times.retain(|mt| {
        if seen.contains(mt) {
            false
        } else {
            seen.push(mt.clone());
            true
        }
    });
}

/// Normalize a time string to 24-hour "HH:MM"; unparseable becomes `None`.
fn norm_time(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_ascii()
        && trimmed.len() == 5
        && trimmed.as_bytes()[2] == b':'
        && trimmed[..2].parse::<u32>().map_or(false, |h| h < 24)
        && trimmed[3..].parse::<u32>().map_or(false, |m| m < 60)
    {
        return Some(trimmed.to_string());
    }
    dates::parse_time(trimmed).map(dates::format_hhmm)
}

// ── Categories ───────────────────────────────────────────────────────────

fn normalize_categories(doc: &mut SyllabusDocument) {
    for cat in &mut doc.categories {
        cat.name = cat.name.trim().to_string();
        if cat.id.trim().is_empty() {
            cat.id = slug(&cat.name);
        }
    }
    doc.categories.retain(|c| !c.id.is_empty());
    // Duplicate ids collapse into the first occurrence, filling its gaps.
    let mut kept: Vec<crate::schema::AssessmentCategory> = Vec::new();
    for cat in doc.categories.drain(..) {
        if let Some(existing) = kept.iter_mut().find(|k| k.id == cat.id) {
            if existing.weight_percent.is_none() {
                existing.weight_percent = cat.weight_percent;
            }
            if existing.drop_lowest.is_none() {
                existing.drop_lowest = cat.drop_lowest;
            }
        } else {
            kept.push(cat);
        }
    }
    doc.categories = kept;
}

// ── Assessments ──────────────────────────────────────────────────────────

fn normalize_assessments(
    doc: &mut SyllabusDocument,
    year: i32,
    config: &ParseConfig,
    flags: &mut Vec<QualityFlag>,
) {
    doc.assessments.retain(|a| !a.title.trim().is_empty());
    for a in &mut doc.assessments {
        a.title = a.title.trim().to_string();

        if !a.confidence.is_finite() || !(0.0..=1.0).contains(&a.confidence) {
            a.confidence = if a.confidence.is_finite() {
                a.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            flags.push(QualityFlag::ConfidenceClamped {
                assessment_id: flag_id(a),
            });
        }

        if let Some(raw) = a.due_datetime.take() {
            match dates::normalize_datetime(&raw, year) {
                Some((iso, all_day)) => {
                    a.due_datetime = Some(iso);
                    a.all_day = all_day;
                }
                None => {
                    a.all_day = true;
                    flags.push(QualityFlag::UnparsedDueDate {
                        assessment_id: flag_id(a),
                        raw,
                    });
                }
            }
        } else {
            a.all_day = true;
        }

        if a.timezone.trim().is_empty() {
            a.timezone = config.timezone.clone();
        }

        if let Some(w) = a.weight_percent {
            if !w.is_finite() || !(0.0..=100.0).contains(&w) {
                a.weight_percent = None;
                flags.push(QualityFlag::WeightOutOfRange {
                    assessment_id: flag_id(a),
                });
            }
        }

        if let Some(rec) = &mut a.recurrence {
            if rec.interval == 0 {
                rec.interval = 1;
            }
            if rec.count == Some(0) {
                rec.count = None;
            }
            if let Some(until) = rec.until.take() {
                match dates::normalize_datetime(&until, year) {
                    Some((iso, _)) => rec.until = Some(iso),
                    None => flags.push(QualityFlag::InvalidRecurrence {
                        assessment_id: flag_id(a),
                    }),
                }
            }
        }
    }
}

/// The identifier used in flags: the assigned id when present, otherwise the
/// deterministic one this assessment will receive.
fn flag_id(a: &Assessment) -> String {
    if a.id.trim().is_empty() {
        base_id(a)
    } else {
        a.id.clone()
    }
}

fn base_id(a: &Assessment) -> String {
    slug(&format!("{}-{}", a.title, a.assessment_type))
}

fn dedup_key(a: &Assessment) -> (String, AssessmentType) {
    let title = a
        .title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    (title, a.assessment_type)
}

/// Merge duplicates on (normalized title, type), keeping the
/// higher-confidence copy's fields and filling its gaps from the other.
fn dedup_assessments(doc: &mut SyllabusDocument) {
    let mut kept: Vec<Assessment> = Vec::new();
    for a in doc.assessments.drain(..) {
        let key = dedup_key(&a);
        match kept.iter_mut().find(|e| dedup_key(e) == key) {
            Some(existing) => {
                if a.confidence > existing.confidence {
                    let lower = std::mem::replace(existing, a);
                    merge_duplicate(existing, lower);
                } else {
                    merge_duplicate(existing, a);
                }
            }
            None => kept.push(a),
        }
    }
    doc.assessments = kept;
}

fn merge_duplicate(base: &mut Assessment, other: Assessment) {
    if base.due_datetime.is_none() && other.due_datetime.is_some() {
        base.due_datetime = other.due_datetime;
        base.all_day = other.all_day;
    }
    if base.weight_percent.is_none() {
        base.weight_percent = other.weight_percent;
    }
    if base.category_id.is_none() {
        base.category_id = other.category_id;
    }
    if base.recurrence.is_none() {
        base.recurrence = other.recurrence;
    }
    match (&mut base.source_excerpt, other.source_excerpt) {
        (Some(b), Some(o)) if *b != o => {
            b.push_str(" | ");
            b.push_str(&o);
        }
        (b @ None, Some(o)) => *b = Some(o),
        _ => {}
    }
}

/// Deterministic, unique ids: slug of title + type, numeric suffix on
/// collision. Pre-set ids are kept but still de-collided.
fn assign_assessment_ids(doc: &mut SyllabusDocument) {
    let mut taken: Vec<String> = Vec::new();
    for a in &mut doc.assessments {
        let base = if a.id.trim().is_empty() {
            base_id(a)
        } else {
            a.id.trim().to_string()
        };
        let base = if base.is_empty() {
            "assessment".to_string()
        } else {
            base
        };
        let mut id = base.clone();
        let mut n = 2;
        while taken.contains(&id) {
            id = format!("{base}-{n}");
            n += 1;
        }
        taken.push(id.clone());
        a.id = id;
    }
}

fn null_dangling_category_refs(doc: &mut SyllabusDocument, flags: &mut Vec<QualityFlag>) {
    let known: Vec<&str> = doc.categories.iter().map(|c| c.id.as_str()).collect();
    for a in &mut doc.assessments {
        if let Some(cid) = &a.category_id {
            if !known.contains(&cid.as_str()) {
                flags.push(QualityFlag::DanglingCategoryRef {
                    assessment_id: a.id.clone(),
                });
                a.category_id = None;
            }
        }
    }
}

/// Repair weight sums above the cap by nulling the lowest-confidence
/// weights first, flagging each. Never silently truncates: the original sum
/// is recorded before any repair.
fn enforce_weight_cap(doc: &mut SyllabusDocument, flags: &mut Vec<QualityFlag>) {
    let sum = doc.weight_sum();
    if sum <= WEIGHT_SUM_CAP {
        return;
    }
    flags.push(QualityFlag::WeightSumExceeded { sum });
    while doc.weight_sum() > WEIGHT_SUM_CAP {
        let Some(victim) = doc
            .assessments
            .iter_mut()
            .filter(|a| a.weight_percent.is_some())
            .min_by(|a, b| a.confidence.total_cmp(&b.confidence))
        else {
            break;
        };
        victim.weight_percent = None;
        flags.push(QualityFlag::WeightDropped {
            assessment_id: victim.id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        AssessmentCategory, DayOfWeek, Frequency, MeetingTime, MeetingType, Recurrence,
        SourceType,
    };

    fn config() -> ParseConfig {
        ParseConfig::builder().academic_year(2025).build().unwrap()
    }

    fn assessment(title: &str, t: AssessmentType) -> Assessment {
        Assessment::new(title, t)
    }

    #[test]
    fn empty_candidate_substitutes_fallback_wholesale() {
        let candidate = SyllabusDocument::empty(SourceType::Txt);
        let mut fallback = SyllabusDocument::empty(SourceType::Txt);
        fallback.course.code = Some("CS 101".into());
        fallback
            .assessments
            .push(assessment("Midterm", AssessmentType::Midterm));

        let (doc, flags) = validate_and_normalize(candidate, Some(&fallback), &config());
        assert_eq!(doc.course.code.as_deref(), Some("CS 101"));
        assert_eq!(doc.assessments.len(), 1);
        assert!(flags.contains(&QualityFlag::FilledFromFallback {
            block: "document".into()
        }));
    }

    #[test]
    fn missing_block_filled_from_fallback() {
        let mut candidate = SyllabusDocument::empty(SourceType::Txt);
        candidate
            .assessments
            .push(assessment("Final", AssessmentType::Final));
        let mut fallback = SyllabusDocument::empty(SourceType::Txt);
        fallback.course.meeting_times.push(MeetingTime {
            day_of_week: DayOfWeek::Mo,
            start_time: Some("10:00".into()),
            end_time: Some("10:50".into()),
            location: None,
            meeting_type: MeetingType::Lecture,
        });

        let (doc, flags) = validate_and_normalize(candidate, Some(&fallback), &config());
        assert_eq!(doc.course.meeting_times.len(), 1);
        assert_eq!(doc.assessments.len(), 1);
        assert!(flags.contains(&QualityFlag::FilledFromFallback {
            block: "meeting_times".into()
        }));
    }

    #[test]
    fn duplicate_assessments_merge() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mut weighted = assessment("Project 1", AssessmentType::Project);
        weighted.weight_percent = Some(20.0);
        weighted.confidence = 0.7;
        weighted.source_excerpt = Some("Project 1: 20%".into());
        let mut dated = assessment("project 1", AssessmentType::Project);
        dated.due_datetime = Some("Oct 24".into());
        dated.confidence = 0.55;
        dated.source_excerpt = Some("Project 1 — due Oct 24".into());
        doc.assessments = vec![weighted, dated];

        let (out, _flags) = validate_and_normalize(doc, None, &config());
        assert_eq!(out.assessments.len(), 1);
        let merged = &out.assessments[0];
        assert_eq!(merged.title, "Project 1");
        assert_eq!(merged.weight_percent, Some(20.0));
        assert_eq!(merged.due_datetime.as_deref(), Some("2025-10-24"));
        assert!(merged.all_day);
        assert!((merged.confidence - 0.7).abs() < 1e-9);
        assert_eq!(
            merged.source_excerpt.as_deref(),
            Some("Project 1: 20% | Project 1 — due Oct 24")
        );
    }

    #[test]
    fn ids_are_deterministic_and_unique() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        doc.assessments = vec![
            assessment("Midterm 1", AssessmentType::Midterm),
            assessment("Essay", AssessmentType::Assignment),
            assessment("Essay", AssessmentType::Quiz),
        ];
        let (out, _) = validate_and_normalize(doc.clone(), None, &config());
        assert_eq!(out.assessments[0].id, "midterm-1-midterm");
        assert_eq!(out.assessments[1].id, "essay-assignment");
        assert_eq!(out.assessments[2].id, "essay-quiz");

        // Idempotent: normalizing the output changes nothing.
        let (again, _) = validate_and_normalize(out.clone(), None, &config());
        assert_eq!(out, again);
    }

    #[test]
    fn dangling_category_ref_nulled() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mut a = assessment("Quiz 1", AssessmentType::Quiz);
        a.category_id = Some("nonexistent".into());
        doc.assessments.push(a);

        let (out, flags) = validate_and_normalize(doc, None, &config());
        assert!(out.assessments[0].category_id.is_none());
        assert!(matches!(
            flags[0],
            QualityFlag::DanglingCategoryRef { .. }
        ));
    }

    #[test]
    fn resolvable_category_ref_kept() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        doc.categories.push(AssessmentCategory {
            id: "quizzes".into(),
            name: "Quizzes".into(),
            weight_percent: Some(20.0),
            drop_lowest: Some(1),
        });
        let mut a = assessment("Quiz 1", AssessmentType::Quiz);
        a.category_id = Some("quizzes".into());
        doc.assessments.push(a);

        let (out, flags) = validate_and_normalize(doc, None, &config());
        assert_eq!(out.assessments[0].category_id.as_deref(), Some("quizzes"));
        assert!(flags.is_empty());
    }

    #[test]
    fn confidence_clamped() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mut a = assessment("Final", AssessmentType::Final);
        a.confidence = 1.7;
        let mut b = assessment("Quiz", AssessmentType::Quiz);
        b.confidence = f64::NAN;
        doc.assessments = vec![a, b];

        let (out, flags) = validate_and_normalize(doc, None, &config());
        assert!((out.assessments[0].confidence - 1.0).abs() < 1e-9);
        assert_eq!(out.assessments[1].confidence, 0.0);
        assert_eq!(flags.len(), 2);
    }

    #[test]
    fn raw_date_phrase_normalized_or_nulled() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mut a = assessment("Midterm", AssessmentType::Midterm);
        a.due_datetime = Some("April 23rd".into());
        let mut b = assessment("Final", AssessmentType::Final);
        b.due_datetime = Some("TBD".into());
        b.all_day = false;
        doc.assessments = vec![a, b];

        let (out, flags) = validate_and_normalize(doc, None, &config());
        assert_eq!(out.assessments[0].due_datetime.as_deref(), Some("2025-04-23"));
        assert!(out.assessments[0].all_day);
        assert!(out.assessments[1].due_datetime.is_none());
        assert!(out.assessments[1].all_day);
        assert!(matches!(
            flags[0],
            QualityFlag::UnparsedDueDate { ref raw, .. } if raw == "TBD"
        ));
    }

    #[test]
    fn weight_sum_above_cap_repaired_lowest_confidence_first() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mut a = assessment("Midterm", AssessmentType::Midterm);
        a.weight_percent = Some(50.0);
        a.confidence = 0.9;
        let mut b = assessment("Final", AssessmentType::Final);
        b.weight_percent = Some(50.0);
        b.confidence = 0.9;
        let mut c = assessment("Ghost quiz", AssessmentType::Quiz);
        c.weight_percent = Some(40.0);
        c.confidence = 0.2;
        doc.assessments = vec![a, b, c];

        let (out, flags) = validate_and_normalize(doc, None, &config());
        assert!(out.weight_sum() <= WEIGHT_SUM_CAP);
        assert!(out.assessments[2].weight_percent.is_none());
        assert_eq!(out.assessments[0].weight_percent, Some(50.0));
        assert!(flags
            .iter()
            .any(|f| matches!(f, QualityFlag::WeightSumExceeded { sum } if (*sum - 140.0).abs() < 1e-9)));
    }

    #[test]
    fn out_of_range_weight_nulled() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mut a = assessment("Midterm", AssessmentType::Midterm);
        a.weight_percent = Some(250.0);
        doc.assessments.push(a);

        let (out, flags) = validate_and_normalize(doc, None, &config());
        assert!(out.assessments[0].weight_percent.is_none());
        assert!(matches!(flags[0], QualityFlag::WeightOutOfRange { .. }));
    }

    #[test]
    fn meeting_times_normalized_and_deduped() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mt = MeetingTime {
            day_of_week: DayOfWeek::Tu,
            start_time: Some("4:00 pm".into()),
            end_time: Some("5:20pm".into()),
            location: Some("McKenzie 221".into()),
            meeting_type: MeetingType::Lecture,
        };
        doc.course.meeting_times = vec![mt.clone(), mt];

        let (out, _) = validate_and_normalize(doc, None, &config());
        assert_eq!(out.course.meeting_times.len(), 1);
        assert_eq!(out.course.meeting_times[0].start_time.as_deref(), Some("16:00"));
        assert_eq!(out.course.meeting_times[0].end_time.as_deref(), Some("17:20"));
    }

    #[test]
    fn recurrence_repaired() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        let mut a = assessment("Weekly quiz", AssessmentType::Quiz);
        a.recurrence = Some(Recurrence {
            frequency: Frequency::Weekly,
            interval: 0,
            by_day: vec![DayOfWeek::Fr],
            until: Some("whenever".into()),
            count: Some(0),
        });
        doc.assessments.push(a);

        let (out, flags) = validate_and_normalize(doc, None, &config());
        let rec = out.assessments[0].recurrence.as_ref().unwrap();
        assert_eq!(rec.interval, 1);
        assert!(rec.until.is_none());
        assert!(rec.count.is_none());
        assert!(flags
            .iter()
            .any(|f| matches!(f, QualityFlag::InvalidRecurrence { .. })));
    }

    #[test]
    fn empty_title_dropped_and_category_id_assigned() {
        let mut doc = SyllabusDocument::empty(SourceType::Txt);
        doc.assessments.push(assessment("   ", AssessmentType::Quiz));
        doc.categories.push(AssessmentCategory {
            id: "".into(),
            name: "Homework".into(),
            weight_percent: Some(20.0),
            drop_lowest: None,
        });

        let (out, _) = validate_and_normalize(doc, None, &config());
        assert!(out.assessments.is_empty());
        assert_eq!(out.categories[0].id, "homework");
    }

    #[test]
    fn flags_compare_by_value_including_fallback() {
        let fell_back = |secs| QualityFlag::InterpreterFellBack {
            failure: crate::error::InterpretationFailure::Timeout { secs },
        };
        assert_eq!(fell_back(5), fell_back(5));
        assert_ne!(fell_back(5), fell_back(6));
        assert_eq!(
            QualityFlag::WeightSumExceeded { sum: 140.0 },
            QualityFlag::WeightSumExceeded { sum: 140.0 }
        );
    }
}
