//! # syllaparse
//!
//! Turn heterogeneous course syllabi (PDF, DOCX, plain text) into a
//! normalized, confidence-scored schema of assessments, meeting times,
//! grading rules, and course metadata.
//!
//! ## Why this crate?
//!
//! Syllabi are wildly inconsistent: grading tables, prose percentages,
//! week-by-week schedules, "TuTh 4:00-5:20pm" meeting lines. Downstream
//! consumers (a scheduler, a calendar exporter, a review UI) need one
//! stable JSON shape with honest confidence values, not best-effort text.
//! This crate extracts that shape with high-precision rules by default and
//! can optionally consult an external schema-constrained interpretation
//! service (an LLM) in hybrid mode, falling back to the rule-based result
//! whenever the service misbehaves.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / DOCX / TXT bytes
//!  │
//!  ├─ 1. Structure   text extraction, section detection, tables, candidates
//!  ├─ 2. Rules       regex/keyword extraction (default path, never fails)
//!  ├─ 3. Interpret   schema-constrained external call (hybrid mode only)
//!  ├─ 4. Normalize   validate, dedup, assign IDs, whole-category fallback
//!  └─ 5. Output      SyllabusDocument + confidence summary + quality flags
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use syllaparse::{parse_sync, ParseConfig, SourceType};
//!
//! let config = ParseConfig::builder().academic_year(2025).build()?;
//! let outcome = parse_sync(
//!     b"Grading\nMidterm 30% April 23rd\nHomework 20%",
//!     SourceType::Txt,
//!     &config,
//! )?;
//! assert_eq!(outcome.document.assessments.len(), 2);
//! println!("{}", serde_json::to_string_pretty(&outcome.document)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Hybrid mode needs an [`Interpreter`]; without one it degrades to rule
//! mode and makes zero external calls:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use syllaparse::{parse, HttpInterpreter, ParseConfig, ParseMode, SourceType};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ParseConfig::builder()
//!     .mode(ParseMode::Hybrid)
//!     .interpreter(Arc::new(HttpInterpreter::new(
//!         "https://api.openai.com/v1/chat/completions",
//!         std::env::var("OPENAI_API_KEY")?,
//!         "gpt-4.1-mini",
//!     )))
//!     .build()?;
//! let bytes = std::fs::read("syllabus.pdf")?;
//! let outcome = parse(&bytes, SourceType::Pdf, &config).await?;
//! eprintln!("mean confidence: {:.2}", outcome.confidence.mean);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `syllaparse` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! syllaparse = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod dates;
pub mod error;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::ParseCache;
pub use config::{ParseConfig, ParseConfigBuilder, ParseMode, Vocabulary};
pub use error::{InterpretationFailure, SyllabusError};
pub use parse::{inspect, parse, parse_sync, parse_text, ConfidenceSummary, ParseOutcome, ParseStats};
pub use pipeline::interpret::{HttpInterpreter, InterpretationRequest, Interpreter};
pub use pipeline::normalize::QualityFlag;
pub use schema::{
    Assessment, AssessmentCategory, AssessmentType, Course, DayOfWeek, DocumentMetadata,
    Frequency, Instructor, LatePassPolicy, MeetingTime, MeetingType, Recurrence, SourceType,
    SyllabusDocument, DEFAULT_TIMEZONE, SCHEMA_VERSION,
};
