//! Pipeline stages for syllabus extraction.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets us swap
//! implementations (e.g. a different interpretation backend) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ structurer ──▶ rules ────┐
//!           (sections,    (regex)    ├──▶ normalize ──▶ SyllabusDocument
//!            tables,   └▶ interpret ─┘    (validate,
//!            candidates)  (external)       dedup, merge)
//! ```
//!
//! 1. [`structurer`] — raw PDF/DOCX/TXT bytes to an [`structurer::IntermediateDocument`]
//! 2. [`rules`]      — pattern-match the intermediate form into the schema;
//!    the default path and the fallback source, never fails, never calls out
//! 3. [`interpret`]  — schema-constrained external interpretation; the only
//!    stage with network I/O, feature-gated and timeout-bounded
//! 4. [`normalize`]  — enforce the schema, normalise dates, dedup, assign
//!    IDs, and apply the whole-category fallback merge

pub mod interpret;
pub mod normalize;
pub mod rules;
pub mod structurer;
