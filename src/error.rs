//! Error types for the syllaparse library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SyllabusError`] — **Fatal**: no useful document can be produced at
//!   all (corrupt file, invalid configuration). Returned as
//!   `Err(SyllabusError)` from the top-level `parse*` functions. This is the
//!   only error class a caller ever sees.
//!
//! * [`InterpretationFailure`] — **Non-fatal**: the external interpretation
//!   service misbehaved (timeout, rate limit, malformed response, empty
//!   result). The orchestrator recovers locally by falling back to the
//!   rule-based result; the failure surfaces only as a quality flag and a
//!   lower aggregate confidence, never as an `Err`.
//!
//! An unreadable-but-well-formed document (e.g. an image-only PDF with no
//! text layer) is *neither* of these: it produces a valid near-empty
//! [`crate::schema::SyllabusDocument`], which the caller is expected to
//! surface as "nothing found, enter manually".

use thiserror::Error;

/// All fatal errors returned by the syllaparse library.
#[derive(Debug, Error)]
pub enum SyllabusError {
    /// The file could not be parsed as its declared format at all.
    /// This is the one structural failure that blocks the whole parse.
    #[error("Corrupt or unreadable {source_type} document: {detail}")]
    CorruptDocument {
        source_type: crate::schema::SourceType,
        detail: String,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not read the input file (CLI path).
    #[error("Failed to read input '{path}': {source}")]
    InputRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of the external interpretation service.
///
/// Reported to the orchestrator, which substitutes the rule-based result.
/// Never raised as an uncaught error that aborts the parse.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum InterpretationFailure {
    /// The call exceeded the configured timeout. Not retried here — the
    /// caller may re-invoke the whole pipeline if it wants another attempt.
    #[error("Interpretation call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The service returned HTTP 429.
    #[error("Interpretation service rate-limited the request")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The response was not JSON conforming to the SyllabusDocument schema.
    #[error("Interpretation response did not conform to the schema: {detail}")]
    Malformed { detail: String },

    /// The service answered but produced no extractable content.
    #[error("Interpretation service returned an empty result")]
    EmptyResult,

    /// Transport-level failure (connection refused, DNS, 5xx).
    #[error("Interpretation request failed: {detail}")]
    RequestFailed { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SourceType;

    #[test]
    fn corrupt_document_display() {
        let e = SyllabusError::CorruptDocument {
            source_type: SourceType::Pdf,
            detail: "bad xref table".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("pdf"), "got: {msg}");
        assert!(msg.contains("bad xref table"));
    }

    #[test]
    fn timeout_display() {
        let e = InterpretationFailure::Timeout { secs: 30 };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn malformed_display() {
        let e = InterpretationFailure::Malformed {
            detail: "missing field `course`".into(),
        };
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn failures_compare_by_value() {
        let timeout = InterpretationFailure::Timeout { secs: 30 };
        assert_eq!(timeout, timeout.clone());
        assert_ne!(timeout, InterpretationFailure::Timeout { secs: 31 });
        assert_ne!(timeout, InterpretationFailure::EmptyResult);
    }

    #[test]
    fn interpretation_failure_serializes() {
        let e = InterpretationFailure::RateLimited {
            retry_after_secs: Some(60),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: InterpretationFailure = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            InterpretationFailure::RateLimited {
                retry_after_secs: Some(60)
            }
        ));
    }
}
