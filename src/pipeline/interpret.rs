//! Interpretive extraction: schema-constrained interpretation of the
//! document by an external service.
//!
//! The only stage with network I/O. It is never reachable unless a
//! [`Interpreter`] is configured — not invoked-and-ignored, literally
//! skipped, so a rule-only deployment makes zero external calls.
//!
//! Every failure here is non-fatal: the orchestrator substitutes the
//! rule-based result and the parse still returns a document. There are no
//! retries — a timeout or rate limit is a failure for this request, and the
//! caller may re-invoke the whole pipeline if it wants another attempt.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ParseConfig;
use crate::error::InterpretationFailure;
use crate::pipeline::structurer::{IntermediateDocument, Section};
use crate::prompts::{user_prompt, SYSTEM_PROMPT};
use crate::schema::SyllabusDocument;

/// One prompt pair sent to the service.
#[derive(Debug, Clone)]
pub struct InterpretationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// An external schema-constrained interpretation backend.
///
/// Implementations must be cheap to share (`Arc<dyn Interpreter>` is cloned
/// into the config) and safe to call concurrently. The library ships
/// [`HttpInterpreter`]; tests inject mocks.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Interpret one prompt into a candidate document.
    ///
    /// The returned document may be partial or schema-violating; the
    /// validator repairs it. Implementations report transport and format
    /// problems as [`InterpretationFailure`], never panic.
    async fn interpret(
        &self,
        request: InterpretationRequest,
    ) -> Result<SyllabusDocument, InterpretationFailure>;
}

/// Run the interpretive extractor over an intermediate document.
///
/// Builds a token-reduced prompt from the relevant sections only. When the
/// combined prompt would exceed `config.max_prompt_chars`, the sections are
/// split into groups, one call per group, and the partial documents merged
/// on return. The per-call timeout comes from the config; exceeding it maps
/// to [`InterpretationFailure::Timeout`].
pub async fn run(
    doc: &IntermediateDocument,
    interpreter: &dyn Interpreter,
    config: &ParseConfig,
) -> Result<SyllabusDocument, InterpretationFailure> {
    let relevant = relevant_sections(doc, config);
    if relevant.is_empty() {
        return Err(InterpretationFailure::EmptyResult);
    }

    let year = config.year_for(None);
    let groups = group_sections(&relevant, year, config);
    debug!(
        sections = relevant.len(),
        calls = groups.len(),
        "interpretation prompt built"
    );

    let mut parts = Vec::with_capacity(groups.len());
    for prompt in groups {
        let request = InterpretationRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: prompt,
        };
        let secs = config.interpret_timeout_secs;
        let part = match timeout(Duration::from_secs(secs), interpreter.interpret(request)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(secs, "interpretation call timed out");
                return Err(InterpretationFailure::Timeout { secs });
            }
        };
        parts.push(part);
    }

    let merged = merge_parts(parts);
    if merged.is_empty() {
        return Err(InterpretationFailure::EmptyResult);
    }
    Ok(merged)
}

/// The sections worth sending: the preamble (course info usually lives
/// before any heading) plus any section under a relevant heading.
fn relevant_sections<'a>(
    doc: &'a IntermediateDocument,
    config: &ParseConfig,
) -> Vec<&'a Section> {
    doc.sections
        .iter()
        .filter(|s| match &s.heading {
            Some(h) => config.vocabulary.is_relevant_heading(h),
            None => true,
        })
        .collect()
}

/// Greedily pack sections into prompts no larger than `max_prompt_chars`.
/// A single oversized section still becomes its own call rather than being
/// dropped.
fn group_sections(sections: &[&Section], year: i32, config: &ParseConfig) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    let mut current: Vec<&Section> = Vec::new();
    let mut current_len = 0usize;

    for &section in sections {
        let len = section.content.len()
            + section
                .tables
                .iter()
                .flat_map(|t| t.rows.iter())
                .map(|r| r.iter().map(String::len).sum::<usize>())
                .sum::<usize>();
        if !current.is_empty() && current_len + len > config.max_prompt_chars {
            groups.push(user_prompt(&current, year, &config.timezone));
            current.clear();
            current_len = 0;
        }
        current.push(section);
        current_len += len;
    }
    if !current.is_empty() {
        groups.push(user_prompt(&current, year, &config.timezone));
    }
    groups
}

/// Merge partial documents from split calls.
///
/// Course fields take the first non-null value across parts; list fields
/// concatenate (the validator dedups afterwards); the late policy takes the
/// first non-empty one.
fn merge_parts(parts: Vec<SyllabusDocument>) -> SyllabusDocument {
    let mut parts = parts.into_iter();
    let Some(mut merged) = parts.next() else {
        return SyllabusDocument::empty(crate::schema::SourceType::Txt);
    };
    for part in parts {
        let c = &mut merged.course;
        c.code = c.code.take().or(part.course.code);
        c.title = c.title.take().or(part.course.title);
        c.term = c.term.take().or(part.course.term);
        c.timezone = c.timezone.take().or(part.course.timezone);
        c.instructors.extend(part.course.instructors);
        c.meeting_times.extend(part.course.meeting_times);
        merged.categories.extend(part.categories);
        merged.assessments.extend(part.assessments);
        if merged.late_pass_policy.is_empty() {
            merged.late_pass_policy = part.late_pass_policy;
        }
    }
    merged
}

// ── HTTP backend ─────────────────────────────────────────────────────────

/// Interpreter backed by an OpenAI-compatible chat-completions endpoint
/// with JSON response forcing.
pub struct HttpInterpreter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpInterpreter {
    /// `endpoint` is the full chat-completions URL
    /// (e.g. `https://api.openai.com/v1/chat/completions`).
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl Interpreter for HttpInterpreter {
    async fn interpret(
        &self,
        request: InterpretationRequest,
    ) -> Result<SyllabusDocument, InterpretationFailure> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| InterpretationFailure::RequestFailed {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(InterpretationFailure::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(InterpretationFailure::RequestFailed {
                detail: format!("HTTP {status}"),
            });
        }

        let chat: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| InterpretationFailure::Malformed {
                    detail: format!("response envelope: {e}"),
                })?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(InterpretationFailure::EmptyResult)?;
        if content.trim().is_empty() {
            return Err(InterpretationFailure::EmptyResult);
        }

        serde_json::from_str(content).map_err(|e| InterpretationFailure::Malformed {
            detail: e.to_string(),
        })
    }
}
