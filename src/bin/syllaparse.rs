//! CLI binary for syllaparse.
//!
//! A thin shim over the library crate that maps CLI flags to `ParseConfig`
//! and prints the resulting SyllabusDocument as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use syllaparse::{
    inspect, parse, HttpInterpreter, ParseConfig, ParseMode, ParseOutcome, SourceType,
};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Rule-based parse (no API key needed)
  syllaparse syllabus.pdf

  # Plain-text input, explicit academic year
  syllaparse --year 2025 notes.txt

  # Hybrid mode against an OpenAI-compatible endpoint
  export SYLLAPARSE_API_KEY=sk-...
  syllaparse --mode hybrid --model gpt-4.1-mini syllabus.pdf

  # Structure inspection only (section/candidate counts)
  syllaparse --inspect-only syllabus.docx

  # Full outcome (flags, stats, confidence) instead of just the document
  syllaparse --full syllabus.pdf > outcome.json

ENVIRONMENT VARIABLES:
  SYLLAPARSE_API_KEY    API key for the interpretation service (hybrid mode)
  SYLLAPARSE_ENDPOINT   Chat-completions URL
                        (default: https://api.openai.com/v1/chat/completions)
  SYLLAPARSE_MODEL      Model ID for the interpretation service

MODES:
  rule     Regex/keyword extraction only. Zero external calls. (default)
  hybrid   Rule + external interpretation, merged; falls back to the
           rule-based result on any service failure. Requires
           SYLLAPARSE_API_KEY (or --api-key)."#;

/// Extract structured course data from a syllabus document.
#[derive(Parser, Debug)]
#[command(
    name = "syllaparse",
    version,
    about = "Extract assignments, meeting times, and grading rules from syllabus files",
    long_about = "Parse a syllabus (PDF, DOCX, or plain text) into a normalized JSON document \
of assessments, meeting times, grading categories, and late policy, each extraction carrying \
a confidence value. Rule-based by default; hybrid mode adds an external schema-constrained \
interpretation service with rule-based fallback.",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the syllabus file (.pdf, .docx, or .txt).
    input: PathBuf,

    /// Extraction mode: rule or hybrid.
    #[arg(long, value_enum, env = "SYLLAPARSE_MODE", default_value = "rule")]
    mode: ModeArg,

    /// Source type override; inferred from the file extension if not set.
    #[arg(long, value_enum)]
    source_type: Option<SourceArg>,

    /// Academic year for dates without one (e.g. 2025).
    #[arg(long)]
    year: Option<i32>,

    /// Term hint for year inference (e.g. "Fall 2025").
    #[arg(long)]
    term: Option<String>,

    /// Timezone stamped on assessments (default: America/Los_Angeles).
    #[arg(long, env = "SYLLAPARSE_TIMEZONE")]
    timezone: Option<String>,

    /// Interpretation-service API key (hybrid mode).
    #[arg(long, env = "SYLLAPARSE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Interpretation-service chat-completions URL.
    #[arg(
        long,
        env = "SYLLAPARSE_ENDPOINT",
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    endpoint: String,

    /// Interpretation-service model ID.
    #[arg(long, env = "SYLLAPARSE_MODEL", default_value = "gpt-4.1-mini")]
    model: String,

    /// Per-call interpretation timeout in seconds.
    #[arg(long, env = "SYLLAPARSE_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Print structuring statistics only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Print the full ParseOutcome (flags, stats, confidence) as JSON.
    #[arg(long)]
    full: bool,

    /// Compact JSON output (default is pretty-printed).
    #[arg(long)]
    compact: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the confidence summary on stderr.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Rule,
    Hybrid,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Pdf,
    Docx,
    Txt,
}

impl From<SourceArg> for SourceType {
    fn from(v: SourceArg) -> Self {
        match v {
            SourceArg::Pdf => SourceType::Pdf,
            SourceArg::Docx => SourceType::Docx,
            SourceArg::Txt => SourceType::Txt,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let source_type = match cli.source_type {
        Some(s) => s.into(),
        None => infer_source_type(&cli.input)?,
    };

    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let config = build_config(&cli)?;

    if cli.inspect_only {
        let stats = inspect(&bytes, source_type, &config).context("structuring failed")?;
        print_json(&stats, cli.compact)?;
        return Ok(());
    }

    let outcome = parse(&bytes, source_type, &config)
        .await
        .context("parse failed")?;

    if cli.full {
        print_json(&outcome, cli.compact)?;
    } else {
        print_json(&outcome.document, cli.compact)?;
    }

    if !cli.quiet {
        print_summary(&outcome);
    }
    Ok(())
}

/// Map CLI args to `ParseConfig`.
fn build_config(cli: &Cli) -> Result<ParseConfig> {
    let mut builder = ParseConfig::builder()
        .interpret_timeout_secs(cli.api_timeout);

    builder = match cli.mode {
        ModeArg::Rule => builder.mode(ParseMode::Rule),
        ModeArg::Hybrid => {
            let api_key = cli.api_key.clone().context(
                "hybrid mode needs an API key (--api-key or SYLLAPARSE_API_KEY)",
            )?;
            builder
                .mode(ParseMode::Hybrid)
                .interpreter(Arc::new(HttpInterpreter::new(
                    cli.endpoint.clone(),
                    api_key,
                    cli.model.clone(),
                )))
        }
    };

    if let Some(year) = cli.year {
        builder = builder.academic_year(year);
    }
    if let Some(ref term) = cli.term {
        builder = builder.term_hint(term.clone());
    }
    if let Some(ref tz) = cli.timezone {
        builder = builder.timezone(tz.clone());
    }

    builder.build().context("invalid configuration")
}

fn infer_source_type(path: &Path) -> Result<SourceType> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => Ok(SourceType::Pdf),
        Some("docx") => Ok(SourceType::Docx),
        Some("txt") | Some("text") | Some("md") => Ok(SourceType::Txt),
        other => anyhow::bail!(
            "cannot infer source type from extension {:?}; pass --source-type",
            other.unwrap_or("<none>")
        ),
    }
}

fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
    .context("failed to serialize output")?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(json.as_bytes()).context("stdout")?;
    handle.write_all(b"\n").ok();
    Ok(())
}

fn print_summary(outcome: &ParseOutcome) {
    let doc = &outcome.document;
    eprintln!(
        "{} assessments, {} meeting times, {} categories  —  mean confidence {:.2} ({} low)",
        doc.assessments.len(),
        doc.course.meeting_times.len(),
        doc.categories.len(),
        outcome.confidence.mean,
        outcome.confidence.low_confidence_count,
    );
    if let Some(failure) = &outcome.interpretation_failure {
        eprintln!("interpretation fell back to rules: {failure}");
    }
    if !outcome.flags.is_empty() {
        eprintln!("{} quality flags (run with --full to see them)", outcome.flags.len());
    }
}
