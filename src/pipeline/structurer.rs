//! Document structuring: raw file bytes to a lightly structured
//! intermediate representation.
//!
//! The structurer does no interpretation of its own. It extracts text,
//! splits it into sections under recognised headings, lifts table grids out
//! of the prose, and collects two candidate-signal lists (date-like
//! substrings and percentage-weight substrings, each with surrounding
//! context). Both downstream extractors consume this one representation.
//!
//! A document with no extractable text (an image-only PDF with no text
//! layer) is **not** an error: it yields an intermediate with empty
//! `raw_text` and no sections, both extractors correctly produce near-empty
//! results, and the caller prompts the user for manual entry. Only a file
//! that cannot be parsed as its declared format at all is surfaced as
//! [`SyllabusError::CorruptDocument`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

use crate::config::ParseConfig;
use crate::error::SyllabusError;
use crate::schema::SourceType;

/// Context window around a candidate match, in characters per side.
const DATE_CONTEXT: usize = 30;
const PERCENT_CONTEXT: usize = 25;

/// A raw substring of interest plus the text around it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// The matched substring, verbatim and un-normalised.
    pub text: String,
    /// Surrounding context, used as extraction input and interpretation hint.
    pub context: String,
}

/// A table preserved as a row/column grid, not flattened into prose, so
/// downstream matching can treat tabular grading/schedule data distinctly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableGrid {
    pub rows: Vec<Vec<String>>,
}

/// One detected section of the document.
#[derive(Debug, Clone, Default)]
pub struct Section {
    /// The heading line that opened this section; `None` for the preamble
    /// before any recognised heading.
    pub heading: Option<String>,
    /// Prose content (table rows excluded).
    pub content: String,
    pub tables: Vec<TableGrid>,
    pub candidate_dates: Vec<Candidate>,
    pub candidate_percentages: Vec<Candidate>,
}

/// The intermediate representation handed to both extractors.
///
/// Owned exclusively by the pipeline; never exposed to external callers
/// except through the read-only statistics in [`crate::parse::inspect`].
#[derive(Debug, Clone, Default)]
pub struct IntermediateDocument {
    pub raw_text: String,
    pub sections: Vec<Section>,
    pub source_type: Option<SourceType>,
}

impl IntermediateDocument {
    /// Whether any text at all was extracted.
    pub fn has_text(&self) -> bool {
        !self.raw_text.trim().is_empty()
    }

    /// All candidate dates across sections.
    pub fn all_candidate_dates(&self) -> impl Iterator<Item = &Candidate> {
        self.sections.iter().flat_map(|s| s.candidate_dates.iter())
    }

    /// All candidate percentages across sections.
    pub fn all_candidate_percentages(&self) -> impl Iterator<Item = &Candidate> {
        self.sections
            .iter()
            .flat_map(|s| s.candidate_percentages.iter())
    }
}

// ── Text extraction per source type ──────────────────────────────────────

/// Turn raw file bytes into an [`IntermediateDocument`].
///
/// # Errors
/// [`SyllabusError::CorruptDocument`] when the bytes cannot be parsed as
/// the declared format (bad PDF structure, DOCX that is not a ZIP or lacks
/// `word/document.xml`). No extractable text is *not* an error.
pub fn structure(
    bytes: &[u8],
    source_type: SourceType,
    config: &ParseConfig,
) -> Result<IntermediateDocument, SyllabusError> {
    let text = match source_type {
        SourceType::Pdf => extract_pdf_text(bytes)?,
        SourceType::Docx => extract_docx_text(bytes)?,
        SourceType::Txt => String::from_utf8_lossy(bytes).into_owned(),
    };
    let mut doc = structure_text(&text, config);
    doc.source_type = Some(source_type);
    debug!(
        source = %source_type,
        chars = doc.raw_text.len(),
        sections = doc.sections.len(),
        "structured document"
    );
    Ok(doc)
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, SyllabusError> {
    // pdf-extract returns Ok("") (or whitespace) for image-only PDFs with a
    // valid structure; only structural parse failures become errors.
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| SyllabusError::CorruptDocument {
        source_type: SourceType::Pdf,
        detail: e.to_string(),
    })
}

/// DOCX files are ZIP archives; the body text lives in `word/document.xml`
/// inside `<w:t>` runs, with `</w:p>` closing each paragraph.
fn extract_docx_text(bytes: &[u8]) -> Result<String, SyllabusError> {
    let corrupt = |detail: String| SyllabusError::CorruptDocument {
        source_type: SourceType::Docx,
        detail,
    };
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(format!("not a ZIP archive: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| corrupt("word/document.xml not found".into()))?
        .read_to_string(&mut xml)
        .map_err(|e| corrupt(format!("unreadable document.xml: {e}")))?;
    Ok(text_from_document_xml(&xml))
}

fn text_from_document_xml(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 8);
    let mut rest = xml;
    let mut in_text = false;
    while let Some(lt) = rest.find('<') {
        if in_text {
            out.push_str(&rest[..lt]);
        }
        rest = &rest[lt + 1..];
        let Some(gt) = rest.find('>') else { break };
        let tag = &rest[..gt];
        if tag == "w:t" || tag.starts_with("w:t ") {
            in_text = true;
        } else if tag == "/w:t" {
            in_text = false;
        } else if tag == "/w:p" {
            out.push('\n');
        } else if tag == "w:tab/" || tag == "w:tab" {
            out.push('\t');
        }
        rest = &rest[gt + 1..];
    }
    out
}

// ── Section detection ────────────────────────────────────────────────────

/// Structure already-extracted text: detect sections, lift tables, collect
/// candidates. Shared by all three source types.
pub fn structure_text(text: &str, config: &ParseConfig) -> IntermediateDocument {
    let mut sections: Vec<Section> = Vec::new();
    let mut current = Section::default();
    let mut table_run: Vec<Vec<String>> = Vec::new();

    let flush_table = |section: &mut Section, run: &mut Vec<Vec<String>>| {
        // A lone row is prose with odd spacing, not a table.
        if run.len() >= 2 {
            section.tables.push(TableGrid {
                rows: std::mem::take(run),
            });
        } else {
            for row in run.drain(..) {
                if !section.content.is_empty() {
                    section.content.push('\n');
                }
                section.content.push_str(&row.join(" "));
            }
        }
    };

    for line in text.lines() {
        if is_heading(line, &config.vocabulary.section_headings) {
            flush_table(&mut current, &mut table_run);
            finish_section(&mut sections, current);
            current = Section {
                heading: Some(line.trim().trim_end_matches(':').trim().to_string()),
                ..Section::default()
            };
            continue;
        }
        if let Some(cells) = split_table_row(line) {
            table_run.push(cells);
            continue;
        }
        flush_table(&mut current, &mut table_run);
        if !current.content.is_empty() {
            current.content.push('\n');
        }
        current.content.push_str(line.trim_end());
    }
    flush_table(&mut current, &mut table_run);
    finish_section(&mut sections, current);

    IntermediateDocument {
        raw_text: text.to_string(),
        sections,
        source_type: None,
    }
}

fn finish_section(sections: &mut Vec<Section>, mut section: Section) {
    let searchable = section_searchable_text(&section);
    section.candidate_dates = find_candidate_dates(&searchable);
    section.candidate_percentages = find_candidate_percentages(&searchable);
    // Drop an empty preamble, keep everything else (an empty section under
    // a heading is still a signal the heading existed).
    if section.heading.is_some() || !section.content.trim().is_empty() || !section.tables.is_empty()
    {
        sections.push(section);
    }
}

fn section_searchable_text(section: &Section) -> String {
    let mut s = section.content.clone();
    for table in &section.tables {
        for row in &table.rows {
            s.push('\n');
            s.push_str(&row.join(" | "));
        }
    }
    s
}

/// A line qualifies as a heading when it matches a vocabulary token,
/// optionally followed by a colon, with little else on the line.
fn is_heading(line: &str, vocabulary: &[String]) -> bool {
    let trimmed = line.trim().trim_start_matches('#').trim();
    let stripped = trimmed.trim_end_matches(':').trim();
    if stripped.is_empty() || stripped.len() > 48 || stripped.split_whitespace().count() > 4 {
        return false;
    }
    // Weight lines and table rows ("Homework | 20%") are content, not headings.
    if stripped.chars().any(|c| c.is_ascii_digit()) || stripped.contains('|') || stripped.contains('%') {
        return false;
    }
    let lower = stripped.to_ascii_lowercase();
    vocabulary.iter().any(|tok| {
        lower == *tok
            || (lower.contains(tok.as_str()) && lower.len() <= tok.len() + 16)
    })
}

/// Split a line into table cells if it looks like a table row: pipes, tabs,
/// or runs of two-plus spaces separating at least two non-empty cells.
fn split_table_row(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains('|') {
        let cells: Vec<String> = trimmed
            .split('|')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if cells.len() >= 2 {
            return Some(cells);
        }
    }
    static RE_COLS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+| {2,}").unwrap());
    let cells: Vec<String> = RE_COLS
        .split(trimmed)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if cells.len() >= 2 {
        return Some(cells);
    }
    None
}

// ── Candidate signals ────────────────────────────────────────────────────

static RE_CANDIDATE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        (?: (?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|
             jul(?:y)?|aug(?:ust)?|sep(?:t|tember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)
            \.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?
          | \b\d{1,2}/\d{1,2}(?:/\d{2,4})?\b
        )
        (?:\s+(?:at\s+)?\d{1,2}(?::\d{2})?\s*(?:am|pm)?)?",
    )
    .unwrap()
});

static RE_CANDIDATE_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,3}\s*%").unwrap());

fn context_around(text: &str, start: usize, end: usize, window: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(window)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);
    let to = text[end..]
        .char_indices()
        .take(window + 1)
        .last()
        .map(|(i, _)| end + i)
        .unwrap_or(end);
    let to = text.len().min(to + 1);
    // Snap to char boundaries (context windows may land mid-codepoint).
    let from = (0..=from).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
    let to = (to..=text.len()).find(|&i| text.is_char_boundary(i)).unwrap_or(text.len());
    text[from..to].replace('\n', " ").trim().to_string()
}

fn find_candidate_dates(text: &str) -> Vec<Candidate> {
    RE_CANDIDATE_DATE
        .find_iter(text)
        .map(|m| Candidate {
            text: m.as_str().trim().to_string(),
            context: context_around(text, m.start(), m.end(), DATE_CONTEXT),
        })
        .collect()
}

fn find_candidate_percentages(text: &str) -> Vec<Candidate> {
    RE_CANDIDATE_PERCENT
        .find_iter(text)
        .map(|m| Candidate {
            text: m.as_str().to_string(),
            context: context_around(text, m.start(), m.end(), PERCENT_CONTEXT),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ParseConfig {
        ParseConfig::default()
    }

    #[test]
    fn heading_detection() {
        let vocab = &config().vocabulary.section_headings;
        assert!(is_heading("Grading", vocab));
        assert!(is_heading("Grading:", vocab));
        assert!(is_heading("GRADING POLICY", vocab));
        assert!(is_heading("  Course Schedule  ", vocab));
        assert!(is_heading("## Assignments", vocab));
        assert!(!is_heading("Grading is based on several long components described below", vocab));
        assert!(!is_heading("Welcome to the course", vocab));
    }

    #[test]
    fn sections_split_on_headings() {
        let text = "CS 101 Intro\nWelcome.\nGrading:\nMidterm 30%\nFinal 40%\nSchedule\nWeek 1: Intro";
        let doc = structure_text(text, &config());
        assert_eq!(doc.sections.len(), 3);
        assert_eq!(doc.sections[0].heading, None);
        assert_eq!(doc.sections[1].heading.as_deref(), Some("Grading"));
        assert_eq!(doc.sections[2].heading.as_deref(), Some("Schedule"));
        assert!(doc.sections[1].content.contains("Midterm 30%"));
    }

    #[test]
    fn tables_lifted_from_prose() {
        let text = "Grading\nAssessment | Weight\nHomework | 20%\nMidterm | 30%\nLectures are recorded.";
        let doc = structure_text(text, &config());
        let grading = &doc.sections[0];
        assert_eq!(grading.tables.len(), 1);
        assert_eq!(grading.tables[0].rows.len(), 3);
        assert_eq!(grading.tables[0].rows[1], vec!["Homework", "20%"]);
        assert!(grading.content.contains("Lectures are recorded."));
    }

    #[test]
    fn multispace_columns_make_tables() {
        let text = "Schedule\nWeek 1    Jan 13    Intro\nWeek 2    Jan 20    Types";
        let doc = structure_text(text, &config());
        assert_eq!(doc.sections[0].tables.len(), 1);
        assert_eq!(doc.sections[0].tables[0].rows[0].len(), 3);
    }

    #[test]
    fn lone_wide_line_stays_prose() {
        let text = "Office hours:  MW 2-3pm\nPlease email ahead.";
        let doc = structure_text(text, &config());
        assert!(doc.sections[0].tables.is_empty());
        assert!(doc.sections[0].content.contains("Office hours"));
    }

    #[test]
    fn candidate_dates_with_context() {
        let text = "Grading\nThe midterm is on October 24 in class.\nFinal due 6/11 2:45pm sharp.";
        let doc = structure_text(text, &config());
        let dates: Vec<_> = doc.all_candidate_dates().collect();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].text, "October 24");
        assert!(dates[0].context.contains("midterm"));
        assert!(dates[1].text.starts_with("6/11"));
        assert!(dates[1].text.contains("2:45pm"));
    }

    #[test]
    fn candidate_percentages_with_context() {
        let text = "Grading\nHomework is worth 20% of the grade; the final exam 40 %.";
        let doc = structure_text(text, &config());
        let pcts: Vec<_> = doc.all_candidate_percentages().collect();
        assert_eq!(pcts.len(), 2);
        assert_eq!(pcts[0].text, "20%");
        assert!(pcts[0].context.contains("Homework"));
        assert_eq!(pcts[1].text, "40 %");
    }

    #[test]
    fn txt_bytes_pass_through() {
        let doc = structure(b"Grading\nMidterm 30%", SourceType::Txt, &config()).unwrap();
        assert!(doc.has_text());
        assert_eq!(doc.source_type, Some(SourceType::Txt));
    }

    #[test]
    fn empty_text_is_valid_not_error() {
        let doc = structure(b"", SourceType::Txt, &config()).unwrap();
        assert!(!doc.has_text());
        assert!(doc.sections.is_empty());
    }

    #[test]
    fn docx_xml_text_extraction() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Grading</w:t></w:r></w:p>
            <w:p><w:r><w:t xml:space="preserve">Midterm </w:t></w:r><w:r><w:t>30%</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = text_from_document_xml(xml);
        assert!(text.contains("Grading\n"));
        assert!(text.contains("Midterm 30%"));
    }

    #[test]
    fn docx_not_a_zip_is_corrupt() {
        let err = structure(b"definitely not a zip", SourceType::Docx, &config());
        assert!(matches!(
            err,
            Err(SyllabusError::CorruptDocument {
                source_type: SourceType::Docx,
                ..
            })
        ));
    }

    #[test]
    fn pdf_garbage_is_corrupt() {
        let err = structure(b"\x00\x01\x02 not a pdf", SourceType::Pdf, &config());
        assert!(err.is_err());
    }
}
