//! Redline artifact generation.
//!
//! Rewrites `word/document.xml`, replacing each clause that carries a live
//! suggestion with tracked-change markup: the original runs wrapped in
//! `<w:del>` as `<w:delText>`, and the top suggestion inserted via `<w:ins>`.
//! Every byte outside an edited clause's paragraph spans is copied from the
//! source verbatim, which is what keeps untouched paragraphs byte-identical.
//!
//! The `w:id` stamped on both markers is the clause ordinal; the clean
//! generator addresses accept/reject decisions through it.

use quick_xml::escape::escape;

use crate::config::RedlineConfig;
use crate::error::{EngineError, Result};
use crate::extract::DocxDocument;
use crate::models::{AnalysisResult, Clause, Decision, Paragraph};

/// Generate the redline `.docx` for an analyzed document.
pub fn generate_redline(
    doc: &DocxDocument,
    result: &AnalysisResult,
    config: &RedlineConfig,
) -> Result<Vec<u8>> {
    if result.paragraph_count != doc.paragraphs.len() {
        return Err(EngineError::Generation(format!(
            "analysis covers {} paragraphs but document has {}",
            result.paragraph_count,
            doc.paragraphs.len()
        )));
    }

    let mut edits: Vec<&Clause> = result
        .clauses
        .iter()
        .filter(|c| !c.suggestions.is_empty() && c.decision != Decision::Rejected)
        .collect();
    edits.sort_by_key(|c| c.para_start);

    let date = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let xml = doc.document_xml();
    let mut out = Vec::with_capacity(xml.len());
    let mut cursor = 0usize;

    for clause in edits {
        let first = paragraph_at(doc, clause.para_start)?;
        let last = paragraph_at(doc, clause.para_end)?;
        let (start, end) = (first.span.0, last.span.1);
        if start < cursor || end > xml.len() {
            return Err(EngineError::Generation(format!(
                "clause {} spans {}..{} cannot be anchored (cursor {})",
                clause.id, start, end, cursor
            )));
        }

        out.extend_from_slice(&xml[cursor..start]);

        let suggestion = clause
            .best_suggestion()
            .ok_or_else(|| EngineError::Generation("edit clause lost its suggestion".to_string()))?;

        for index in clause.para_start..=clause.para_end {
            let para = paragraph_at(doc, index)?;
            let insert = if index == clause.para_start {
                Some(suggestion.replacement.as_str())
            } else {
                None
            };
            write_redline_paragraph(&mut out, doc, para, clause.id, insert, config, &date);
        }

        cursor = end;
    }

    out.extend_from_slice(&xml[cursor..]);
    doc.rebuild(&out)
}

fn paragraph_at(doc: &DocxDocument, index: usize) -> Result<&Paragraph> {
    doc.paragraphs.get(index).ok_or_else(|| {
        EngineError::Generation(format!("paragraph index {} out of range", index))
    })
}

/// One rewritten paragraph: original properties, the original runs deleted,
/// and (on the clause's first paragraph) the suggestion inserted.
fn write_redline_paragraph(
    out: &mut Vec<u8>,
    doc: &DocxDocument,
    para: &Paragraph,
    clause_id: u32,
    insert: Option<&str>,
    config: &RedlineConfig,
    date: &str,
) {
    let author = escape(config.author.as_str());

    out.extend_from_slice(b"<w:p>");
    if let Some((start, end)) = para.ppr_span {
        out.extend_from_slice(&doc.document_xml()[start..end]);
    }

    if !para.runs.is_empty() {
        out.extend_from_slice(
            format!(
                "<w:del w:id=\"{}\" w:author=\"{}\" w:date=\"{}\">",
                clause_id, author, date
            )
            .as_bytes(),
        );
        for run in &para.runs {
            out.extend_from_slice(b"<w:r>");
            write_run_properties(out, run.bold, run.italic, run.underline);
            out.extend_from_slice(b"<w:delText xml:space=\"preserve\">");
            out.extend_from_slice(escape(run.text.as_str()).as_bytes());
            out.extend_from_slice(b"</w:delText></w:r>");
        }
        out.extend_from_slice(b"</w:del>");
    }

    if let Some(text) = insert {
        out.extend_from_slice(
            format!(
                "<w:ins w:id=\"{}\" w:author=\"{}\" w:date=\"{}\">",
                clause_id, author, date
            )
            .as_bytes(),
        );
        out.extend_from_slice(b"<w:r><w:t xml:space=\"preserve\">");
        out.extend_from_slice(escape(text).as_bytes());
        out.extend_from_slice(b"</w:t></w:r>");
        out.extend_from_slice(b"</w:ins>");
    }

    out.extend_from_slice(b"</w:p>");
}

fn write_run_properties(out: &mut Vec<u8>, bold: bool, italic: bool, underline: bool) {
    if !(bold || italic || underline) {
        return;
    }
    out.extend_from_slice(b"<w:rPr>");
    if bold {
        out.extend_from_slice(b"<w:b/>");
    }
    if italic {
        out.extend_from_slice(b"<w:i/>");
    }
    if underline {
        out.extend_from_slice(b"<w:u w:val=\"single\"/>");
    }
    out.extend_from_slice(b"</w:rPr>");
}
