//! Clean artifact generation: apply accept/reject decisions to a redlined
//! document and strip every tracked-change marker.
//!
//! Accepted clause: the inserted text survives as plain runs, the deleted
//! content disappears. Rejected clause (or no decision recorded): the deleted
//! content is restored as plain runs, the insertion disappears. Paragraphs
//! without markup are copied verbatim.

use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{EngineError, Result};
use crate::extract::DocxDocument;
use crate::models::{AnalysisResult, Decision};

/// Per-clause accept/reject decisions, keyed by the clause ordinal stamped
/// as `w:id` on the redline markers. A clause without a recorded decision is
/// reverted, never silently accepted.
#[derive(Debug, Clone, Default)]
pub struct DecisionSet {
    decisions: HashMap<u32, Decision>,
    accept_by_default: bool,
}

impl DecisionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, clause_id: u32, decision: Decision) {
        self.decisions.insert(clause_id, decision);
    }

    /// Accept every clause of an analysis result.
    pub fn accept_all(result: &AnalysisResult) -> Self {
        let mut set = Self::new();
        for clause in &result.clauses {
            set.set(clause.id, Decision::Accepted);
        }
        set
    }

    /// Accept every marker not explicitly decided, instead of reverting it.
    /// For callers holding only the redlined bytes, not the analysis result.
    pub fn accept_unlisted() -> Self {
        Self {
            decisions: HashMap::new(),
            accept_by_default: true,
        }
    }

    fn accepts(&self, clause_id: u32) -> bool {
        match self.decisions.get(&clause_id) {
            Some(decision) => *decision == Decision::Accepted,
            None => self.accept_by_default,
        }
    }
}

/// Generate the clean `.docx` from redlined bytes.
pub fn generate_clean(doc: &DocxDocument, decisions: &DecisionSet) -> Result<Vec<u8>> {
    let xml = doc.document_xml();
    let mut out = Vec::with_capacity(xml.len());
    let mut cursor = 0usize;

    for para in &doc.paragraphs {
        if !para.has_markup {
            continue;
        }
        let (start, end) = para.span;
        if start < cursor || end > xml.len() {
            return Err(EngineError::Generation(format!(
                "paragraph {} span {}..{} cannot be anchored",
                para.index, start, end
            )));
        }
        out.extend_from_slice(&xml[cursor..start]);
        let rewritten = strip_markup(&xml[start..end], decisions)?;
        out.extend_from_slice(&rewritten);
        cursor = end;
    }

    out.extend_from_slice(&xml[cursor..]);
    doc.rebuild(&out)
}

/// What to do with content inside the marker currently being walked.
#[derive(Debug, Clone, Copy)]
enum MarkerMode {
    /// Drop everything until the marker closes.
    Drop,
    /// Keep content as-is (accepted insertion).
    Keep,
    /// Keep content, rewriting `<w:delText>` to `<w:t>` (rejected deletion).
    Restore,
}

/// Rewrite one paragraph's XML, resolving its tracked-change markers.
fn strip_markup(para_xml: &[u8], decisions: &DecisionSet) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(para_xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    // Marker nesting; the innermost mode wins.
    let mut markers: Vec<(Vec<u8>, MarkerMode)> = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| EngineError::Generation(format!("redlined paragraph: {}", e)))?;

        match event {
            Event::Start(ref e) => {
                let local = e.local_name().as_ref().to_vec();
                match local.as_slice() {
                    b"ins" => {
                        let mode = if marker_accepted(e, decisions) {
                            MarkerMode::Keep
                        } else {
                            MarkerMode::Drop
                        };
                        markers.push((local, mode));
                    }
                    b"del" => {
                        let mode = if marker_accepted(e, decisions) {
                            MarkerMode::Drop
                        } else {
                            MarkerMode::Restore
                        };
                        markers.push((local, mode));
                    }
                    b"delText" if matches!(active_mode(&markers), Some(MarkerMode::Restore)) => {
                        write_event(&mut writer, Event::Start(renamed_text_element(e)))?;
                    }
                    _ => {
                        if !dropping(&markers) {
                            write_event(&mut writer, Event::Start(e.to_owned()))?;
                        }
                    }
                }
            }
            Event::End(ref e) => {
                let local = e.local_name().as_ref();
                match local {
                    b"ins" | b"del" if markers.last().map(|(n, _)| n.as_slice()) == Some(local) => {
                        markers.pop();
                    }
                    b"delText" if matches!(active_mode(&markers), Some(MarkerMode::Restore)) => {
                        write_event(&mut writer, Event::End(BytesEnd::new("w:t")))?;
                    }
                    _ => {
                        if !dropping(&markers) {
                            write_event(&mut writer, Event::End(e.to_owned()))?;
                        }
                    }
                }
            }
            Event::Empty(ref e) => {
                let local = e.local_name().as_ref().to_vec();
                // A childless marker carries nothing worth keeping.
                if !matches!(local.as_slice(), b"ins" | b"del") && !dropping(&markers) {
                    write_event(&mut writer, Event::Empty(e.to_owned()))?;
                }
            }
            Event::Text(ref t) => {
                if !dropping(&markers) {
                    write_event(&mut writer, Event::Text(t.to_owned()))?;
                }
            }
            Event::Eof => break,
            other => {
                if !dropping(&markers) {
                    write_event(&mut writer, other.into_owned())?;
                }
            }
        }
        buf.clear();
    }

    Ok(writer.into_inner().into_inner())
}

fn write_event(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| EngineError::Generation(e.to_string()))
}

fn active_mode(markers: &[(Vec<u8>, MarkerMode)]) -> Option<MarkerMode> {
    markers.last().map(|(_, m)| *m)
}

fn dropping(markers: &[(Vec<u8>, MarkerMode)]) -> bool {
    markers
        .iter()
        .any(|(_, m)| matches!(m, MarkerMode::Drop))
}

/// Marker decision lookup from the element's `w:id`. A marker with no
/// parseable id gets the no-decision default.
fn marker_accepted(e: &BytesStart, decisions: &DecisionSet) -> bool {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"id" {
            if let Ok(text) = std::str::from_utf8(&attr.value) {
                if let Ok(id) = text.trim().parse::<u32>() {
                    return decisions.accepts(id);
                }
            }
        }
    }
    decisions.accept_by_default
}

/// `<w:delText ...>` renamed to `<w:t ...>`, attributes carried over.
fn renamed_text_element(e: &BytesStart) -> BytesStart<'static> {
    let mut elem = BytesStart::new("w:t");
    for attr in e.attributes().flatten() {
        elem.push_attribute(attr);
    }
    elem
}
