//! WordprocessingML extraction with formatting preservation.
//!
//! Parses `.docx` bytes into a [`DocxDocument`]: the raw ZIP entries plus a
//! paragraph arena over `word/document.xml`. Every body-level `<w:p>` element
//! is recorded with its byte span in the source XML, so untouched paragraphs
//! can be reproduced verbatim when an artifact is generated. Content outside
//! body-level paragraphs (section properties, tables) lives in the gap bytes
//! between spans and is never rewritten.

use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{EngineError, Result};
use crate::models::{Paragraph, RunFormat};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// One entry of the `.docx` container, decompressed.
#[derive(Debug, Clone)]
pub struct DocxEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A parsed `.docx` container: all entries in archive order plus the
/// paragraph arena over `word/document.xml`.
#[derive(Debug, Clone)]
pub struct DocxDocument {
    entries: Vec<DocxEntry>,
    document_index: usize,
    pub paragraphs: Vec<Paragraph>,
}

impl DocxDocument {
    /// Raw bytes of `word/document.xml`.
    pub fn document_xml(&self) -> &[u8] {
        &self.entries[self.document_index].bytes
    }

    /// Raw bytes of one paragraph's `<w:p>` element.
    pub fn paragraph_bytes(&self, index: usize) -> Result<&[u8]> {
        let para = self.paragraphs.get(index).ok_or_else(|| {
            EngineError::Generation(format!("paragraph index {} out of range", index))
        })?;
        let xml = self.document_xml();
        let (start, end) = para.span;
        if start > end || end > xml.len() {
            return Err(EngineError::Generation(format!(
                "paragraph {} span {}..{} exceeds document.xml length {}",
                index,
                start,
                end,
                xml.len()
            )));
        }
        Ok(&xml[start..end])
    }

    /// Rebuild the container with `word/document.xml` replaced. All other
    /// entries are written back unchanged, in their original order.
    pub fn rebuild(&self, new_document_xml: &[u8]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            for (i, entry) in self.entries.iter().enumerate() {
                if entry.name.ends_with('/') {
                    zip.add_directory(entry.name.clone(), options)
                        .map_err(|e| EngineError::Generation(e.to_string()))?;
                    continue;
                }
                zip.start_file(entry.name.clone(), options)
                    .map_err(|e| EngineError::Generation(e.to_string()))?;
                let bytes = if i == self.document_index {
                    new_document_xml
                } else {
                    &entry.bytes
                };
                zip.write_all(bytes)
                    .map_err(|e| EngineError::Generation(e.to_string()))?;
            }
            zip.finish()
                .map_err(|e| EngineError::Generation(e.to_string()))?;
        }
        Ok(buf)
    }
}

/// Parse `.docx` bytes into a [`DocxDocument`].
pub fn parse_docx(bytes: &[u8]) -> Result<DocxDocument> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| EngineError::Parse(format!("not a docx container: {}", e)))?;

    let mut entries = Vec::with_capacity(archive.len());
    let mut document_index = None;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| EngineError::Parse(e.to_string()))?;
        let name = entry.name().to_string();

        let mut data = Vec::new();
        entry
            .take(MAX_ENTRY_BYTES)
            .read_to_end(&mut data)
            .map_err(|e| EngineError::Parse(e.to_string()))?;
        if data.len() as u64 >= MAX_ENTRY_BYTES {
            return Err(EngineError::Parse(format!(
                "ZIP entry {} exceeds size limit ({} bytes)",
                name, MAX_ENTRY_BYTES
            )));
        }

        if name == "word/document.xml" {
            document_index = Some(entries.len());
        }
        entries.push(DocxEntry { name, bytes: data });
    }

    let document_index = document_index
        .ok_or_else(|| EngineError::Parse("word/document.xml not found".to_string()))?;

    let paragraphs = parse_paragraphs(&entries[document_index].bytes)?;

    Ok(DocxDocument {
        entries,
        document_index,
        paragraphs,
    })
}

/// Interpret `<w:b/>`-style toggle elements: present means on unless
/// `w:val` says otherwise.
fn toggle_value(e: &BytesStart) -> bool {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"val" {
            return !matches!(attr.value.as_ref(), b"0" | b"false" | b"none");
        }
    }
    true
}

fn val_attribute(e: &BytesStart) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"val" {
            return String::from_utf8(attr.value.to_vec()).ok();
        }
    }
    None
}

/// Stream `document.xml` and record every body-level `<w:p>` with its byte
/// span, text, and run formatting.
pub(crate) fn parse_paragraphs(xml: &[u8]) -> Result<Vec<Paragraph>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut paragraphs = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut saw_body = false;
    let mut last_pos = 0usize;

    // State of the paragraph currently being captured, if any.
    struct Capture {
        start: usize,
        depth: usize,
        text: String,
        style: Option<String>,
        runs: Vec<RunFormat>,
        ppr_span: Option<(usize, usize)>,
        ppr_start: Option<usize>,
        has_markup: bool,
        // Current run state.
        run_text: String,
        bold: bool,
        italic: bool,
        underline: bool,
        in_rpr: bool,
        in_ppr: bool,
        in_text: bool,
    }
    let mut capture: Option<Capture> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| EngineError::Parse(format!("document.xml: {}", e)))?;
        let pos = reader.buffer_position() as usize;

        match event {
            Event::Start(ref e) => {
                let local = e.local_name().as_ref().to_vec();
                if local == b"body" {
                    saw_body = true;
                }
                if local == b"p"
                    && capture.is_none()
                    && stack.last().map(|n| n.as_slice()) == Some(b"body".as_slice())
                {
                    capture = Some(Capture {
                        start: last_pos,
                        depth: stack.len(),
                        text: String::new(),
                        style: None,
                        runs: Vec::new(),
                        ppr_span: None,
                        ppr_start: None,
                        has_markup: false,
                        run_text: String::new(),
                        bold: false,
                        italic: false,
                        underline: false,
                        in_rpr: false,
                        in_ppr: false,
                        in_text: false,
                    });
                } else if let Some(cap) = capture.as_mut() {
                    match local.as_slice() {
                        b"pPr" => {
                            cap.in_ppr = true;
                            cap.ppr_start = Some(last_pos);
                        }
                        b"rPr" => cap.in_rpr = true,
                        b"r" => {
                            cap.run_text.clear();
                            cap.bold = false;
                            cap.italic = false;
                            cap.underline = false;
                        }
                        b"t" => cap.in_text = true,
                        b"b" if cap.in_rpr => cap.bold = toggle_value(e),
                        b"i" if cap.in_rpr => cap.italic = toggle_value(e),
                        b"u" if cap.in_rpr => cap.underline = toggle_value(e),
                        b"pStyle" if cap.in_ppr => cap.style = val_attribute(e),
                        b"ins" | b"del" => cap.has_markup = true,
                        _ => {}
                    }
                }
                stack.push(local);
            }
            Event::Empty(ref e) => {
                let local = e.local_name().as_ref();
                if local == b"p" && stack.last().map(|n| n.as_slice()) == Some(b"body".as_slice())
                {
                    paragraphs.push(Paragraph {
                        index: paragraphs.len(),
                        text: String::new(),
                        style: None,
                        runs: Vec::new(),
                        span: (last_pos, pos),
                        ppr_span: None,
                        has_markup: false,
                        embedding: None,
                    });
                } else if let Some(cap) = capture.as_mut() {
                    match local {
                        b"b" if cap.in_rpr => cap.bold = toggle_value(e),
                        b"i" if cap.in_rpr => cap.italic = toggle_value(e),
                        b"u" if cap.in_rpr => cap.underline = toggle_value(e),
                        b"pStyle" if cap.in_ppr => cap.style = val_attribute(e),
                        b"ins" | b"del" => cap.has_markup = true,
                        _ => {}
                    }
                }
            }
            Event::Text(ref t) => {
                if let Some(cap) = capture.as_mut() {
                    if cap.in_text {
                        let text = t
                            .unescape()
                            .map_err(|e| EngineError::Parse(e.to_string()))?;
                        cap.text.push_str(&text);
                        cap.run_text.push_str(&text);
                    }
                }
            }
            Event::End(ref e) => {
                let local = e.local_name().as_ref().to_vec();
                stack.pop();

                let mut finished = None;
                if let Some(cap) = capture.as_mut() {
                    match local.as_slice() {
                        b"pPr" => {
                            cap.in_ppr = false;
                            if let Some(start) = cap.ppr_start.take() {
                                cap.ppr_span = Some((start, pos));
                            }
                        }
                        b"rPr" => cap.in_rpr = false,
                        b"t" => cap.in_text = false,
                        b"r" => {
                            if !cap.run_text.is_empty() {
                                cap.runs.push(RunFormat {
                                    text: std::mem::take(&mut cap.run_text),
                                    bold: cap.bold,
                                    italic: cap.italic,
                                    underline: cap.underline,
                                });
                            }
                        }
                        b"p" if stack.len() == cap.depth => {
                            finished = Some(pos);
                        }
                        _ => {}
                    }
                }
                if let Some(end) = finished {
                    if let Some(cap) = capture.take() {
                        paragraphs.push(Paragraph {
                            index: paragraphs.len(),
                            text: cap.text,
                            style: cap.style,
                            runs: cap.runs,
                            span: (cap.start, end),
                            ppr_span: cap.ppr_span,
                            has_markup: cap.has_markup,
                            embedding: None,
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }

        last_pos = pos;
        buf.clear();
    }

    if !saw_body {
        return Err(EngineError::Parse(
            "document.xml has no <w:body> element".to_string(),
        ));
    }

    Ok(paragraphs)
}
