//! Paragraph text extraction from OOXML word-processing files.
//!
//! A `.docx` is a zip archive; the body lives in `word/document.xml`. Only
//! paragraphs that are direct children of `w:body` are returned, in
//! document order. Paragraphs inside tables (`w:tbl`) are not body
//! children and are skipped; text-box content (`w:txbxContent`) nested in a
//! body paragraph is skipped too.
//!
//! Within a paragraph:
//! - `w:t` text is concatenated (deleted text `w:delText` is not),
//! - `w:tab` inside a run becomes `\t`,
//! - `w:br` / `w:cr` inside a run become `\n`.

use crate::error::ConvertError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;

const DOCUMENT_PART: &str = "word/document.xml";

/// Read the body paragraphs of the document at `path`.
///
/// Empty paragraphs are included; callers decide what to skip.
pub fn read_paragraphs(path: &Path) -> Result<Vec<String>, ConvertError> {
    let file = std::fs::File::open(path).map_err(|e| ConvertError::SourceUnreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let malformed = |detail: String| ConvertError::MalformedDocument {
        path: path.to_path_buf(),
        detail,
    };

    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| malformed(format!("not a zip archive: {}", e)))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| malformed(format!("{}: {}", DOCUMENT_PART, e)))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| malformed(format!("{}: {}", DOCUMENT_PART, e)))?;

    parse_document_xml(&xml).map_err(malformed)
}

/// Extract body paragraphs from the `word/document.xml` string.
pub(crate) fn parse_document_xml(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut paragraphs = Vec::new();
    // Stack depth of the body paragraph being read.
    let mut para_depth: Option<usize> = None;
    let mut current = String::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("XML error at byte {}: {}", reader.buffer_position(), e))?;

        match event {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if name == b"w:p"
                    && para_depth.is_none()
                    && stack.last().map(Vec::as_slice) == Some(b"w:body".as_slice())
                {
                    para_depth = Some(stack.len());
                    current.clear();
                }
                stack.push(name);
            }
            Event::End(_) => {
                stack.pop();
                if para_depth == Some(stack.len()) {
                    paragraphs.push(std::mem::take(&mut current));
                    para_depth = None;
                }
            }
            Event::Empty(e) => {
                let in_body_para = para_depth.is_some()
                    && !in_text_box(&stack)
                    && stack.last().map(Vec::as_slice) == Some(b"w:r".as_slice());
                if in_body_para {
                    match e.name().as_ref() {
                        b"w:tab" => current.push('\t'),
                        b"w:br" | b"w:cr" => current.push('\n'),
                        _ => {}
                    }
                }
                // An empty body paragraph: <w:p/>
                if e.name().as_ref() == b"w:p"
                    && para_depth.is_none()
                    && stack.last().map(Vec::as_slice) == Some(b"w:body".as_slice())
                {
                    paragraphs.push(String::new());
                }
            }
            Event::Text(t) => {
                if para_depth.is_some()
                    && !in_text_box(&stack)
                    && stack.last().map(Vec::as_slice) == Some(b"w:t".as_slice())
                {
                    let text = t.unescape().map_err(|e| format!("bad text: {}", e))?;
                    current.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

fn in_text_box(stack: &[Vec<u8>]) -> bool {
    stack.iter().any(|n| n == b"w:txbxContent")
}
