//! Document converter: `.docx` paragraphs → text-only A4 PDF.
//!
//! ## Layout
//!
//! Every non-empty paragraph becomes a block of wrapped lines:
//!
//! ```text
//!  10 mm ┌────────────────────── 190 mm ──────────────────────┐
//!        │ 1 mm padding, text wrapped to 188 mm               │ 10 mm per line
//!        └────────────────────────────────────────────────────┘
//!          5 mm gap before the next paragraph
//! ```
//!
//! A new page starts whenever the next line would cross the 15 mm bottom
//! margin. A document without any non-empty paragraph still produces a
//! single blank page.

use crate::error::ConvertError;
use crate::pipeline::docx;
use crate::pipeline::output::write_pdf;
use crate::pipeline::pdf::{EmbeddedFont, PdfBuilder, A4_HEIGHT_MM, MM};
use std::path::Path;
use tracing::{debug, info};

pub const MARGIN_MM: f32 = 10.0;
pub const BLOCK_WIDTH_MM: f32 = 190.0;
pub const PADDING_MM: f32 = 1.0;
pub const LINE_HEIGHT_MM: f32 = 10.0;
pub const PARAGRAPH_GAP_MM: f32 = 5.0;
pub const BOTTOM_MARGIN_MM: f32 = 15.0;

/// Tabs render as this many spaces.
const TAB_WIDTH: usize = 4;

/// Convert the document at `source` into a PDF at `target`.
///
/// Blocking; run inside `spawn_blocking`. The document is parsed before the
/// font is loaded, so a malformed document is reported as such even when
/// the font is also missing.
pub fn convert(
    source: &Path,
    target: &Path,
    font_path: &Path,
    font_size: f32,
) -> Result<(), ConvertError> {
    let paragraphs = docx::read_paragraphs(source)?;
    let font = EmbeddedFont::load(font_path)?;
    debug!(
        "{}: {} paragraphs, font {}",
        source.display(),
        paragraphs.len(),
        font_path.display()
    );

    let pdf = layout(&paragraphs, font, font_size)?;
    info!(
        "Laid out {} on {} page(s)",
        source.display(),
        pdf.page_count().max(1)
    );
    write_pdf(target, &pdf.finish()?)
}

/// Place `paragraphs` onto pages.
pub fn layout(
    paragraphs: &[String],
    font: EmbeddedFont,
    font_size: f32,
) -> Result<PdfBuilder, ConvertError> {
    let mut pdf = PdfBuilder::with_font(font);
    pdf.add_page();

    let text_x = MARGIN_MM + PADDING_MM;
    let max_width_pt = (BLOCK_WIDTH_MM - 2.0 * PADDING_MM) * MM;
    let page_break_at = A4_HEIGHT_MM - BOTTOM_MARGIN_MM;
    // Baseline offset inside a line box, font size converted to mm.
    let baseline_offset = 0.5 * LINE_HEIGHT_MM + 0.3 * (font_size / MM);

    let mut y = MARGIN_MM;
    for paragraph in paragraphs.iter().filter(|p| !p.trim().is_empty()) {
        let text = paragraph.replace('\t', &" ".repeat(TAB_WIDTH));
        let lines = {
            let font = pdf
                .font()
                .ok_or_else(|| ConvertError::Internal("layout builder lost its font".into()))?;
            wrap_lines(&text, max_width_pt, |s| font.text_width(s, font_size))
        };

        for line in lines {
            if y + LINE_HEIGHT_MM > page_break_at {
                pdf.add_page();
                y = MARGIN_MM;
            }
            if !line.is_empty() {
                pdf.text(text_x, y + baseline_offset, font_size, &line)?;
            }
            y += LINE_HEIGHT_MM;
        }
        y += PARAGRAPH_GAP_MM;
    }

    Ok(pdf)
}

/// Greedy line breaking.
///
/// `\n` forces a break. Otherwise a line is broken at its last space once
/// `measure` exceeds `max_width`; a word wider than `max_width` is broken
/// between characters. The space a line is broken at is dropped.
pub fn wrap_lines(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();

    for hard_line in text.split('\n') {
        let chars: Vec<char> = hard_line.chars().collect();
        let mut start = 0;
        let mut last_space: Option<usize> = None;
        let mut i = 0;

        while i < chars.len() {
            if chars[i] == ' ' {
                last_space = Some(i);
            }
            let candidate: String = chars[start..=i].iter().collect();
            if i > start && measure(&candidate) > max_width {
                match last_space {
                    Some(sp) if sp > start => {
                        lines.push(chars[start..sp].iter().collect());
                        start = sp + 1;
                    }
                    _ => {
                        lines.push(chars[start..i].iter().collect());
                        start = i;
                    }
                }
                last_space = None;
                i = start;
                continue;
            }
            i += 1;
        }

        if start < chars.len() || start == 0 {
            lines.push(chars[start..].iter().collect());
        }
    }

    lines
}
