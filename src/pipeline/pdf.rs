//! Minimal PDF writer: A4 pages carrying text in one embedded TrueType font
//! and/or raster images.
//!
//! ## Why not a layout engine?
//!
//! The converters need exactly two drawing primitives ("put this line of
//! text at this position", "put this image in this box"), so the writer
//! assembles the object graph directly with `lopdf`. Coordinates are taken
//! in millimetres measured from the **top-left** corner of the page and
//! flipped into PDF user space (points, origin bottom-left) here.
//!
//! ## Font embedding
//!
//! Text is shown with a Type0 / CIDFontType2 font using the `Identity-H`
//! encoding: each character is written as its 2-byte glyph id. Glyph widths
//! go into the `W` array and a `ToUnicode` CMap maps glyph ids back to
//! Unicode so text remains selectable and searchable. The whole font file
//! is embedded (no subsetting).

use crate::error::ConvertError;
use ab_glyph::{Font, FontVec, GlyphId};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

/// Points per millimetre.
pub const MM: f32 = 72.0 / 25.4;

/// A4 page width in millimetres.
pub const A4_WIDTH_MM: f32 = 210.0;

/// A4 page height in millimetres.
pub const A4_HEIGHT_MM: f32 = 297.0;

const FONT_RESOURCE: &str = "F1";

// ── Font ─────────────────────────────────────────────────────────────────

/// A TrueType font loaded for measuring and embedding.
pub struct EmbeddedFont {
    data: Vec<u8>,
    font: FontVec,
    name: String,
}

impl std::fmt::Debug for EmbeddedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedFont")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl EmbeddedFont {
    /// Load a TrueType font file.
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let data = std::fs::read(path).map_err(|e| ConvertError::FontUnavailable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_bytes(data, path)
    }

    /// Parse font bytes; `origin` is used for the PDF font name and errors.
    pub fn from_bytes(data: Vec<u8>, origin: &Path) -> Result<Self, ConvertError> {
        let font = FontVec::try_from_vec(data.clone()).map_err(|e| {
            ConvertError::FontUnavailable {
                path: origin.to_path_buf(),
                detail: e.to_string(),
            }
        })?;
        Ok(Self {
            data,
            font,
            name: pdf_font_name(origin),
        })
    }

    fn units_per_em(&self) -> f32 {
        self.font.units_per_em().unwrap_or(1000.0)
    }

    /// Advance of glyph `id` in 1/1000 em (PDF glyph space).
    fn advance_1000(&self, id: GlyphId) -> f32 {
        self.font.h_advance_unscaled(id) * 1000.0 / self.units_per_em()
    }

    /// Width of `text` in points when set at `size` points. Kerning is ignored.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: f32 = text
            .chars()
            .map(|c| self.advance_1000(self.font.glyph_id(c)))
            .sum();
        units * size / 1000.0
    }
}

/// Derive a PDF-safe `BaseFont` name from the font file stem.
fn pdf_font_name(origin: &Path) -> String {
    let stem = origin
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if name.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        name
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct PageContent {
    ops: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
    uses_font: bool,
}

/// Accumulates pages and produces the serialised PDF.
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    pages: Vec<PageContent>,
    font: Option<EmbeddedFont>,
    /// glyph id → character, for `W` and `ToUnicode`.
    used_glyphs: BTreeMap<u16, char>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    /// A builder for image-only documents.
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            pages: Vec::new(),
            font: None,
            used_glyphs: BTreeMap::new(),
        }
    }

    /// A builder that can draw text with `font`.
    pub fn with_font(font: EmbeddedFont) -> Self {
        let mut builder = Self::new();
        builder.font = Some(font);
        builder
    }

    /// The font text is measured and drawn with, if any.
    pub fn font(&self) -> Option<&EmbeddedFont> {
        self.font.as_ref()
    }

    /// Start a new A4 page; subsequent drawing goes onto it.
    pub fn add_page(&mut self) {
        self.pages.push(PageContent::default());
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn current_page(&mut self) -> &mut PageContent {
        if self.pages.is_empty() {
            self.add_page();
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Draw one line of text with its baseline at `baseline_mm` from the top.
    pub fn text(
        &mut self,
        x_mm: f32,
        baseline_mm: f32,
        size: f32,
        text: &str,
    ) -> Result<(), ConvertError> {
        let font = self
            .font
            .as_ref()
            .ok_or_else(|| ConvertError::Internal("text drawn without a font".into()))?;

        let mut encoded = Vec::with_capacity(text.len() * 2);
        for c in text.chars() {
            let gid = font.font.glyph_id(c).0;
            self.used_glyphs.entry(gid).or_insert(c);
            encoded.extend_from_slice(&gid.to_be_bytes());
        }

        let x = x_mm * MM;
        let y = (A4_HEIGHT_MM - baseline_mm) * MM;
        let page = self.current_page();
        page.uses_font = true;
        page.ops.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), size.into()],
            ),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(encoded, StringFormat::Hexadecimal)],
            ),
            Operation::new("ET", vec![]),
        ]);
        Ok(())
    }

    /// Place `img` with its top-left corner at (`x_mm`, `y_mm`), scaled to
    /// `width_mm` with the height implied by the aspect ratio.
    pub fn image(
        &mut self,
        img: &DynamicImage,
        x_mm: f32,
        y_mm: f32,
        width_mm: f32,
    ) -> Result<(), ConvertError> {
        let (px_w, px_h) = (img.width(), img.height());
        if px_w == 0 || px_h == 0 {
            return Err(ConvertError::Internal("image has zero size".into()));
        }

        let rgb = img.to_rgb8();
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => px_w as i64,
            "Height" => px_h as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "FlateDecode",
        };

        if img.color().has_alpha() {
            let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
            let smask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => px_w as i64,
                    "Height" => px_h as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8_i64,
                    "Filter" => "FlateDecode",
                },
                deflate(&alpha)?,
            );
            let smask_id = self.doc.add_object(smask);
            dict.set("SMask", smask_id);
        }

        let image_id = self.doc.add_object(Stream::new(dict, deflate(rgb.as_raw())?));

        let w = width_mm * MM;
        let h = w * px_h as f32 / px_w as f32;
        let x = x_mm * MM;
        let y = (A4_HEIGHT_MM - y_mm) * MM - h;

        let page = self.current_page();
        let name = format!("Im{}", page.images.len() + 1);
        page.ops.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    w.into(),
                    0_i64.into(),
                    0_i64.into(),
                    h.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        page.images.push((name, image_id));
        Ok(())
    }

    /// Assemble the object graph and serialise it.
    ///
    /// A builder with no pages yields a document with one blank page.
    pub fn finish(mut self) -> Result<Vec<u8>, ConvertError> {
        if self.pages.is_empty() {
            self.add_page();
        }

        let font_id = if self.pages.iter().any(|p| p.uses_font) {
            Some(self.embed_font()?)
        } else {
            None
        };

        let pages = std::mem::take(&mut self.pages);
        let mut kids = Vec::with_capacity(pages.len());
        for page in pages {
            let content = Content { operations: page.ops };
            let encoded = content
                .encode()
                .map_err(|e| ConvertError::Internal(format!("content stream: {}", e)))?;
            let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

            let mut resources = lopdf::Dictionary::new();
            if let (true, Some(id)) = (page.uses_font, font_id) {
                resources.set("Font", dictionary! { FONT_RESOURCE => id });
            }
            if !page.images.is_empty() {
                let mut xobjects = lopdf::Dictionary::new();
                for (name, id) in page.images {
                    xobjects.set(name.into_bytes(), id);
                }
                resources.set("XObject", xobjects);
            }

            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_id,
                "MediaBox" => vec![
                    0_i64.into(),
                    0_i64.into(),
                    (A4_WIDTH_MM * MM).into(),
                    (A4_HEIGHT_MM * MM).into(),
                ],
                "Contents" => content_id,
                "Resources" => resources,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| ConvertError::Internal(format!("PDF serialisation: {}", e)))?;
        Ok(out)
    }

    /// Add the Type0 font objects and return the Type0 font id.
    fn embed_font(&mut self) -> Result<ObjectId, ConvertError> {
        let font = self
            .font
            .as_ref()
            .ok_or_else(|| ConvertError::Internal("font used but not loaded".into()))?;

        let scale = 1000.0 / font.units_per_em();
        let ascent = (font.font.ascent_unscaled() * scale).round() as i64;
        let descent = (font.font.descent_unscaled() * scale).round() as i64;

        let file_stream = Stream::new(
            dictionary! {
                "Length1" => font.data.len() as i64,
                "Filter" => "FlateDecode",
            },
            deflate(&font.data)?,
        );
        let file_id = self.doc.add_object(file_stream);

        let descriptor_id = self.doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => font.name.as_str(),
            "Flags" => 32_i64,
            "FontBBox" => vec![0_i64.into(), descent.into(), 1000_i64.into(), ascent.into()],
            "ItalicAngle" => 0_i64,
            "Ascent" => ascent,
            "Descent" => descent,
            "CapHeight" => ascent,
            "StemV" => 80_i64,
            "FontFile2" => file_id,
        });

        let mut widths = Vec::with_capacity(self.used_glyphs.len() * 2);
        for &gid in self.used_glyphs.keys() {
            let w = font.advance_1000(GlyphId(gid)).round() as i64;
            widths.push(Object::Integer(gid as i64));
            widths.push(Object::Array(vec![Object::Integer(w)]));
        }

        let cid_font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => font.name.as_str(),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0_i64,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000_i64,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, to_unicode_cmap(&self.used_glyphs)));

        let name = font.name.clone();
        Ok(self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => name.as_str(),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        }))
    }
}

/// Zlib-compress `data` for a `FlateDecode` stream.
fn deflate(data: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let err = |e: std::io::Error| ConvertError::Internal(format!("deflate: {}", e));
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).map_err(err)?;
    enc.finish().map_err(err)
}

/// Build a ToUnicode CMap mapping 2-byte glyph ids to UTF-16BE.
fn to_unicode_cmap(glyphs: &BTreeMap<u16, char>) -> Vec<u8> {
    let mut s = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );

    // Glyph 0 stands for every character the font lacks, so it has no single text.
    let entries: Vec<(&u16, &char)> = glyphs.iter().filter(|(gid, _)| **gid != 0).collect();
    // bfchar blocks are limited to 100 entries.
    for chunk in entries.chunks(100) {
        let _ = writeln!(s, "{} beginbfchar", chunk.len());
        for (gid, c) in chunk {
            let mut units = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            let _ = writeln!(s, "<{:04X}> <{}>", gid, hex);
        }
        s.push_str("endbfchar\n");
    }

    s.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    s.into_bytes()
}
