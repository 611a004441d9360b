//! Format converters: one source file in, one PDF out.
//!
//! Each submodule implements exactly one step or one format, so each is
//! testable on its own and a converter can be swapped without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! .docx ──▶ docx ──▶ document ──┐
//!                               ├──▶ pdf ──▶ output ──▶ <output>/<stem>.pdf
//! .png/.jpg ──▶ image ──────────┘
//! .xls/.xlsx ──▶ spreadsheet (external engine) ──▶ output
//! ```
//!
//! 1. [`docx`]        — paragraph text out of the OOXML zip
//! 2. [`document`]    — line wrapping and page layout with an embedded font
//! 3. [`image`]       — decode and place one raster image
//! 4. [`spreadsheet`] — headless LibreOffice export in a scoped session
//! 5. [`pdf`]         — minimal PDF object writer over `lopdf`
//! 6. [`output`]      — atomic write / replace in the output folder
//!
//! [`ConverterRegistry`] ties them together. Document and image conversion
//! are CPU-bound and run in `spawn_blocking`; spreadsheet conversion awaits
//! its child process.

pub mod document;
pub mod docx;
pub mod image;
pub mod output;
pub mod pdf;
pub mod spreadsheet;

use crate::config::PipelineConfig;
use crate::dispatch::ConversionJob;
use crate::error::ConvertError;
use std::fmt;
use std::time::Duration;

/// The converter a recognised extension maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Converter {
    /// `.docx`
    Document,
    /// `.png`, `.jpg`, `.jpeg`
    Image,
    /// `.xls`, `.xlsx`
    Spreadsheet,
}

impl fmt::Display for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Converter::Document => "document",
            Converter::Image => "image",
            Converter::Spreadsheet => "spreadsheet",
        })
    }
}

/// Runs the converter for a job with the configured assets and limits.
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    config: PipelineConfig,
}

impl ConverterRegistry {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Write the PDF for `job.source` to `job.target`.
    pub async fn convert(&self, converter: Converter, job: &ConversionJob) -> Result<(), ConvertError> {
        let source = job.source.clone();
        let target = job.target.clone();

        match converter {
            Converter::Document => {
                let font_path = self.config.font_path.clone();
                let font_size = self.config.font_size;
                tokio::task::spawn_blocking(move || {
                    document::convert(&source, &target, &font_path, font_size)
                })
                .await
                .map_err(|e| ConvertError::Internal(format!("Document converter panicked: {}", e)))?
            }
            Converter::Image => {
                tokio::task::spawn_blocking(move || image::convert(&source, &target))
                    .await
                    .map_err(|e| ConvertError::Internal(format!("Image converter panicked: {}", e)))?
            }
            Converter::Spreadsheet => {
                spreadsheet::convert(
                    &source,
                    &target,
                    &self.config.office_program,
                    Duration::from_secs(self.config.office_timeout_secs),
                )
                .await
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::write_docx;
    use super::*;
    use tempfile::TempDir;

    fn job(dir: &TempDir, name: &str) -> ConversionJob {
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        ConversionJob::new(&dir.path().join(name), &out).unwrap()
    }

    #[test]
    fn converter_display() {
        assert_eq!(Converter::Document.to_string(), "document");
        assert_eq!(Converter::Spreadsheet.to_string(), "spreadsheet");
    }

    #[tokio::test]
    async fn registry_runs_image_converter() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, "pixel.png");
        ::image::RgbImage::from_pixel(2, 2, ::image::Rgb([1, 2, 3]))
            .save(&job.source)
            .unwrap();

        let registry = ConverterRegistry::new(PipelineConfig::default());
        registry.convert(Converter::Image, &job).await.unwrap();
        assert!(job.target.is_file());
    }

    #[tokio::test]
    async fn registry_reports_missing_font_for_documents() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, "memo.docx");
        write_docx(&job.source, &["hello"]);

        let config = PipelineConfig::builder()
            .font_path(dir.path().join("fonts/missing.ttf"))
            .build()
            .unwrap();
        let err = ConverterRegistry::new(config)
            .convert(Converter::Document, &job)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::FontUnavailable { .. }), "got: {err}");
        assert!(!job.target.exists());
    }
}
