//! Image converter: PNG / JPEG → single-page A4 PDF.
//!
//! The image is placed at (10 mm, 10 mm) scaled to a width of 190 mm; the
//! height follows from the aspect ratio. Tall images are not split: the
//! document always has exactly one page, even if the image runs past the
//! bottom edge.

use crate::error::ConvertError;
use crate::pipeline::output::write_pdf;
use crate::pipeline::pdf::PdfBuilder;
use std::path::Path;
use tracing::debug;

pub const IMAGE_X_MM: f32 = 10.0;
pub const IMAGE_Y_MM: f32 = 10.0;
pub const IMAGE_WIDTH_MM: f32 = 190.0;

/// Convert the image at `source` into a PDF at `target`.
///
/// Blocking; run inside `spawn_blocking`. The format is guessed from the
/// file content, not the extension.
pub fn convert(source: &Path, target: &Path) -> Result<(), ConvertError> {
    let reader = image::ImageReader::open(source).map_err(|e| ConvertError::SourceUnreadable {
        path: source.to_path_buf(),
        detail: e.to_string(),
    })?;
    let malformed = |detail: String| ConvertError::MalformedImage {
        path: source.to_path_buf(),
        detail,
    };
    let img = reader
        .with_guessed_format()
        .map_err(|e| malformed(e.to_string()))?
        .decode()
        .map_err(|e| malformed(e.to_string()))?;

    debug!(
        "{}: {}×{} {:?}",
        source.display(),
        img.width(),
        img.height(),
        img.color()
    );

    let mut pdf = PdfBuilder::new();
    pdf.add_page();
    pdf.image(&img, IMAGE_X_MM, IMAGE_Y_MM, IMAGE_WIDTH_MM)
        .map_err(|e| match e {
            ConvertError::Internal(detail) => malformed(detail),
            other => other,
        })?;
    write_pdf(target, &pdf.finish()?)
}
