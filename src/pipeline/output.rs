//! Writing finished PDFs into the output folder.
//!
//! Both helpers guarantee that the target path holds either the previous
//! file or the complete new one, never a partial write.

use crate::error::ConvertError;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Write `bytes` to `target` through a temp file in the same folder + rename.
pub fn write_pdf(target: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let fail = |detail: String| ConvertError::OutputWriteFailed {
        path: target.to_path_buf(),
        detail,
    };

    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".folder2pdf-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| fail(e.to_string()))?;
    tmp.write_all(bytes).map_err(|e| fail(e.to_string()))?;
    tmp.as_file().sync_all().map_err(|e| fail(e.to_string()))?;
    tmp.persist(target).map_err(|e| fail(e.error.to_string()))?;

    debug!("Wrote {} bytes to {}", bytes.len(), target.display());
    Ok(())
}

/// Move an already-complete file at `staged` onto `target`.
///
/// Any existing file at `target` is removed first, then `staged` is renamed
/// into place. Both paths must be on the same filesystem.
pub fn replace_file(staged: &Path, target: &Path) -> Result<(), ConvertError> {
    let fail = |e: std::io::Error| ConvertError::OutputWriteFailed {
        path: target.to_path_buf(),
        detail: e.to_string(),
    };

    match std::fs::remove_file(target) {
        Ok(()) => debug!("Removed previous {}", target.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(fail(e)),
    }
    std::fs::rename(staged, target).map_err(fail)
}
