//! Error types for the folder2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Folder2PdfError`] — **Fatal**: the watcher cannot start or keep its
//!   configuration (unreadable config file, folder cannot be created, OS
//!   watch handle refused). Returned as `Err(Folder2PdfError)` from
//!   [`crate::config::ConfigStore`], [`crate::watcher::FolderWatcher::new`]
//!   and [`crate::session::WatchSession::start`].
//!
//! * [`ConvertError`] — **Non-fatal**: one file failed to convert (corrupt
//!   document, missing font, spreadsheet engine crashed) but the watch loop
//!   is fine. Produced by the converters in [`crate::pipeline`] and always
//!   contained by [`crate::dispatch::Dispatcher`], which logs it and moves on
//!   to the next event.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the folder2pdf library.
///
/// Per-file conversion failures use [`ConvertError`] and never escape the
/// dispatcher.
#[derive(Debug, Error)]
pub enum Folder2PdfError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The configuration file exists but could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON or lacks a required key.
    #[error("Config file '{path}' is invalid: {source}\nExpected keys: \"pdf_folder\", \"watch_folder\".")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration file could not be written.
    #[error("Failed to write config file '{path}': {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configured folder could not be created.
    #[error("Failed to create folder '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings or folder combination rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Watcher errors ────────────────────────────────────────────────────
    /// The OS refused to watch the folder.
    #[error("Cannot watch folder '{path}': {reason}")]
    WatchFailed { path: PathBuf, reason: String },
}

/// A non-fatal error for a single file.
///
/// Logged by the dispatcher together with the source path. The source file
/// is left untouched and no PDF is produced.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ConvertError {
    /// The source file vanished or could not be opened.
    #[error("Cannot read '{path}': {detail}")]
    SourceUnreadable { path: PathBuf, detail: String },

    /// The source path has no usable file name to derive the PDF name from.
    #[error("Cannot derive an output name from '{path}'")]
    InvalidSourceName { path: PathBuf },

    /// The document is not a readable OOXML word-processing file.
    #[error("Document '{path}' is malformed: {detail}")]
    MalformedDocument { path: PathBuf, detail: String },

    /// The image could not be decoded.
    #[error("Image '{path}' is malformed: {detail}")]
    MalformedImage { path: PathBuf, detail: String },

    /// The TrueType font used for text could not be loaded.
    #[error("Font '{path}' is unavailable: {detail}\nPlace a TrueType font there or pass --font <PATH>.")]
    FontUnavailable { path: PathBuf, detail: String },

    /// The spreadsheet engine executable could not be started.
    #[error("Spreadsheet engine '{program}' is unavailable: {detail}\nInstall LibreOffice or pass --office-program <PATH>.")]
    EngineUnavailable { program: String, detail: String },

    /// The spreadsheet engine ran but reported failure.
    #[error("Spreadsheet engine failed: {detail}")]
    EngineFailed { detail: String },

    /// The spreadsheet engine did not finish in time and was killed.
    #[error("Spreadsheet engine timed out after {secs}s")]
    EngineTimeout { secs: u64 },

    /// The engine exited cleanly but the exported PDF is missing.
    #[error("Exported PDF not found at '{path}'")]
    ExportMissing { path: PathBuf },

    /// The PDF could not be assembled or written to the output folder.
    #[error("Failed to write PDF '{path}': {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },

    /// Unexpected internal error (e.g. a converter task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_unavailable_display_has_hint() {
        let e = ConvertError::FontUnavailable {
            path: PathBuf::from("fonts/DejaVuSans.ttf"),
            detail: "No such file or directory".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("DejaVuSans.ttf"), "got: {msg}");
        assert!(msg.contains("--font"), "got: {msg}");
    }

    #[test]
    fn engine_timeout_display() {
        let e = ConvertError::EngineTimeout { secs: 120 };
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn engine_unavailable_display() {
        let e = ConvertError::EngineUnavailable {
            program: "soffice".into(),
            detail: "not found".into(),
        };
        assert!(e.to_string().contains("soffice"));
        assert!(e.to_string().contains("LibreOffice"));
    }

    #[test]
    fn watch_failed_display() {
        let e = Folder2PdfError::WatchFailed {
            path: PathBuf::from("/srv/inbox"),
            reason: "permission denied".into(),
        };
        assert!(e.to_string().contains("/srv/inbox"));
        assert!(e.to_string().contains("permission denied"));
    }

    #[test]
    fn convert_error_roundtrips_through_json() {
        let e = ConvertError::ExportMissing {
            path: PathBuf::from("/tmp/out/book.pdf"),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        let back: ConvertError = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back.to_string(), e.to_string());
    }
}
