//! # folder2pdf
//!
//! Watch a folder and turn every new document, image or spreadsheet into a
//! PDF in a separate output folder.
//!
//! ## Why this crate?
//!
//! "Drop it in a folder, get a PDF" is the simplest conversion workflow for
//! people who never open a terminal: scanners, mail clients and browsers can
//! all save into a folder. This crate keeps that folder clean: supported
//! files are converted, temporary files are left alone while they are
//! still being written, and anything else is removed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! OS create / move-in event
//!  │
//!  ├─ 1. Watch     notify → unbounded channel → Stream<PathBuf>
//!  ├─ 2. Classify  extension → FileClass (Convertible / Temporary / Unsupported)
//!  ├─ 3. Convert   docx: text layout · png/jpg: image page · xls/xlsx: LibreOffice
//!  └─ 4. Output    <output>/<stem>.pdf via temp file + rename
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folder2pdf::{ConfigStore, PipelineConfig, WatchService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ConfigStore::new("config.json");
//!     let service = WatchService::new(store, PipelineConfig::default());
//!     service
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `folder2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! folder2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## External requirements
//!
//! | Format | Needs |
//! |--------|-------|
//! | `.docx` | a TrueType font at `fonts/DejaVuSans.ttf` (or `PipelineConfig::font_path`) |
//! | `.png`, `.jpg`, `.jpeg` | nothing |
//! | `.xls`, `.xlsx` | LibreOffice (`soffice`) on `PATH` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod watcher;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConfigStore, Configuration, GracePolicy, PipelineConfig, PipelineConfigBuilder};
pub use dispatch::{ConversionJob, DispatchOutcome, Dispatcher, FileClass};
pub use error::{ConvertError, Folder2PdfError};
pub use pipeline::{Converter, ConverterRegistry};
pub use progress::{NoopProgressCallback, ProgressCallback, WatchProgressCallback};
pub use session::{WatchService, WatchSession};
pub use watcher::FolderWatcher;

/// Usage instructions shown by the "Information" action.
pub const INSTRUCTIONS: &str = "\
1. Run `folder2pdf set-watch-folder <DIR>` to select the folder where the original files are located.
2. Run `folder2pdf set-output-folder <DIR>` to select the folder where you want the converted PDFs to be saved.
3. The watcher automatically converts supported files (.docx, .png, .jpg, .jpeg, .xls, .xlsx) to PDFs and saves them in the output folder.
4. Unsupported files are deleted after a short grace period, and temporary files (.tmp) are ignored.";
