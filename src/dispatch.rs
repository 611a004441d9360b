//! Event dispatcher: one "file created" notification in, one outcome out.
//!
//! The file's class is resolved once from its extension into a
//! [`FileClass`] and matched exhaustively:
//!
//! | extension (any case)  | class                       | action                        |
//! |-----------------------|-----------------------------|-------------------------------|
//! | `docx`                | `Convertible(Document)`     | convert                       |
//! | `png`, `jpg`, `jpeg`  | `Convertible(Image)`        | convert                       |
//! | `xls`, `xlsx`         | `Convertible(Spreadsheet)`  | convert                       |
//! | `tmp`                 | `Temporary`                 | leave alone                   |
//! | anything else / none  | `Unsupported`               | wait for grace, then delete   |
//!
//! A creation event fires when the writer opens the file, not when it is
//! done. Convertible files are therefore converted only once their size has
//! stopped changing (see [`wait_until_settled`]).
//!
//! [`Dispatcher::handle`] never fails: every per-file error is logged,
//! reported to the progress callback and returned as
//! [`DispatchOutcome::Failed`].

use crate::config::{GracePolicy, PipelineConfig};
use crate::error::ConvertError;
use crate::pipeline::{Converter, ConverterRegistry};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for a still-growing file under
/// [`GracePolicy::FixedDelay`].
pub const SETTLE_MAX_WAIT: Duration = Duration::from_secs(30);

/// What a path's extension says about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileClass {
    /// A format with a converter.
    Convertible(Converter),
    /// In-progress download or editor temp file; never touched.
    Temporary,
    /// Any other extension (lower-cased), or `None` for no extension.
    Unsupported { extension: Option<String> },
}

impl FileClass {
    /// Classify by the lower-cased extension of `path`.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        Self::from_extension(extension)
    }

    /// Classify an already lower-cased extension.
    pub fn from_extension(extension: Option<String>) -> Self {
        match extension.as_deref() {
            Some("docx") => FileClass::Convertible(Converter::Document),
            Some("png" | "jpg" | "jpeg") => FileClass::Convertible(Converter::Image),
            Some("xls" | "xlsx") => FileClass::Convertible(Converter::Spreadsheet),
            Some("tmp") => FileClass::Temporary,
            _ => FileClass::Unsupported { extension },
        }
    }
}

/// Source and target of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub source: PathBuf,
    /// `<output_folder>/<source stem>.pdf`
    pub target: PathBuf,
}

impl ConversionJob {
    pub fn new(source: &Path, output_folder: &Path) -> Result<Self, ConvertError> {
        let stem = source
            .file_stem()
            .ok_or_else(|| ConvertError::InvalidSourceName {
                path: source.to_path_buf(),
            })?;
        let mut name = stem.to_os_string();
        name.push(".pdf");
        Ok(Self {
            source: source.to_path_buf(),
            target: output_folder.join(name),
        })
    }
}

/// Result of handling one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The path is a directory.
    SkippedDirectory,
    /// A PDF was written to `target`.
    Converted { converter: Converter, target: PathBuf },
    /// Temporary file left untouched.
    Ignored,
    /// Unsupported file removed.
    Deleted,
    /// Conversion or deletion failed; the source is left in place.
    Failed { reason: String },
}

/// Routes each created file to its converter or to deletion.
pub struct Dispatcher {
    output_folder: PathBuf,
    registry: ConverterRegistry,
    progress: ProgressCallback,
}

impl Dispatcher {
    pub fn new(output_folder: impl Into<PathBuf>, config: PipelineConfig) -> Self {
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Self {
            output_folder: output_folder.into(),
            registry: ConverterRegistry::new(config),
            progress,
        }
    }

    /// Handle one creation notification for `path`.
    pub async fn handle(&self, path: &Path) -> DispatchOutcome {
        self.progress.on_file_detected(path);

        if path.is_dir() {
            debug!("Skipping directory {}", path.display());
            return DispatchOutcome::SkippedDirectory;
        }

        match FileClass::from_path(path) {
            FileClass::Convertible(converter) => {
                wait_until_settled(self.registry.config().grace, path).await;
                self.convert(converter, path).await
            }
            FileClass::Temporary => {
                info!("Ignored temporary file: {}", path.display());
                self.progress.on_ignored(path);
                DispatchOutcome::Ignored
            }
            FileClass::Unsupported { extension } => {
                debug!(
                    "Unsupported extension {:?} for {}, deleting after grace period",
                    extension.as_deref().unwrap_or(""),
                    path.display()
                );
                wait_for_grace(self.registry.config().grace, path).await;
                self.delete(path).await
            }
        }
    }

    async fn convert(&self, converter: Converter, path: &Path) -> DispatchOutcome {
        let job = match ConversionJob::new(path, &self.output_folder) {
            Ok(job) => job,
            Err(e) => return self.failed(path, &e.to_string()),
        };

        info!("Converting {} ({})", path.display(), converter);
        let started = Instant::now();
        match self.registry.convert(converter, &job).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                info!(
                    "Converted {} → {} in {:.2}s",
                    path.display(),
                    job.target.display(),
                    elapsed.as_secs_f64()
                );
                self.progress.on_converted(path, &job.target, elapsed);
                DispatchOutcome::Converted {
                    converter,
                    target: job.target,
                }
            }
            Err(e) => self.failed(path, &e.to_string()),
        }
    }

    async fn delete(&self, path: &Path) -> DispatchOutcome {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!("Deleted unsupported file: {}", path.display());
                self.progress.on_deleted(path);
                DispatchOutcome::Deleted
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", path.display(), e);
                self.progress.on_conversion_failed(path, &e.to_string());
                DispatchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn failed(&self, path: &Path, reason: &str) -> DispatchOutcome {
        error!("Failed to convert {}: {}", path.display(), reason);
        self.progress.on_conversion_failed(path, reason);
        DispatchOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Wait according to `policy` before an unsupported file is deleted.
pub async fn wait_for_grace(policy: GracePolicy, path: &Path) {
    match policy {
        GracePolicy::FixedDelay(delay) => tokio::time::sleep(delay).await,
        GracePolicy::StableSize { poll, max_wait } => {
            wait_for_stable_size(path, poll, max_wait).await
        }
    }
}

/// Wait until a convertible file has stopped growing.
///
/// The size is sampled every grace delay (or every `poll` for
/// [`GracePolicy::StableSize`]) and the wait ends at the first unchanged
/// sample or after the maximum wait.
pub async fn wait_until_settled(policy: GracePolicy, path: &Path) {
    let (poll, max_wait) = match policy {
        GracePolicy::FixedDelay(delay) => (delay, SETTLE_MAX_WAIT),
        GracePolicy::StableSize { poll, max_wait } => (poll, max_wait),
    };
    wait_for_stable_size(path, poll, max_wait).await
}

async fn wait_for_stable_size(path: &Path, poll: Duration, max_wait: Duration) {
    let deadline = tokio::time::Instant::now() + max_wait;
    let mut last = file_size(path).await;
    loop {
        if tokio::time::Instant::now() >= deadline {
            debug!("{} still changing after {:?}", path.display(), max_wait);
            break;
        }
        tokio::time::sleep(poll).await;
        let size = file_size(path).await;
        if size == last {
            break;
        }
        last = size;
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}
