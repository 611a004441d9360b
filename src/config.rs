//! Configuration: the persisted folder pair and the in-process pipeline settings.
//!
//! Two kinds of configuration live here:
//!
//! * [`Configuration`] — the watch folder and output folder. Persisted by
//!   [`ConfigStore`] as a flat JSON record with exactly two keys
//!   (`pdf_folder`, `watch_folder`) and mutated only by the two
//!   folder-selection actions. Each watch session receives an immutable
//!   snapshot; nothing reads a shared, mutable copy while watching.
//!
//! * [`PipelineConfig`] — everything else (font, grace policy, spreadsheet
//!   engine). Not persisted; built from CLI flags / environment through
//!   [`PipelineConfigBuilder`], which validates the values.

use crate::error::Folder2PdfError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default location of the persisted record, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default output folder written into a freshly created record.
pub const DEFAULT_PDF_FOLDER: &str = "./pdfs";

/// Default watch folder written into a freshly created record.
pub const DEFAULT_WATCH_FOLDER: &str = "./watch_folder";

/// Default TrueType font used by the document converter.
pub const DEFAULT_FONT_PATH: &str = "fonts/DejaVuSans.ttf";

// ── Persisted folder pair ────────────────────────────────────────────────

/// The two folders a watch session operates on, as absolute paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
    /// Folder monitored for new files.
    pub watch_folder: PathBuf,
    /// Folder receiving converted PDFs.
    pub output_folder: PathBuf,
}

impl Configuration {
    pub fn new(watch_folder: impl Into<PathBuf>, output_folder: impl Into<PathBuf>) -> Self {
        Self {
            watch_folder: watch_folder.into(),
            output_folder: output_folder.into(),
        }
    }

    /// Reject folder combinations the pipeline cannot run on.
    ///
    /// An output folder equal to the watch folder would feed every produced
    /// PDF back into the dispatcher as an unsupported file and delete it.
    pub fn validate(&self) -> Result<(), Folder2PdfError> {
        if normalise(&self.watch_folder) == normalise(&self.output_folder) {
            return Err(Folder2PdfError::InvalidConfig(format!(
                "watch folder and output folder must differ (both are '{}')",
                self.watch_folder.display()
            )));
        }
        Ok(())
    }

    /// Create both folders if they are missing.
    pub fn ensure_directories(&self) -> Result<(), Folder2PdfError> {
        for dir in [&self.watch_folder, &self.output_folder] {
            std::fs::create_dir_all(dir).map_err(|e| Folder2PdfError::CreateDir {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// On-disk shape of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ConfigRecord {
    pdf_folder: String,
    watch_folder: String,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            pdf_folder: DEFAULT_PDF_FOLDER.to_string(),
            watch_folder: DEFAULT_WATCH_FOLDER.to_string(),
        }
    }
}

/// Loads and persists the [`Configuration`] record.
///
/// Relative paths (in the record or given to the folder-selection actions)
/// are resolved against `base_dir`, which defaults to the process working
/// directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    base_dir: PathBuf,
}

impl ConfigStore {
    /// Create a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Resolve relative paths against `dir` instead of the working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Absolute path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.resolve(&self.path)
    }

    /// Resolve `p` to an absolute, `.`-free path.
    pub fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            normalise(p)
        } else {
            normalise(&self.base_dir.join(p))
        }
    }

    /// Read the record, creating it with defaults if absent.
    ///
    /// Both folders are created if missing before returning.
    pub fn load(&self) -> Result<Configuration, Folder2PdfError> {
        let path = self.path();

        if !path.exists() {
            info!("Config file not found, creating defaults at {}", path.display());
            self.write_record(&ConfigRecord::default())?;
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| Folder2PdfError::ConfigRead {
            path: path.clone(),
            source: e,
        })?;
        let record: ConfigRecord =
            serde_json::from_str(&raw).map_err(|e| Folder2PdfError::ConfigParse {
                path: path.clone(),
                source: e,
            })?;

        let config = Configuration {
            watch_folder: self.resolve(Path::new(&record.watch_folder)),
            output_folder: self.resolve(Path::new(&record.pdf_folder)),
        };
        config.validate()?;
        config.ensure_directories()?;

        debug!(
            "Loaded config: watch={} output={}",
            config.watch_folder.display(),
            config.output_folder.display()
        );
        Ok(config)
    }

    /// Overwrite the persisted record with `config`.
    pub fn save(&self, config: &Configuration) -> Result<(), Folder2PdfError> {
        config.validate()?;
        let record = ConfigRecord {
            pdf_folder: self.resolve(&config.output_folder).to_string_lossy().into_owned(),
            watch_folder: self.resolve(&config.watch_folder).to_string_lossy().into_owned(),
        };
        self.write_record(&record)?;
        config.ensure_directories()
    }

    /// Folder-selection action: monitor `dir` from the next session on.
    pub fn set_watch_folder(&self, dir: impl AsRef<Path>) -> Result<Configuration, Folder2PdfError> {
        let mut config = self.load()?;
        config.watch_folder = self.resolve(dir.as_ref());
        self.save(&config)?;
        info!("Watch folder set to {}", config.watch_folder.display());
        Ok(config)
    }

    /// Folder-selection action: write PDFs to `dir` from the next session on.
    pub fn set_output_folder(&self, dir: impl AsRef<Path>) -> Result<Configuration, Folder2PdfError> {
        let mut config = self.load()?;
        config.output_folder = self.resolve(dir.as_ref());
        self.save(&config)?;
        info!("Output folder set to {}", config.output_folder.display());
        Ok(config)
    }

    /// Atomic write: temp file in the same folder, then rename.
    fn write_record(&self, record: &ConfigRecord) -> Result<(), Folder2PdfError> {
        let path = self.path();
        let write_err = |e: std::io::Error| Folder2PdfError::ConfigWrite {
            path: path.clone(),
            source: e,
        };

        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());
        std::fs::create_dir_all(&parent).map_err(write_err)?;

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        record
            .serialize(&mut ser)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        buf.push(b'\n');

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(&buf).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

/// Lexically drop `.` components (`/a/./b` → `/a/b`).
fn normalise(p: &Path) -> PathBuf {
    p.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

// ── Pipeline settings ────────────────────────────────────────────────────

/// What to do before deleting a file with an unsupported extension.
///
/// Deleting on the creation event alone would race the writer, so the
/// dispatcher waits first. Neither policy is a correctness guarantee: a
/// writer that pauses longer than the policy allows still loses its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracePolicy {
    /// Sleep for a fixed duration, then delete. (default: 1 s)
    FixedDelay(Duration),
    /// Poll the file size every `poll` until two samples agree, giving up
    /// after `max_wait`, then delete.
    StableSize { poll: Duration, max_wait: Duration },
}

impl Default for GracePolicy {
    fn default() -> Self {
        GracePolicy::FixedDelay(Duration::from_secs(1))
    }
}

/// In-process settings shared by the dispatcher and the converters.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use folder2pdf::{GracePolicy, PipelineConfig};
/// use std::time::Duration;
///
/// let config = PipelineConfig::builder()
///     .font_path("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf")
///     .grace(GracePolicy::FixedDelay(Duration::from_millis(500)))
///     .office_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// TrueType font embedded by the document converter. Default: `fonts/DejaVuSans.ttf`.
    pub font_path: PathBuf,

    /// Font size in points for document text. Range: 4–72. Default: 10.
    pub font_size: f32,

    /// Wait applied before deleting unsupported files. Default: 1 s fixed delay.
    pub grace: GracePolicy,

    /// Spreadsheet engine executable. Default: `soffice`.
    pub office_program: String,

    /// Upper bound on one spreadsheet export, in seconds. Default: 120.
    ///
    /// The engine is killed when the bound is hit; the file counts as a
    /// failed conversion.
    pub office_timeout_secs: u64,

    /// How often [`crate::session::WatchService`] re-reads the config file. Default: 2 s.
    pub reload_interval: Duration,

    /// Optional per-file event observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
            font_size: 10.0,
            grace: GracePolicy::default(),
            office_program: "soffice".to_string(),
            office_timeout_secs: 120,
            reload_interval: Duration::from_secs(2),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("font_path", &self.font_path)
            .field("font_size", &self.font_size)
            .field("grace", &self.grace)
            .field("office_program", &self.office_program)
            .field("office_timeout_secs", &self.office_timeout_secs)
            .field("reload_interval", &self.reload_interval)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn WatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Create the fonts asset folder (parent of `font_path`) if missing.
    pub fn ensure_asset_dirs(&self) -> Result<(), Folder2PdfError> {
        match self.font_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|e| Folder2PdfError::CreateDir {
                    path: dir.to_path_buf(),
                    source: e,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = path.into();
        self
    }

    pub fn font_size(mut self, size: f32) -> Self {
        self.config.font_size = size;
        self
    }

    pub fn grace(mut self, policy: GracePolicy) -> Self {
        self.config.grace = policy;
        self
    }

    pub fn office_program(mut self, program: impl Into<String>) -> Self {
        self.config.office_program = program.into();
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = secs;
        self
    }

    pub fn reload_interval(mut self, interval: Duration) -> Self {
        self.config.reload_interval = interval;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Folder2PdfError> {
        let c = &self.config;
        if !c.font_size.is_finite() || c.font_size < 4.0 || c.font_size > 72.0 {
            return Err(Folder2PdfError::InvalidConfig(format!(
                "Font size must be 4–72 pt, got {}",
                c.font_size
            )));
        }
        if c.office_program.trim().is_empty() {
            return Err(Folder2PdfError::InvalidConfig(
                "Spreadsheet engine program must not be empty".into(),
            ));
        }
        if c.office_timeout_secs == 0 {
            return Err(Folder2PdfError::InvalidConfig(
                "Spreadsheet engine timeout must be ≥ 1 s".into(),
            ));
        }
        if c.reload_interval.is_zero() {
            return Err(Folder2PdfError::InvalidConfig(
                "Config reload interval must be non-zero".into(),
            ));
        }
        if let GracePolicy::StableSize { poll, .. } = c.grace {
            if poll.is_zero() {
                return Err(Folder2PdfError::InvalidConfig(
                    "Stable-size poll interval must be non-zero".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(DEFAULT_CONFIG_FILE).with_base_dir(dir.path())
    }

    #[test]
    fn load_creates_default_record() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let config = store.load().expect("load should create defaults");

        assert_eq!(config.watch_folder, dir.path().join("watch_folder"));
        assert_eq!(config.output_folder, dir.path().join("pdfs"));
        assert!(config.watch_folder.is_dir());
        assert!(config.output_folder.is_dir());

        let raw = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2, "record must have exactly two keys: {raw}");
        assert_eq!(obj["pdf_folder"], "./pdfs");
        assert_eq!(obj["watch_folder"], "./watch_folder");
        assert!(raw.contains("\n    \"pdf_folder\""), "4-space indent expected: {raw}");
    }

    #[test]
    fn load_recreates_missing_folders() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let config = store.load().unwrap();

        std::fs::remove_dir_all(&config.output_folder).unwrap();
        let again = store.load().unwrap();
        assert!(again.output_folder.is_dir());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.load().unwrap();

        let config = Configuration::new(dir.path().join("in"), dir.path().join("out"));
        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn set_watch_folder_persists_absolute_path() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let config = store.set_watch_folder("incoming").unwrap();
        assert_eq!(config.watch_folder, dir.path().join("incoming"));
        assert!(config.watch_folder.is_dir());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let persisted = PathBuf::from(value["watch_folder"].as_str().unwrap());
        assert!(persisted.is_absolute());
        assert_eq!(persisted, dir.path().join("incoming"));
    }

    #[test]
    fn set_output_folder_keeps_watch_folder() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let before = store.load().unwrap();

        let after = store.set_output_folder(dir.path().join("converted")).unwrap();
        assert_eq!(after.watch_folder, before.watch_folder);
        assert_eq!(after.output_folder, dir.path().join("converted"));
        assert_eq!(store.load().unwrap(), after);
    }

    #[test]
    fn identical_folders_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let config = store.load().unwrap();

        let err = store.set_output_folder(&config.watch_folder).unwrap_err();
        assert!(matches!(err, Folder2PdfError::InvalidConfig(_)), "got: {err}");
        // Record unchanged
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn garbage_record_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let err = store_in(&dir).load().unwrap_err();
        assert!(matches!(err, Folder2PdfError::ConfigParse { .. }), "got: {err}");
    }

    #[test]
    fn missing_key_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"pdf_folder": "./pdfs"}"#).unwrap();
        let err = store_in(&dir).load().unwrap_err();
        assert!(err.to_string().contains("watch_folder"), "got: {err}");
    }

    #[test]
    fn resolve_drops_current_dir_components() {
        let store = ConfigStore::new("config.json").with_base_dir("/srv/app");
        assert_eq!(store.resolve(Path::new("./pdfs")), PathBuf::from("/srv/app/pdfs"));
        assert_eq!(store.resolve(Path::new("/abs/./x")), PathBuf::from("/abs/x"));
    }

    #[test]
    fn builder_defaults() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.font_path, PathBuf::from(DEFAULT_FONT_PATH));
        assert_eq!(config.font_size, 10.0);
        assert_eq!(config.grace, GracePolicy::FixedDelay(Duration::from_secs(1)));
        assert_eq!(config.office_program, "soffice");
        assert_eq!(config.office_timeout_secs, 120);
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(PipelineConfig::builder().font_size(0.0).build().is_err());
        assert!(PipelineConfig::builder().office_program("  ").build().is_err());
        assert!(PipelineConfig::builder().office_timeout_secs(0).build().is_err());
        assert!(PipelineConfig::builder()
            .grace(GracePolicy::StableSize {
                poll: Duration::ZERO,
                max_wait: Duration::from_secs(5),
            })
            .build()
            .is_err());
    }

    #[test]
    fn ensure_asset_dirs_creates_font_folder() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::builder()
            .font_path(dir.path().join("fonts").join("DejaVuSans.ttf"))
            .build()
            .unwrap();
        config.ensure_asset_dirs().unwrap();
        assert!(dir.path().join("fonts").is_dir());
    }
}
