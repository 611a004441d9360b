//! CLI binary for folder2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the folder-selection actions against the config
//! file, and runs the watch service until Ctrl-C.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use folder2pdf::config::{DEFAULT_CONFIG_FILE, DEFAULT_FONT_PATH};
use folder2pdf::pipeline::spreadsheet::engine_available;
use folder2pdf::{
    ConfigStore, ConversionJob, ConverterRegistry, FileClass, GracePolicy, PipelineConfig,
    ProgressCallback, WatchProgressCallback, WatchService, INSTRUCTIONS,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner showing the watched folder, plus
/// one log line per handled file printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
    converted: AtomicUsize,
    failed: AtomicUsize,
    deleted: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed_precise}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            converted: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        let converted = self.converted.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let deleted = self.deleted.load(Ordering::SeqCst);
        eprintln!(
            "{} {} converted  {} failed  {} deleted",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&converted.to_string()),
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            },
            deleted,
        );
    }
}

impl WatchProgressCallback for CliProgressCallback {
    fn on_session_start(&self, watch_folder: &Path, output_folder: &Path) {
        self.bar.set_prefix("Watching");
        self.bar.set_message(watch_folder.display().to_string());
        self.bar.println(format!(
            "{} {} {} {}",
            cyan("◆"),
            bold(&watch_folder.display().to_string()),
            dim("→"),
            bold(&output_folder.display().to_string()),
        ));
    }

    fn on_file_detected(&self, source: &Path) {
        self.bar.set_prefix("Handling");
        self.bar.set_message(file_name(source));
    }

    fn on_converted(&self, source: &Path, target: &Path, elapsed: Duration) {
        self.converted.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            file_name(source),
            dim(&format!("→ {}", file_name(target))),
            dim(&format!("{:.1}s", elapsed.as_secs_f64())),
        ));
        self.bar.set_prefix("Watching");
    }

    fn on_conversion_failed(&self, source: &Path, error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);

        // Keep output tidy: first line only, at most 80 chars.
        let first = error.lines().next().unwrap_or(error);
        let msg = if first.chars().count() > 80 {
            format!("{}\u{2026}", first.chars().take(79).collect::<String>())
        } else {
            first.to_string()
        };

        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            file_name(source),
            red(&msg)
        ));
        self.bar.set_prefix("Watching");
    }

    fn on_ignored(&self, source: &Path) {
        self.bar
            .println(dim(&format!("  · {}  ignored (temporary)", file_name(source))));
        self.bar.set_prefix("Watching");
    }

    fn on_deleted(&self, source: &Path) {
        self.deleted.fetch_add(1, Ordering::SeqCst);
        self.bar
            .println(dim(&format!("  − {}  deleted (unsupported)", file_name(source))));
        self.bar.set_prefix("Watching");
    }

    fn on_session_stop(&self, watch_folder: &Path) {
        self.bar.println(format!(
            "{} {}",
            dim("◇ stopped watching"),
            dim(&watch_folder.display().to_string())
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Watch the configured folder until Ctrl-C
  folder2pdf

  # Choose folders (persisted in config.json)
  folder2pdf set-watch-folder ~/Scans
  folder2pdf set-output-folder ~/Scans/PDF

  # One-off conversion into the configured output folder
  folder2pdf convert report.docx

  # Safer deletion: wait until the file size stops changing
  folder2pdf --stable-size --grace-ms 500

WHAT HAPPENS TO A NEW FILE:
  .docx                    text laid out on A4 pages (needs the TrueType font)
  .png .jpg .jpeg          image placed on one A4 page
  .xls .xlsx               exported by LibreOffice (soffice)
  .tmp                     left alone
  anything else            deleted after the grace period

  Deletion after a fixed delay can hit a file that is still being written
  by a slow writer. Prefer --stable-size when files arrive slowly.

ENVIRONMENT VARIABLES:
  FOLDER2PDF_CONFIG          Config file path (default: config.json)
  FOLDER2PDF_FONT            TrueType font for .docx text
  FOLDER2PDF_OFFICE_PROGRAM  Spreadsheet engine executable
  RUST_LOG                   Log filter, overrides -v / -q

SETUP:
  1. Put a TrueType font at fonts/DejaVuSans.ttf (or pass --font).
  2. Install LibreOffice for spreadsheets.
  3. Run:  folder2pdf
"#;

/// Watch a folder and convert new files to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "folder2pdf",
    version,
    about = "Watch a folder and convert new documents, images and spreadsheets to PDF",
    long_about = "Watch a folder and convert every new .docx, .png, .jpg, .jpeg, .xls and .xlsx \
file into a PDF in the output folder. Temporary .tmp files are ignored; files with any other \
extension are deleted after a grace period.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file holding the watch and output folders.
    #[arg(long, global = true, env = "FOLDER2PDF_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// TrueType font used for .docx text.
    #[arg(long, global = true, env = "FOLDER2PDF_FONT", default_value = DEFAULT_FONT_PATH)]
    font: PathBuf,

    /// Font size in points for .docx text (4–72).
    #[arg(long, global = true, env = "FOLDER2PDF_FONT_SIZE", default_value_t = 10.0)]
    font_size: f32,

    /// Grace period before deleting unsupported files, in milliseconds.
    #[arg(long, global = true, env = "FOLDER2PDF_GRACE_MS", default_value_t = 1000)]
    grace_ms: u64,

    /// Delete unsupported files only once their size stops changing
    /// (sampled every --grace-ms, giving up after 30 s).
    #[arg(long, global = true, env = "FOLDER2PDF_STABLE_SIZE")]
    stable_size: bool,

    /// Spreadsheet engine executable.
    #[arg(long, global = true, env = "FOLDER2PDF_OFFICE_PROGRAM", default_value = "soffice")]
    office_program: String,

    /// Spreadsheet engine timeout in seconds.
    #[arg(long, global = true, env = "FOLDER2PDF_OFFICE_TIMEOUT", default_value_t = 120)]
    office_timeout: u64,

    /// How often the watcher re-reads the config file, in milliseconds.
    #[arg(long, global = true, env = "FOLDER2PDF_RELOAD_MS", default_value_t = 2000)]
    reload_ms: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FOLDER2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FOLDER2PDF_QUIET")]
    quiet: bool,

    /// Disable the spinner; log lines are printed instead.
    #[arg(long, global = true, env = "FOLDER2PDF_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Watch the configured folder until Ctrl-C (default).
    Watch,
    /// Choose the folder to watch.
    SetWatchFolder {
        /// Folder to watch; created if missing.
        dir: PathBuf,
    },
    /// Choose the folder PDFs are written to.
    SetOutputFolder {
        /// Output folder; created if missing.
        dir: PathBuf,
    },
    /// Print usage instructions and the state of external requirements.
    Info,
    /// Print the resolved configuration as JSON.
    ShowConfig,
    /// Convert one file now (unsupported files are left untouched).
    Convert {
        /// File to convert.
        file: PathBuf,
        /// Output folder (default: the configured one).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.clone().unwrap_or(Command::Watch);

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // per-file lines provide all the feedback that matters to the user.
    let show_progress = matches!(command, Command::Watch) && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store = ConfigStore::new(&cli.config);

    match command {
        Command::Watch => {
            let progress = if show_progress {
                Some(CliProgressCallback::new())
            } else {
                None
            };
            let config = build_config(
                &cli,
                progress
                    .clone()
                    .map(|cb| cb as Arc<dyn WatchProgressCallback>),
            )?;

            WatchService::new(store, config)
                .run(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
                .context("Watcher failed")?;

            if let Some(cb) = progress {
                cb.finish();
            }
        }

        Command::SetWatchFolder { dir } => {
            let config = store
                .set_watch_folder(&dir)
                .with_context(|| format!("Failed to set watch folder to {}", dir.display()))?;
            report_saved("Watch folder", &config.watch_folder, &cli);
        }

        Command::SetOutputFolder { dir } => {
            let config = store
                .set_output_folder(&dir)
                .with_context(|| format!("Failed to set output folder to {}", dir.display()))?;
            report_saved("Output folder", &config.output_folder, &cli);
        }

        Command::Info => {
            println!("{}", bold("Information"));
            println!("{INSTRUCTIONS}");
            println!();
            println!("Config file:  {}", store.path().display());
            let font_ok = cli.font.is_file();
            println!(
                "Font:         {}  {}",
                cli.font.display(),
                if font_ok { green("found") } else { red("missing") }
            );
            let engine_ok = engine_available(&cli.office_program).await;
            println!(
                "Spreadsheets: {}  {}",
                cli.office_program,
                if engine_ok { green("available") } else { red("not found") }
            );
        }

        Command::ShowConfig => {
            let config = store.load().context("Failed to load configuration")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to serialise configuration")?
            );
        }

        Command::Convert { file, output } => {
            let output_folder = match output {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)
                        .with_context(|| format!("Failed to create {}", dir.display()))?;
                    dir
                }
                None => {
                    store
                        .load()
                        .context("Failed to load configuration")?
                        .output_folder
                }
            };

            let converter = match FileClass::from_path(&file) {
                FileClass::Convertible(c) => c,
                _ => anyhow::bail!(
                    "'{}' is not a supported format (.docx, .png, .jpg, .jpeg, .xls, .xlsx)",
                    file.display()
                ),
            };

            let job = ConversionJob::new(&file, &output_folder).context("Invalid input file")?;
            let registry = ConverterRegistry::new(build_config(&cli, None)?);
            let started = Instant::now();
            registry
                .convert(converter, &job)
                .await
                .with_context(|| format!("Conversion of {} failed", file.display()))?;

            if !cli.quiet {
                eprintln!(
                    "{}  {}  {}  →  {}",
                    green("✔"),
                    converter,
                    dim(&format!("{}ms", started.elapsed().as_millis())),
                    bold(&job.target.display().to_string()),
                );
            }
        }
    }

    Ok(())
}

fn report_saved(what: &str, dir: &Path, cli: &Cli) {
    if cli.quiet {
        return;
    }
    eprintln!("{} {} set to {}", green("✔"), what, bold(&dir.display().to_string()));
    eprintln!(
        "   {}",
        dim(&format!(
            "A running watcher switches over within {}ms.",
            cli.reload_ms
        ))
    );
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let grace = if cli.stable_size {
        GracePolicy::StableSize {
            poll: Duration::from_millis(cli.grace_ms),
            max_wait: Duration::from_secs(30),
        }
    } else {
        GracePolicy::FixedDelay(Duration::from_millis(cli.grace_ms))
    };

    let mut builder = PipelineConfig::builder()
        .font_path(&cli.font)
        .font_size(cli.font_size)
        .grace(grace)
        .office_program(&cli.office_program)
        .office_timeout_secs(cli.office_timeout)
        .reload_interval(Duration::from_millis(cli.reload_ms));

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
