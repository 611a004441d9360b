//! Spreadsheet converter: `.xls` / `.xlsx` → PDF via a headless LibreOffice.
//!
//! ## Why a scoped session?
//!
//! The engine is an external process with state on disk: a user profile
//! (which it locks while running) and the exported file. [`OfficeSession`]
//! owns both as temporary directories and the child process is spawned with
//! `kill_on_drop`, so every exit path (success, engine failure, timeout,
//! caller cancellation) kills the engine and removes the directories.
//!
//! `soffice` is only a launcher: it forks the worker that does the export.
//! On Unix the engine therefore runs in its own process group, and the
//! whole group is killed when the export returns or is cancelled.
//!
//! The export directory is created inside the output folder so the final
//! move into place is a same-filesystem rename.

use crate::error::ConvertError;
use crate::pipeline::output::replace_file;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One engine invocation with its private profile and export directories.
#[derive(Debug)]
pub struct OfficeSession {
    program: String,
    profile: TempDir,
    export_dir: TempDir,
    timeout: Duration,
}

impl OfficeSession {
    /// Create the session directories. `output_folder` must exist.
    pub fn new(
        program: impl Into<String>,
        output_folder: &Path,
        timeout: Duration,
    ) -> Result<Self, ConvertError> {
        let profile = tempfile::Builder::new()
            .prefix("folder2pdf-profile-")
            .tempdir()
            .map_err(|e| ConvertError::Internal(format!("engine profile dir: {}", e)))?;
        let export_dir = tempfile::Builder::new()
            .prefix(".folder2pdf-export-")
            .tempdir_in(output_folder)
            .map_err(|e| ConvertError::OutputWriteFailed {
                path: output_folder.to_path_buf(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            program: program.into(),
            profile,
            export_dir,
            timeout,
        })
    }

    /// Run the engine on `source` and return the exported PDF path.
    pub async fn export(&self, source: &Path) -> Result<PathBuf, ConvertError> {
        let stem = source
            .file_stem()
            .ok_or_else(|| ConvertError::InvalidSourceName {
                path: source.to_path_buf(),
            })?;

        let mut cmd = Command::new(&self.program);
        cmd.arg(format!(
            "-env:UserInstallation={}",
            file_url(self.profile.path())
        ))
        .args([
            "--headless",
            "--norestore",
            "--nolockcheck",
            "--convert-to",
            "pdf",
            "--outdir",
        ])
        .arg(self.export_dir.path())
        .arg(source)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("Spawning {} for {}", self.program, source.display());
        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| ConvertError::EngineUnavailable {
            program: self.program.clone(),
            detail: e.to_string(),
        })?;
        #[cfg(unix)]
        let _group = ProcessGroupGuard {
            pgid: child.id().map(|id| id as libc::pid_t),
        };

        // On timeout the child handle is dropped, which kills the engine.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!(
                    "{} exceeded {}s on {}, killed",
                    self.program,
                    self.timeout.as_secs(),
                    source.display()
                );
                ConvertError::EngineTimeout {
                    secs: self.timeout.as_secs(),
                }
            })?
            .map_err(|e| ConvertError::EngineFailed {
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::EngineFailed {
                detail: format!("{} ({})", output.status, stderr.trim()),
            });
        }

        let mut name = stem.to_os_string();
        name.push(".pdf");
        let exported = self.export_dir.path().join(name);
        if !exported.is_file() {
            return Err(ConvertError::ExportMissing { path: exported });
        }

        debug!(
            "{} exported {} in {:.1}s",
            self.program,
            exported.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(exported)
    }
}

/// Kills every process left in the engine's group when dropped.
#[cfg(unix)]
#[derive(Debug)]
struct ProcessGroupGuard {
    pgid: Option<libc::pid_t>,
}

#[cfg(unix)]
impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // Fails with ESRCH once every member has exited.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
                debug!("Killed leftover engine processes in group {}", pgid);
            }
        }
    }
}

/// Convert the workbook at `source` into a PDF at `target`.
///
/// Any existing file at `target` is replaced only after the engine has
/// produced a complete export.
pub async fn convert(
    source: &Path,
    target: &Path,
    program: &str,
    timeout: Duration,
) -> Result<(), ConvertError> {
    if !source.is_file() {
        return Err(ConvertError::SourceUnreadable {
            path: source.to_path_buf(),
            detail: "not a regular file".into(),
        });
    }
    let output_folder = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let session = OfficeSession::new(program, output_folder, timeout)?;
    let exported = session.export(source).await?;
    replace_file(&exported, target)?;
    info!("Exported {} with {}", source.display(), program);
    Ok(())
}

/// Whether `program` can be started (`--version` exits successfully).
pub async fn engine_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// `file://` URL for an engine `-env:` argument.
fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{}", s)
    } else {
        format!("file:///{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_forms() {
        assert_eq!(file_url(Path::new("/tmp/p")), "file:///tmp/p");
        assert_eq!(file_url(Path::new("C:\\t\\p")), "file:///C:/t/p");
    }

    #[tokio::test]
    async fn missing_engine_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("book.xlsx");
        std::fs::write(&source, b"PK").unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let err = convert(
            &source,
            &out.join("book.pdf"),
            "folder2pdf-no-such-engine",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvertError::EngineUnavailable { .. }), "got: {err}");
        // Session directories are gone.
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_source_is_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = convert(
            &dir.path().join("nope.xls"),
            &dir.path().join("nope.pdf"),
            "soffice",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvertError::SourceUnreadable { .. }), "got: {err}");
    }

    #[cfg(unix)]
    mod fake_engine {
        use super::super::convert;
        use crate::error::ConvertError;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};
        use std::time::Duration;
        use tempfile::TempDir;

        /// Writes `<outdir>/<stem>.pdf` = "%PDF-1.4\n" + source bytes.
        const EXPORTING: &str = r#"#!/bin/sh
outdir=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    *) src="$1"; shift ;;
  esac
done
name=$(basename "$src")
stem="${name%.*}"
{ printf '%%PDF-1.4\n'; cat "$src"; } > "$outdir/$stem.pdf"
"#;

        fn script(dir: &Path, name: &str, body: &str) -> String {
            let path = dir.join(name);
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        struct Fixture {
            _dir: TempDir,
            bin: PathBuf,
            source: PathBuf,
            out: PathBuf,
        }

        fn fixture() -> Fixture {
            let dir = TempDir::new().unwrap();
            let bin = dir.path().join("bin");
            let out = dir.path().join("out");
            std::fs::create_dir(&bin).unwrap();
            std::fs::create_dir(&out).unwrap();
            let source = dir.path().join("book.xlsx");
            std::fs::write(&source, b"v1").unwrap();
            Fixture {
                _dir: dir,
                bin,
                source,
                out,
            }
        }

        fn out_entries(out: &Path) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(out)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }

        #[tokio::test]
        async fn converting_twice_replaces_the_target() {
            let f = fixture();
            let engine = script(&f.bin, "fake-soffice", EXPORTING);
            let target = f.out.join("book.pdf");

            convert(&f.source, &target, &engine, Duration::from_secs(10))
                .await
                .unwrap();
            assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.4\nv1");

            std::fs::write(&f.source, b"v2").unwrap();
            convert(&f.source, &target, &engine, Duration::from_secs(10))
                .await
                .unwrap();

            assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.4\nv2");
            assert_eq!(out_entries(&f.out), ["book.pdf"], "no leftover export dir");
        }

        #[tokio::test]
        async fn failing_engine_keeps_previous_target() {
            let f = fixture();
            let engine = script(&f.bin, "broken-soffice", "#!/bin/sh\necho boom >&2\nexit 1\n");
            let target = f.out.join("book.pdf");
            std::fs::write(&target, b"%PDF-previous").unwrap();

            let err = convert(&f.source, &target, &engine, Duration::from_secs(10))
                .await
                .unwrap_err();

            assert!(matches!(err, ConvertError::EngineFailed { .. }), "got: {err}");
            assert!(err.to_string().contains("boom"), "got: {err}");
            assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-previous");
            assert_eq!(out_entries(&f.out), ["book.pdf"]);
        }

        #[tokio::test]
        async fn silent_engine_reports_missing_export() {
            let f = fixture();
            let engine = script(&f.bin, "silent-soffice", "#!/bin/sh\nexit 0\n");

            let err = convert(&f.source, &f.out.join("book.pdf"), &engine, Duration::from_secs(10))
                .await
                .unwrap_err();

            assert!(matches!(err, ConvertError::ExportMissing { .. }), "got: {err}");
            assert!(out_entries(&f.out).is_empty());
        }

        /// Whether `pid` is a live (non-zombie) process.
        #[cfg(target_os = "linux")]
        fn running(pid: &str) -> bool {
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Ok(stat) => stat
                    .rsplit(')')
                    .next()
                    .is_some_and(|rest| !rest.trim_start().starts_with('Z')),
                Err(_) => false,
            }
        }

        #[cfg(target_os = "linux")]
        async fn gone(pid: &str) -> bool {
            for _ in 0..40 {
                if !running(pid) {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            !running(pid)
        }

        /// An engine that forks a worker and waits on it, like `soffice`.
        #[cfg(target_os = "linux")]
        fn forking_engine(f: &Fixture) -> (String, PathBuf) {
            let pid_file = f.bin.join("worker.pid");
            let body = format!(
                "#!/bin/sh\nsleep 60 &\necho $! > '{}'\nwait\n",
                pid_file.display()
            );
            (script(&f.bin, "forking-soffice", &body), pid_file)
        }

        #[cfg(target_os = "linux")]
        async fn worker_pid(pid_file: &Path) -> String {
            for _ in 0..40 {
                if let Ok(pid) = std::fs::read_to_string(pid_file) {
                    if !pid.trim().is_empty() {
                        return pid.trim().to_string();
                    }
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            panic!("engine never wrote {}", pid_file.display());
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        async fn timeout_kills_forked_engine_worker() {
            let f = fixture();
            let (engine, pid_file) = forking_engine(&f);

            let err = convert(&f.source, &f.out.join("book.pdf"), &engine, Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(matches!(err, ConvertError::EngineTimeout { secs: 1 }), "got: {err}");

            let pid = worker_pid(&pid_file).await;
            assert!(gone(&pid).await, "engine worker {pid} still running after timeout");
            assert!(out_entries(&f.out).is_empty());
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        async fn cancelled_conversion_kills_forked_engine_worker() {
            let f = fixture();
            let (engine, pid_file) = forking_engine(&f);

            let target = f.out.join("book.pdf");
            let pending = convert(&f.source, &target, &engine, Duration::from_secs(60));
            let cancelled = tokio::time::timeout(Duration::from_millis(500), pending).await;
            assert!(cancelled.is_err(), "conversion should still be running");

            let pid = worker_pid(&pid_file).await;
            assert!(gone(&pid).await, "engine worker {pid} still running after cancel");
            assert!(out_entries(&f.out).is_empty());
        }

        #[tokio::test]
        async fn hung_engine_times_out() {
            let f = fixture();
            let engine = script(&f.bin, "hung-soffice", "#!/bin/sh\nexec sleep 30\n");

            let err = convert(&f.source, &f.out.join("book.pdf"), &engine, Duration::from_secs(1))
                .await
                .unwrap_err();

            assert!(matches!(err, ConvertError::EngineTimeout { secs: 1 }), "got: {err}");
            assert!(out_entries(&f.out).is_empty());
        }
    }

    #[tokio::test]
    async fn real_engine_exports_workbook() {
        if !engine_available("soffice").await {
            eprintln!("SKIP — soffice not installed");
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        // LibreOffice imports CSV content regardless of the .xls name.
        let source = dir.path().join("sheet.xls");
        std::fs::write(&source, "a,b\n1,2\n").unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let target = out.join("sheet.pdf");

        match convert(&source, &target, "soffice", Duration::from_secs(120)).await {
            Ok(()) => {
                let bytes = std::fs::read(&target).unwrap();
                assert!(bytes.starts_with(b"%PDF"));
            }
            // Some engine builds refuse CSV-in-.xls; the session must still clean up.
            Err(e) => {
                eprintln!("engine refused the sample: {e}");
                assert!(!target.exists());
            }
        }
        assert!(std::fs::read_dir(&out)
            .unwrap()
            .all(|e| e.unwrap().file_name() == "sheet.pdf"));
    }
}
