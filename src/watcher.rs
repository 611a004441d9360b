//! Folder watcher: OS file-creation events for one directory as a `Stream`.
//!
//! ## Why an unbounded channel?
//!
//! `notify` delivers events on its own thread through a callback. The
//! callback must never block (a blocked backend thread drops OS events), so
//! it pushes into an unbounded Tokio channel and the watch session pulls
//! from the other end at its own pace. While a slow conversion runs, new
//! notifications simply queue.
//!
//! ## Which events count as "created"?
//!
//! - `Create(_)`: a new entry.
//! - `Modify(Name(To))`: an entry moved or renamed *into* the folder, which
//!   is how "write elsewhere, then rename" tools deliver files. On inotify a
//!   rename inside the folder also yields `Name(From)` and `Name(Both)`;
//!   only `To` is used so each rename produces one notification.
//! - `Modify(Name(Any))`: backends that cannot tell the two sides of a
//!   rename apart (FSEvents); emitted only if the path exists.
//!
//! Only direct children of the folder are reported.

use crate::error::Folder2PdfError;
use futures::Stream;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Subscription to creation events in one directory.
///
/// Dropping the watcher (or calling [`FolderWatcher::stop`]) releases the
/// OS watch handle.
pub struct FolderWatcher {
    path: PathBuf,
    rx: mpsc::UnboundedReceiver<PathBuf>,
    /// Kept alive for as long as events are wanted.
    watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for FolderWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderWatcher")
            .field("path", &self.path)
            .field("active", &self.watcher.is_some())
            .finish()
    }
}

impl FolderWatcher {
    /// Start watching `dir` (non-recursively).
    pub fn new(dir: &Path) -> Result<Self, Folder2PdfError> {
        let fail = |reason: String| Folder2PdfError::WatchFailed {
            path: dir.to_path_buf(),
            reason,
        };

        // Backends report canonical paths (e.g. /private/var on macOS).
        let path = dir.canonicalize().map_err(|e| fail(e.to_string()))?;
        if !path.is_dir() {
            return Err(fail("not a directory".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let folder = path.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for created in created_paths(&folder, event) {
                        // Receiver gone means the session stopped.
                        let _ = tx.send(created);
                    }
                }
                Err(e) => warn!("Watch backend error on {}: {}", folder.display(), e),
            }
        })
        .map_err(|e| fail(e.to_string()))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| fail(e.to_string()))?;
        debug!("Watching {}", path.display());

        Ok(Self {
            path,
            rx,
            watcher: Some(watcher),
        })
    }

    /// The canonical path being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next created path. `None` once stopped and drained.
    pub async fn next(&mut self) -> Option<PathBuf> {
        self.rx.recv().await
    }

    /// Release the OS watch handle. Already-queued notifications can still
    /// be drained with [`FolderWatcher::next`].
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            debug!("Stopped watching {}", self.path.display());
        }
        self.rx.close();
    }
}

impl Stream for FolderWatcher {
    type Item = PathBuf;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<PathBuf>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Paths in `event` that are newly present direct children of `folder`.
fn created_paths(folder: &Path, event: Event) -> Vec<PathBuf> {
    let wanted = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => true,
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            return event
                .paths
                .into_iter()
                .filter(|p| p.parent() == Some(folder) && p.exists())
                .collect();
        }
        _ => false,
    };
    if !wanted {
        return Vec::new();
    }
    event
        .paths
        .into_iter()
        .filter(|p| p.parent() == Some(folder))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn create_and_rename_to_are_reported() {
        let folder = Path::new("/w");
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path("/w/a.docx".into());
        assert_eq!(created_paths(folder, create), [PathBuf::from("/w/a.docx")]);

        let moved_in = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path("/w/b.png".into());
        assert_eq!(created_paths(folder, moved_in), [PathBuf::from("/w/b.png")]);
    }

    #[test]
    fn other_events_and_nested_paths_are_dropped() {
        let folder = Path::new("/w");
        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/w/a.docx".into());
        assert!(created_paths(folder, write).is_empty());

        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/w/a.tmp".into())
            .add_path("/w/a.docx".into());
        assert!(created_paths(folder, both).is_empty());

        let nested = Event::new(EventKind::Create(CreateKind::File)).add_path("/w/sub/x.docx".into());
        assert!(created_paths(folder, nested).is_empty());
    }

    #[tokio::test]
    async fn reports_new_top_level_file() {
        let dir = TempDir::new().unwrap();
        let mut watcher = FolderWatcher::new(dir.path()).unwrap();

        std::fs::write(dir.path().join("report.docx"), b"x").unwrap();

        let got = timeout(WAIT, watcher.next()).await.expect("event in time");
        assert_eq!(got, Some(watcher.path().join("report.docx")));
    }

    #[tokio::test]
    async fn ignores_files_in_subfolders() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let mut watcher = FolderWatcher::new(dir.path()).unwrap();

        std::fs::write(nested.join("inner.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"x").unwrap();

        let got = timeout(WAIT, watcher.next()).await.expect("event in time");
        assert_eq!(got, Some(watcher.path().join("top.txt")));
    }

    #[tokio::test]
    async fn rename_into_folder_is_a_creation() {
        let root = TempDir::new().unwrap();
        let watched = root.path().join("watch");
        let staging = root.path().join("staging");
        std::fs::create_dir(&watched).unwrap();
        std::fs::create_dir(&staging).unwrap();
        std::fs::write(staging.join("photo.jpg"), b"x").unwrap();

        let mut watcher = FolderWatcher::new(&watched).unwrap();
        std::fs::rename(staging.join("photo.jpg"), watched.join("photo.jpg")).unwrap();

        let got = timeout(WAIT, watcher.next()).await.expect("event in time");
        assert_eq!(got, Some(watcher.path().join("photo.jpg")));
    }

    #[tokio::test]
    async fn works_as_a_stream() {
        use futures::StreamExt;

        let dir = TempDir::new().unwrap();
        let mut watcher = FolderWatcher::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();

        let got = timeout(WAIT, StreamExt::next(&mut watcher)).await.expect("event in time");
        assert_eq!(got, Some(watcher.path().join("a.png")));
    }

    #[tokio::test]
    async fn stop_ends_the_stream() {
        let dir = TempDir::new().unwrap();
        let mut watcher = FolderWatcher::new(dir.path()).unwrap();
        watcher.stop();

        std::fs::write(dir.path().join("late.docx"), b"x").unwrap();
        let got = timeout(WAIT, watcher.next()).await.expect("stream closes");
        assert_eq!(got, None);
    }

    #[test]
    fn missing_folder_is_a_watch_error() {
        let err = FolderWatcher::new(Path::new("/definitely/not/a/folder")).unwrap_err();
        assert!(matches!(err, Folder2PdfError::WatchFailed { .. }), "got: {err}");
    }
}
