//! Progress-callback trait for per-file watch events.
//!
//! Inject an [`Arc<dyn WatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the dispatcher handles each file.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal spinner, a log file or a
//! notification system without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because the watch session runs on
//! a background Tokio task.
//!
//! # Example
//!
//! ```rust
//! use folder2pdf::{PipelineConfig, WatchProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//! use std::time::Duration;
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl WatchProgressCallback for CountingCallback {
//!     fn on_converted(&self, source: &Path, target: &Path, elapsed: Duration) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} → {} in {:?}", source.display(), target.display(), elapsed);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { converted: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn WatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Called by the watch session and the dispatcher as files come and go.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events for one session arrive in order from a single
/// task.
pub trait WatchProgressCallback: Send + Sync {
    /// Called once when a watch session has subscribed to its folder.
    fn on_session_start(&self, watch_folder: &Path, output_folder: &Path) {
        let _ = (watch_folder, output_folder);
    }

    /// Called for every creation notification before it is classified.
    fn on_file_detected(&self, source: &Path) {
        let _ = source;
    }

    /// Called when a PDF has been written for `source`.
    ///
    /// # Arguments
    /// * `source`  — the file that was converted
    /// * `target`  — the PDF now present in the output folder
    /// * `elapsed` — wall-clock conversion time
    fn on_converted(&self, source: &Path, target: &Path, elapsed: Duration) {
        let _ = (source, target, elapsed);
    }

    /// Called when a conversion failed. The source file is left in place.
    fn on_conversion_failed(&self, source: &Path, error: &str) {
        let _ = (source, error);
    }

    /// Called for temporary files that are deliberately left alone.
    fn on_ignored(&self, source: &Path) {
        let _ = source;
    }

    /// Called after an unsupported file has been deleted.
    fn on_deleted(&self, source: &Path) {
        let _ = source;
    }

    /// Called once after the session has released its folder.
    fn on_session_stop(&self, watch_folder: &Path) {
        let _ = watch_folder;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl WatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn WatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        detected: AtomicUsize,
        converted: AtomicUsize,
        failed: Mutex<Vec<String>>,
        deleted: AtomicUsize,
    }

    impl WatchProgressCallback for TrackingCallback {
        fn on_file_detected(&self, _source: &Path) {
            self.detected.fetch_add(1, Ordering::SeqCst);
        }

        fn on_converted(&self, _source: &Path, _target: &Path, _elapsed: Duration) {
            self.converted.fetch_add(1, Ordering::SeqCst);
        }

        fn on_conversion_failed(&self, _source: &Path, error: &str) {
            self.failed.lock().unwrap().push(error.to_string());
        }

        fn on_deleted(&self, _source: &Path) {
            self.deleted.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let p = Path::new("/watch/a.docx");
        cb.on_session_start(Path::new("/watch"), Path::new("/out"));
        cb.on_file_detected(p);
        cb.on_converted(p, Path::new("/out/a.pdf"), Duration::from_millis(5));
        cb.on_conversion_failed(p, "boom");
        cb.on_ignored(p);
        cb.on_deleted(p);
        cb.on_session_stop(Path::new("/watch"));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let docx = Path::new("/watch/report.docx");
        let txt = Path::new("/watch/notes.txt");

        tracker.on_file_detected(docx);
        tracker.on_converted(docx, Path::new("/out/report.pdf"), Duration::from_millis(12));
        tracker.on_file_detected(txt);
        tracker.on_deleted(txt);
        tracker.on_conversion_failed(docx, "Document is malformed");
        tracker.on_ignored(Path::new("/watch/x.tmp"));

        assert_eq!(tracker.detected.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.converted.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.deleted.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failed.lock().unwrap().as_slice(), ["Document is malformed"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_file_detected(Path::new("/watch/photo.JPG"));
        cb.on_session_stop(Path::new("/watch"));
    }
}
