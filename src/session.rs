//! Watch sessions: the background task that feeds watcher events to the
//! dispatcher, and the service that restarts it when configuration changes.
//!
//! ## Why snapshots instead of shared configuration?
//!
//! A [`WatchSession`] is started with its own copy of [`Configuration`] and
//! never looks at the config file again. Changing folders therefore means
//! stopping one session and starting another ([`WatchService`] does this),
//! and at no point can a half-updated folder pair be observed.
//!
//! ```text
//! WatchService ── polls ConfigStore every reload interval
//!      │ on change: stop ─┐
//!      ▼                  ▼
//! WatchSession ── FolderWatcher ──▶ Dispatcher ──▶ ConverterRegistry
//! ```

use crate::config::{ConfigStore, Configuration, PipelineConfig};
use crate::dispatch::Dispatcher;
use crate::error::Folder2PdfError;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::watcher::FolderWatcher;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// One running watcher → dispatcher loop on a fixed folder pair.
///
/// Files are handled one at a time in arrival order. Dropping the session
/// without calling [`WatchSession::stop`] also ends the task, but without
/// waiting for it.
#[derive(Debug)]
pub struct WatchSession {
    config: Configuration,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl WatchSession {
    /// Subscribe to `config.watch_folder` and spawn the session task.
    ///
    /// Must be called from within a Tokio runtime. Both folders are created
    /// if missing.
    pub fn start(config: Configuration, pipeline: PipelineConfig) -> Result<Self, Folder2PdfError> {
        config.validate()?;
        config.ensure_directories()?;

        let mut watcher = FolderWatcher::new(&config.watch_folder)?;
        let progress: ProgressCallback = pipeline
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let dispatcher = Dispatcher::new(config.output_folder.clone(), pipeline);

        info!(
            "Watching {} → {}",
            config.watch_folder.display(),
            config.output_folder.display()
        );
        progress.on_session_start(&config.watch_folder, &config.output_folder);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let watch_folder = config.watch_folder.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    // Fires on stop() and when the session handle is dropped.
                    _ = &mut shutdown_rx => break,
                    next = watcher.next() => match next {
                        Some(path) => {
                            let outcome = dispatcher.handle(&path).await;
                            debug!("{} → {:?}", path.display(), outcome);
                        }
                        None => {
                            warn!("Watcher for {} closed unexpectedly", watch_folder.display());
                            break;
                        }
                    },
                }
            }
            watcher.stop();
            progress.on_session_stop(&watch_folder);
            info!("Stopped watching {}", watch_folder.display());
        });

        Ok(Self {
            config,
            shutdown: Some(shutdown_tx),
            handle,
        })
    }

    /// The folder pair this session runs on.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Signal the task and wait for it. A file being converted when the
    /// signal arrives is finished first; queued notifications are dropped.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.handle.await {
            error!("Watch session task failed: {}", e);
        }
    }
}

/// Supervises [`WatchSession`]s, restarting on configuration changes.
#[derive(Debug, Clone)]
pub struct WatchService {
    store: ConfigStore,
    pipeline: PipelineConfig,
}

impl WatchService {
    pub fn new(store: ConfigStore, pipeline: PipelineConfig) -> Self {
        Self { store, pipeline }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Fails only if the initial configuration cannot be loaded or the first
    /// session cannot start. Later reload failures are logged and the
    /// current session keeps running.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), Folder2PdfError>
    where
        F: Future<Output = ()>,
    {
        self.pipeline.ensure_asset_dirs()?;
        let mut active = self.store.load()?;
        let mut session = Some(WatchSession::start(active.clone(), self.pipeline.clone())?);

        let mut interval = tokio::time::interval(self.pipeline.reload_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = ticks.next() => {
                    let loaded = match self.store.load() {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("Failed to reload config, keeping current session: {}", e);
                            continue;
                        }
                    };
                    if loaded == active {
                        continue;
                    }

                    info!(
                        "Configuration changed: watching {} → {}",
                        loaded.watch_folder.display(),
                        loaded.output_folder.display()
                    );
                    if let Some(old) = session.take() {
                        debug!("Stopping session on {}", old.config().watch_folder.display());
                        old.stop().await;
                    }
                    active = loaded;
                    session = match WatchSession::start(active.clone(), self.pipeline.clone()) {
                        Ok(s) => Some(s),
                        Err(e) => {
                            error!("Cannot start watch session: {}", e);
                            None
                        }
                    };
                }
            }
        }

        if let Some(s) = session {
            s.stop().await;
        }
        Ok(())
    }
}
