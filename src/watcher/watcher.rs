//! File system watcher using notify-rs, with per-path debouncing.
//!
//! Raw notifications are buffered per path (last write wins) and handed to
//! the decision handler once they have been quiet for the debounce window.
//! Directories are watched one by one rather than recursively so the
//! skip-set and `SkipSubtree` decisions can shape the watch set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::events::{EventKind, PendingEvents, WatchEvent};
use super::filter::SkipSet;
use super::handler::{Action, DecisionHandler};
use crate::error::WatcherError;
use crate::observability::spans;
use crate::{Error, Result};

/// Default quiet time before a path's events are dispatched.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

/// Default time between flushes of the debounce buffer.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Default capacity of the new-directory probe queue.
pub const DEFAULT_PROBE_QUEUE: usize = 1024;

/// File watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration.
    pub debounce: Duration,
    /// Flush timer period.
    pub flush_interval: Duration,
    /// Capacity of the queue feeding the new-directory prober.
    pub probe_queue: usize,
    /// Directory names never watched.
    pub skip: SkipSet,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            probe_queue: DEFAULT_PROBE_QUEUE,
            skip: SkipSet::default(),
        }
    }
}

struct Registry {
    backend: Option<RecommendedWatcher>,
    watched: HashSet<PathBuf>,
}

/// Watch registrations, shared between the event loop, the prober and the
/// dispatch workers.
#[derive(Clone)]
struct WatchRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl WatchRegistry {
    fn new(backend: RecommendedWatcher) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                backend: Some(backend),
                watched: HashSet::new(),
            })),
        }
    }

    fn add(&self, path: &Path) -> std::result::Result<(), WatcherError> {
        let mut guard = self.inner.lock();
        let registry = &mut *guard;
        let backend = registry.backend.as_mut().ok_or(WatcherError::Closed)?;

        backend
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::watch_failed(path, e))?;
        registry.watched.insert(path.to_path_buf());
        Ok(())
    }

    fn remove(&self, path: &Path) -> std::result::Result<(), WatcherError> {
        let mut guard = self.inner.lock();
        let registry = &mut *guard;
        let backend = registry.backend.as_mut().ok_or(WatcherError::Closed)?;

        backend
            .unwatch(path)
            .map_err(|e| WatcherError::watch_failed(path, e))?;
        registry.watched.remove(path);
        Ok(())
    }

    /// Drop the watch on `dir` and on every watched directory beneath it.
    fn remove_tree(&self, dir: &Path) -> usize {
        let mut guard = self.inner.lock();
        let registry = &mut *guard;
        let Some(backend) = registry.backend.as_mut() else {
            return 0;
        };

        let doomed: Vec<PathBuf> = registry
            .watched
            .iter()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();

        for path in &doomed {
            if let Err(e) = backend.unwatch(path) {
                tracing::debug!(path = %path.display(), error = %e, "Unwatch failed");
            }
            registry.watched.remove(path);
        }
        doomed.len()
    }

    fn close(&self) -> bool {
        let mut registry = self.inner.lock();
        registry.watched.clear();
        registry.backend.take().is_some()
    }

    fn watched(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.inner.lock().watched.iter().cloned().collect();
        dirs.sort();
        dirs
    }
}

struct Channels {
    events: mpsc::UnboundedReceiver<notify::Event>,
    errors: mpsc::UnboundedReceiver<notify::Error>,
}

/// Debouncing file system watcher.
pub struct Watcher {
    config: WatcherConfig,
    handler: Arc<dyn DecisionHandler>,
    registry: WatchRegistry,
    pending: PendingEvents,
    channels: Mutex<Option<Channels>>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Create a new watcher. No paths are watched until [`Watcher::add`] or
    /// [`Watcher::add_recursive`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS notification backend cannot be created.
    pub fn new(config: WatcherConfig, handler: Arc<dyn DecisionHandler>) -> Result<Self> {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let backend = notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| {
                // Send failures only mean the event loop is gone.
                match result {
                    Ok(event) => {
                        let _ = event_tx.send(event);
                    }
                    Err(e) => {
                        let _ = error_tx.send(e);
                    }
                }
            },
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok(Self {
            config,
            handler,
            registry: WatchRegistry::new(backend),
            pending: PendingEvents::new(),
            channels: Mutex::new(Some(Channels { events, errors })),
        })
    }

    /// Watch a single directory (non-recursively).
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be watched or the watcher is closed.
    pub fn add(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.registry.add(path)?;
        tracing::debug!(path = %path.display(), "Watching directory");
        Ok(())
    }

    /// Stop watching a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if unwatching fails or the watcher is closed.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.registry.remove(path)?;
        tracing::debug!(path = %path.display(), "Stopped watching directory");
        Ok(())
    }

    /// Watch `root` and every directory below it, except skip-set members.
    ///
    /// A directory that cannot be watched is logged and skipped. Returns the
    /// number of directories registered.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not an accessible directory or the
    /// watcher is closed.
    pub fn add_recursive(&self, root: impl AsRef<Path>) -> Result<usize> {
        let root = root.as_ref();
        let metadata = std::fs::metadata(root).map_err(|e| WatcherError::watch_failed(root, e))?;
        if !metadata.is_dir() {
            return Err(WatcherError::watch_failed(root, "not a directory").into());
        }

        let mut registered = 0;
        let mut entries = WalkDir::new(root).follow_links(false).into_iter();
        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot access path, continuing");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.depth() > 0 && self.config.skip.matches(entry.file_name()) {
                entries.skip_current_dir();
                continue;
            }

            match self.registry.add(entry.path()) {
                Ok(()) => registered += 1,
                Err(WatcherError::Closed) => return Err(WatcherError::Closed.into()),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Failed to watch directory, continuing");
                }
            }
        }

        tracing::info!(root = %root.display(), directories = registered, "Registered watches");
        Ok(registered)
    }

    /// Directories currently watched, sorted.
    #[must_use]
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.registry.watched()
    }

    /// Number of paths waiting out their debounce window.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Process notifications until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] on cancellation, or
    /// [`WatcherError::AlreadyRunning`] if another `run` is active. Returns
    /// `Ok(())` if the notification source shuts down (after [`Watcher::close`]).
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let Some(mut channels) = self.channels.lock().take() else {
            return Err(WatcherError::AlreadyRunning.into());
        };

        let (probe_tx, probe_rx) = mpsc::channel(self.config.probe_queue.max(1));
        let prober = tokio::spawn(probe_new_dirs(
            probe_rx,
            self.registry.clone(),
            self.config.skip.clone(),
        ));

        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch_batches(
            batch_rx,
            Arc::clone(&self.handler),
            self.registry.clone(),
        ));

        let mut flush = tokio::time::interval(self.config.flush_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            debounce_ms = u64::try_from(self.config.debounce.as_millis()).unwrap_or(u64::MAX),
            flush_ms = u64::try_from(self.config.flush_interval.as_millis()).unwrap_or(u64::MAX),
            "Starting filesystem watcher"
        );

        let result = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Err(Error::Cancelled),
                _ = flush.tick() => {
                    if let Some(batch) = self.take_settled() {
                        if batch_tx.send(batch).is_err() {
                            tracing::error!("Dispatch worker stopped");
                        }
                    }
                }
                event = channels.events.recv() => match event {
                    Some(event) => self.ingest(&event, &probe_tx),
                    None => break Ok(()),
                },
                error = channels.errors.recv() => match error {
                    Some(e) => tracing::warn!(error = %e, "Watch error"),
                    None => break Ok(()),
                },
            }
        };

        // Queued batches are dropped; the next scan covers them.
        dispatcher.abort();
        prober.abort();
        *self.channels.lock() = Some(channels);
        result
    }

    /// Release the OS notification resource. Safe to call repeatedly and
    /// after `run` has returned.
    pub fn close(&self) {
        if self.registry.close() {
            tracing::info!("Filesystem watcher closed");
        }
    }

    /// Buffer one raw notification.
    fn ingest(&self, event: &notify::Event, probe_tx: &mpsc::Sender<PathBuf>) {
        let Some(kind) = EventKind::from_notify(&event.kind) else {
            return;
        };

        for path in &event.paths {
            let coalesced = self.pending.record(WatchEvent::new(path.clone(), kind));
            tracing::trace!(path = %path.display(), ?kind, coalesced, "Buffered event");

            if kind == EventKind::Create {
                if let Err(mpsc::error::TrySendError::Full(path)) = probe_tx.try_send(path.clone()) {
                    tracing::debug!(path = %path.display(), "Probe queue full, leaving directory to the scanner");
                }
            }
        }
    }

    /// Remove and return every settled event, if any.
    fn take_settled(&self) -> Option<Vec<WatchEvent>> {
        let settled = self.pending.take_settled(Instant::now(), self.config.debounce);
        (!settled.is_empty()).then_some(settled)
    }
}

/// Hand settled batches to the handler one at a time, off the event loop.
async fn dispatch_batches(
    mut rx: mpsc::UnboundedReceiver<Vec<WatchEvent>>,
    handler: Arc<dyn DecisionHandler>,
    registry: WatchRegistry,
) {
    while let Some(batch) = rx.recv().await {
        dispatch_batch(batch, Arc::clone(&handler), registry.clone()).await;
    }
}

/// Run one batch through the handler on the blocking pool.
async fn dispatch_batch(
    batch: Vec<WatchEvent>,
    handler: Arc<dyn DecisionHandler>,
    registry: WatchRegistry,
) {
    let count = batch.len();
    match tokio::task::spawn_blocking(move || dispatch(&batch, handler.as_ref(), &registry)).await {
        Ok(()) => tracing::debug!(events = count, "Flushed settled events"),
        Err(e) => tracing::error!(error = %e, "Dispatch task panicked"),
    }
}

fn dispatch(events: &[WatchEvent], handler: &dyn DecisionHandler, registry: &WatchRegistry) {
    let _span = spans::dispatch_span(events.len()).entered();

    for event in events {
        let metadata = match std::fs::metadata(&event.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::trace!(path = %event.path.display(), "Path vanished before dispatch");
                continue;
            }
            Err(e) => {
                tracing::warn!(path = %event.path.display(), error = %e, "Failed to stat event path");
                continue;
            }
        };

        match handler.decide(&event.path, &metadata) {
            Action::SkipSubtree if metadata.is_dir() => {
                let dropped = registry.remove_tree(&event.path);
                if dropped > 0 {
                    tracing::debug!(path = %event.path.display(), dropped, "Stopped watching ignored directory");
                }
            }
            Action::Failed(e) => {
                tracing::warn!(path = %event.path.display(), error = %e, "Handler failed for event");
            }
            Action::SkipSubtree | Action::Continue => {}
        }
    }
}

/// Register watches on directories announced by Create notifications.
///
/// Children created inside a new directory before its watch lands are
/// missed here; the periodic scanner picks them up.
async fn probe_new_dirs(mut rx: mpsc::Receiver<PathBuf>, registry: WatchRegistry, skip: SkipSet) {
    while let Some(path) = rx.recv().await {
        let Ok(metadata) = tokio::fs::metadata(&path).await else {
            continue;
        };
        if !metadata.is_dir() || path.file_name().is_some_and(|name| skip.matches(name)) {
            continue;
        }

        let registry = registry.clone();
        let probed = path.clone();
        match tokio::task::spawn_blocking(move || registry.add(&probed)).await {
            Ok(Ok(())) => tracing::debug!(path = %path.display(), "Watching new directory"),
            Ok(Err(WatcherError::Closed)) => break,
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to watch new directory");
            }
            Err(e) => tracing::error!(error = %e, "Probe task panicked"),
        }
    }
}
