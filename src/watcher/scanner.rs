//! Periodic incremental scanner.
//!
//! Walks the root depth-first, handing every entry to the decision handler.
//! Repeat scans prune directories whose modification time has not moved
//! since the previous scan and skip files older than the previous scan's
//! start, so a quiet tree costs one `stat` per directory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::filter::SkipSet;
use super::handler::{Action, DecisionHandler};
use crate::observability::spans;
use crate::{Error, Result};

/// Default scan interval.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Filesystem timestamps come from a coarse clock (and FAT rounds to 2s), so
/// the recorded scan start is pulled back by this much.
pub const MTIME_SLACK: Duration = Duration::from_secs(2);

/// Counters for one scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub files_seen: u64,
    pub files_handled: u64,
    pub dirs_seen: u64,
    pub dirs_pruned: u64,
    pub errors: u64,
}

/// Scanner configuration.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Root directory to walk.
    pub root: PathBuf,
    /// Time between scans in `run`.
    pub interval: Duration,
    /// Directory names never descended into.
    pub skip: SkipSet,
}

impl ScannerConfig {
    /// Configuration with the default interval and skip-set.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            interval: DEFAULT_SCAN_INTERVAL,
            skip: SkipSet::default(),
        }
    }
}

#[derive(Debug, Default)]
struct ScanState {
    /// Start time of the last completed scan.
    last_scan_start: Option<SystemTime>,
    /// Directory mtimes recorded during the last completed scan.
    fingerprints: HashMap<PathBuf, SystemTime>,
}

/// Incremental directory scanner.
pub struct Scanner {
    root: PathBuf,
    interval: Duration,
    skip: SkipSet,
    handler: Arc<dyn DecisionHandler>,
    state: Mutex<ScanState>,
    // Serializes walks so two scans never interleave fingerprint updates.
    walk_lock: Mutex<()>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("root", &self.root)
            .field("interval", &self.interval)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

impl Scanner {
    /// Create a scanner.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be resolved to an absolute path.
    pub fn new(config: ScannerConfig, handler: Arc<dyn DecisionHandler>) -> Result<Self> {
        let root = config.root.canonicalize().map_err(|e| {
            Error::config(format!(
                "cannot resolve scan root '{}': {e}",
                config.root.display()
            ))
        })?;

        let interval = if config.interval.is_zero() {
            DEFAULT_SCAN_INTERVAL
        } else {
            config.interval
        };

        tracing::debug!(
            root = %root.display(),
            interval_secs = interval.as_secs(),
            skip = ?config.skip.names().collect::<Vec<_>>(),
            "Scanner configured"
        );

        Ok(Self {
            root,
            interval,
            skip: config.skip,
            handler,
            state: Mutex::new(ScanState::default()),
            walk_lock: Mutex::new(()),
        })
    }

    /// The resolved root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start time of the last completed scan, less the timestamp slack.
    /// `None` until a scan completes.
    #[must_use]
    pub fn last_scan_start(&self) -> Option<SystemTime> {
        self.state.lock().last_scan_start
    }

    /// Number of directories currently fingerprinted.
    #[must_use]
    pub fn fingerprint_count(&self) -> usize {
        self.state.lock().fingerprints.len()
    }

    /// Whether `dir` currently has a recorded fingerprint.
    #[must_use]
    pub fn has_fingerprint(&self, dir: &Path) -> bool {
        self.state.lock().fingerprints.contains_key(dir)
    }

    /// Forget everything learned so far; the next scan is a full scan.
    pub fn clear_cache(&self) {
        let mut state = self.state.lock();
        state.fingerprints.clear();
        state.last_scan_start = None;
    }

    /// Perform one scan of the whole tree.
    ///
    /// Per-entry failures are logged and skipped; they never fail the scan.
    ///
    /// # Errors
    ///
    /// Does not fail today; the signature matches [`Scanner::scan_until`].
    pub fn scan(&self) -> Result<ScanStats> {
        self.walk(None)
    }

    /// Like [`Scanner::scan`], but stops at the next entry once `cancel`
    /// fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the token fired mid-walk. A cancelled
    /// walk leaves the fingerprint table and last scan time untouched.
    pub fn scan_until(&self, cancel: &CancellationToken) -> Result<ScanStats> {
        self.walk(Some(cancel))
    }

    fn walk(&self, cancel: Option<&CancellationToken>) -> Result<ScanStats> {
        let _walk = self.walk_lock.lock();
        let _span = spans::scan_span(&self.root).entered();

        let started = Instant::now();
        let scan_start = SystemTime::now();
        let last_scan = self.last_scan_start();
        let mut stats = ScanStats::default();
        let mut visited: HashSet<PathBuf> = HashSet::new();

        tracing::info!(root = %self.root.display(), incremental = last_scan.is_some(), "Starting scan");

        let mut entries = WalkDir::new(&self.root).follow_links(false).into_iter();
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                tracing::debug!(root = %self.root.display(), "Scan cancelled");
                return Err(Error::Cancelled);
            }

            let entry = match entries.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Walk error, skipping entry");
                    stats.errors += 1;
                    continue;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read metadata");
                    stats.errors += 1;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                stats.dirs_seen += 1;
                visited.insert(path.to_path_buf());

                match self.handler.decide(path, &metadata) {
                    Action::SkipSubtree => {
                        tracing::debug!(path = %path.display(), "Skipping contents of ignored directory");
                        stats.dirs_pruned += 1;
                        entries.skip_current_dir();
                        continue;
                    }
                    Action::Failed(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Handler failed for directory");
                        stats.errors += 1;
                    }
                    Action::Continue => {}
                }

                let is_root = entry.depth() == 0;
                if !is_root && self.skip.matches(entry.file_name()) {
                    stats.dirs_pruned += 1;
                    entries.skip_current_dir();
                    continue;
                }

                let Ok(mtime) = metadata.modified() else {
                    continue;
                };
                let unchanged = self.refresh_fingerprint(path, mtime);
                if !is_root && last_scan.is_some() && unchanged {
                    stats.dirs_pruned += 1;
                    entries.skip_current_dir();
                }
            } else {
                stats.files_seen += 1;

                if let (Some(since), Ok(mtime)) = (last_scan, metadata.modified()) {
                    if mtime < since {
                        continue;
                    }
                }

                stats.files_handled += 1;
                if let Action::Failed(e) = self.handler.decide(path, &metadata) {
                    tracing::warn!(path = %path.display(), error = %e, "Handler failed for file");
                    stats.errors += 1;
                }
            }
        }

        let purged = self.purge_unvisited(&visited);
        self.state.lock().last_scan_start =
            Some(scan_start.checked_sub(MTIME_SLACK).unwrap_or(scan_start));

        tracing::info!(
            root = %self.root.display(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            files = stats.files_seen,
            handled = stats.files_handled,
            dirs = stats.dirs_seen,
            pruned = stats.dirs_pruned,
            errors = stats.errors,
            purged,
            "Scan complete"
        );

        Ok(stats)
    }

    /// Record `mtime` for `dir`, returning whether it matched the previous
    /// recording.
    fn refresh_fingerprint(&self, dir: &Path, mtime: SystemTime) -> bool {
        self.state
            .lock()
            .fingerprints
            .insert(dir.to_path_buf(), mtime)
            .is_some_and(|previous| previous == mtime)
    }

    fn purge_unvisited(&self, visited: &HashSet<PathBuf>) -> usize {
        let mut state = self.state.lock();
        let before = state.fingerprints.len();
        state.fingerprints.retain(|dir, _| visited.contains(dir));
        before - state.fingerprints.len()
    }

    /// Scan immediately, then once per interval until `cancel` fires.
    ///
    /// Walks run on the blocking pool. Scan failures are logged and the loop
    /// keeps going.
    ///
    /// # Errors
    ///
    /// Always ends with [`Error::Cancelled`].
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            root = %self.root.display(),
            interval_secs = self.interval.as_secs(),
            "Starting periodic scanner"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => {
                    let scanner = Arc::clone(&self);
                    let token = cancel.clone();
                    match tokio::task::spawn_blocking(move || scanner.scan_until(&token)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(Error::Cancelled)) => return Err(Error::Cancelled),
                        Ok(Err(e)) => tracing::error!(error = %e, "Scan failed"),
                        Err(e) => tracing::error!(error = %e, "Scan task panicked"),
                    }
                }
            }
        }
    }
}
