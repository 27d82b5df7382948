//! Short-lived memory of entries already classified as ignored.
//!
//! Keeps the classifier from re-reading attributes for entries it has just
//! tagged. An entry is only a hit while its identity and mtime are unchanged
//! and its TTL has not run out.

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

/// Default lifetime of a cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Identity and modification time of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Inode number (0 where the platform has none).
    pub inode: u64,
    /// Last modification time, if the platform reports one.
    pub mtime: Option<SystemTime>,
}

impl Fingerprint {
    /// Fingerprint taken from metadata.
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            inode: inode(metadata),
            mtime: metadata.modified().ok(),
        }
    }
}

#[cfg(unix)]
fn inode(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode(_metadata: &Metadata) -> u64 {
    0
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    fingerprint: Fingerprint,
    added: Instant,
}

/// TTL-bounded map from path to fingerprint.
#[derive(Debug)]
pub struct ProcessedCache {
    ttl: Duration,
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl Default for ProcessedCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl ProcessedCache {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether `path` was recorded with this exact fingerprint and has not
    /// expired. Expired entries are evicted on lookup.
    pub fn seen(&self, path: &Path, fingerprint: &Fingerprint) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(path).copied() else {
            return false;
        };

        if entry.added.elapsed() > self.ttl {
            entries.remove(path);
            return false;
        }
        entry.fingerprint == *fingerprint
    }

    /// Record or refresh `path`.
    pub fn record(&self, path: &Path, fingerprint: Fingerprint) {
        self.entries.lock().insert(
            path.to_path_buf(),
            Entry {
                fingerprint,
                added: Instant::now(),
            },
        );
    }

    /// Forget `path`.
    pub fn remove(&self, path: &Path) {
        self.entries.lock().remove(path);
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn clean(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.added.elapsed() <= self.ttl);
        before - entries.len()
    }

    /// Number of entries, expired ones included until evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
