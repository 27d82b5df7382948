//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dbxignore::error::AttributeError;
use dbxignore::{Action, AttributeStore, DecisionHandler};
use filetime::FileTime;
use parking_lot::Mutex;
use walkdir::WalkDir;

/// In-memory attribute store counting writes per path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tagged: Mutex<HashSet<PathBuf>>,
    writes: Mutex<HashMap<PathBuf, usize>>,
}

impl MemoryStore {
    pub fn is_tagged_now(&self, path: &Path) -> bool {
        self.tagged.lock().contains(path)
    }

    pub fn writes_for(&self, path: &Path) -> usize {
        self.writes.lock().get(path).copied().unwrap_or(0)
    }

    pub fn tagged(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.tagged.lock().iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl AttributeStore for MemoryStore {
    fn is_tagged(&self, path: &Path) -> Result<bool, AttributeError> {
        Ok(self.tagged.lock().contains(path))
    }

    fn set_tagged(&self, path: &Path) -> Result<(), AttributeError> {
        *self.writes.lock().entry(path.to_path_buf()).or_default() += 1;
        self.tagged.lock().insert(path.to_path_buf());
        Ok(())
    }

    fn clear_tagged(&self, path: &Path) -> Result<(), AttributeError> {
        self.tagged.lock().remove(path);
        Ok(())
    }
}

/// Handler wrapper recording every path it is asked about.
pub struct Recorder<H> {
    inner: H,
    calls: Mutex<Vec<PathBuf>>,
}

impl<H: DecisionHandler> Recorder<H> {
    pub fn new(inner: H) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().clone()
    }

    pub fn count(&self, path: &Path) -> usize {
        self.calls.lock().iter().filter(|p| *p == path).count()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

impl<H: DecisionHandler> DecisionHandler for Recorder<H> {
    fn decide(&self, path: &Path, metadata: &Metadata) -> Action {
        self.calls.lock().push(path.to_path_buf());
        self.inner.decide(path, metadata)
    }
}

/// Push every mtime under `root` one hour into the past.
pub fn age_tree(root: &Path) {
    let past = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = entry.unwrap();
        filetime::set_file_mtime(entry.path(), past).unwrap();
    }
}

/// Poll `condition` every 20ms for up to `timeout`.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
