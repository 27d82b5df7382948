//! Directory skip-set shared by the scanner and the watcher.

use std::collections::BTreeSet;
use std::ffi::OsStr;

/// Directory names that are never descended into or watched.
const DEFAULT_SKIP_DIRS: &[&str] = &[".git", ".dropbox.cache", "node_modules", ".svn", ".hg"];

/// Set of directory names excluded from traversal and watching.
///
/// Any name starting with `.` is excluded as well. The walk root itself is
/// never tested against the set; callers pass only descendant names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipSet {
    names: BTreeSet<String>,
}

impl Default for SkipSet {
    fn default() -> Self {
        Self {
            names: DEFAULT_SKIP_DIRS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl SkipSet {
    /// An empty set. Dotted names are still skipped.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            names: BTreeSet::new(),
        }
    }

    /// The default set extended with `extra`.
    #[must_use]
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        set.names.extend(extra.into_iter().map(Into::into));
        set
    }

    /// Add a name to the set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    /// Remove a name from the set.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.names.remove(name);
        self
    }

    /// Whether a directory with this name should be pruned.
    #[must_use]
    pub fn matches(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        name.starts_with('.') || self.names.contains(name.as_ref())
    }

    /// The explicit names in the set.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
