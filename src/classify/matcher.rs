//! `.dropboxignore` pattern matching.
//!
//! A path is governed by the nearest `.dropboxignore` at or above its parent
//! directory, with gitignore syntax relative to the directory holding that
//! file. Compiled rule sets are kept in a small LRU cache.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::MatcherError;
use crate::Result;

/// Name of the per-directory ignore file.
pub const IGNORE_FILE_NAME: &str = ".dropboxignore";

/// Default number of compiled ignore files kept in memory.
pub const DEFAULT_MATCHER_CACHE_SIZE: usize = 32;

#[derive(Debug, Clone)]
struct CachedRules {
    rules: Arc<Gitignore>,
    mtime: Option<SystemTime>,
}

/// Matches paths against their governing `.dropboxignore`.
#[derive(Debug)]
pub struct Matcher {
    cache: Mutex<LruCache<PathBuf, CachedRules>>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCHER_CACHE_SIZE)
    }
}

impl Matcher {
    /// Create a matcher caching up to `cache_size` ignore files. Zero falls
    /// back to the default size.
    #[must_use]
    pub fn new(cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size)
            .or_else(|| NonZeroUsize::new(DEFAULT_MATCHER_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Whether `path` is excluded by its governing ignore file. Directory
    /// patterns are checked against the path's current type on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the governing ignore file cannot be read or
    /// compiled.
    pub fn should_ignore(&self, path: &Path) -> Result<bool> {
        let is_dir = std::fs::metadata(path).is_ok_and(|m| m.is_dir());
        self.should_ignore_as(path, is_dir)
    }

    /// Like [`Matcher::should_ignore`] with the directory flag supplied by
    /// the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the governing ignore file cannot be read or
    /// compiled.
    pub fn should_ignore_as(&self, path: &Path, is_dir: bool) -> Result<bool> {
        let Some(parent) = path.parent() else {
            return Ok(false);
        };
        let Some(ignore_file) = find_ignore_file(parent) else {
            return Ok(false);
        };

        let rules = self.rules_for(&ignore_file)?;
        let Ok(relative) = path.strip_prefix(rules.path()) else {
            return Ok(false);
        };

        Ok(rules
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore())
    }

    /// Compiled rules for `ignore_file`, reloading when its mtime changed.
    fn rules_for(&self, ignore_file: &Path) -> Result<Arc<Gitignore>> {
        let mtime = std::fs::metadata(ignore_file)
            .and_then(|m| m.modified())
            .ok();

        if let Some(cached) = self.cache.lock().get(ignore_file) {
            if cached.mtime == mtime {
                return Ok(Arc::clone(&cached.rules));
            }
        }

        let rules = Arc::new(load_ignore_file(ignore_file)?);
        tracing::debug!(
            path = %ignore_file.display(),
            patterns = rules.num_ignores() + rules.num_whitelists(),
            "Loaded ignore file"
        );

        self.cache.lock().put(
            ignore_file.to_path_buf(),
            CachedRules {
                rules: Arc::clone(&rules),
                mtime,
            },
        );
        Ok(rules)
    }

    /// Drop the cached rules for one ignore file.
    pub fn invalidate(&self, ignore_file: &Path) {
        if self.cache.lock().pop(ignore_file).is_some() {
            tracing::debug!(path = %ignore_file.display(), "Invalidated cached ignore rules");
        }
    }

    /// Drop every cached rule set.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Number of cached rule sets.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Nearest `.dropboxignore` in `dir` or any ancestor.
#[must_use]
pub fn find_ignore_file(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|d| d.join(IGNORE_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Compile an ignore file. Blank lines and `#` comments are skipped and
/// surrounding whitespace is trimmed; a pattern that fails to compile is
/// logged and dropped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the rule set cannot be
/// built.
pub fn load_ignore_file(path: &Path) -> Result<Gitignore> {
    let contents = std::fs::read_to_string(path).map_err(|source| MatcherError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new("/"));
    let mut builder = GitignoreBuilder::new(base);

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Err(e) = builder.add_line(Some(path.to_path_buf()), line) {
            tracing::warn!(path = %path.display(), pattern = line, error = %e, "Skipping invalid pattern");
        }
    }

    let rules = builder.build().map_err(|e| MatcherError::InvalidPattern {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_ignore(dir: &Path, contents: &str) -> PathBuf {
        let file = dir.join(IGNORE_FILE_NAME);
        fs::write(&file, contents).unwrap();
        file
    }

    #[test]
    fn test_matcher_basic() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_ignore(
            root,
            "# Test ignore patterns\nnode_modules/\n*.log\n.cache/\n!important.log\n",
        );
        fs::create_dir_all(root.join("node_modules")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();

        let matcher = Matcher::new(10);
        let cases = [
            (root.join("node_modules"), true),
            (root.join("node_modules/package.json"), true),
            (root.join("src/main.rs"), false),
            (root.join("debug.log"), true),
            (root.join("important.log"), false),
            (root.join(".cache/data"), true),
        ];

        for (path, expected) in cases {
            assert_eq!(
                matcher.should_ignore(&path).unwrap(),
                expected,
                "{}",
                path.display()
            );
        }
    }

    #[test]
    fn test_directory_only_pattern() {
        let tmp = TempDir::new().unwrap();
        write_ignore(tmp.path(), "build/\n");
        fs::create_dir(tmp.path().join("build")).unwrap();
        fs::write(tmp.path().join("build.txt"), "x").unwrap();

        let matcher = Matcher::default();
        assert!(matcher.should_ignore(&tmp.path().join("build")).unwrap());
        assert!(!matcher.should_ignore_as(&tmp.path().join("build"), false).unwrap());
        assert!(!matcher.should_ignore(&tmp.path().join("build.txt")).unwrap());
    }

    #[test]
    fn test_nearest_ignore_file_wins() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let project = root.join("project");
        fs::create_dir_all(&project).unwrap();
        write_ignore(root, "*.tmp\nbuild/\n");
        write_ignore(&project, "dist/\n*.cache\n");

        let matcher = Matcher::default();
        assert!(matcher.should_ignore(&root.join("test.tmp")).unwrap());
        assert!(matcher.should_ignore(&root.join("build/app")).unwrap());
        assert!(!matcher.should_ignore(&project.join("test.tmp")).unwrap());
        assert!(matcher.should_ignore(&project.join("dist/app.js")).unwrap());
        assert!(matcher.should_ignore(&project.join("data.cache")).unwrap());
    }

    #[test]
    fn test_no_ignore_file() {
        let tmp = TempDir::new().unwrap();
        let matcher = Matcher::default();

        assert!(!matcher.should_ignore(&tmp.path().join("test.txt")).unwrap());
        assert_eq!(matcher.cached_len(), 0);
    }

    #[test]
    fn test_load_ignore_file_skips_comments_and_blanks() {
        let tmp = TempDir::new().unwrap();
        let file = write_ignore(
            tmp.path(),
            "# Comment line\n   \n*.log\n  # Another comment\n/absolute/path\nrelative/path\n!important.txt\n  \n",
        );

        let rules = load_ignore_file(&file).unwrap();
        assert!(rules.matched("test.log", false).is_ignore());
        assert!(rules.matched("dir/test.log", false).is_ignore());
        assert!(rules.matched("important.txt", false).is_whitelist());
        assert!(rules.matched("absolute/path", false).is_ignore());
        assert!(rules.matched("relative/path", false).is_ignore());
        assert_eq!(rules.num_ignores() + rules.num_whitelists(), 4);
    }

    #[test]
    fn test_cache_and_clear() {
        let tmp = TempDir::new().unwrap();
        write_ignore(tmp.path(), "*.log");
        let file = tmp.path().join("test.log");

        let matcher = Matcher::new(2);
        assert!(matcher.should_ignore(&file).unwrap());
        assert_eq!(matcher.cached_len(), 1);
        assert!(matcher.should_ignore(&file).unwrap());
        assert_eq!(matcher.cached_len(), 1);

        matcher.clear();
        assert_eq!(matcher.cached_len(), 0);
        assert!(matcher.should_ignore(&file).unwrap());
    }

    #[test]
    fn test_cache_is_bounded() {
        let tmp = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            let dir = tmp.path().join(name);
            fs::create_dir(&dir).unwrap();
            write_ignore(&dir, "*.log");
        }

        let matcher = Matcher::new(2);
        for name in ["a", "b", "c"] {
            assert!(matcher
                .should_ignore(&tmp.path().join(name).join("x.log"))
                .unwrap());
        }
        assert_eq!(matcher.cached_len(), 2);
    }

    #[test]
    fn test_edited_ignore_file_is_reloaded() {
        let tmp = TempDir::new().unwrap();
        let ignore_file = write_ignore(tmp.path(), "*.log");
        let file = tmp.path().join("notes.txt");

        let matcher = Matcher::default();
        assert!(!matcher.should_ignore(&file).unwrap());

        fs::write(&ignore_file, "*.txt").unwrap();
        let later = filetime::FileTime::from_unix_time(2_000_000_000, 0);
        filetime::set_file_mtime(&ignore_file, later).unwrap();

        assert!(matcher.should_ignore(&file).unwrap());
    }

    #[test]
    fn test_invalidate() {
        let tmp = TempDir::new().unwrap();
        let ignore_file = write_ignore(tmp.path(), "*.log");

        let matcher = Matcher::default();
        matcher.should_ignore(&tmp.path().join("a.log")).unwrap();
        assert_eq!(matcher.cached_len(), 1);

        matcher.invalidate(&ignore_file);
        assert_eq!(matcher.cached_len(), 0);
    }

    #[test]
    fn test_unreadable_ignore_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_ignore_file(&tmp.path().join(IGNORE_FILE_NAME)).unwrap_err();
        assert!(matches!(err, crate::Error::Matcher(MatcherError::Read { .. })));
    }
}
