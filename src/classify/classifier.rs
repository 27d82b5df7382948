//! The production decision handler: match, check, tag.

use std::ffi::OsStr;
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;

use super::matcher::{Matcher, IGNORE_FILE_NAME};
use crate::config::Config;
use crate::storage::{AttributeStore, Fingerprint, ProcessedCache, XattrStore};
use crate::watcher::{Action, DecisionHandler};

/// Tags entries matched by `.dropboxignore` rules so Dropbox skips them.
///
/// Ignored directories are tagged as a whole and reported as
/// [`Action::SkipSubtree`]; their contents are never visited.
pub struct IgnoreClassifier {
    matcher: Matcher,
    store: Arc<dyn AttributeStore>,
    processed: ProcessedCache,
    dry_run: bool,
}

impl std::fmt::Debug for IgnoreClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnoreClassifier")
            .field("matcher", &self.matcher)
            .field("processed", &self.processed.len())
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl IgnoreClassifier {
    /// Create a classifier writing through `store`.
    #[must_use]
    pub fn new(matcher: Matcher, store: Arc<dyn AttributeStore>, processed: ProcessedCache) -> Self {
        Self {
            matcher,
            store,
            processed,
            dry_run: false,
        }
    }

    /// Classifier using extended attributes, sized from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Matcher::new(config.matcher_cache_size),
            Arc::new(XattrStore::new()),
            ProcessedCache::new(config.cache_ttl),
        )
        .with_dry_run(config.dry_run)
    }

    /// Log decisions instead of writing attributes.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Whether attribute writes are suppressed.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The pattern matcher.
    #[must_use]
    pub const fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// The processed-entry cache.
    #[must_use]
    pub const fn processed(&self) -> &ProcessedCache {
        &self.processed
    }
}

fn done(metadata: &Metadata) -> Action {
    if metadata.is_dir() {
        Action::SkipSubtree
    } else {
        Action::Continue
    }
}

impl DecisionHandler for IgnoreClassifier {
    fn decide(&self, path: &Path, metadata: &Metadata) -> Action {
        if path.file_name() == Some(OsStr::new(IGNORE_FILE_NAME)) {
            self.matcher.invalidate(path);
        }

        let fingerprint = Fingerprint::from_metadata(metadata);
        if self.processed.seen(path, &fingerprint) {
            return done(metadata);
        }

        match self.matcher.should_ignore_as(path, metadata.is_dir()) {
            Ok(true) => {}
            Ok(false) => return Action::Continue,
            Err(e) => return Action::Failed(e),
        }

        match self.store.is_tagged(path) {
            Ok(true) => {
                tracing::trace!(path = %path.display(), "Already tagged");
            }
            Ok(false) if self.dry_run => {
                tracing::info!(path = %path.display(), "Would tag ignored entry (dry run)");
            }
            Ok(false) => {
                if let Err(e) = self.store.set_tagged(path) {
                    return Action::Failed(e.into());
                }
                tracing::info!(path = %path.display(), dir = metadata.is_dir(), "Tagged ignored entry");
            }
            Err(e) => return Action::Failed(e.into()),
        }

        self.processed.record(path, fingerprint);
        done(metadata)
    }
}
