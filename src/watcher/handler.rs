//! The decision contract shared by the scanner and the watcher.

use std::fs::Metadata;
use std::path::Path;

use crate::Error;

/// Outcome of classifying a single filesystem entry.
#[derive(Debug)]
pub enum Action {
    /// Nothing special; keep walking.
    Continue,
    /// Do not descend into this directory. Ignored for plain files.
    SkipSubtree,
    /// The entry could not be classified this round.
    Failed(Error),
}

impl Action {
    #[cfg(test)]
    pub(crate) const fn is_skip(&self) -> bool {
        matches!(self, Self::SkipSubtree)
    }
}

/// Classifies one entry. Called synchronously and possibly concurrently from
/// the scanner and the watcher, so implementations must tolerate being
/// invoked twice for the same path at the same time.
pub trait DecisionHandler: Send + Sync {
    /// Decide what to do with `path`, whose metadata is `metadata`.
    fn decide(&self, path: &Path, metadata: &Metadata) -> Action;
}

impl<F> DecisionHandler for F
where
    F: Fn(&Path, &Metadata) -> Action + Send + Sync,
{
    fn decide(&self, path: &Path, metadata: &Metadata) -> Action {
        self(path, metadata)
    }
}
