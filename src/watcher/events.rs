//! Watch event types and the per-path debounce buffer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use notify::event::ModifyKind;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Kinds of raw notification that can change an entry's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Entry was created.
    Create,
    /// Entry contents were written.
    Write,
    /// Entry was renamed (either side of the rename).
    Rename,
}

impl EventKind {
    /// Map a `notify` event kind, discarding kinds that cannot affect
    /// classification (removals, access, metadata-only changes).
    #[must_use]
    pub fn from_notify(kind: &notify::EventKind) -> Option<Self> {
        match kind {
            notify::EventKind::Create(_) => Some(Self::Create),
            notify::EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Rename),
            notify::EventKind::Modify(ModifyKind::Metadata(_)) => None,
            notify::EventKind::Modify(_) => Some(Self::Write),
            _ => None,
        }
    }
}

/// A settled or pending filesystem change on one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Absolute path of the changed entry.
    pub path: PathBuf,
    /// Kind of the most recent raw notification.
    pub kind: EventKind,
    /// When the most recent raw notification arrived.
    pub observed_at: Instant,
}

impl WatchEvent {
    /// Create an event observed now.
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at: Instant::now(),
        }
    }
}

/// Debounce buffer holding at most one pending event per path.
#[derive(Debug, Default)]
pub struct PendingEvents {
    events: Mutex<HashMap<PathBuf, WatchEvent>>,
}

impl PendingEvents {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event, replacing any pending event for the same path.
    ///
    /// Returns `true` if an earlier event was coalesced away.
    pub fn record(&self, event: WatchEvent) -> bool {
        self.events.lock().insert(event.path.clone(), event).is_some()
    }

    /// Remove and return every event that has been quiet for at least
    /// `debounce` as of `now`. Younger events stay buffered.
    pub fn take_settled(&self, now: Instant, debounce: Duration) -> Vec<WatchEvent> {
        let mut events = self.events.lock();
        let settled: Vec<PathBuf> = events
            .iter()
            .filter(|(_, event)| now.saturating_duration_since(event.observed_at) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();

        settled
            .into_iter()
            .filter_map(|path| events.remove(&path))
            .collect()
    }

    #[cfg(test)]
    fn contains(&self, path: &std::path::Path) -> bool {
        self.events.lock().contains_key(path)
    }

    /// Number of pending paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
