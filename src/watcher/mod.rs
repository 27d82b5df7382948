//! File system scanning and watching.
//!
//! This module provides:
//! - The decision contract both paths feed into
//! - Incremental, mtime-pruned directory scanning
//! - Debounced directory watching using notify-rs
//! - The directory skip-set shared by both

mod events;
mod filter;
mod handler;
mod scanner;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::{EventKind, PendingEvents, WatchEvent};
pub use filter::SkipSet;
pub use handler::{Action, DecisionHandler};
pub use scanner::{ScanStats, Scanner, ScannerConfig, DEFAULT_SCAN_INTERVAL, MTIME_SLACK};
pub use watcher::{
    Watcher, WatcherConfig, DEFAULT_DEBOUNCE, DEFAULT_FLUSH_INTERVAL, DEFAULT_PROBE_QUEUE,
};
