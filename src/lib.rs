//! dbxignore
//!
//! Keeps Dropbox from syncing entries matched by `.dropboxignore` files.
//! A periodic incremental scanner and a debounced filesystem watcher feed
//! every candidate path into one [`DecisionHandler`]; the production handler,
//! [`IgnoreClassifier`], tags matches with the extended attribute Dropbox
//! honours.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod config;
pub mod daemon;
pub mod error;
pub mod observability;
pub mod storage;
pub mod watcher;

pub use classify::{IgnoreClassifier, Matcher};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use storage::{AttributeStore, ProcessedCache, XattrStore};
pub use watcher::{Action, DecisionHandler, Scanner, SkipSet, Watcher};
