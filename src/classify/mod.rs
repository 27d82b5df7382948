//! Ignore-rule classification.
//!
//! This module provides:
//! - `.dropboxignore` lookup and gitignore-style matching
//! - The classifier that tags matched entries

mod classifier;
mod matcher;

pub use classifier::IgnoreClassifier;
pub use matcher::{
    find_ignore_file, load_ignore_file, Matcher, DEFAULT_MATCHER_CACHE_SIZE, IGNORE_FILE_NAME,
};
