//! Configuration settings and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::DEFAULT_MATCHER_CACHE_SIZE;
use crate::storage::DEFAULT_CACHE_TTL;
use crate::watcher::{
    ScannerConfig, SkipSet, WatcherConfig, DEFAULT_DEBOUNCE, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_PROBE_QUEUE, DEFAULT_SCAN_INTERVAL,
};
use crate::{Error, Result};

/// Default Dropbox folder, relative to the home directory.
pub const DEFAULT_ROOT: &str = "~/Dropbox";

/// Main configuration for the dbxignore daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Dropbox root to watch and scan. A leading `~` is expanded.
    pub root: PathBuf,

    /// Time between incremental scans.
    pub scan_interval: Duration,

    /// Quiet time before a path's watch events are handled.
    pub debounce: Duration,

    /// How often the debounce buffer is flushed.
    pub flush_interval: Duration,

    /// Extra directory names to skip, on top of the built-in set.
    pub skip_dirs: Vec<String>,

    /// How long classified entries are remembered.
    pub cache_ttl: Duration,

    /// Number of compiled `.dropboxignore` files kept in memory.
    pub matcher_cache_size: usize,

    /// Log tagging decisions without writing attributes.
    pub dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            skip_dirs: Vec::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            matcher_cache_size: DEFAULT_MATCHER_CACHE_SIZE,
            dry_run: false,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(Error::config("root cannot be empty"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.scan_interval.is_zero() {
            return Err(Error::config("scan_interval cannot be 0"));
        }
        if self.debounce.is_zero() {
            return Err(Error::config("debounce cannot be 0"));
        }
        if self.flush_interval.is_zero() {
            return Err(Error::config("flush_interval cannot be 0"));
        }
        if self.matcher_cache_size == 0 {
            return Err(Error::config("matcher_cache_size cannot be 0"));
        }

        if let Some(bad) = self
            .skip_dirs
            .iter()
            .find(|name| name.is_empty() || name.contains(std::path::MAIN_SEPARATOR))
        {
            return Err(Error::config(format!(
                "skip directory '{bad}' must be a plain directory name"
            )));
        }

        Ok(())
    }

    /// The root with a leading `~` expanded to the home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the root starts with `~` and no home directory
    /// is known.
    pub fn resolved_root(&self) -> Result<PathBuf> {
        expand_home(&self.root)
    }

    /// Built-in skip-set extended with `skip_dirs`.
    #[must_use]
    pub fn skip_set(&self) -> SkipSet {
        SkipSet::with_extra(self.skip_dirs.iter().cloned())
    }

    /// Scanner settings derived from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be expanded.
    pub fn scanner_config(&self) -> Result<ScannerConfig> {
        Ok(ScannerConfig {
            root: self.resolved_root()?,
            interval: self.scan_interval,
            skip: self.skip_set(),
        })
    }

    /// Watcher settings derived from this configuration.
    #[must_use]
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            debounce: self.debounce,
            flush_interval: self.flush_interval,
            probe_queue: DEFAULT_PROBE_QUEUE,
            skip: self.skip_set(),
        }
    }
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };

    let home = dirs::home_dir()
        .ok_or_else(|| Error::config("cannot expand '~': home directory is unknown"))?;
    Ok(home.join(rest))
}
