//! dbxignore - keeps `.dropboxignore` matches out of Dropbox
//!
//! Entry point for the daemon and the one-shot scanner.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use dbxignore::config::DEFAULT_ROOT;
use dbxignore::daemon::shutdown_signal;
use dbxignore::observability::{config_from_env, init_tracing};
use dbxignore::{Config, Daemon, Error, IgnoreClassifier, Result, Scanner};

/// dbxignore - Dropbox ignore daemon
#[derive(Parser, Debug)]
#[command(name = "dbxignore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon until interrupted
    Serve {
        #[command(flatten)]
        common: CommonArgs,

        /// Seconds between incremental scans
        #[arg(long, env = "DBXIGNORE_SCAN_INTERVAL", default_value = "300", value_name = "SECS")]
        scan_interval: u64,

        /// Quiet time before a changed path is handled, in milliseconds
        #[arg(long, env = "DBXIGNORE_DEBOUNCE_MS", default_value = "800")]
        debounce_ms: u64,

        /// How often settled events are flushed, in milliseconds
        #[arg(long, env = "DBXIGNORE_FLUSH_MS", default_value = "250")]
        flush_ms: u64,
    },

    /// Run one full scan and exit
    Scan {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Root directory to monitor or scan
    #[arg(short, long, env = "DBXIGNORE_ROOT", default_value = DEFAULT_ROOT)]
    root: PathBuf,

    /// Show what would be tagged without writing attributes
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable JSON logging output
    #[arg(long)]
    log_json: bool,

    /// Extra directory names never scanned or watched
    #[arg(long = "skip-dir", value_name = "NAME", env = "DBXIGNORE_SKIP_DIRS", value_delimiter = ',')]
    skip_dirs: Vec<String>,
}

impl CommonArgs {
    fn into_config(self) -> Config {
        let mut tracing = config_from_env();
        if let Some(level) = self.log_level {
            tracing.level = level;
        } else if self.verbose {
            tracing.level = "debug".to_string();
        }

        Config {
            root: self.root,
            skip_dirs: self.skip_dirs,
            dry_run: self.dry_run,
            log_level: tracing.level,
            log_json: self.log_json || tracing.json,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, serve) = match cli.command {
        Command::Serve {
            common,
            scan_interval,
            debounce_ms,
            flush_ms,
        } => {
            let config = Config {
                scan_interval: Duration::from_secs(scan_interval),
                debounce: Duration::from_millis(debounce_ms),
                flush_interval: Duration::from_millis(flush_ms),
                ..common.into_config()
            };
            (config, true)
        }
        Command::Scan { common } => (common.into_config(), false),
    };

    config.validate()?;
    init_tracing(&dbxignore::observability::TracingConfig {
        level: config.log_level.clone(),
        json: config.log_json,
    })?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dbxignore starting");
    tracing::debug!(?config, "Configuration loaded");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    let handler = Arc::new(IgnoreClassifier::from_config(&config));
    if config.dry_run {
        tracing::info!("Dry run: no attributes will be written");
    }

    if serve {
        let daemon = Daemon::new(&config, handler)?;
        daemon.run(cancel).await
    } else {
        let scanner = Arc::new(Scanner::new(config.scanner_config()?, handler)?);
        tracing::info!(root = %scanner.root().display(), "Scanning");

        let outcome = tokio::task::spawn_blocking(move || scanner.scan_until(&cancel))
            .await
            .map_err(|e| Error::internal(format!("scan task failed: {e}")))?;

        match outcome {
            Ok(_) => Ok(()),
            Err(e) if e.is_cancelled() => {
                tracing::info!("Scan interrupted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
