//! Daemon orchestration.
//!
//! Runs the periodic scanner and the event watcher side by side over one
//! root, feeding both into the same decision handler.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::watcher::{DecisionHandler, Scanner, Watcher};
use crate::{Error, Result};

/// Scanner and watcher sharing one handler.
#[derive(Debug)]
pub struct Daemon {
    scanner: Arc<Scanner>,
    watcher: Arc<Watcher>,
}

impl Daemon {
    /// Build both components and register the recursive watch set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the root cannot be
    /// resolved, or the notification backend cannot be set up.
    pub fn new(config: &Config, handler: Arc<dyn DecisionHandler>) -> Result<Self> {
        config.validate()?;

        let scanner = Arc::new(Scanner::new(
            config.scanner_config()?,
            Arc::clone(&handler),
        )?);
        let watcher = Arc::new(Watcher::new(config.watcher_config(), handler)?);
        watcher.add_recursive(scanner.root())?;

        Ok(Self { scanner, watcher })
    }

    /// The periodic scanner.
    #[must_use]
    pub const fn scanner(&self) -> &Arc<Scanner> {
        &self.scanner
    }

    /// The event watcher.
    #[must_use]
    pub const fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }

    /// Run both loops until `cancel` fires or one of them stops, then close
    /// the watcher.
    ///
    /// # Errors
    ///
    /// Returns the first error from either loop other than cancellation.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        // Either loop finishing stops the other.
        let stop = cancel.child_token();

        let scan_task = {
            let scanner = Arc::clone(&self.scanner);
            let stop = stop.clone();
            tokio::spawn(async move {
                let result = scanner.run(stop.clone()).await;
                stop.cancel();
                result
            })
        };
        let watch_task = {
            let watcher = Arc::clone(&self.watcher);
            let stop = stop.clone();
            tokio::spawn(async move {
                let result = watcher.run(stop.clone()).await;
                stop.cancel();
                result
            })
        };

        tracing::info!(
            root = %self.scanner.root().display(),
            watched = self.watcher.watched_dirs().len(),
            "Daemon started"
        );

        let (scanned, watched) = tokio::join!(scan_task, watch_task);
        self.watcher.close();

        let mut first_error = None;
        for (component, joined) in [("scanner", scanned), ("watcher", watched)] {
            let result = joined.map_err(|e| Error::internal(format!("{component} task failed: {e}")));
            match result.and_then(|inner| inner) {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    tracing::error!(component, error = %e, "Component stopped with error");
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::info!("Daemon stopped");
        first_error.map_or(Ok(()), Err)
    }
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
