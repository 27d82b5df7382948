//! Integration tests for the debounced watcher against the real OS backend.

mod common;

use std::fs::{self, Metadata};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use common::{eventually, MemoryStore, Recorder};
use dbxignore::watcher::WatcherConfig;
use dbxignore::{
    Action, AttributeStore, DecisionHandler, IgnoreClassifier, Matcher, ProcessedCache, Watcher,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn fast_config() -> WatcherConfig {
    WatcherConfig {
        debounce: Duration::from_millis(100),
        flush_interval: Duration::from_millis(50),
        ..WatcherConfig::default()
    }
}

struct Continue;

impl DecisionHandler for Continue {
    fn decide(&self, _: &Path, _: &Metadata) -> Action {
        Action::Continue
    }
}

fn start(watcher: &Arc<Watcher>, cancel: &CancellationToken) -> tokio::task::JoinHandle<dbxignore::Result<()>> {
    let watcher = Arc::clone(watcher);
    let cancel = cancel.clone();
    tokio::spawn(async move { watcher.run(cancel).await })
}

/// A burst of writes to one file is handled once.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_burst_is_coalesced() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    let recorder = Recorder::new(Continue);
    let watcher = Arc::new(Watcher::new(fast_config(), Arc::clone(&recorder) as _).unwrap());
    watcher.add_recursive(&root).unwrap();

    let cancel = CancellationToken::new();
    let task = start(&watcher, &cancel);

    let file = root.join("notes.txt");
    for i in 0..5 {
        fs::write(&file, format!("revision {i}")).unwrap();
    }

    assert!(eventually(Duration::from_secs(5), || recorder.count(&file) >= 1).await);
    // Give a straggling second dispatch time to show up.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(recorder.count(&file), 1);

    cancel.cancel();
    assert!(task.await.unwrap().unwrap_err().is_cancelled());
    watcher.close();
}

/// Directories created after startup are watched and their contents handled.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_directory_is_watched() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    let recorder = Recorder::new(Continue);
    let watcher = Arc::new(Watcher::new(fast_config(), Arc::clone(&recorder) as _).unwrap());
    watcher.add_recursive(&root).unwrap();

    let cancel = CancellationToken::new();
    let task = start(&watcher, &cancel);

    let dir = root.join("photos");
    fs::create_dir(&dir).unwrap();
    assert!(eventually(Duration::from_secs(5), || watcher.watched_dirs().contains(&dir)).await);

    let file = dir.join("img.jpg");
    fs::write(&file, "jpeg").unwrap();
    assert!(eventually(Duration::from_secs(5), || recorder.count(&file) == 1).await);

    cancel.cancel();
    let _ = task.await;
    watcher.close();
}

/// Skip-set directories created at runtime are never watched.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_skip_directory_is_not_watched() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    let recorder = Recorder::new(Continue);
    let watcher = Arc::new(Watcher::new(fast_config(), Arc::clone(&recorder) as _).unwrap());
    watcher.add_recursive(&root).unwrap();

    let cancel = CancellationToken::new();
    let task = start(&watcher, &cancel);

    let git = root.join(".git");
    fs::create_dir(&git).unwrap();
    // The create itself is still dispatched once it settles.
    assert!(eventually(Duration::from_secs(5), || recorder.count(&git) == 1).await);
    assert!(!watcher.watched_dirs().contains(&git));

    cancel.cancel();
    let _ = task.await;
    watcher.close();
}

/// Ignored directories created at runtime are tagged and unwatched.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ignored_directory_is_tagged_and_unwatched() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    fs::write(root.join(".dropboxignore"), "target/\n").unwrap();

    let store = Arc::new(MemoryStore::default());
    let classifier = IgnoreClassifier::new(
        Matcher::default(),
        Arc::clone(&store) as Arc<dyn AttributeStore>,
        ProcessedCache::default(),
    );
    let watcher = Arc::new(Watcher::new(fast_config(), Arc::new(classifier)).unwrap());
    watcher.add_recursive(&root).unwrap();

    let cancel = CancellationToken::new();
    let task = start(&watcher, &cancel);

    let target = root.join("target");
    fs::create_dir(&target).unwrap();
    assert!(eventually(Duration::from_secs(5), || store.is_tagged_now(&target)).await);
    assert!(eventually(Duration::from_secs(5), || !watcher.watched_dirs().contains(&target)).await);

    cancel.cancel();
    let _ = task.await;
    watcher.close();
}

/// Closing the watcher ends `run` cleanly.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_ends_run() {
    let tmp = TempDir::new().unwrap();
    let watcher = Arc::new(Watcher::new(fast_config(), Arc::new(Continue)).unwrap());
    watcher.add_recursive(tmp.path()).unwrap();

    let task = start(&watcher, &CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(50)).await;
    watcher.close();
    watcher.close();

    let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap();
    assert!(result.unwrap().is_ok());
}

/// A slow handler neither stalls ingestion of new notifications nor delays
/// cancellation.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ingestion_continues_while_handler_is_busy() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    let slow = root.join("slow.txt");

    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let gate = Mutex::new((started_tx, release_rx));
    let handler = {
        let slow = slow.clone();
        move |path: &Path, _: &Metadata| {
            if path == slow {
                let gate = gate.lock();
                let _ = gate.0.send(());
                let _ = gate.1.recv_timeout(Duration::from_secs(10));
            }
            Action::Continue
        }
    };

    let config = WatcherConfig {
        debounce: Duration::from_millis(300),
        flush_interval: Duration::from_millis(50),
        ..WatcherConfig::default()
    };
    let watcher = Arc::new(Watcher::new(config, Arc::new(handler)).unwrap());
    watcher.add_recursive(&root).unwrap();

    let cancel = CancellationToken::new();
    let task = start(&watcher, &cancel);

    fs::write(&slow, "x").unwrap();
    let started = tokio::task::spawn_blocking(move || started_rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(started.is_ok(), "handler never saw slow.txt");

    // The handler is now blocked; this write must still be buffered.
    fs::write(root.join("other.txt"), "y").unwrap();
    assert!(eventually(Duration::from_secs(2), || watcher.pending_len() >= 1).await);

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_millis(500), task).await;
    assert!(result.expect("run ignored cancellation").unwrap().unwrap_err().is_cancelled());

    release_tx.send(()).unwrap();
    watcher.close();
}
