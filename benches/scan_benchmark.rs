//! Scan benchmarks.
//!
//! Compares a full walk against an incremental walk of an unchanged tree.
//!
//! **Run benchmarks:**
//! ```bash
//! cargo bench                      # Run all benchmarks
//! cargo bench -- scan/incremental  # Incremental scans only
//! ```

use std::fs::{self, Metadata};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbxignore::watcher::ScannerConfig;
use dbxignore::{Action, DecisionHandler, Scanner};
use filetime::FileTime;
use tempfile::TempDir;

struct Continue;

impl DecisionHandler for Continue {
    fn decide(&self, _: &Path, _: &Metadata) -> Action {
        Action::Continue
    }
}

/// Build `dirs` directories of `files` files each, all mtimes an hour old.
fn build_tree(dirs: usize, files: usize) -> TempDir {
    let tmp = TempDir::new().expect("failed to create temp dir");
    for d in 0..dirs {
        let dir = tmp.path().join(format!("dir{d:04}"));
        fs::create_dir(&dir).expect("failed to create dir");
        for f in 0..files {
            fs::write(dir.join(format!("file{f:04}.txt")), "x").expect("failed to write file");
        }
    }

    let past = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
    for entry in walkdir::WalkDir::new(tmp.path()).contents_first(true) {
        let entry = entry.expect("failed to walk tree");
        filetime::set_file_mtime(entry.path(), past).expect("failed to set mtime");
    }
    tmp
}

fn bench_scans(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.sample_size(10);

    for dirs in [10, 100] {
        let tree = build_tree(dirs, 20);
        let scanner = Scanner::new(ScannerConfig::new(tree.path()), Arc::new(Continue))
            .expect("failed to create scanner");

        group.bench_with_input(BenchmarkId::new("full", dirs), &dirs, |b, _| {
            b.iter(|| {
                scanner.clear_cache();
                black_box(scanner.scan().expect("scan failed"))
            });
        });

        scanner.scan().expect("scan failed");
        group.bench_with_input(BenchmarkId::new("incremental", dirs), &dirs, |b, _| {
            b.iter(|| black_box(scanner.scan().expect("scan failed")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scans);
criterion_main!(benches);
