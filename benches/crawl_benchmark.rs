//! Performance benchmarks for orgdisk
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use orgdisk::config::RunConfig;
use orgdisk::core::{DownloadScheduler, RequestPacer, RunCoordinator, SchedulerConfig, TreeCrawler};
use orgdisk::fs::LocalMirrorBuilder;
use orgdisk::storage::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Tree with `dirs` top-level directories, each holding `files` files
fn build_store(dirs: usize, files: usize, size: usize) -> MemoryStore {
    let mut store = MemoryStore::new();
    for d in 0..dirs {
        for f in 0..files {
            store = store.with_file(&format!("/dir_{}/sub/file_{}.bin", d, f), vec![(f % 256) as u8; size]);
        }
    }
    store
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_crawl(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("crawl");

    for dirs in [10usize, 100, 500] {
        let store = build_store(dirs, 10, 16);
        group.throughput(Throughput::Elements((dirs * 10) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dirs), &store, |b, store| {
            b.to_async(&rt).iter(|| async move {
                let result = TreeCrawler::new(store)
                    .with_pacer(RequestPacer::unlimited())
                    .crawl("/")
                    .await
                    .unwrap();
                black_box(result.files.len())
            });
        });
    }

    group.finish();
}

fn bench_download(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("download");
    group.sample_size(20);

    let store = Arc::new(build_store(20, 50, 4 * 1024));
    let crawl = rt
        .block_on(
            TreeCrawler::new(store.as_ref())
                .with_pacer(RequestPacer::unlimited())
                .crawl("/"),
        )
        .unwrap();

    let dst = TempDir::new().unwrap();
    LocalMirrorBuilder::new(dst.path(), "/")
        .ensure_local_tree(&crawl.directories)
        .unwrap();

    group.throughput(Throughput::Bytes(store.total_bytes()));
    for concurrency in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(concurrency), &concurrency, |b, &concurrency| {
            let scheduler = DownloadScheduler::new(
                Arc::clone(&store),
                SchedulerConfig {
                    concurrency,
                    ..Default::default()
                },
            );
            let scheduler = &scheduler;
            let (files, dst) = (&crawl.files, dst.path());
            b.to_async(&rt).iter(|| async move {
                let report = scheduler.download_all(files, "/", dst).await;
                black_box(report.succeeded)
            });
        });
    }

    group.finish();
}

fn bench_full_run(c: &mut Criterion) {
    let rt = runtime();
    let store = Arc::new(build_store(50, 20, 1024).with_download_latency(Duration::from_micros(200)));
    let dst = TempDir::new().unwrap();

    let config = RunConfig {
        output_dir: dst.path().to_path_buf(),
        crawl_delay: Duration::ZERO,
        ..Default::default()
    };
    let coordinator = RunCoordinator::new(store, config);

    let coordinator = &coordinator;
    c.bench_function("full_run_1000_files", |b| {
        b.to_async(&rt).iter(|| async move {
            let summary = coordinator.run("bench@example.com").await.unwrap();
            black_box(summary.succeeded())
        });
    });
}

criterion_group!(benches, bench_crawl, bench_download, bench_full_run);
criterion_main!(benches);
