//! Integration tests: the fetch engine against a local segment server.

mod common;

use std::sync::Arc;

use common::segment_server::{Failure, SegmentServer};
use reqwest::Url;
use tempfile::tempdir;
use vod_dl::{
    DownloadConfig, Error, FetchJob, Fetcher, NoStatus, Progress, SharedProgress,
};

fn body(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_add(seed)).collect()
}

fn job(server: &SegmentServer, id: usize, path: &str, dir: &std::path::Path) -> FetchJob {
    FetchJob {
        id,
        url: Url::parse(&server.url(path)).unwrap(),
        path: dir.join(format!("{id:05}.ts")),
    }
}

fn progress(count: usize) -> SharedProgress {
    SharedProgress::new(Progress::new(count, Arc::new(NoStatus)))
}

#[tokio::test]
async fn cached_segment_is_never_requested() {
    let server = SegmentServer::start();
    server.serve("/0.ts", body(100, 0));
    let dir = tempdir().unwrap();
    let jobs = vec![job(&server, 0, "/0.ts", dir.path())];
    std::fs::write(&jobs[0].path, b"cached").unwrap();

    let fetcher = Fetcher::new(reqwest::Client::new(), DownloadConfig::default());
    let progress = progress(1);
    let stats = fetcher.fetch_all(&jobs, &progress).await.unwrap();

    assert_eq!(server.requests("/0.ts"), 0);
    assert_eq!(stats.segments_cached, 1);
    assert_eq!(stats.segments_downloaded, 0);
    let state = progress.state();
    assert_eq!(state.items_completed, 1);
    assert_eq!(state.bytes_so_far, 6);
    assert_eq!(progress.with(|p| p.transferred()), 0);
    assert_eq!(std::fs::read(&jobs[0].path).unwrap(), b"cached");
}

#[tokio::test]
async fn transient_failures_are_retried_and_cache_is_reused() {
    let server = SegmentServer::start();
    let one = body(3000, 1);
    let two = body(5000, 2);
    server.serve("/1.ts", one.clone());
    server.serve("/2.ts", two.clone());
    server.fail("/1.ts", Failure::Status(503), 1);
    server.fail("/2.ts", Failure::Status(500), 1);

    let dir = tempdir().unwrap();
    let jobs = vec![
        job(&server, 0, "/0.ts", dir.path()),
        job(&server, 1, "/1.ts", dir.path()),
        job(&server, 2, "/2.ts", dir.path()),
    ];
    std::fs::write(&jobs[0].path, vec![9u8; 7]).unwrap();

    let fetcher = Fetcher::new(reqwest::Client::new(), DownloadConfig::default());
    let progress = progress(3);
    let stats = fetcher.fetch_all(&jobs, &progress).await.unwrap();

    assert_eq!(server.requests("/0.ts"), 0);
    assert_eq!(server.requests("/1.ts"), 2);
    assert_eq!(server.requests("/2.ts"), 2);

    let state = progress.state();
    assert_eq!(state.items_completed, 3);
    assert_eq!(state.bytes_so_far, 7 + 3000 + 5000);
    assert_eq!(state.percent, Some(100));
    assert_eq!(progress.with(|p| p.transferred()), 8000);

    assert_eq!(stats.segments_cached, 1);
    assert_eq!(stats.segments_downloaded, 2);
    assert_eq!(stats.bytes_downloaded, 8000);

    assert_eq!(std::fs::read(&jobs[1].path).unwrap(), one);
    assert_eq!(std::fs::read(&jobs[2].path).unwrap(), two);
}

#[tokio::test]
async fn dropped_connection_is_retried() {
    let server = SegmentServer::start();
    server.serve("/0.ts", body(2048, 3));
    server.fail("/0.ts", Failure::Drop, 2);
    let dir = tempdir().unwrap();
    let jobs = vec![job(&server, 0, "/0.ts", dir.path())];

    let fetcher = Fetcher::new(reqwest::Client::new(), DownloadConfig::default());
    let stats = fetcher.fetch_all(&jobs, &progress(1)).await.unwrap();

    assert_eq!(server.requests("/0.ts"), 3);
    assert_eq!(stats.bytes_downloaded, 2048);
}

#[tokio::test]
async fn exhausted_budget_fails_the_batch() {
    let server = SegmentServer::start();
    server.serve("/0.ts", body(1000, 4));
    server.fail("/0.ts", Failure::Status(503), 3);
    let dir = tempdir().unwrap();
    let jobs = vec![job(&server, 0, "/0.ts", dir.path())];

    let fetcher = Fetcher::new(
        reqwest::Client::new(),
        DownloadConfig::new().with_retries(2),
    );
    let err = fetcher.fetch_all(&jobs, &progress(1)).await.unwrap_err();

    match err {
        Error::DownloadFailed { url, attempts, .. } => {
            assert_eq!(attempts, 2);
            assert!(url.ends_with("/0.ts"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.requests("/0.ts"), 2);
    assert!(!jobs[0].path.exists());
}

#[tokio::test]
async fn missing_segment_is_not_retried() {
    let server = SegmentServer::start();
    let dir = tempdir().unwrap();
    let jobs = vec![job(&server, 0, "/gone.ts", dir.path())];

    let fetcher = Fetcher::new(reqwest::Client::new(), DownloadConfig::default());
    let err = fetcher.fetch_all(&jobs, &progress(1)).await.unwrap_err();

    assert!(matches!(err, Error::DownloadFailed { attempts: 1, .. }));
    assert_eq!(server.requests("/gone.ts"), 1);
}

#[tokio::test]
async fn single_worker_still_fetches_everything() {
    let server = SegmentServer::start();
    let dir = tempdir().unwrap();
    let mut jobs = Vec::new();
    for i in 0..6 {
        let path = format!("/{i}.ts");
        server.serve(&path, body(512 + i * 10, i as u8));
        jobs.push(job(&server, i, &path, dir.path()));
    }

    let fetcher = Fetcher::new(
        reqwest::Client::new(),
        DownloadConfig::new().with_workers(1).with_chunk_size(100),
    );
    let progress = progress(jobs.len());
    let stats = fetcher.fetch_all(&jobs, &progress).await.unwrap();

    assert_eq!(stats.segments_downloaded, 6);
    assert_eq!(server.total_requests(), 6);
    let expected: u64 = (0..6).map(|i| 512 + i * 10).sum();
    assert_eq!(progress.state().bytes_so_far, expected);
}
