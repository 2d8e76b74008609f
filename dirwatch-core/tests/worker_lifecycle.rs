//! End-to-end exercises of the census worker over its control channel.

use std::fs;
use std::path::Path;
use std::time::Duration;

use dirwatch_core::{
    CensusWorker, MonitorConfig, ScanResult, ScanStatus, WorkerCommand, WorkerReport,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

struct Harness {
    commands: mpsc::Sender<WorkerCommand>,
    reports: mpsc::Receiver<WorkerReport>,
    cancel: CancellationToken,
}

impl Harness {
    fn spawn(config: MonitorConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (report_tx, report_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let worker = CensusWorker::new(config, command_rx, report_tx, cancel.clone());
        tokio::spawn(worker.run());
        Self {
            commands: command_tx,
            reports: report_rx,
            cancel,
        }
    }

    async fn next_report(&mut self) -> WorkerReport {
        timeout(REPORT_TIMEOUT, self.reports.recv())
            .await
            .expect("timed out waiting for a worker report")
            .expect("report channel closed")
    }

    async fn next_result(&mut self) -> ScanResult {
        loop {
            if let WorkerReport::ResultsReady {
                results: Some(result),
            } = self.next_report().await
            {
                return result;
            }
        }
    }

    /// Skim reports until a result satisfies `predicate`; cycles with stale
    /// totals in between are expected and skipped.
    async fn result_where<F>(&mut self, predicate: F) -> ScanResult
    where
        F: Fn(&ScanResult) -> bool,
    {
        for _ in 0..100 {
            let result = self.next_result().await;
            if predicate(&result) {
                return result;
            }
        }
        panic!("no matching scan result arrived");
    }

    async fn wait_for_ready(&mut self) {
        loop {
            if matches!(self.next_report().await, WorkerReport::Ready) {
                return;
            }
        }
    }

    async fn send(&self, command: WorkerCommand) {
        self.commands.send(command).await.expect("worker is gone");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn fast_config(root: &Path, token: &str) -> MonitorConfig {
    MonitorConfig {
        root_directory: root.to_path_buf(),
        search_token: token.to_string(),
        poll_interval_ms: 150,
        ..MonitorConfig::default()
    }
}

fn has_file(paths: &[std::path::PathBuf], name: &str) -> bool {
    paths
        .iter()
        .any(|p| p.file_name().and_then(|n| n.to_str()) == Some(name))
}

#[tokio::test]
async fn initial_scan_counts_occurrences_and_signals_ready() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "hello world\nhello again").unwrap();
    fs::write(tmp.path().join("b.txt"), "no magic here").unwrap();

    let mut harness = Harness::spawn(fast_config(tmp.path(), "hello"));

    let first = harness.next_result().await;
    assert_eq!(first.status, ScanStatus::Success);
    assert_eq!(first.occurrence_total, 2);
    assert_eq!(first.search_token, "hello");
    assert!(has_file(&first.added_paths, "a.txt"));
    assert!(has_file(&first.added_paths, "b.txt"));
    assert!(first.deleted_paths.is_empty());

    assert!(matches!(harness.next_report().await, WorkerReport::Ready));
}

#[tokio::test]
async fn empty_directory_scan_succeeds_with_zero_total() {
    let tmp = TempDir::new().unwrap();
    let mut harness = Harness::spawn(fast_config(tmp.path(), "hello"));

    let first = harness.next_result().await;
    assert_eq!(first.status, ScanStatus::Success);
    assert_eq!(first.occurrence_total, 0);
    assert!(first.added_paths.is_empty());

    assert!(matches!(harness.next_report().await, WorkerReport::Ready));
}

#[tokio::test]
async fn change_and_delete_events_reconcile_the_total() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "hello hello").unwrap();
    fs::write(tmp.path().join("b.txt"), "no magic here").unwrap();

    let mut harness = Harness::spawn(fast_config(tmp.path(), "hello"));

    let first = harness.next_result().await;
    assert_eq!(first.occurrence_total, 2);
    harness.wait_for_ready().await;

    // b.txt grows from zero to three occurrences.
    fs::write(tmp.path().join("b.txt"), "hello hello hello").unwrap();
    let grown = harness
        .result_where(|r| r.occurrence_total == 5 && r.status == ScanStatus::Success)
        .await;
    assert!(grown.deleted_paths.is_empty());

    // Deleting a.txt removes its two occurrences.
    fs::remove_file(tmp.path().join("a.txt")).unwrap();
    let shrunk = harness
        .result_where(|r| r.occurrence_total == 3 && r.status == ScanStatus::Success)
        .await;
    assert!(has_file(&shrunk.deleted_paths, "a.txt"));
}

#[tokio::test]
async fn added_file_is_tracked_incrementally() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "hello").unwrap();

    let mut harness = Harness::spawn(fast_config(tmp.path(), "hello"));
    harness.wait_for_ready().await;

    fs::write(tmp.path().join("c.txt"), "hello hello").unwrap();
    let result = harness
        .result_where(|r| r.occurrence_total == 3 && r.status == ScanStatus::Success)
        .await;
    assert!(has_file(&result.added_paths, "c.txt"));
}

#[tokio::test]
async fn magic_word_change_discards_the_cache_and_rescans() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "hello word hello").unwrap();

    let mut harness = Harness::spawn(fast_config(tmp.path(), "hello"));
    let first = harness.next_result().await;
    assert_eq!(first.occurrence_total, 2);
    harness.wait_for_ready().await;

    harness
        .send(WorkerCommand::ChangeMagicWord("word".to_string()))
        .await;

    // The worker drops readiness, rescans from scratch, and the fresh total
    // reflects the new token rather than a delta from the old cache.
    loop {
        match harness.next_report().await {
            WorkerReport::NotReady => break,
            WorkerReport::ResultsReady { .. } => continue,
            WorkerReport::Ready => panic!("worker must not stay ready across a token change"),
        }
    }

    let rescanned = harness
        .result_where(|r| r.search_token == "word")
        .await;
    assert_eq!(rescanned.status, ScanStatus::Success);
    assert_eq!(rescanned.occurrence_total, 1);
    assert!(has_file(&rescanned.added_paths, "a.txt"));

    harness.wait_for_ready().await;
}

#[tokio::test]
async fn failed_scan_retries_until_a_directory_change_unsticks_it() {
    let missing = TempDir::new().unwrap().path().join("gone");
    let mut harness = Harness::spawn(fast_config(&missing, "hello"));

    let first = harness.next_result().await;
    assert_eq!(first.status, ScanStatus::Failed);
    assert_eq!(first.occurrence_total, 0);
    assert!(first.added_paths.is_empty());

    // The retry timer fires after the poll interval and fails again.
    let retried = harness.next_result().await;
    assert_eq!(retried.status, ScanStatus::Failed);

    let good = TempDir::new().unwrap();
    fs::write(good.path().join("a.txt"), "hello").unwrap();
    harness
        .send(WorkerCommand::ChangeDirSettings(good.path().to_path_buf()))
        .await;

    let recovered = harness
        .result_where(|r| r.status == ScanStatus::Success)
        .await;
    assert_eq!(recovered.occurrence_total, 1);
    harness.wait_for_ready().await;
}

#[tokio::test]
async fn poll_interval_change_does_not_invalidate_the_cache() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "hello").unwrap();

    let mut harness = Harness::spawn(fast_config(tmp.path(), "hello"));
    harness.wait_for_ready().await;

    harness.send(WorkerCommand::ChangePollInterval(200)).await;

    // Monitoring carries on: results keep flowing and readiness is never
    // withdrawn.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(800);
    let mut cycles = 0;
    while tokio::time::Instant::now() < deadline {
        match timeout(Duration::from_millis(400), harness.reports.recv()).await {
            Ok(Some(WorkerReport::NotReady)) => {
                panic!("interval change must not invalidate the cache")
            }
            Ok(Some(WorkerReport::ResultsReady { .. })) => cycles += 1,
            Ok(Some(WorkerReport::Ready)) | Ok(None) | Err(_) => {}
        }
    }
    assert!(cycles >= 1);
}
