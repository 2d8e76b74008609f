//! The census worker: owns the scanner, reader, cache, and watch pipeline,
//! and drives them through the scan/monitor state machine.

pub mod protocol;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::future;
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::census::{CensusCache, FileEvent};
use crate::config::MonitorConfig;
use crate::error::{CensusError, Result};
use crate::result::{ScanResult, ScanStatus};
use crate::scan::DirectoryScanner;
use crate::scan::reader::OccurrenceReader;
use crate::watch::DirectoryWatcher;
use crate::worker::protocol::{WorkerCommand, WorkerReport};

/// Phases of the worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Scanning,
    Ready,
    Monitoring,
    Reconciling,
    Failed,
}

/// Outcome of waiting in `Monitoring` or `Failed`.
enum TickOutcome {
    Tick,
    Rescan,
    Stopped,
}

/// Long-running census task. One worker monitors one root for one token;
/// the cache has no other mutator, so no locking guards it.
pub struct CensusWorker {
    config: MonitorConfig,
    cache: CensusCache,
    reader: Option<Arc<OccurrenceReader>>,
    watcher: Option<DirectoryWatcher>,
    commands: mpsc::Receiver<WorkerCommand>,
    reports: mpsc::Sender<WorkerReport>,
    cancel: CancellationToken,
    state: WorkerState,
}

impl std::fmt::Debug for CensusWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CensusWorker")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("tracked_files", &self.cache.len())
            .field("total", &self.cache.total())
            .finish()
    }
}

impl CensusWorker {
    pub fn new(
        config: MonitorConfig,
        commands: mpsc::Receiver<WorkerCommand>,
        reports: mpsc::Sender<WorkerReport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            cache: CensusCache::new(),
            reader: None,
            watcher: None,
            commands,
            reports,
            cancel,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Drive the worker until cancellation or until the command channel
    /// closes. Each pass through the outer loop is one full-scan generation;
    /// the inner loop serializes monitoring ticks.
    pub async fn run(mut self) {
        info!(
            "census worker starting for {} (token {:?})",
            self.config.root_directory.display(),
            self.config.search_token
        );

        'lifecycle: loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.state = WorkerState::Scanning;
            let (result, scanned) = self.full_scan().await;
            self.report(WorkerReport::ResultsReady {
                results: Some(result),
            })
            .await;

            if scanned {
                self.state = WorkerState::Ready;

                // Attach the watcher before announcing readiness so changes
                // landing right after the scan are not lost.
                self.ensure_watcher().await;
                self.report(WorkerReport::Ready).await;

                self.state = WorkerState::Monitoring;
                loop {
                    match self.wait_for_tick().await {
                        TickOutcome::Stopped => break 'lifecycle,
                        TickOutcome::Rescan => {
                            self.begin_rescan().await;
                            continue 'lifecycle;
                        }
                        TickOutcome::Tick => {
                            self.state = WorkerState::Reconciling;
                            let (result, watch_failed) = self.reconcile_cycle().await;
                            self.report(WorkerReport::ResultsReady {
                                results: Some(result),
                            })
                            .await;

                            if watch_failed {
                                // Stale cache cannot be trusted once events
                                // may have been dropped; resynchronize.
                                self.begin_rescan().await;
                                continue 'lifecycle;
                            }
                            self.state = WorkerState::Monitoring;
                        }
                    }
                }
            } else {
                self.state = WorkerState::Failed;
                debug!(
                    "retrying the scan after {}ms",
                    self.config.poll_interval_ms
                );
                match self.wait_for_tick().await {
                    TickOutcome::Stopped => break 'lifecycle,
                    TickOutcome::Rescan => {
                        self.begin_rescan().await;
                        continue 'lifecycle;
                    }
                    TickOutcome::Tick => continue 'lifecycle,
                }
            }
        }

        info!("census worker stopped");
    }

    /// Seed the cache from a complete walk of the tree. Returns the cycle
    /// result and whether the scan succeeded.
    async fn full_scan(&mut self) -> (ScanResult, bool) {
        let started = Utc::now();
        let token = self.config.search_token.clone();

        // The previous census is discarded up front; a failed scan leaves an
        // empty cache rather than stale totals.
        self.cache.clear();
        self.reader = None;

        match self.seed_counts().await {
            Ok(counts) => {
                self.cache.seed(counts);
                info!(
                    "full scan of {} complete: {} files tracked, {} occurrences of {:?}",
                    self.config.root_directory.display(),
                    self.cache.len(),
                    self.cache.total(),
                    token
                );
                let result = ScanResult::new(
                    started,
                    Utc::now(),
                    token,
                    self.cache.total(),
                    ScanStatus::Success,
                )
                .with_added(self.cache.tracked_paths());
                (result, true)
            }
            Err(err) => {
                warn!(
                    "full scan of {} failed: {err}",
                    self.config.root_directory.display()
                );
                self.cache.clear();
                self.reader = None;
                let result =
                    ScanResult::new(started, Utc::now(), token, 0, ScanStatus::Failed);
                (result, false)
            }
        }
    }

    /// Enumerate eligible files and count occurrences in each, fanning the
    /// reads out over the blocking pool and joining every one of them before
    /// returning. A single unreadable file is skipped, not fatal.
    async fn seed_counts(&mut self) -> Result<HashMap<PathBuf, u64>> {
        let reader = Arc::new(OccurrenceReader::new(&self.config.search_token)?);
        let scanner = DirectoryScanner::new(&self.config);
        let root = self.config.root_directory.clone();

        let files = spawn_blocking(move || scanner.collect_files(&root))
            .await
            .map_err(|err| CensusError::Internal(format!("scan task panicked: {err}")))??;

        debug!("full scan dispatching {} file reads", files.len());

        let mut reads = Vec::with_capacity(files.len());
        for file in files {
            let reader = Arc::clone(&reader);
            reads.push(spawn_blocking(move || {
                let count = reader.count_file(&file);
                (file, count)
            }));
        }

        // Completion barrier: the cache swap must not happen while any read
        // is outstanding.
        let joined = future::join_all(reads).await;

        let mut counts = HashMap::new();
        for outcome in joined {
            match outcome {
                Ok((file, Ok(count))) => {
                    counts.insert(file, count);
                }
                Ok((file, Err(err))) => {
                    warn!("skipping {}: {err}", file.display());
                }
                Err(err) => {
                    warn!("file read task failed: {err}");
                }
            }
        }

        self.reader = Some(reader);
        Ok(counts)
    }

    /// Apply the change events observed since the previous tick. Returns the
    /// cycle result and whether the watch subsystem itself failed.
    async fn reconcile_cycle(&mut self) -> (ScanResult, bool) {
        let started = Utc::now();
        let mut added = Vec::new();
        let mut deleted = Vec::new();
        let mut watch_failed = !self.ensure_watcher().await;

        if !watch_failed {
            let drained = match self.watcher.as_mut() {
                Some(watcher) => watcher.drain(),
                None => Err(CensusError::WatchInit("watcher not attached".into())),
            };
            match drained {
                Ok(events) => {
                    if !events.is_empty() {
                        debug!("reconciling {} change events", events.len());
                    }
                    let scanner = DirectoryScanner::new(&self.config);
                    for event in &events {
                        if let Err(err) =
                            self.apply_event(&scanner, event, &mut added, &mut deleted)
                        {
                            warn!(
                                "skipping event for {}: {err}",
                                event.path().display()
                            );
                        }
                    }
                }
                Err(err) => {
                    warn!("watch subsystem failed: {err}");
                    watch_failed = true;
                }
            }
        }

        let status = if watch_failed {
            ScanStatus::Failed
        } else {
            ScanStatus::Success
        };
        let result = ScanResult::new(
            started,
            Utc::now(),
            self.config.search_token.clone(),
            self.cache.total(),
            status,
        )
        .with_added(added)
        .with_deleted(deleted);

        (result, watch_failed)
    }

    /// Apply one event, re-reading the file as needed. A failure here is
    /// scoped to this event; the caller logs it and moves on.
    fn apply_event(
        &mut self,
        scanner: &DirectoryScanner,
        event: &FileEvent,
        added: &mut Vec<PathBuf>,
        deleted: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let reader = self.reader.clone().ok_or_else(|| {
            CensusError::Internal("occurrence reader missing during reconciliation".into())
        })?;

        match event {
            FileEvent::Added(path) => {
                let Some(count) = read_if_eligible(scanner, reader.as_ref(), path)? else {
                    return Ok(());
                };
                self.cache.record_added(path.clone(), count);
                added.push(path.clone());
            }
            FileEvent::Changed(path) => {
                let Some(count) = read_if_eligible(scanner, reader.as_ref(), path)? else {
                    return Ok(());
                };
                self.cache.record_changed(path.clone(), count);
            }
            FileEvent::Deleted(path) => {
                if self.cache.count_for(path).is_some() {
                    deleted.push(path.clone());
                }
                self.cache.record_deleted(path);
            }
        }
        Ok(())
    }

    /// Attach the watcher if it is not running. Returns whether a watcher is
    /// attached afterwards.
    async fn ensure_watcher(&mut self) -> bool {
        if self.watcher.is_some() {
            return true;
        }
        match DirectoryWatcher::start(self.config.root_directory.clone()).await {
            Ok(watcher) => {
                debug!("watching {} for changes", watcher.root().display());
                self.watcher = Some(watcher);
                true
            }
            Err(err) => {
                warn!("failed to start watcher: {err}");
                false
            }
        }
    }

    /// Sleep until the next tick, applying any commands that arrive in the
    /// meantime. An interval change does not disturb the timer already
    /// running; a token or directory change supersedes it.
    async fn wait_for_tick(&mut self) -> TickOutcome {
        let sleep = tokio::time::sleep(self.config.poll_interval());
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return TickOutcome::Stopped,
                _ = &mut sleep => return TickOutcome::Tick,
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command) {
                            return TickOutcome::Rescan;
                        }
                    }
                    None => return TickOutcome::Stopped,
                },
            }
        }
    }

    /// Apply a command to the configuration. Returns whether the census must
    /// be rebuilt from a fresh full scan.
    fn handle_command(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::ChangePollInterval(ms) => {
                debug!("changing polling interval to {ms}ms, takes effect next cycle");
                self.config.poll_interval_ms = ms;
                false
            }
            WorkerCommand::ChangeMagicWord(word) => {
                debug!("changing magic word to {word:?}");
                self.config.search_token = word;
                true
            }
            WorkerCommand::ChangeDirSettings(directory) => {
                debug!("changing monitored directory to {}", directory.display());
                self.config.root_directory = directory;
                true
            }
        }
    }

    /// Tear down monitoring state ahead of a forced full rescan.
    async fn begin_rescan(&mut self) {
        // Dropping the watcher stops its notify stream.
        self.watcher = None;
        self.cache.clear();
        self.reader = None;
        self.report(WorkerReport::NotReady).await;
    }

    async fn report(&self, report: WorkerReport) {
        if self.reports.send(report).await.is_err() {
            debug!("supervisor side of the report channel is closed");
        }
    }
}

/// Stat and count a file, skipping paths that vanished or fail the
/// eligibility filters.
fn read_if_eligible(
    scanner: &DirectoryScanner,
    reader: &OccurrenceReader,
    path: &std::path::Path,
) -> Result<Option<u64>> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        // Vanished between the event and the read; a delete event follows.
        Err(_) => return Ok(None),
    };
    if !metadata.is_file() || !scanner.is_eligible(path, metadata.len()) {
        return Ok(None);
    }
    reader.count_file(path).map(Some)
}
