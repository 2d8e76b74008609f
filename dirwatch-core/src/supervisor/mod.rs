//! Supervision of the census worker: lifecycle, crash recovery, command
//! relay, and result forwarding.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::{CensusError, Result};
use crate::store::ResultStore;
use crate::worker::CensusWorker;
use crate::worker::protocol::{WorkerCommand, WorkerReport};

/// Depth of the supervisor-to-worker command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Depth of the worker-to-supervisor report channel.
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Whether a worker task currently exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    Stopped,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Running => "running",
            WorkerStatus::Stopped => "stopped",
        }
    }
}

/// Outcome of a start/stop request from the control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Done(String),
    Ignored(String),
}

impl TaskOutcome {
    pub fn message(&self) -> &str {
        match self {
            TaskOutcome::Done(msg) | TaskOutcome::Ignored(msg) => msg,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, TaskOutcome::Ignored(_))
    }
}

struct WorkerHandle {
    commands: mpsc::Sender<WorkerCommand>,
    cancel: CancellationToken,
    generation: u64,
    #[cfg(test)]
    abort: tokio::task::AbortHandle,
}

/// Owns at most one [`CensusWorker`] at a time. Restarts it on unexpected
/// exit unless the stop was operator-requested, relays configuration changes
/// over the control channel, and forwards cycle results to the store.
///
/// The supervision boundary is the concurrency guard: the worker is the only
/// mutator of its cache, and the two sides share nothing but channels.
pub struct Supervisor {
    store: Arc<dyn ResultStore>,
    /// Latest accepted configuration; a restarted worker picks these values
    /// up, not the boot-time ones.
    config: Mutex<MonitorConfig>,
    handle: Mutex<Option<WorkerHandle>>,
    child_ready: AtomicBool,
    planned_stop: AtomicBool,
    generation: AtomicU64,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("child_ready", &self.child_ready.load(Ordering::SeqCst))
            .field("planned_stop", &self.planned_stop.load(Ordering::SeqCst))
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}

impl Supervisor {
    pub fn new(config: MonitorConfig, store: Arc<dyn ResultStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            config: Mutex::new(config),
            handle: Mutex::new(None),
            child_ready: AtomicBool::new(false),
            planned_stop: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        })
    }

    /// Start the worker. A no-op when one is already running.
    pub async fn start(self: &Arc<Self>) -> TaskOutcome {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            let msg = "worker already running, ignoring start".to_string();
            debug!("{msg}");
            return TaskOutcome::Ignored(msg);
        }

        self.planned_stop.store(false, Ordering::SeqCst);
        let (run_task, generation) = self.install_worker(&mut guard).await;
        self.spawn_supervision_loop(run_task, generation);
        info!("started census worker (generation {generation})");
        TaskOutcome::Done("started census worker".to_string())
    }

    /// Stop the worker without triggering a restart. A no-op when none is
    /// running.
    pub async fn stop(&self) -> TaskOutcome {
        let mut guard = self.handle.lock().await;
        match guard.take() {
            Some(handle) => {
                self.planned_stop.store(true, Ordering::SeqCst);
                self.child_ready.store(false, Ordering::SeqCst);
                handle.cancel.cancel();
                info!("stopped census worker (generation {})", handle.generation);
                TaskOutcome::Done("stopped census worker".to_string())
            }
            None => {
                let msg = "no active worker, ignoring stop".to_string();
                debug!("{msg}");
                TaskOutcome::Ignored(msg)
            }
        }
    }

    pub async fn status(&self) -> WorkerStatus {
        if self.handle.lock().await.is_some() {
            WorkerStatus::Running
        } else {
            WorkerStatus::Stopped
        }
    }

    pub fn is_ready(&self) -> bool {
        self.child_ready.load(Ordering::SeqCst)
    }

    /// Change the polling cadence. Requires a running, ready worker.
    pub async fn change_poll_interval(&self, interval_ms: u64) -> Result<()> {
        if interval_ms == 0 {
            return Err(CensusError::Config(
                "poll interval must be greater than zero".into(),
            ));
        }
        self.send_when_ready(WorkerCommand::ChangePollInterval(interval_ms), |config| {
            config.poll_interval_ms = interval_ms;
        })
        .await
    }

    /// Change the search token. Requires a running, ready worker; forces a
    /// full rescan on the worker side.
    pub async fn change_magic_word(&self, word: String) -> Result<()> {
        if word.is_empty() {
            return Err(CensusError::Config("magic word must not be empty".into()));
        }
        self.send_when_ready(WorkerCommand::ChangeMagicWord(word.clone()), |config| {
            config.search_token = word;
        })
        .await
    }

    /// Change the monitored directory. Accepted regardless of readiness so a
    /// stuck initial scan can be redirected; the path is validated here and
    /// never forwarded when invalid.
    pub async fn change_directory(&self, directory: PathBuf) -> Result<()> {
        if !directory.is_dir() {
            return Err(CensusError::Config(format!(
                "invalid path {} given to monitor",
                directory.display()
            )));
        }

        let guard = self.handle.lock().await;
        let handle = guard
            .as_ref()
            .ok_or_else(|| CensusError::Channel("no active worker".into()))?;

        handle
            .commands
            .send(WorkerCommand::ChangeDirSettings(directory.clone()))
            .await
            .map_err(|err| CensusError::Channel(format!("worker command failed: {err}")))?;

        self.config.lock().await.root_directory = directory;
        Ok(())
    }

    /// Cancel the worker and mark the stop planned; used at process exit.
    pub async fn shutdown(&self) {
        let outcome = self.stop().await;
        debug!("supervisor shutdown: {}", outcome.message());
    }

    async fn send_when_ready<F>(&self, command: WorkerCommand, apply: F) -> Result<()>
    where
        F: FnOnce(&mut MonitorConfig),
    {
        let guard = self.handle.lock().await;
        let handle = guard
            .as_ref()
            .ok_or_else(|| CensusError::Channel("no active worker".into()))?;

        if !self.is_ready() {
            return Err(CensusError::Channel(
                "worker is not ready to accept changes".into(),
            ));
        }

        handle
            .commands
            .send(command)
            .await
            .map_err(|err| CensusError::Channel(format!("worker command failed: {err}")))?;

        apply(&mut *self.config.lock().await);
        Ok(())
    }

    /// Create channels, spawn one worker generation plus its report pump, and
    /// place the handle in `slot`. The caller holds the handle lock.
    async fn install_worker(
        self: &Arc<Self>,
        slot: &mut Option<WorkerHandle>,
    ) -> (JoinHandle<()>, u64) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let config = self.config.lock().await.clone();

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (report_tx, report_rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let worker = CensusWorker::new(config, command_rx, report_tx, cancel.clone());
        let run_task = tokio::spawn(worker.run());
        #[cfg(test)]
        let abort = run_task.abort_handle();

        self.spawn_report_pump(report_rx, generation);

        *slot = Some(WorkerHandle {
            commands: command_tx,
            cancel,
            generation,
            #[cfg(test)]
            abort,
        });
        (run_task, generation)
    }

    /// Drain worker reports: readiness flips the gate, results go to the
    /// store. Store failures are logged and do not disturb the worker.
    fn spawn_report_pump(
        self: &Arc<Self>,
        mut reports: mpsc::Receiver<WorkerReport>,
        generation: u64,
    ) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(report) = reports.recv().await {
                match report {
                    WorkerReport::Ready => {
                        debug!("worker generation {generation} is ready");
                        supervisor.child_ready.store(true, Ordering::SeqCst);
                    }
                    WorkerReport::NotReady => {
                        debug!("worker generation {generation} is not ready");
                        supervisor.child_ready.store(false, Ordering::SeqCst);
                    }
                    WorkerReport::ResultsReady {
                        results: Some(result),
                    } => {
                        if let Err(err) = supervisor.store.insert(&result).await {
                            warn!("failed to persist scan result: {err}");
                        }
                    }
                    WorkerReport::ResultsReady { results: None } => {
                        debug!("received empty results from worker");
                    }
                }
            }
            debug!("report pump for generation {generation} finished");
        });
    }

    /// One long-lived task awaits each worker generation in turn and respawns
    /// after an exit that was not operator-requested.
    fn spawn_supervision_loop(self: &Arc<Self>, run_task: JoinHandle<()>, generation: u64) {
        let supervisor = Arc::clone(self);
        let mut run_task = run_task;
        let mut generation = generation;
        tokio::spawn(async move {
            loop {
                match run_task.await {
                    Ok(()) => debug!("worker generation {generation} exited"),
                    Err(err) if err.is_panic() => {
                        warn!("worker generation {generation} panicked: {err}");
                    }
                    Err(err) => debug!("worker generation {generation} aborted: {err}"),
                }

                let mut guard = supervisor.handle.lock().await;
                let current = guard.as_ref().map(|handle| handle.generation);
                if current != Some(generation) {
                    // The slot was released by a stop or taken over by a
                    // newer start; this loop is done.
                    return;
                }

                supervisor.child_ready.store(false, Ordering::SeqCst);
                *guard = None;

                if supervisor.planned_stop.load(Ordering::SeqCst) {
                    return;
                }

                warn!("worker generation {generation} terminated unexpectedly, restarting");
                let (task, next) = supervisor.install_worker(&mut guard).await;
                run_task = task;
                generation = next;
                info!("restarted census worker (generation {generation})");
            }
        });
    }

    #[cfg(test)]
    pub(crate) async fn current_generation(&self) -> Option<u64> {
        self.handle.lock().await.as_ref().map(|h| h.generation)
    }

    #[cfg(test)]
    pub(crate) async fn abort_worker(&self) {
        if let Some(handle) = self.handle.lock().await.as_ref() {
            handle.abort.abort();
        }
    }
}
