//! Filesystem watch pipeline for the census worker.
//!
//! A thin wrapper around `notify` that forwards raw filesystem notifications
//! into a tokio channel and classifies them into the add/change/delete events
//! the reconciliation engine consumes. Watcher errors are surfaced explicitly
//! so the worker can fall back to a full rescan of the tree.

use std::path::{Path, PathBuf};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use tracing::warn;

use crate::census::FileEvent;
use crate::error::{CensusError, Result};

/// Channel capacity for raw notifications between the notify callback thread
/// and the worker.
const RAW_EVENT_CAPACITY: usize = 4096;

enum WatchMessage {
    Event(Event),
    Error(String),
}

/// Watches one directory tree and buffers its change events until the worker
/// drains them at the next monitoring tick.
///
/// Dropping the watcher stops the notify stream.
pub struct DirectoryWatcher {
    root: PathBuf,
    rx: mpsc::Receiver<WatchMessage>,
    // Held for its Drop; the stream dies with it.
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .finish()
    }
}

impl DirectoryWatcher {
    /// Start watching `root` recursively. Construction happens on the
    /// blocking pool; a failure to create or attach the watcher is a
    /// [`CensusError::WatchInit`].
    pub async fn start(root: PathBuf) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|err| CensusError::WatchInit(format!(
                "failed to resolve {}: {err}",
                root.display()
            )))?;

        let (tx, rx) = mpsc::channel::<WatchMessage>(RAW_EVENT_CAPACITY);

        let watcher_root = root.clone();
        let watcher = spawn_blocking(move || init_watcher(&watcher_root, tx))
            .await
            .map_err(|err| {
                CensusError::WatchInit(format!("watcher initialization panicked: {err}"))
            })??;

        Ok(Self {
            root,
            rx,
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drain every notification observed since the last drain, classified
    /// into census events in delivery order.
    ///
    /// A watcher-reported error fails the drain; the caller is expected to
    /// discard this watcher and resynchronize with a full scan.
    pub fn drain(&mut self) -> Result<Vec<FileEvent>> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(WatchMessage::Event(event)) => classify(&event, &mut events),
                Ok(WatchMessage::Error(message)) => {
                    return Err(CensusError::WatchInit(format!("watcher error: {message}")));
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return Err(CensusError::WatchInit(
                        "watcher notification stream closed".into(),
                    ));
                }
            }
        }
        Ok(events)
    }
}

fn init_watcher(root: &Path, tx: mpsc::Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let callback_root = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Err(err) = tx.blocking_send(WatchMessage::Event(event)) {
                    warn!(
                        "watch channel send failed for {}: {}",
                        callback_root.display(),
                        err
                    );
                }
            }
            Err(err) => {
                let _ = tx.blocking_send(WatchMessage::Error(err.to_string()));
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| {
        CensusError::WatchInit(format!(
            "failed to create watcher for {}: {err}",
            root.display()
        ))
    })?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|err| {
            CensusError::WatchInit(format!("failed to watch {}: {err}", root.display()))
        })?;

    Ok(watcher)
}

/// Map a raw notify event onto census events. Renames split into a delete of
/// the old path and an add of the new one; access notifications are dropped.
fn classify(event: &Event, out: &mut Vec<FileEvent>) {
    let Some(first) = event.paths.first() else {
        return;
    };

    match event.kind {
        EventKind::Create(_) => out.push(FileEvent::Added(first.clone())),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            out.push(FileEvent::Deleted(first.clone()));
            if let Some(second) = event.paths.get(1) {
                out.push(FileEvent::Added(second.clone()));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            out.push(FileEvent::Deleted(first.clone()));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            out.push(FileEvent::Added(first.clone()));
        }
        EventKind::Modify(_) | EventKind::Any => {
            out.push(FileEvent::Changed(first.clone()));
        }
        EventKind::Remove(_) => out.push(FileEvent::Deleted(first.clone())),
        EventKind::Access(_) | EventKind::Other => {}
    }
}
