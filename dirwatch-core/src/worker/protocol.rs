//! Typed messages exchanged between the supervisor and the census worker.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::result::ScanResult;

/// Commands relayed from the control surface to the worker.
///
/// A token or directory change invalidates the occurrence cache and forces a
/// full rescan; an interval change only affects the next scheduled cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkerCommand {
    ChangePollInterval(u64),
    ChangeMagicWord(String),
    ChangeDirSettings(PathBuf),
}

/// Reports emitted by the worker towards the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReport {
    /// A scan cycle finished; `results` is `None` when there is nothing to
    /// persist.
    ResultsReady { results: Option<ScanResult> },
    /// The cache is valid and hot-reconfiguration may be accepted.
    Ready,
    /// The cache was invalidated; only directory changes are accepted.
    NotReady,
}
