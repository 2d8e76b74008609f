//! Per-cycle result records handed to persistence.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Success,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Success => "success",
            ScanStatus::Failed => "failed",
        }
    }
}

/// Immutable record of one census cycle, created by the worker and stored by
/// the supervisor. Timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub start_time: i64,
    pub end_time: i64,
    pub duration_seconds: f64,
    pub added_paths: Vec<PathBuf>,
    pub deleted_paths: Vec<PathBuf>,
    pub search_token: String,
    pub occurrence_total: u64,
    pub status: ScanStatus,
}

impl ScanResult {
    /// Frame a result for the cycle bounded by `started` and `ended`.
    pub fn new(
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
        search_token: String,
        occurrence_total: u64,
        status: ScanStatus,
    ) -> Self {
        let duration_seconds = (ended - started).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            start_time: started.timestamp(),
            end_time: ended.timestamp(),
            duration_seconds,
            added_paths: Vec::new(),
            deleted_paths: Vec::new(),
            search_token,
            occurrence_total,
            status,
        }
    }

    pub fn with_added(mut self, mut added: Vec<PathBuf>) -> Self {
        added.sort();
        self.added_paths = added;
        self
    }

    pub fn with_deleted(mut self, mut deleted: Vec<PathBuf>) -> Self {
        deleted.sort();
        self.deleted_paths = deleted;
        self
    }
}
