//! Monitoring configuration shared by the worker and its supervisor.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default polling cadence between monitoring cycles.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300_000;

/// Default token counted in file contents.
pub const DEFAULT_SEARCH_TOKEN: &str = "hello";

/// Files larger than this are never read.
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 1_073_741_824;

fn default_excluded_extensions() -> HashSet<String> {
    [".dll", ".lib", ".exe", ".jpg", ".png"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Settings for one census worker: which tree to monitor, what to count,
/// and how often to reconcile.
///
/// A change to `search_token` or `root_directory` invalidates the occurrence
/// cache and forces a full rescan; a change to `poll_interval_ms` only affects
/// the next scheduled cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Root of the directory tree to census.
    pub root_directory: PathBuf,
    /// Literal token counted as whole-word matches in file contents.
    pub search_token: String,
    /// Delay between monitoring cycles, also used as the retry delay after a
    /// failed full scan.
    pub poll_interval_ms: u64,
    /// Lowercase dotted extensions (".jpg") skipped by the scanner.
    pub excluded_extensions: HashSet<String>,
    /// Size ceiling; oversized files are skipped unconditionally.
    pub max_file_size_bytes: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            root_directory: PathBuf::from("./"),
            search_token: DEFAULT_SEARCH_TOKEN.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            excluded_extensions: default_excluded_extensions(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }
}

impl MonitorConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.search_token, "hello");
        assert_eq!(config.poll_interval_ms, 300_000);
        assert_eq!(config.max_file_size_bytes, 1_073_741_824);
        assert!(config.excluded_extensions.contains(".dll"));
        assert!(config.excluded_extensions.contains(".png"));
        assert_eq!(config.excluded_extensions.len(), 5);
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"search_token": "needle", "poll_interval_ms": 1000}"#)
                .unwrap();
        assert_eq!(config.search_token, "needle");
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.max_file_size_bytes, DEFAULT_MAX_FILE_SIZE_BYTES);
    }
}
