//! Recursive enumeration of census-eligible files.

pub mod reader;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::MonitorConfig;
use crate::error::{CensusError, Result};

/// Walks a directory tree and yields the regular files the census tracks.
///
/// Directories are descended unconditionally; eligibility applies to files
/// only. Enumeration order is unspecified.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    /// Lowercase dotted extensions excluded from the census.
    excluded_extensions: HashSet<String>,
    /// Files larger than this are skipped unconditionally.
    max_file_size_bytes: u64,
}

impl DirectoryScanner {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            excluded_extensions: config
                .excluded_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            max_file_size_bytes: config.max_file_size_bytes,
        }
    }

    /// Whether a file with the given size passes the extension and size
    /// filters.
    pub fn is_eligible(&self, path: &Path, size: u64) -> bool {
        if size > self.max_file_size_bytes {
            return false;
        }
        !self.is_extension_excluded(path)
    }

    fn is_extension_excluded(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => {
                let dotted = format!(".{}", ext.to_lowercase());
                self.excluded_extensions.contains(&dotted)
            }
            None => false,
        }
    }

    /// Enumerate all eligible files under `root`.
    ///
    /// Fails when the root is missing or not a directory. A stat failure on an
    /// individual entry is logged and that entry skipped.
    pub fn collect_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.exists() {
            return Err(CensusError::Scan {
                root: root.to_path_buf(),
                message: "directory does not exist".into(),
            });
        }
        if !root.is_dir() {
            return Err(CensusError::Scan {
                root: root.to_path_buf(),
                message: "path is not a directory".into(),
            });
        }

        // Watch events arrive with absolute paths; cache keys must match.
        let root = root.canonicalize().map_err(|err| CensusError::Scan {
            root: root.to_path_buf(),
            message: format!("failed to resolve root: {err}"),
        })?;

        let mut files = Vec::new();
        let mut skipped = 0usize;

        for entry in WalkDir::new(&root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("error walking {}: {}", root.display(), err);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!("failed to stat {}: {}", entry.path().display(), err);
                    continue;
                }
            };

            if self.is_eligible(entry.path(), metadata.len()) {
                files.push(entry.path().to_path_buf());
            } else {
                skipped += 1;
            }
        }

        debug!(
            "walk of {} found {} eligible files ({} skipped)",
            root.display(),
            files.len(),
            skipped
        );

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scanner() -> DirectoryScanner {
        DirectoryScanner::new(&MonitorConfig::default())
    }

    #[test]
    fn extension_exclusion_is_case_insensitive() {
        let scanner = scanner();
        assert!(!scanner.is_eligible(Path::new("shot.JPG"), 10));
        assert!(!scanner.is_eligible(Path::new("tool.exe"), 10));
        assert!(scanner.is_eligible(Path::new("notes.txt"), 10));
        assert!(scanner.is_eligible(Path::new("no_extension"), 10));
    }

    #[test]
    fn oversized_files_are_skipped_regardless_of_extension() {
        let scanner = DirectoryScanner::new(&MonitorConfig {
            max_file_size_bytes: 100,
            ..MonitorConfig::default()
        });
        assert!(scanner.is_eligible(Path::new("small.txt"), 100));
        assert!(!scanner.is_eligible(Path::new("big.txt"), 101));
        assert!(!scanner.is_eligible(Path::new("big.dll"), 101));
    }

    #[test]
    fn collects_files_recursively() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), b"one").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested/b.txt"), b"two").unwrap();
        fs::write(tmp.path().join("nested/skip.png"), b"img").unwrap();

        let files = scanner().collect_files(tmp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(files.len(), 2);
        assert!(names.contains(&"a.txt"));
        assert!(names.contains(&"b.txt"));
    }

    #[test]
    fn empty_directory_yields_no_files() {
        let tmp = TempDir::new().unwrap();
        let files = scanner().collect_files(tmp.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn missing_root_is_a_scan_error() {
        let result = scanner().collect_files(Path::new("/nonexistent/census/root"));
        assert!(matches!(result, Err(CensusError::Scan { .. })));
    }

    #[test]
    fn file_root_is_a_scan_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("plain.txt");
        fs::write(&file, b"data").unwrap();
        let result = scanner().collect_files(&file);
        assert!(matches!(result, Err(CensusError::Scan { .. })));
    }
}
