//! Occurrence cache and the reconciliation rules that keep its running total
//! consistent across full scans and incremental file events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A filesystem change observed for one path, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Added(path) | FileEvent::Changed(path) | FileEvent::Deleted(path) => path,
        }
    }
}

/// Mapping of tracked file path to its occurrence count plus the running
/// aggregate. The worker is the only mutator; every method leaves
/// `total == sum(counts)`.
#[derive(Debug, Clone, Default)]
pub struct CensusCache {
    counts: HashMap<PathBuf, u64>,
    total: u64,
}

impl CensusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count_for(&self, path: &Path) -> Option<u64> {
        self.counts.get(path).copied()
    }

    /// All tracked paths, unordered.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.counts.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.total = 0;
    }

    /// Replace the cache wholesale with the counts of a completed full scan.
    pub fn seed(&mut self, counts: HashMap<PathBuf, u64>) {
        self.total = counts.values().sum();
        self.counts = counts;
    }

    /// Track a newly added file. A duplicate add for a path already tracked
    /// is applied as a change.
    pub fn record_added(&mut self, path: PathBuf, count: u64) {
        if self.counts.contains_key(&path) {
            self.record_changed(path, count);
            return;
        }
        self.total += count;
        self.counts.insert(path, count);
    }

    /// Re-count a tracked file. The single delta expression covers both
    /// growing and shrinking counts; an untracked path starts from zero.
    pub fn record_changed(&mut self, path: PathBuf, count: u64) {
        let old = self.counts.get(&path).copied().unwrap_or(0);
        self.total = self.total - old + count;
        self.counts.insert(path, count);
    }

    /// Stop tracking a deleted file. Unknown paths are a no-op.
    pub fn record_deleted(&mut self, path: &Path) {
        if let Some(old) = self.counts.remove(path) {
            self.total -= old;
        }
    }

    /// Recompute the total from scratch; test hook for the invariant.
    #[cfg(test)]
    fn checksum(&self) -> u64 {
        self.counts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str) -> PathBuf {
        PathBuf::from(name)
    }

    #[test]
    fn seed_replaces_cache_and_total() {
        let mut cache = CensusCache::new();
        cache.record_added(path("stale.txt"), 9);

        let mut counts = HashMap::new();
        counts.insert(path("a.txt"), 2);
        counts.insert(path("b.txt"), 0);
        cache.seed(counts);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.total(), 2);
        assert_eq!(cache.count_for(&path("a.txt")), Some(2));
        assert_eq!(cache.count_for(&path("b.txt")), Some(0));
        assert_eq!(cache.count_for(&path("stale.txt")), None);
    }

    #[test]
    fn change_delta_handles_growth_and_shrink() {
        let mut cache = CensusCache::new();
        cache.record_added(path("a.txt"), 2);
        cache.record_added(path("b.txt"), 0);
        assert_eq!(cache.total(), 2);

        cache.record_changed(path("b.txt"), 3);
        assert_eq!(cache.total(), 5);
        assert_eq!(cache.count_for(&path("b.txt")), Some(3));

        cache.record_changed(path("b.txt"), 1);
        assert_eq!(cache.total(), 3);
        assert_eq!(cache.checksum(), cache.total());
    }

    #[test]
    fn change_is_idempotent_for_unchanged_content() {
        let mut cache = CensusCache::new();
        cache.record_added(path("a.txt"), 4);

        cache.record_changed(path("a.txt"), 4);
        cache.record_changed(path("a.txt"), 4);

        assert_eq!(cache.total(), 4);
        assert_eq!(cache.count_for(&path("a.txt")), Some(4));
    }

    #[test]
    fn add_then_delete_restores_prior_total() {
        let mut cache = CensusCache::new();
        cache.record_added(path("base.txt"), 5);
        let before = cache.total();

        cache.record_added(path("f.txt"), 3);
        cache.record_deleted(&path("f.txt"));

        assert_eq!(cache.total(), before);
        assert_eq!(cache.count_for(&path("f.txt")), None);
    }

    #[test]
    fn duplicate_add_is_applied_as_change() {
        let mut cache = CensusCache::new();
        cache.record_added(path("a.txt"), 2);
        cache.record_added(path("a.txt"), 7);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total(), 7);
    }

    #[test]
    fn delete_of_untracked_path_is_a_noop() {
        let mut cache = CensusCache::new();
        cache.record_added(path("a.txt"), 2);
        cache.record_deleted(&path("ghost.txt"));
        assert_eq!(cache.total(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn coalesced_and_successive_changes_agree() {
        // Two successive changes for one path must land on the same state as
        // a single change carrying the final count.
        let mut successive = CensusCache::new();
        successive.record_added(path("a.txt"), 2);
        successive.record_changed(path("a.txt"), 6);
        successive.record_changed(path("a.txt"), 1);

        let mut coalesced = CensusCache::new();
        coalesced.record_added(path("a.txt"), 2);
        coalesced.record_changed(path("a.txt"), 1);

        assert_eq!(successive.total(), coalesced.total());
        assert_eq!(
            successive.count_for(&path("a.txt")),
            coalesced.count_for(&path("a.txt"))
        );
    }

    #[test]
    fn invariant_holds_across_event_sequences() {
        let mut cache = CensusCache::new();
        let sequence: Vec<(FileEvent, u64)> = vec![
            (FileEvent::Added(path("a.txt")), 2),
            (FileEvent::Added(path("b.txt")), 0),
            (FileEvent::Changed(path("b.txt")), 3),
            (FileEvent::Added(path("c.txt")), 10),
            (FileEvent::Changed(path("a.txt")), 1),
            (FileEvent::Deleted(path("c.txt")), 0),
            (FileEvent::Changed(path("missing.txt")), 4),
            (FileEvent::Deleted(path("b.txt")), 0),
        ];

        for (event, count) in sequence {
            match event {
                FileEvent::Added(p) => cache.record_added(p, count),
                FileEvent::Changed(p) => cache.record_changed(p, count),
                FileEvent::Deleted(p) => cache.record_deleted(&p),
            }
            assert_eq!(cache.total(), cache.checksum());
        }

        assert_eq!(cache.total(), 5);
        assert_eq!(cache.len(), 2);
    }
}
