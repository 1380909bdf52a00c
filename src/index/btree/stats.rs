//! B+Tree structural statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of structural changes made by the tree.
///
/// All fields are atomic so readers holding only a shared lock on the
/// database can take a snapshot. `Ordering::Relaxed` is enough: each counter
/// is independent and only needs atomic increments.
///
/// # Example
/// ```
/// use leafdb::TreeStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = TreeStats::new();
/// stats.leaf_splits.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().leaf_splits, 1);
/// ```
#[derive(Debug)]
pub struct TreeStats {
    /// Leaf pages split because an insert did not fit.
    pub leaf_splits: AtomicU64,

    /// Branch pages split while propagating a new child.
    pub branch_splits: AtomicU64,

    /// New levels added on top of the tree.
    pub root_splits: AtomicU64,

    /// Pages taken from the store (recycled or new).
    pub pages_allocated: AtomicU64,

    /// Pages returned to the recycle list.
    pub pages_recycled: AtomicU64,
}

impl TreeStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self {
            leaf_splits: AtomicU64::new(0),
            branch_splits: AtomicU64::new(0),
            root_splits: AtomicU64::new(0),
            pages_allocated: AtomicU64::new(0),
            pages_recycled: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            leaf_splits: self.leaf_splits.load(Ordering::Relaxed),
            branch_splits: self.branch_splits.load(Ordering::Relaxed),
            root_splits: self.root_splits.load(Ordering::Relaxed),
            pages_allocated: self.pages_allocated.load(Ordering::Relaxed),
            pages_recycled: self.pages_recycled.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.leaf_splits.store(0, Ordering::Relaxed);
        self.branch_splits.store(0, Ordering::Relaxed);
        self.root_splits.store(0, Ordering::Relaxed);
        self.pages_allocated.store(0, Ordering::Relaxed);
        self.pages_recycled.store(0, Ordering::Relaxed);
    }
}

impl Default for TreeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`TreeStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub leaf_splits: u64,
    pub branch_splits: u64,
    pub root_splits: u64,
    pub pages_allocated: u64,
    pub pages_recycled: u64,
}

impl StatsSnapshot {
    /// All page splits, at any level.
    pub fn total_splits(&self) -> u64 {
        self.leaf_splits + self.branch_splits + self.root_splits
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ leaf_splits: {}, branch_splits: {}, root_splits: {}, allocated: {}, recycled: {} }}",
            self.leaf_splits,
            self.branch_splits,
            self.root_splits,
            self.pages_allocated,
            self.pages_recycled
        )
    }
}
