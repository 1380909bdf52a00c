//! B+Tree index over a [`PageStore`].
//!
//! Leaves hold user records and form a doubly linked chain starting at the
//! front leaf; branch pages map a separator key of each child to the
//! child's page offset. A separator is ≤ every key below it, and a branch
//! page always starts with the same key its parent holds for it. Routing
//! follows the greatest entry ≤ key, falling back to the first entry, which
//! only happens at the root for keys below the front leaf.
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ root: a  m   │
//!                 └──┬───────┬───┘
//!          ┌─────────┘       └─────────┐
//!   ┌──────┴──────┐             ┌──────┴──────┐
//!   │ leaf: a c f │ ◄─────────► │ leaf: m q x │
//!   └─────────────┘  pre/next   └─────────────┘
//!     front leaf
//! ```
//!
//! The operations are split across files:
//! - `insert.rs` - insertion, splits and upward propagation
//! - `delete.rs` - deletion and page recycling
//! - `scan.rs` - ordered range scans
//! - `stats.rs` - structural counters

mod delete;
mod insert;
mod scan;
mod stats;

pub use stats::{StatsSnapshot, TreeStats};

use std::path::Path;

use tracing::trace;

use crate::common::config::Options;
use crate::common::{Error, PageId, Result};
use crate::storage::page::{PageLayout, PageType, Record};
use crate::storage::{PageStatistics, PageStore};

/// A B+Tree stored in one file.
///
/// `BTree` is not synchronized; wrap it in a lock to share it (see
/// [`Db`](crate::Db)).
pub struct BTree {
    store: PageStore,
    stats: TreeStats,
}

impl BTree {
    /// Build a tree on an opened store.
    pub fn new(store: PageStore) -> Self {
        Self {
            store,
            stats: TreeStats::new(),
        }
    }

    /// Open or create the file at `path` and build a tree on it.
    ///
    /// # Errors
    /// Any error from [`PageStore::open`].
    pub fn open<P: AsRef<Path>>(path: P, options: &Options) -> Result<Self> {
        Ok(Self::new(PageStore::open(path, options)?))
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    pub fn layout(&self) -> PageLayout {
        self.store.layout()
    }

    /// Find the leaf whose key range covers `key`.
    ///
    /// # Errors
    /// `Error::Corrupted` if the descent meets a page that is neither a
    /// branch nor a leaf, or does not terminate.
    pub(crate) fn find_leaf(&self, key: &[u8]) -> Result<PageId> {
        let mut current = self.store.root();
        for level in 0..self.store.page_count() {
            let page = self.store.page(current)?;
            match page.page_type() {
                PageType::Leaf => return Ok(current),
                PageType::Branch => {
                    let child = page.child_for(key)?;
                    trace!(page = current.0, child = child.0, level, "btree.descend");
                    current = child;
                }
                other => {
                    return Err(Error::Corrupted(format!(
                        "{current} of type {other:?} on the lookup path"
                    )))
                }
            }
        }
        Err(Error::Corrupted("lookup path does not reach a leaf".into()))
    }

    /// True if `key` sorts before every stored key.
    fn below_front(&self, key: &[u8]) -> Result<bool> {
        let front = self.store.page(self.store.front())?;
        Ok(front.min().map_or(true, |min| key < min))
    }

    /// Look up `key`.
    ///
    /// # Errors
    /// `Error::Corrupted` if the tree structure is damaged.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.below_front(key)? {
            return Ok(None);
        }
        let leaf = self.find_leaf(key)?;
        Ok(self.store.page(leaf)?.get(key).map(<[u8]>::to_vec))
    }

    /// Number of stored records.
    ///
    /// # Errors
    /// `Error::Corrupted` if the leaf chain loops or leaves the file.
    pub fn count(&self) -> Result<usize> {
        let mut total = 0;
        let mut current = self.store.front();
        let mut steps = 0;
        while current.is_some() {
            steps += 1;
            if steps > self.store.page_count() {
                return Err(Error::Corrupted("leaf chain has a cycle".into()));
            }
            let page = self.store.page(current)?;
            total += page.len();
            current = page.next();
        }
        Ok(total)
    }

    /// Page counts and depth of the file.
    ///
    /// # Errors
    /// Any error from [`PageStore::statistics`].
    pub fn page_statistics(&self) -> Result<PageStatistics> {
        self.store.statistics()
    }

    /// Write dirty pages back to the file.
    ///
    /// # Errors
    /// `Error::Io` if msync fails.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    // ========================================================================
    // Page management shared by insert and delete
    // ========================================================================

    fn allocate(&mut self, page_type: PageType) -> Result<PageId> {
        let id = self.store.allocate_page(page_type)?;
        TreeStats::bump(&self.stats.pages_allocated);
        Ok(id)
    }

    fn recycle(&mut self, id: PageId) -> Result<()> {
        self.store.recycle(id)?;
        TreeStats::bump(&self.stats.pages_recycled);
        Ok(())
    }

    /// Smallest key of a page that must not be empty.
    fn min_key(&self, id: PageId) -> Result<Vec<u8>> {
        self.store
            .page(id)?
            .min()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::Corrupted(format!("{id} is unexpectedly empty")))
    }

    /// Spread ascending records over as many fresh pages as needed, filling
    /// each before starting the next.
    ///
    /// Children placed into branch pages get their parent pointers updated.
    /// The new pages are returned in key order; linking them into the tree
    /// is up to the caller.
    fn distribute(&mut self, records: Vec<Record>, page_type: PageType) -> Result<Vec<PageId>> {
        let mut pages = Vec::new();
        let mut adopted = Vec::new();
        let mut current: Option<PageId> = None;

        for record in records {
            let placed = match current {
                Some(id) => self.store.page_mut(id)?.set(&record.key, &record.value).fits,
                None => false,
            };
            let target = match (placed, current) {
                (true, Some(id)) => id,
                _ => {
                    let id = self.allocate(page_type)?;
                    if !self.store.page_mut(id)?.set(&record.key, &record.value).fits {
                        return Err(Error::Corrupted(format!(
                            "{}-byte record does not fit an empty page",
                            record.slot_size()
                        )));
                    }
                    pages.push(id);
                    current = Some(id);
                    id
                }
            };

            if page_type == PageType::Branch {
                let child = PageId::from_bytes(&record.value)
                    .ok_or_else(|| Error::Corrupted("branch entry is not a page offset".into()))?;
                adopted.push((child, target));
            }
        }

        for (child, parent) in adopted {
            self.store.page_mut(child)?.set_parent(parent);
        }
        Ok(pages)
    }

    // ========================================================================
    // Consistency check
    // ========================================================================

    /// Walk the whole tree and check its structure: page invariants, parent
    /// pointers, separator keys, and that the leaf chain visits the leaves in
    /// tree order with strictly ascending keys.
    ///
    /// # Errors
    /// `Error::Corrupted` describing the first violation found.
    pub fn verify(&self) -> Result<()> {
        let mut leaves = Vec::new();
        self.verify_subtree(self.store.root(), PageId::NONE, 0, &mut leaves)?;

        let mut expected = leaves.into_iter();
        let mut prev = PageId::NONE;
        let mut last_key: Option<Vec<u8>> = None;
        let mut current = self.store.front();
        while current.is_some() {
            if expected.next() != Some(current) {
                return Err(Error::Corrupted(format!(
                    "leaf chain reaches {current} out of tree order"
                )));
            }
            let page = self.store.page(current)?;
            if page.pre() != prev {
                return Err(Error::Corrupted(format!("{current} has a broken pre link")));
            }
            for (key, _) in page.records() {
                if last_key.as_deref().is_some_and(|last| last >= key) {
                    return Err(Error::Corrupted(format!("{current} breaks the key order")));
                }
                last_key = Some(key.to_vec());
            }
            prev = current;
            current = page.next();
        }
        if expected.next().is_some() {
            return Err(Error::Corrupted("leaf chain ends early".into()));
        }
        Ok(())
    }

    /// Returns the smallest and largest key below `id`.
    fn verify_subtree(
        &self,
        id: PageId,
        parent: PageId,
        depth: u64,
        leaves: &mut Vec<PageId>,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if depth > self.store.page_count() {
            return Err(Error::Corrupted("tree has a cycle".into()));
        }
        let page = self.store.page(id)?;
        page.validate()?;
        if page.parent() != parent {
            return Err(Error::Corrupted(format!(
                "{id} points at parent {} instead of {parent}",
                page.parent()
            )));
        }

        match page.page_type() {
            PageType::Leaf => {
                leaves.push(id);
                if page.is_empty() && (parent.is_some() || page.next().is_some()) {
                    return Err(Error::Corrupted(format!("{id} is an empty leaf in a live tree")));
                }
                let min = page.min().map(<[u8]>::to_vec);
                let max = page.records().last().map(|(k, _)| k.to_vec());
                Ok(min.zip(max))
            }
            PageType::Branch => {
                let entries = page.all();
                if entries.is_empty() {
                    return Err(Error::Corrupted(format!("{id} is an empty branch")));
                }
                let mut bounds: Option<(Vec<u8>, Vec<u8>)> = None;
                for (i, entry) in entries.iter().enumerate() {
                    let child = PageId::from_bytes(&entry.value)
                        .ok_or_else(|| Error::Corrupted(format!("{id} has a bad child entry")))?;
                    let Some((lo, hi)) = self.verify_subtree(child, id, depth + 1, leaves)? else {
                        return Err(Error::Corrupted(format!("{child} is an empty subtree")));
                    };
                    if lo < entry.key {
                        return Err(Error::Corrupted(format!("{child} holds keys below its separator")));
                    }
                    let child_page = self.store.page(child)?;
                    if child_page.page_type() == PageType::Branch
                        && child_page.min() != Some(entry.key.as_slice())
                    {
                        return Err(Error::Corrupted(format!(
                            "{child} does not start at its separator"
                        )));
                    }
                    if let Some(next) = entries.get(i + 1) {
                        if hi >= next.key {
                            return Err(Error::Corrupted(format!(
                                "{child} holds keys beyond the next separator"
                            )));
                        }
                    }
                    bounds = Some(match bounds {
                        None => (lo, hi),
                        Some((first, _)) => (first, hi),
                    });
                }
                Ok(bounds)
            }
            other => Err(Error::Corrupted(format!("{id} has type {other:?} inside the tree"))),
        }
    }
}
