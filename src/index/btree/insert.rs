//! Insertion: leaf placement, splits, and propagation toward the root.
//!
//! Two rules keep the separators exact without ever rewriting a separator
//! in the middle of a page:
//! - A key below the front leaf's minimum goes into the front leaf (or a
//!   new leaf in front of it), and the new minimum is pushed up the
//!   leftmost path.
//! - Any other key goes into the leaf found by descent. When it does not
//!   fit, the leaf keeps its front part and the rest moves into new leaves
//!   behind it, each announced to the parent.

use tracing::debug;

use crate::common::{Error, PageId, Result};
use crate::storage::page::{PageType, Record};

use super::{BTree, TreeStats};

impl BTree {
    /// Insert or overwrite `key`. Returns `true` if the key was new.
    ///
    /// The caller is responsible for the record size limit.
    ///
    /// # Errors
    /// - `Error::Corrupted` if the tree structure is damaged
    /// - `Error::Io` if the file cannot grow
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        if self.below_front(key)? {
            return self.insert_front(key, value);
        }

        let leaf = self.find_leaf(key)?;
        let outcome = self.store.page_mut(leaf)?.set(key, value);
        if !outcome.fits {
            self.split_leaf(leaf, key, value)?;
        }
        Ok(outcome.inserted)
    }

    /// Insert a key smaller than every stored key.
    fn insert_front(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        let front = self.store.front();
        if self.store.page_mut(front)?.set(key, value).fits {
            self.propagate_front(front, Vec::new())?;
            return Ok(true);
        }

        let leaf = self.allocate(PageType::Leaf)?;
        {
            let mut page = self.store.page_mut(leaf)?;
            if !page.set(key, value).fits {
                return Err(Error::Corrupted("record does not fit an empty leaf".into()));
            }
            page.set_next(front);
        }
        self.store.page_mut(front)?.set_pre(leaf);
        self.store.set_front(leaf);
        debug!(leaf = leaf.0, old_front = front.0, "btree.front.extend");

        self.propagate_front(front, vec![leaf])?;
        Ok(true)
    }

    /// Split a full leaf around `(key, value)` and hang the new leaves
    /// behind it.
    fn split_leaf(&mut self, leaf: PageId, key: &[u8], value: &[u8]) -> Result<()> {
        let (overflow, _) = self.store.page_mut(leaf)?.split_behind(key, value)?;
        if overflow.is_empty() {
            return Ok(());
        }

        let siblings = self.distribute(overflow, PageType::Leaf)?;
        self.thread_leaves(leaf, &siblings)?;
        TreeStats::bump(&self.stats.leaf_splits);
        debug!(leaf = leaf.0, siblings = siblings.len(), "btree.split.leaf");

        let mut left = leaf;
        for sibling in siblings {
            self.propagate_after(left, sibling)?;
            left = sibling;
        }
        Ok(())
    }

    /// Link `siblings` into the leaf chain right after `leaf`.
    fn thread_leaves(&mut self, leaf: PageId, siblings: &[PageId]) -> Result<()> {
        let old_next = self.store.page(leaf)?.next();
        let mut prev = leaf;
        for &sibling in siblings {
            self.store.page_mut(prev)?.set_next(sibling);
            self.store.page_mut(sibling)?.set_pre(prev);
            prev = sibling;
        }
        self.store.page_mut(prev)?.set_next(old_next);
        if old_next.is_some() {
            self.store.page_mut(old_next)?.set_pre(prev);
        }
        Ok(())
    }

    /// Register `added`, a new page directly behind `left`, with the parent
    /// of `left`, splitting upward as needed.
    fn propagate_after(&mut self, left: PageId, added: PageId) -> Result<()> {
        let parent = self.store.page(left)?.parent();
        if parent.is_none() {
            return self.grow_root(vec![left, added]);
        }

        let entry = Record::new(&self.min_key(added)?, &added.to_bytes());
        if self.store.page_mut(parent)?.set(&entry.key, &entry.value).fits {
            self.store.page_mut(added)?.set_parent(parent);
            return Ok(());
        }

        let (overflow, in_front) = self
            .store
            .page_mut(parent)?
            .split_behind(&entry.key, &entry.value)?;
        if in_front {
            self.store.page_mut(added)?.set_parent(parent);
        }
        let siblings = self.distribute(overflow, PageType::Branch)?;
        TreeStats::bump(&self.stats.branch_splits);
        debug!(branch = parent.0, siblings = siblings.len(), "btree.split.branch");

        let mut left = parent;
        for sibling in siblings {
            self.propagate_after(left, sibling)?;
            left = sibling;
        }
        Ok(())
    }

    /// After the minimum of `child` dropped and `fronts` were created in
    /// front of it, update the leftmost path.
    ///
    /// `child` is always the first entry of its parent. Its entry is renamed
    /// to the new minimum and every page in `fronts` gets an entry; what
    /// does not fit is split off into new branch pages in front of the
    /// parent, which become the next level's `fronts`.
    fn propagate_front(&mut self, mut child: PageId, mut fronts: Vec<PageId>) -> Result<()> {
        loop {
            let parent = self.store.page(child)?.parent();
            if parent.is_none() {
                if !fronts.is_empty() {
                    fronts.push(child);
                    self.grow_root(fronts)?;
                }
                return Ok(());
            }

            let child_min = self.min_key(child)?;
            let mut entries = Vec::with_capacity(fronts.len());
            for &front in &fronts {
                entries.push((front, Record::new(&self.min_key(front)?, &front.to_bytes())));
            }

            let mut pending = Vec::new();
            let mut placed = Vec::new();
            let old_min = {
                let mut page = self.store.page_mut(parent)?;
                let old_min = page.min().map(<[u8]>::to_vec);
                if let Some(record) = page.update_min_key(&child_min) {
                    pending.push(record);
                }
                for (front, entry) in entries {
                    if page.set(&entry.key, &entry.value).fits {
                        placed.push(front);
                    } else {
                        pending.push(entry);
                    }
                }
                old_min
            };
            for front in placed {
                self.store.page_mut(front)?.set_parent(parent);
            }

            let new_fronts = if pending.is_empty() {
                Vec::new()
            } else {
                self.split_branch_front(parent, pending)?
            };

            if new_fronts.is_empty() && self.store.page(parent)?.min() == old_min.as_deref() {
                return Ok(());
            }
            child = parent;
            fronts = new_fronts;
        }
    }

    /// Make room for entries that did not fit the leftmost branch `parent`.
    ///
    /// All pending keys sort before the parent's own keys. The largest one
    /// drives a front split; the rest join the split-off records.
    fn split_branch_front(&mut self, parent: PageId, mut pending: Vec<Record>) -> Result<Vec<PageId>> {
        pending.sort_by(|a, b| a.key.cmp(&b.key));
        let Some(largest) = pending.pop() else {
            return Ok(Vec::new());
        };

        let mut overflow = self
            .store
            .page_mut(parent)?
            .split_front(&largest.key, &largest.value)?;

        let kept = {
            let page = self.store.page(parent)?;
            (page.get(&largest.key) == Some(largest.value.as_slice()))
                .then(|| PageId::from_bytes(&largest.value))
                .flatten()
        };
        if let Some(child) = kept {
            self.store.page_mut(child)?.set_parent(parent);
        }

        overflow.extend(pending);
        overflow.sort_by(|a, b| a.key.cmp(&b.key));
        let pages = self.distribute(overflow, PageType::Branch)?;
        TreeStats::bump(&self.stats.branch_splits);
        debug!(branch = parent.0, fronts = pages.len(), "btree.split.branch_front");
        Ok(pages)
    }

    /// Stack new branch levels over `level` (ascending sibling pages without
    /// a parent) until a single page remains, and make it the root.
    fn grow_root(&mut self, mut level: Vec<PageId>) -> Result<()> {
        while level.len() > 1 {
            let mut entries = Vec::with_capacity(level.len());
            for &id in &level {
                entries.push(Record::new(&self.min_key(id)?, &id.to_bytes()));
            }
            level = self.distribute(entries, PageType::Branch)?;
            TreeStats::bump(&self.stats.root_splits);
        }

        let root = level
            .first()
            .copied()
            .ok_or_else(|| Error::Corrupted("no page left to become the root".into()))?;
        self.store.page_mut(root)?.set_parent(PageId::NONE);
        self.store.set_root(root);
        debug!(root = root.0, "btree.root.grow");
        Ok(())
    }
}
