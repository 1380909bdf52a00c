//! Deletion and page recycling.
//!
//! Non-empty pages are never merged or rebalanced. A leaf that becomes
//! empty is unlinked and recycled, and so is every ancestor left without
//! children. A branch that loses its first entry hands that entry's key to
//! the next one. The last leaf always survives as the root.

use tracing::debug;

use crate::common::{Error, PageId, Result};

use super::BTree;

impl BTree {
    /// Remove `key`. Returns whether it was present.
    ///
    /// # Errors
    /// `Error::Corrupted` if the tree structure is damaged.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        if self.below_front(key)? {
            return Ok(false);
        }

        let leaf = self.find_leaf(key)?;
        let (removed, emptied) = {
            let mut page = self.store.page_mut(leaf)?;
            let removed = page.delete(key);
            (removed, page.is_empty())
        };
        if removed && emptied {
            self.remove_empty_leaf(leaf, key)?;
        }
        Ok(removed)
    }

    /// Drop an empty leaf from the chain and from its ancestors.
    ///
    /// `key` is the key just deleted from it; it routes to the leaf's entry
    /// at every level.
    fn remove_empty_leaf(&mut self, leaf: PageId, key: &[u8]) -> Result<()> {
        let (pre, next, parent) = {
            let page = self.store.page(leaf)?;
            (page.pre(), page.next(), page.parent())
        };

        if pre.is_none() && next.is_none() {
            return self.collapse_to(leaf, parent);
        }

        if pre.is_some() {
            self.store.page_mut(pre)?.set_next(next);
        } else {
            self.store.set_front(next);
        }
        if next.is_some() {
            self.store.page_mut(next)?.set_pre(pre);
        }
        self.recycle(leaf)?;
        debug!(leaf = leaf.0, "btree.leaf.recycle");

        let mut child = leaf;
        let mut parent = parent;
        while parent.is_some() {
            let (removed, emptied, grandparent) = {
                let mut page = self.store.page_mut(parent)?;
                let removed = page.remove_child(key, child)?;
                (removed, page.is_empty(), page.parent())
            };
            if !removed {
                return Err(Error::Corrupted(format!("{parent} has no entry for child {child}")));
            }
            if !emptied {
                break;
            }
            self.recycle(parent)?;
            debug!(branch = parent.0, "btree.branch.recycle");
            child = parent;
            parent = grandparent;
        }
        Ok(())
    }

    /// The last leaf became empty: recycle its ancestors and make it the
    /// root.
    fn collapse_to(&mut self, leaf: PageId, parent: PageId) -> Result<()> {
        if parent.is_none() {
            return Ok(());
        }

        let mut current = parent;
        while current.is_some() {
            let up = self.store.page(current)?.parent();
            self.recycle(current)?;
            current = up;
        }
        self.store.page_mut(leaf)?.set_parent(PageId::NONE);
        self.store.set_root(leaf);
        debug!(root = leaf.0, "btree.root.collapse");
        Ok(())
    }
}
