//! Db - the thread-safe key/value store facade.

use std::path::Path;

use parking_lot::RwLock;
use tracing::info;

use crate::common::config::Options;
use crate::common::{Error, Result};
use crate::index::{BTree, StatsSnapshot};
use crate::storage::page::PageLayout;
use crate::storage::PageStatistics;

/// An ordered key/value store in a single memory-mapped file.
///
/// Keys and values are arbitrary byte strings, ordered bytewise.
///
/// # Thread Safety
/// One `RwLock` guards the tree: `get`, `range`, `count` and the
/// statistics share a read lock; `set`, `update` and `delete` take the
/// write lock. `Db` is `Send + Sync` and is meant to be shared through an
/// `Arc`.
///
/// # Durability
/// Changes go to the shared mapping and reach the disk when the OS writes
/// them back or on [`flush`](Self::flush).
///
/// # Example
/// ```
/// use leafdb::Db;
///
/// let dir = tempfile::tempdir().unwrap();
/// let db = Db::open(dir.path().join("example.db")).unwrap();
///
/// assert!(db.set(b"apple", b"red").unwrap());
/// assert!(!db.set(b"apple", b"green").unwrap());
/// assert_eq!(db.get(b"apple").unwrap(), b"green");
///
/// db.set(b"banana", b"yellow").unwrap();
/// let fruits = db.range(b"", b"").unwrap();
/// assert_eq!(fruits.len(), 2);
/// ```
pub struct Db {
    tree: RwLock<BTree>,
    layout: PageLayout,
}

impl Db {
    /// Open or create a database with default options.
    ///
    /// # Errors
    /// See [`open_with_options`](Self::open_with_options).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, Options::default())
    }

    /// Open or create a database.
    ///
    /// # Errors
    /// - `Error::InvalidPageSize` / `Error::InvalidOptions` for bad options
    /// - `Error::PageSizeMismatch` if the file uses another page size
    /// - `Error::Corrupted` if the file is not a valid database
    /// - `Error::Io` on file or mapping failures
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref();
        let tree = BTree::open(path, &options)?;
        let layout = tree.layout();
        info!(
            path = %path.display(),
            page_size = layout.page_size(),
            max_record_size = layout.max_record_size(),
            "db.open"
        );
        Ok(Self {
            tree: RwLock::new(tree),
            layout,
        })
    }

    /// Largest record slot accepted, derived from the page size.
    pub fn max_record_size(&self) -> usize {
        self.layout.max_record_size()
    }

    fn check_size(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let size = self.layout.record_size(key, value);
        let max = self.layout.max_record_size();
        if size > max {
            return Err(Error::RecordTooLarge { size, max });
        }
        Ok(())
    }

    /// Insert or overwrite `key`. Returns `true` if the key was new.
    ///
    /// # Errors
    /// - `Error::RecordTooLarge` if the pair exceeds [`max_record_size`](Self::max_record_size)
    /// - `Error::Corrupted` / `Error::Io` from the tree
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.check_size(key, value)?;
        self.tree.write().set(key, value)
    }

    /// Overwrite the value of an existing key.
    ///
    /// # Errors
    /// - `Error::RecordNotFound` if `key` is absent
    /// - `Error::RecordTooLarge` if the pair exceeds [`max_record_size`](Self::max_record_size)
    pub fn update(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_size(key, value)?;
        let mut tree = self.tree.write();
        if tree.get(key)?.is_none() {
            return Err(Error::RecordNotFound);
        }
        tree.set(key, value)?;
        Ok(())
    }

    /// Value stored under `key`.
    ///
    /// # Errors
    /// `Error::RecordNotFound` if `key` is absent.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.tree.read().get(key)?.ok_or(Error::RecordNotFound)
    }

    /// Remove `key`.
    ///
    /// # Errors
    /// `Error::RecordNotFound` if `key` is absent.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if self.tree.write().delete(key)? {
            Ok(())
        } else {
            Err(Error::RecordNotFound)
        }
    }

    /// Pairs with `min <= key <= max`, ascending. Pass `b""` for an open
    /// bound.
    pub fn range(&self, min: &[u8], max: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.tree.read().range(min, max)
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize> {
        self.tree.read().count()
    }

    /// Structural counters since open.
    pub fn stats(&self) -> StatsSnapshot {
        self.tree.read().stats().snapshot()
    }

    /// Page counts and tree depth. Reads every page.
    pub fn page_statistics(&self) -> Result<PageStatistics> {
        self.tree.read().page_statistics()
    }

    /// Check the whole file for structural damage.
    pub fn verify(&self) -> Result<()> {
        self.tree.read().verify()
    }

    /// Write dirty pages back to the file.
    pub fn flush(&self) -> Result<()> {
        self.tree.read().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_db_is_send_sync() {
        assert_send_sync::<Db>();
    }

    #[test]
    fn test_missing_key_errors() {
        let dir = tempdir().unwrap();
        let db = Db::open(dir.path().join("test.db")).unwrap();
        assert!(matches!(db.get(b"x"), Err(Error::RecordNotFound)));
        assert!(matches!(db.delete(b"x"), Err(Error::RecordNotFound)));
        assert!(matches!(db.update(b"x", b"1"), Err(Error::RecordNotFound)));
    }

    #[test]
    fn test_update_existing() {
        let dir = tempdir().unwrap();
        let db = Db::open(dir.path().join("test.db")).unwrap();
        db.set(b"k", b"1").unwrap();
        db.update(b"k", b"2").unwrap();
        assert_eq!(db.get(b"k").unwrap(), b"2");
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_record_size_limit() {
        let dir = tempdir().unwrap();
        let db = Db::open(dir.path().join("test.db")).unwrap();
        let max = db.max_record_size();
        assert_eq!(max, 2016);

        let key = b"key";
        let fits = vec![0u8; max - 10 - key.len()];
        assert!(db.set(key, &fits).is_ok());

        let too_big = vec![0u8; fits.len() + 1];
        match db.set(b"other", &too_big) {
            Err(Error::RecordTooLarge { size, max: m }) => {
                assert_eq!(m, max);
                assert_eq!(size, 10 + 5 + too_big.len());
            }
            other => panic!("expected RecordTooLarge, got {other:?}"),
        }
        assert!(matches!(db.get(b"other"), Err(Error::RecordNotFound)));
    }

    #[test]
    fn test_long_key_counts_branch_entry() {
        let dir = tempdir().unwrap();
        let db = Db::open(dir.path().join("test.db")).unwrap();
        // Key alone fits as a leaf record with an empty value, but not as a
        // branch entry pointing at a child page.
        let key = vec![b'k'; db.max_record_size() - 10 - 4];
        assert!(matches!(db.set(&key, b""), Err(Error::RecordTooLarge { .. })));
        let key = vec![b'k'; db.max_record_size() - 10 - 8];
        assert!(db.set(&key, b"").is_ok());
    }
}
