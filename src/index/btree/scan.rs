//! Ordered scans along the leaf chain.

use crate::common::{Error, Result};
use crate::storage::page::Record;

use super::BTree;

impl BTree {
    /// Records with `min <= key <= max`, ascending. An empty bound is open.
    ///
    /// Starts at the leaf owning `min` (the front leaf when `min` is open)
    /// and follows `next` links until a key passes `max`.
    ///
    /// # Errors
    /// `Error::Corrupted` if the leaf chain loops or leaves the file.
    pub fn range(&self, min: &[u8], max: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        if !min.is_empty() && !max.is_empty() && min > max {
            return Ok(out);
        }

        let mut current = if min.is_empty() {
            self.store.front()
        } else {
            self.find_leaf(min)?
        };
        let mut steps = 0;
        while current.is_some() {
            steps += 1;
            if steps > self.store.page_count() {
                return Err(Error::Corrupted("leaf chain has a cycle".into()));
            }

            let page = self.store.page(current)?;
            for (key, value) in page.records() {
                if key < min {
                    continue;
                }
                if !max.is_empty() && key > max {
                    return Ok(out);
                }
                out.push((key.to_vec(), value.to_vec()));
            }
            current = page.next();
        }
        Ok(out)
    }

    /// Every record, ascending.
    ///
    /// # Errors
    /// Same as [`range`](Self::range).
    pub fn all(&self) -> Result<Vec<Record>> {
        Ok(self
            .range(b"", b"")?
            .into_iter()
            .map(|(key, value)| Record { key, value })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{key, tree};

    #[test]
    fn test_range_on_empty_tree() {
        let (_dir, tree) = tree();
        assert!(tree.range(b"", b"").unwrap().is_empty());
        assert!(tree.all().unwrap().is_empty());
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let (_dir, mut tree) = tree();
        for i in 0..1000 {
            tree.set(&key(i), format!("{i}").as_bytes()).unwrap();
        }

        let hits = tree.range(&key(100), &key(199)).unwrap();
        assert_eq!(hits.len(), 100);
        assert_eq!(hits.first().unwrap().0, key(100));
        assert_eq!(hits.last().unwrap().0, key(199));
        assert!(hits.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_open_bounds() {
        let (_dir, mut tree) = tree();
        for i in 0..1000 {
            tree.set(&key(i), b"v").unwrap();
        }
        assert_eq!(tree.range(b"", &key(9)).unwrap().len(), 10);
        assert_eq!(tree.range(&key(990), b"").unwrap().len(), 10);
        assert_eq!(tree.range(b"", b"").unwrap().len(), 1000);
        assert_eq!(tree.all().unwrap().len(), 1000);
    }

    #[test]
    fn test_bounds_between_keys() {
        let (_dir, mut tree) = tree();
        for i in (0..600).map(|i| i * 2) {
            tree.set(&key(i), b"v").unwrap();
        }
        let hits = tree.range(&key(101), &key(109)).unwrap();
        let keys: Vec<_> = hits.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![key(102), key(104), key(106), key(108)]);

        // Below everything, above everything, and inverted
        assert_eq!(tree.range(b"a", &key(0)).unwrap().len(), 1);
        assert!(tree.range(b"zzz", b"").unwrap().is_empty());
        assert!(tree.range(&key(50), &key(10)).unwrap().is_empty());
    }

    #[test]
    fn test_all_is_strictly_ascending_after_random_inserts() {
        let (_dir, mut tree) = tree();
        for i in 0..2000 {
            tree.set(&key((i * 7919) % 2000), b"v").unwrap();
        }
        let all = tree.all().unwrap();
        assert_eq!(all.len(), 2000);
        assert!(all.windows(2).all(|w| w[0].key < w[1].key));
    }
}
