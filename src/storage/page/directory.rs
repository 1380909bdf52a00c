//! Sparse in-page directory.
//!
//! The directory splits the record chain into buckets of about `fanout`
//! records and stores one entry per bucket, packed backward from the page
//! end. Lookups step through the entries from the page end to the last one
//! not above the key, then scan that one bucket instead of the whole chain.
//!
//! Entry layout, low to high address (`8 + key_len` bytes):
//!
//! ```text
//! key_len u16 | key | key_len u16 | count u16 | first u16
//!                                                       ^ end
//! ```
//!
//! Entries are read from their high end. The trailing `key_len` gives the
//! entry start; the leading one lets a walk step from an entry to the one
//! above it. The entry at the page end has the smallest key.

use super::page::Page;

/// Fixed bytes of an entry besides the key.
const DIR_ENTRY_OVERHEAD: usize = 8;

/// One decoded directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DirEntry {
    /// Exclusive high boundary of the entry.
    pub end: usize,
    pub key_len: usize,
    /// Records in the bucket.
    pub count: u16,
    /// Offset of the bucket's first record.
    pub first: u16,
}

impl DirEntry {
    #[inline]
    pub fn start(&self) -> usize {
        self.end - self.size()
    }

    #[inline]
    pub fn size(&self) -> usize {
        DIR_ENTRY_OVERHEAD + self.key_len
    }
}

impl<B: AsRef<[u8]>> Page<B> {
    #[inline]
    pub(super) fn dir_is_empty(&self) -> bool {
        self.dir_low() >= self.page_size()
    }

    pub(super) fn dir_entry_at(&self, end: usize) -> DirEntry {
        DirEntry {
            end,
            key_len: self.read_u16(end - 6) as usize,
            count: self.read_u16(end - 4),
            first: self.read_u16(end - 2),
        }
    }

    /// Representative key of an entry.
    pub(super) fn dir_key(&self, entry: &DirEntry) -> &[u8] {
        &self.as_slice()[entry.end - 6 - entry.key_len..entry.end - 6]
    }

    /// All entries, ascending by key.
    pub(super) fn dir_entries(&self) -> Vec<DirEntry> {
        let low = self.dir_low();
        let mut entries = Vec::new();
        let mut end = self.page_size();
        while end > low {
            let entry = self.dir_entry_at(end);
            end = entry.start();
            entries.push(entry);
        }
        entries
    }

    /// Last entry whose key is ≤ `key`.
    pub(super) fn dir_find(&self, key: &[u8]) -> Option<DirEntry> {
        let low = self.dir_low();
        let mut found = None;
        let mut end = self.page_size();
        while end > low {
            let entry = self.dir_entry_at(end);
            if self.dir_key(&entry) > key {
                break;
            }
            found = Some(entry);
            end = entry.start();
        }
        found
    }

    /// Entry directly above `entry` (smaller key), if any.
    fn dir_predecessor(&self, entry: &DirEntry) -> Option<DirEntry> {
        if entry.end >= self.page_size() {
            return None;
        }
        let key_len = self.read_u16(entry.end) as usize;
        Some(self.dir_entry_at(entry.end + DIR_ENTRY_OVERHEAD + key_len))
    }

    /// Lowest address the directory may grow to right now.
    fn dir_floor(&self) -> usize {
        self.free_begin().max(self.layout().min_dir_begin())
    }

    fn dir_can_grow(&self, by: usize) -> bool {
        self.dir_low()
            .checked_sub(by)
            .is_some_and(|low| low >= self.dir_floor())
    }

    fn chain_len_from(&self, mut off: u16) -> usize {
        let mut len = 0;
        while off != 0 {
            len += 1;
            off = self.rec_next(off);
        }
        len
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Page<B> {
    /// Write an entry ending at `end` whose key is copied from the record
    /// at `first`.
    fn write_dir_entry(&mut self, end: usize, first: u16, count: u16) {
        let key = self.rec_key_range(first);
        let key_len = key.len();
        let start = end - DIR_ENTRY_OVERHEAD - key_len;
        self.write_u16(start, key_len as u16);
        self.bytes_mut().copy_within(key, start + 2);
        self.write_u16(end - 6, key_len as u16);
        self.write_u16(end - 4, count);
        self.write_u16(end - 2, first);
    }

    fn set_dir_count(&mut self, entry: &DirEntry, count: u16) {
        self.write_u16(entry.end - 4, count);
    }

    /// Move the entries between the directory's low boundary and `boundary`
    /// by `delta` bytes, adjusting the boundary.
    fn dir_shift(&mut self, boundary: usize, delta: isize) {
        let low = self.dir_low();
        let new_low = low.wrapping_add_signed(delta);
        self.bytes_mut().copy_within(low..boundary, new_low);
        self.set_dir_low(new_low);
    }

    /// Open a gap below `end` and write a new entry there.
    fn dir_insert_entry(&mut self, end: usize, first: u16, count: u16) -> bool {
        let size = DIR_ENTRY_OVERHEAD + self.rec_key_len(first);
        if !self.dir_can_grow(size) {
            return false;
        }
        self.dir_shift(end, -(size as isize));
        self.write_dir_entry(end, first, count);
        true
    }

    fn dir_remove_entry(&mut self, entry: &DirEntry) {
        self.dir_shift(entry.start(), entry.size() as isize);
    }

    /// Register the freshly linked record at `off`.
    ///
    /// `entry` is the bucket found for its key before linking.
    pub(super) fn dir_add(&mut self, entry: Option<DirEntry>, off: u16) {
        if self.dir_is_empty() {
            if self.len() == 1 {
                self.dir_insert_entry(self.page_size(), off, 1);
            } else {
                self.dir_rebuild();
            }
            return;
        }

        let Some(entry) = entry else {
            // New smallest key: it opens its own bucket at the top.
            if !self.dir_insert_entry(self.page_size(), off, 1) {
                self.dir_rebuild();
            }
            return;
        };

        let fanout = self.layout().dir_fanout();
        if entry.count + 1 < fanout {
            self.set_dir_count(&entry, entry.count + 1);
            return;
        }

        let total = entry.count + 1;
        let split_at = total / 2;
        let mut second = entry.first;
        for _ in 0..split_at {
            second = self.rec_next(second);
        }
        if second == 0 {
            self.dir_rebuild();
            return;
        }

        if self.dir_insert_entry(entry.start(), second, total - split_at) {
            self.set_dir_count(&entry, split_at);
        } else {
            // No room for another entry: the bucket grows past fanout.
            self.set_dir_count(&entry, total);
        }
    }

    /// Account for the removal of `key`, whose chain successor was `next`.
    ///
    /// `entry` is the bucket found for the key before it was unlinked.
    pub(super) fn dir_delete(&mut self, entry: Option<DirEntry>, key: &[u8], next: u16) {
        if self.dir_is_empty() {
            return;
        }
        let Some(entry) = entry else {
            self.dir_rebuild();
            return;
        };

        let was_first = self.dir_key(&entry) == key;
        if entry.count <= 1 {
            if was_first {
                self.dir_remove_entry(&entry);
            } else {
                self.dir_rebuild();
            }
            return;
        }

        if !was_first {
            self.set_dir_count(&entry, entry.count - 1);
        } else {
            if next == 0 {
                self.dir_rebuild();
                return;
            }
            let delta = self.rec_key_len(next) as isize - entry.key_len as isize;
            if delta > 0 && !self.dir_can_grow(delta as usize) {
                self.dir_rebuild();
                return;
            }
            if delta != 0 {
                self.dir_shift(entry.start(), -delta);
            }
            self.write_dir_entry(entry.end, next, entry.count - 1);
        }

        let entry = self.dir_entry_at(entry.end);
        if let Some(pred) = self.dir_predecessor(&entry) {
            if pred.count + entry.count <= self.layout().dir_fanout() {
                self.set_dir_count(&pred, pred.count + entry.count);
                self.dir_remove_entry(&entry);
            }
        }
    }

    /// Rebuild the whole directory from the record chain.
    ///
    /// Emits one entry per `fanout` records from the page end downward. When
    /// the next entry would cross the floor, the remaining records join the
    /// last entry written; when not even the first fits, the directory stays
    /// empty and lookups scan from the chain head.
    pub(super) fn dir_rebuild(&mut self) {
        let page_size = self.page_size();
        self.set_dir_low(page_size);

        let fanout = self.layout().dir_fanout() as usize;
        let floor = self.dir_floor();
        let mut end = page_size;
        let mut last: Option<DirEntry> = None;
        let mut first = self.record_head();

        while first != 0 {
            let mut count = 0;
            let mut after = first;
            while after != 0 && count < fanout {
                count += 1;
                after = self.rec_next(after);
            }

            let size = DIR_ENTRY_OVERHEAD + self.rec_key_len(first);
            if end < floor + size {
                if let Some(last) = last {
                    let rest = self.chain_len_from(first);
                    self.set_dir_count(&last, last.count + rest as u16);
                }
                break;
            }

            self.write_dir_entry(end, first, count as u16);
            last = Some(self.dir_entry_at(end));
            end -= size;
            first = after;
        }

        self.set_dir_low(end);
    }
}
