//! Record heap: slot allocation and the sorted record chain inside a page.
//!
//! Each record lives in a slot that grows forward from the page header:
//!
//! ```text
//! Offset  Size  Field
//! 0       2     slot_len   (bytes reserved, ≥ serialized length)
//! 2       2     prev       (previous record in key order, 0 = none)
//! 4       2     next       (next record in key order, 0 = none)
//! 6       2     key_len
//! 8       2     value_len
//! 10      k     key
//! 10+k    v     value
//! ```
//!
//! A released slot keeps its `slot_len` and reuses bytes 2..4 as the link of
//! the page-local free list.

use super::page::Page;

/// Fixed bytes in front of every record's key.
pub const RECORD_HEADER_SIZE: usize = 10;

const OFFSET_SLOT_LEN: usize = 0;
const OFFSET_PREV: usize = 2;
const OFFSET_NEXT: usize = 4;
const OFFSET_KEY_LEN: usize = 6;
const OFFSET_VALUE_LEN: usize = 8;

/// Free-list link inside a released slot.
const OFFSET_NEXT_FREE: usize = 2;

/// An owned key/value pair, used when records move between pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    /// Bytes a slot needs for this key and value.
    #[inline]
    pub fn serialized_size(key: &[u8], value: &[u8]) -> usize {
        RECORD_HEADER_SIZE + key.len() + value.len()
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        Self::serialized_size(&self.key, &self.value)
    }
}

/// Ascending iterator over `(key, value)` pairs of one page.
pub struct Records<'a, B> {
    page: &'a Page<B>,
    current: u16,
}

impl<'a, B: AsRef<[u8]>> Records<'a, B> {
    pub(super) fn new(page: &'a Page<B>, start: u16) -> Self {
        Self {
            page,
            current: start,
        }
    }
}

impl<'a, B: AsRef<[u8]>> Iterator for Records<'a, B> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == 0 {
            return None;
        }
        let off = self.current;
        self.current = self.page.rec_next(off);
        Some((self.page.rec_key(off), self.page.rec_value(off)))
    }
}

impl<B: AsRef<[u8]>> Page<B> {
    #[inline]
    pub(super) fn slot_len(&self, off: u16) -> usize {
        self.read_u16(off as usize + OFFSET_SLOT_LEN) as usize
    }

    #[inline]
    pub(super) fn rec_prev(&self, off: u16) -> u16 {
        self.read_u16(off as usize + OFFSET_PREV)
    }

    #[inline]
    pub(super) fn rec_next(&self, off: u16) -> u16 {
        self.read_u16(off as usize + OFFSET_NEXT)
    }

    #[inline]
    pub(super) fn rec_key_len(&self, off: u16) -> usize {
        self.read_u16(off as usize + OFFSET_KEY_LEN) as usize
    }

    /// Byte range of the key of the record at `off`.
    #[inline]
    pub(super) fn rec_key_range(&self, off: u16) -> std::ops::Range<usize> {
        let start = off as usize + RECORD_HEADER_SIZE;
        start..start + self.rec_key_len(off)
    }

    pub(super) fn rec_key(&self, off: u16) -> &[u8] {
        &self.as_slice()[self.rec_key_range(off)]
    }

    pub(super) fn rec_value(&self, off: u16) -> &[u8] {
        let start = self.rec_key_range(off).end;
        let len = self.read_u16(off as usize + OFFSET_VALUE_LEN) as usize;
        &self.as_slice()[start..start + len]
    }

    /// Offsets of the chained records, ascending by key.
    pub(super) fn offsets(&self) -> impl Iterator<Item = u16> + '_ {
        std::iter::successors(Some(self.record_head()).filter(|&off| off != 0), move |&off| {
            Some(self.rec_next(off)).filter(|&next| next != 0)
        })
    }

    /// Bytes available to records if the page were compacted.
    pub(super) fn reclaimable_bytes(&self) -> usize {
        let mut total = self.dir_low() - self.free_begin();
        let mut off = self.free_head();
        while off != 0 {
            total += self.slot_len(off);
            off = self.read_u16(off as usize + OFFSET_NEXT_FREE);
        }
        total
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Page<B> {
    /// Reserve a slot of at least `len` bytes.
    ///
    /// First fit over the free list, then the bump region up to the
    /// directory. Returns `None` when neither has room.
    pub(super) fn alloc_slot(&mut self, len: usize) -> Option<u16> {
        let mut prev = 0u16;
        let mut off = self.free_head();
        while off != 0 {
            let next_free = self.read_u16(off as usize + OFFSET_NEXT_FREE);
            if self.slot_len(off) >= len {
                if prev == 0 {
                    self.set_free_head(next_free);
                } else {
                    self.write_u16(prev as usize + OFFSET_NEXT_FREE, next_free);
                }
                return Some(off);
            }
            prev = off;
            off = next_free;
        }

        let begin = self.free_begin();
        if begin + len > self.dir_low() {
            return None;
        }
        self.set_free_begin(begin + len);
        self.write_u16(begin + OFFSET_SLOT_LEN, len as u16);
        Some(begin as u16)
    }

    /// Return a slot to the page. A slot at the end of the record region
    /// goes back to the bump cursor instead of the free list.
    pub(super) fn free_slot(&mut self, off: u16) {
        let len = self.slot_len(off);
        if off as usize + len == self.free_begin() {
            self.set_free_begin(off as usize);
            return;
        }
        let head = self.free_head();
        self.write_u16(off as usize + OFFSET_NEXT_FREE, head);
        self.set_free_head(off);
    }

    /// Write key and value into an allocated slot, leaving links untouched.
    pub(super) fn write_record(&mut self, off: u16, key: &[u8], value: &[u8]) {
        let at = off as usize;
        self.write_u16(at + OFFSET_KEY_LEN, key.len() as u16);
        self.write_u16(at + OFFSET_VALUE_LEN, value.len() as u16);
        let key_at = at + RECORD_HEADER_SIZE;
        let bytes = self.bytes_mut();
        bytes[key_at..key_at + key.len()].copy_from_slice(key);
        bytes[key_at + key.len()..key_at + key.len() + value.len()].copy_from_slice(value);
    }

    /// Replace the value of a record whose slot is known to be large enough.
    pub(super) fn overwrite_value(&mut self, off: u16, value: &[u8]) {
        let start = self.rec_key_range(off).end;
        self.write_u16(off as usize + OFFSET_VALUE_LEN, value.len() as u16);
        self.bytes_mut()[start..start + value.len()].copy_from_slice(value);
    }

    /// Link the record at `off` between `prev` and `next`.
    pub(super) fn splice(&mut self, off: u16, prev: u16, next: u16) {
        self.write_u16(off as usize + OFFSET_PREV, prev);
        self.write_u16(off as usize + OFFSET_NEXT, next);
        if prev == 0 {
            self.set_record_head(off);
        } else {
            self.write_u16(prev as usize + OFFSET_NEXT, off);
        }
        if next != 0 {
            self.write_u16(next as usize + OFFSET_PREV, off);
        }
        self.set_len(self.len() + 1);
    }

    /// Take the record at `off` out of the chain.
    pub(super) fn unsplice(&mut self, off: u16) {
        let prev = self.rec_prev(off);
        let next = self.rec_next(off);
        if prev == 0 {
            self.set_record_head(next);
        } else {
            self.write_u16(prev as usize + OFFSET_NEXT, next);
        }
        if next != 0 {
            self.write_u16(next as usize + OFFSET_PREV, prev);
        }
        self.set_len(self.len().saturating_sub(1));
    }

    /// Allocate, link and index a record whose key is absent.
    ///
    /// Returns `false` without touching the page if no slot is available.
    pub(super) fn insert_record(&mut self, key: &[u8], value: &[u8]) -> bool {
        let Some(off) = self.alloc_slot(Record::serialized_size(key, value)) else {
            return false;
        };
        let entry = self.dir_find(key);
        let pos = self.locate(key);
        self.write_record(off, key, value);
        self.splice(off, pos.prev, pos.current);
        self.dir_add(entry, off);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::{PageLayout, PageType};

    fn page() -> Page<Vec<u8>> {
        let layout = PageLayout::default();
        let mut page = Page::new(vec![0u8; layout.page_size()], layout);
        page.init(PageType::Leaf);
        page
    }

    #[test]
    fn test_record_sizes() {
        let record = Record::new(b"abc", b"12345");
        assert_eq!(record.slot_size(), 18);
        assert_eq!(Record::serialized_size(b"", b""), RECORD_HEADER_SIZE);
    }

    #[test]
    fn test_bump_allocation_is_contiguous() {
        let mut page = page();
        let a = page.alloc_slot(20).unwrap();
        let b = page.alloc_slot(30).unwrap();
        assert_eq!(a, 64);
        assert_eq!(b, 84);
        assert_eq!(page.free_begin(), 114);
    }

    #[test]
    fn test_allocation_stops_at_directory() {
        let mut page = page();
        let room = page.dir_low() - page.free_begin();
        assert!(page.alloc_slot(room + 1).is_none());
        assert!(page.alloc_slot(room).is_some());
        assert!(page.alloc_slot(RECORD_HEADER_SIZE).is_none());
    }

    #[test]
    fn test_free_list_first_fit_reuses_whole_slot() {
        let mut page = page();
        let a = page.alloc_slot(40).unwrap();
        let _b = page.alloc_slot(40).unwrap();
        let _guard = page.alloc_slot(40).unwrap();

        page.free_slot(a);
        assert_eq!(page.free_head(), a);

        // Smaller request takes the whole freed slot
        let c = page.alloc_slot(25).unwrap();
        assert_eq!(c, a);
        assert_eq!(page.slot_len(c), 40);
        assert_eq!(page.free_head(), 0);
    }

    #[test]
    fn test_free_list_skips_small_slots() {
        let mut page = page();
        let small = page.alloc_slot(12).unwrap();
        let _x = page.alloc_slot(20).unwrap();
        let large = page.alloc_slot(50).unwrap();
        let _y = page.alloc_slot(20).unwrap();

        page.free_slot(large);
        page.free_slot(small);
        assert_eq!(page.free_head(), small);

        assert_eq!(page.alloc_slot(40), Some(large));
        assert_eq!(page.free_head(), small);
    }

    #[test]
    fn test_freeing_tail_slot_rewinds_bump_cursor() {
        let mut page = page();
        let _a = page.alloc_slot(20).unwrap();
        let b = page.alloc_slot(30).unwrap();
        page.free_slot(b);
        assert_eq!(page.free_begin(), b as usize);
        assert_eq!(page.free_head(), 0);
    }

    #[test]
    fn test_reclaimable_bytes_counts_holes() {
        let mut page = page();
        let before = page.reclaimable_bytes();
        let a = page.alloc_slot(40).unwrap();
        let _b = page.alloc_slot(40).unwrap();
        assert_eq!(page.reclaimable_bytes(), before - 80);
        page.free_slot(a);
        assert_eq!(page.reclaimable_bytes(), before - 40);
    }

    #[test]
    fn test_chain_links() {
        let mut page = page();
        assert!(page.insert_record(b"b", b"2"));
        assert!(page.insert_record(b"a", b"1"));
        assert!(page.insert_record(b"c", b"3"));

        let offsets: Vec<u16> = page.offsets().collect();
        assert_eq!(offsets.len(), 3);
        assert_eq!(page.rec_key(offsets[0]), b"a");
        assert_eq!(page.rec_prev(offsets[0]), 0);
        assert_eq!(page.rec_prev(offsets[1]), offsets[0]);
        assert_eq!(page.rec_next(offsets[2]), 0);

        page.unsplice(offsets[1]);
        let keys: Vec<_> = page.records().map(|(k, _)| k.to_vec()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
        assert_eq!(page.len(), 2);
    }
}
