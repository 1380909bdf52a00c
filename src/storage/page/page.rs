//! Page - a typed view over one fixed-size region of the database file.
//!
//! A [`Page`] wraps a byte buffer (a slice of the memory map, or an owned
//! `Vec<u8>` in tests) and interprets it as a header, a sorted record chain
//! growing forward from the header, and a sparse directory growing backward
//! from the page end:
//!
//! ```text
//! ┌────────┬───────────────────────┬─────────┬────────────────────┐
//! │ header │ record slots  ──►     │  free   │   ◄── directory    │
//! └────────┴───────────────────────┴─────────┴────────────────────┘
//! 0        64               free_begin      dir_begin        page_size
//! ```
//!
//! Read operations need only `B: AsRef<[u8]>`; mutations additionally need
//! `B: AsMut<[u8]>`, so a shared borrow of the map can never be written.

use std::cmp::Ordering;

use crate::common::config::PAGE_HEADER_SIZE;
use crate::common::{Error, PageId, Result};

use super::layout::PageLayout;
use super::page_header::{PageHeader, PageType};
use super::record::{Record, Records};

/// Result of [`Page::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOutcome {
    /// The key was not present before.
    pub inserted: bool,
    /// The record is now stored in this page.
    ///
    /// When `false` for an existing key, the old record has already been
    /// removed and the caller must place the new one elsewhere.
    pub fits: bool,
}

/// Where a key sits in the record chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Position {
    /// Last record with a smaller key, 0 if none.
    pub prev: u16,
    /// First record with a key ≥ the searched one, 0 at the chain end.
    pub current: u16,
    pub found: bool,
}

/// A view of one page.
pub struct Page<B> {
    data: B,
    layout: PageLayout,
}

impl<B> Page<B> {
    #[inline]
    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.layout.page_size()
    }
}

// ============================================================================
// Read side
// ============================================================================

impl<B: AsRef<[u8]>> Page<B> {
    /// Wrap a buffer of exactly `layout.page_size()` bytes.
    ///
    /// # Panics
    /// Panics if the buffer length differs from the layout's page size.
    pub fn new(data: B, layout: PageLayout) -> Self {
        assert_eq!(
            data.as_ref().len(),
            layout.page_size(),
            "page buffer does not match the page size"
        );
        Self { data, layout }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_ref()
    }

    #[inline]
    pub(super) fn read_u16(&self, at: usize) -> u16 {
        let bytes = self.data.as_ref();
        u16::from_be_bytes([bytes[at], bytes[at + 1]])
    }

    #[inline]
    pub(super) fn read_u64(&self, at: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.data.as_ref()[at..at + 8]);
        u64::from_be_bytes(raw)
    }

    /// Decode the header into a snapshot.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(self.data.as_ref())
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_u16(self.read_u16(PageHeader::OFFSET_PAGE_TYPE))
    }

    pub fn parent(&self) -> PageId {
        PageId(self.read_u64(PageHeader::OFFSET_PARENT))
    }

    pub fn pre(&self) -> PageId {
        PageId(self.read_u64(PageHeader::OFFSET_PRE))
    }

    pub fn next(&self) -> PageId {
        PageId(self.read_u64(PageHeader::OFFSET_NEXT))
    }

    /// Number of live records.
    #[inline]
    pub fn len(&self) -> usize {
        self.read_u16(PageHeader::OFFSET_RECORD_COUNT) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.record_head() == 0
    }

    #[inline]
    pub(super) fn record_head(&self) -> u16 {
        self.read_u16(PageHeader::OFFSET_RECORD_HEAD)
    }

    #[inline]
    pub(super) fn free_head(&self) -> u16 {
        self.read_u16(PageHeader::OFFSET_FREE_HEAD)
    }

    /// Bump cursor, with 0 meaning "right after the header".
    #[inline]
    pub(super) fn free_begin(&self) -> usize {
        match self.read_u16(PageHeader::OFFSET_FREE_BEGIN) {
            0 => PAGE_HEADER_SIZE,
            begin => begin as usize,
        }
    }

    /// Low boundary of the directory, with an empty directory at page end.
    #[inline]
    pub(super) fn dir_low(&self) -> usize {
        match self.read_u16(PageHeader::OFFSET_DIR_BEGIN) {
            0 => self.page_size(),
            begin => begin as usize,
        }
    }

    /// Locate `key` in the chain, starting from its directory bucket.
    pub(super) fn locate(&self, key: &[u8]) -> Position {
        let (mut prev, mut current) = match self.dir_find(key) {
            Some(entry) => (self.rec_prev(entry.first), entry.first),
            None => (0, self.record_head()),
        };

        while current != 0 {
            match self.rec_key(current).cmp(key) {
                Ordering::Less => {
                    prev = current;
                    current = self.rec_next(current);
                }
                Ordering::Equal => {
                    return Position {
                        prev,
                        current,
                        found: true,
                    }
                }
                Ordering::Greater => break,
            }
        }

        Position {
            prev,
            current,
            found: false,
        }
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let pos = self.locate(key);
        pos.found.then(|| self.rec_value(pos.current))
    }

    /// Smallest key in the page.
    pub fn min(&self) -> Option<&[u8]> {
        match self.record_head() {
            0 => None,
            head => Some(self.rec_key(head)),
        }
    }

    /// Iterate records in ascending key order.
    pub fn records(&self) -> Records<'_, B> {
        Records::new(self, self.record_head())
    }

    /// All records, ascending.
    pub fn all(&self) -> Vec<Record> {
        self.records().map(|(k, v)| Record::new(k, v)).collect()
    }

    /// Records with `min <= key <= max`. An empty bound is open.
    pub fn query(&self, min: &[u8], max: &[u8]) -> Vec<Record> {
        let start = if min.is_empty() {
            self.record_head()
        } else {
            self.locate(min).current
        };
        Records::new(self, start)
            .take_while(|(k, _)| max.is_empty() || *k <= max)
            .map(|(k, v)| Record::new(k, v))
            .collect()
    }

    /// Record that routes `key` in a branch page: the greatest entry ≤ key,
    /// or the first entry when `key` sorts before all of them.
    fn routing_record(&self, key: &[u8]) -> u16 {
        let pos = self.locate(key);
        if pos.found {
            pos.current
        } else if pos.prev != 0 {
            pos.prev
        } else {
            self.record_head()
        }
    }

    /// Child page that covers `key`.
    ///
    /// # Errors
    /// `Error::Corrupted` if the page has no entries or the entry is not an
    /// 8-byte page offset.
    pub fn child_for(&self, key: &[u8]) -> Result<PageId> {
        match self.routing_record(key) {
            0 => Err(Error::Corrupted("branch page without children".into())),
            off => PageId::from_bytes(self.rec_value(off))
                .filter(|id| id.is_some())
                .ok_or_else(|| Error::Corrupted("branch entry is not a page offset".into())),
        }
    }

    /// Check the structural invariants of the record chain and directory.
    ///
    /// # Errors
    /// `Error::Corrupted` describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let corrupted = |msg: String| -> Result<()> { Err(Error::Corrupted(msg)) };
        let free_begin = self.free_begin();
        let dir_low = self.dir_low();

        if free_begin > dir_low {
            return corrupted(format!("free_begin {free_begin} above dir_begin {dir_low}"));
        }
        if dir_low < self.layout.min_dir_begin() {
            return corrupted(format!("directory extends below {}", self.layout.min_dir_begin()));
        }

        let mut chain = Vec::new();
        let mut prev = 0u16;
        let mut off = self.record_head();
        while off != 0 {
            let at = off as usize;
            if at < PAGE_HEADER_SIZE || at + super::record::RECORD_HEADER_SIZE > free_begin {
                return corrupted(format!("record offset {at} outside the record region"));
            }
            if at + self.slot_len(off) > free_begin {
                return corrupted(format!("record at {at} overruns the record region"));
            }
            if self.rec_prev(off) != prev {
                return corrupted(format!("record at {at} has a broken back link"));
            }
            if prev != 0 && self.rec_key(prev) >= self.rec_key(off) {
                return corrupted(format!("record at {at} is out of order"));
            }
            chain.push(off);
            if chain.len() > self.page_size() / super::record::RECORD_HEADER_SIZE {
                return corrupted("record chain has a cycle".into());
            }
            prev = off;
            off = self.rec_next(off);
        }
        if chain.len() != self.len() {
            return corrupted(format!("count {} but {} records chained", self.len(), chain.len()));
        }

        // Buckets must partition the chain in order.
        let mut index = 0usize;
        for entry in self.dir_entries() {
            match chain[index..].iter().position(|&o| o == entry.first) {
                Some(0) => {}
                _ => return corrupted(format!("bucket at {} starts out of place", entry.end)),
            }
            if self.dir_key(&entry) != self.rec_key(entry.first) {
                return corrupted(format!("bucket at {} has a stale key", entry.end));
            }
            if entry.count == 0 {
                return corrupted(format!("bucket at {} is empty", entry.end));
            }
            index += entry.count as usize;
            if index > chain.len() {
                return corrupted(format!("bucket at {} counts past the chain end", entry.end));
            }
        }
        if dir_low < self.page_size() && index != chain.len() {
            return corrupted("buckets do not cover the chain".into());
        }

        Ok(())
    }
}

// ============================================================================
// Write side
// ============================================================================

impl<B: AsRef<[u8]> + AsMut<[u8]>> Page<B> {
    #[inline]
    pub(super) fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    #[inline]
    pub(super) fn write_u16(&mut self, at: usize, value: u16) {
        self.data.as_mut()[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub(super) fn write_u64(&mut self, at: usize, value: u64) {
        self.data.as_mut()[at..at + 8].copy_from_slice(&value.to_be_bytes());
    }

    /// Format the page as an empty page of `page_type` with no links.
    pub fn init(&mut self, page_type: PageType) {
        PageHeader::new(page_type).write_to(self.data.as_mut());
    }

    /// Drop every record, keeping the type and the tree links.
    pub fn reset(&mut self) {
        self.set_record_head(0);
        self.set_free_head(0);
        self.set_free_begin(PAGE_HEADER_SIZE);
        self.set_dir_low(self.page_size());
        self.set_len(0);
    }

    pub fn set_page_type(&mut self, page_type: PageType) {
        self.write_u16(PageHeader::OFFSET_PAGE_TYPE, page_type as u16);
    }

    pub fn set_parent(&mut self, parent: PageId) {
        self.write_u64(PageHeader::OFFSET_PARENT, parent.0);
    }

    pub fn set_pre(&mut self, pre: PageId) {
        self.write_u64(PageHeader::OFFSET_PRE, pre.0);
    }

    pub fn set_next(&mut self, next: PageId) {
        self.write_u64(PageHeader::OFFSET_NEXT, next.0);
    }

    pub(super) fn set_record_head(&mut self, off: u16) {
        self.write_u16(PageHeader::OFFSET_RECORD_HEAD, off);
    }

    pub(super) fn set_free_head(&mut self, off: u16) {
        self.write_u16(PageHeader::OFFSET_FREE_HEAD, off);
    }

    pub(super) fn set_free_begin(&mut self, begin: usize) {
        self.write_u16(PageHeader::OFFSET_FREE_BEGIN, begin as u16);
    }

    pub(super) fn set_dir_low(&mut self, low: usize) {
        let raw = if low >= self.page_size() { 0 } else { low as u16 };
        self.write_u16(PageHeader::OFFSET_DIR_BEGIN, raw);
    }

    pub(super) fn set_len(&mut self, len: usize) {
        self.write_u16(PageHeader::OFFSET_RECORD_COUNT, len as u16);
    }

    /// Insert or overwrite `key`.
    ///
    /// An existing record is rewritten in place when its slot is large
    /// enough; otherwise it is removed and the new record inserted. A
    /// record that cannot be placed leaves `fits == false`.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> SetOutcome {
        let pos = self.locate(key);
        if pos.found {
            let need = Record::serialized_size(key, value);
            if self.slot_len(pos.current) >= need {
                self.overwrite_value(pos.current, value);
                return SetOutcome {
                    inserted: false,
                    fits: true,
                };
            }
            self.remove_at(pos.current);
            return SetOutcome {
                inserted: false,
                fits: self.insert(key, value),
            };
        }

        SetOutcome {
            inserted: true,
            fits: self.insert(key, value),
        }
    }

    /// Insert a key known to be absent, compacting the slot area once if
    /// fragmentation is the only obstacle.
    fn insert(&mut self, key: &[u8], value: &[u8]) -> bool {
        if self.insert_record(key, value) {
            return true;
        }
        if self.reclaimable_bytes() < Record::serialized_size(key, value) {
            return false;
        }
        self.compact();
        self.insert_record(key, value)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        let pos = self.locate(key);
        if pos.found {
            self.remove_at(pos.current);
        }
        pos.found
    }

    /// Unlink the record at `off` and keep the directory consistent.
    fn remove_at(&mut self, off: u16) {
        let key = self.rec_key(off).to_vec();
        let entry = self.dir_find(&key);
        let next = self.rec_next(off);
        self.unsplice(off);
        self.free_slot(off);
        self.dir_delete(entry, &key, next);
    }

    /// Replace the key of the smallest record, keeping its value.
    ///
    /// Returns the record if it no longer fits after the rename; it has
    /// then been removed from the page and must be placed by the caller.
    pub fn update_min_key(&mut self, key: &[u8]) -> Option<Record> {
        let head = self.record_head();
        if head == 0 || self.rec_key(head) == key {
            return None;
        }
        let value = self.rec_value(head).to_vec();
        self.remove_at(head);
        if self.insert(key, &value) {
            None
        } else {
            Some(Record::new(key, &value))
        }
    }

    /// Remove the branch entry pointing at `child`. Returns whether it was
    /// present.
    ///
    /// `key` is any key routed through that entry; it finds the entry in
    /// one bucket scan, with a full scan as fallback.
    ///
    /// When the first entry goes, the next one inherits its key, so the
    /// page's smallest key keeps matching the separator above it.
    ///
    /// # Errors
    /// `Error::Corrupted` if the inherited key cannot be placed.
    pub fn remove_child(&mut self, key: &[u8], child: PageId) -> Result<bool> {
        let target = child.to_bytes();
        let guess = self.routing_record(key);
        let off = if guess != 0 && self.rec_value(guess) == target {
            Some(guess)
        } else {
            self.offsets().find(|&off| self.rec_value(off) == target)
        };
        let Some(off) = off else {
            return Ok(false);
        };

        let separator = (off == self.record_head()).then(|| self.rec_key(off).to_vec());
        self.remove_at(off);
        if let Some(separator) = separator {
            if !self.is_empty() && self.update_min_key(&separator).is_some() {
                return Err(Error::Corrupted(
                    "inherited separator does not fit its branch".into(),
                ));
            }
        }
        Ok(true)
    }

    /// Rewrite all records contiguously, merging the free list back into
    /// the bump region.
    pub fn compact(&mut self) {
        let records = self.all();
        self.reset();
        // The records fitted before, so they fit packed.
        let packed = self.append_sorted(&records);
        debug_assert!(packed.is_ok(), "compaction lost records: {packed:?}");
    }

    /// All current records plus `(key, value)`, ascending.
    fn merged_with(&self, key: &[u8], value: &[u8]) -> Vec<Record> {
        let mut records = self.all();
        match records.binary_search_by(|r| r.key.as_slice().cmp(key)) {
            Ok(i) => records[i].value = value.to_vec(),
            Err(i) => records.insert(i, Record::new(key, value)),
        }
        records
    }

    /// Split for an insert behind the smallest key.
    ///
    /// Retains the front of the merged record set up to the fill target and
    /// returns the rest, plus whether `key` was retained here.
    ///
    /// # Errors
    /// `Error::Corrupted` if the retained records cannot be placed.
    pub fn split_behind(&mut self, key: &[u8], value: &[u8]) -> Result<(Vec<Record>, bool)> {
        let mut records = self.merged_with(key, value);
        let target = self.layout.fill_target();

        let mut used = 0;
        let mut keep = 0;
        for record in &records {
            if used >= target {
                break;
            }
            used += record.slot_size();
            keep += 1;
        }
        let overflow = records.split_off(keep);

        self.reset();
        self.append_sorted(&records)?;

        let in_front = overflow.first().map_or(true, |r| key < r.key.as_slice());
        Ok((overflow, in_front))
    }

    /// Split for an insert in front of the smallest key.
    ///
    /// Retains the back of the merged record set up to the fill target and
    /// returns the front portion, ascending.
    ///
    /// # Errors
    /// `Error::Corrupted` if the retained records cannot be placed.
    pub fn split_front(&mut self, key: &[u8], value: &[u8]) -> Result<Vec<Record>> {
        let mut records = self.merged_with(key, value);
        let target = self.layout.fill_target();

        let mut used = 0;
        let mut keep_from = records.len();
        while keep_from > 0 && used < target {
            keep_from -= 1;
            used += records[keep_from].slot_size();
        }
        let back = records.split_off(keep_from);

        self.reset();
        self.append_sorted(&back)?;
        Ok(records)
    }

    /// Bump-write ascending records into an empty page, then index them.
    fn append_sorted(&mut self, records: &[Record]) -> Result<()> {
        let mut tail = 0u16;
        for record in records {
            let need = record.slot_size();
            let off = self.alloc_slot(need).ok_or_else(|| {
                Error::Corrupted(format!("split could not place a {need}-byte record"))
            })?;
            self.write_record(off, &record.key, &record.value);
            self.splice(off, tail, 0);
            tail = off;
        }
        self.dir_rebuild();
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
