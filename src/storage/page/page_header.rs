//! Page header and type definitions.
//!
//! Every tree page starts with a [`PageHeader`] containing:
//! - [`PageType`] discriminator
//! - Tree links (parent, and pre/next for the leaf chain)
//! - In-page region pointers (record chain, slot free list, bump cursor, directory)

use crate::common::config::PAGE_HEADER_SIZE;
use crate::common::PageId;

/// Type of page stored on disk.
///
/// Uses `#[repr(u16)]` to match its 2-byte on-disk field.
#[repr(u16)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Uninitialized or corrupted page.
    #[default]
    Invalid = 0,
    /// B+Tree branch page; record values are child page offsets.
    Branch = 1,
    /// B+Tree leaf page; record values are user data.
    Leaf = 2,
    /// Page on the recycle list.
    Recycled = 3,
}

impl PageType {
    /// Convert from u16, returning Invalid for unknown values.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => PageType::Branch,
            2 => PageType::Leaf,
            3 => PageType::Recycled,
            _ => PageType::Invalid,
        }
    }
}

/// Metadata stored at the beginning of every tree page.
///
/// # Layout (64 bytes reserved, big-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       8     parent     (PageId, 0 = root)
/// 8       8     pre        (previous leaf, 0 = none)
/// 16      8     next       (next leaf, or next recycled page)
/// 24      2     page_type
/// 26      2     record_head   (first record of the sorted chain, 0 = empty)
/// 28      2     free_head     (first reclaimed slot, 0 = empty)
/// 30      2     free_begin    (bump cursor, 0 = header end)
/// 32      2     dir_begin     (low boundary of the directory, 0 = empty)
/// 34      2     record_count
/// ```
///
/// Pages mutate these fields in place; this struct is a decoded snapshot
/// for inspection and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub parent: PageId,
    pub pre: PageId,
    pub next: PageId,
    pub page_type: PageType,
    pub record_head: u16,
    pub free_head: u16,
    pub free_begin: u16,
    pub dir_begin: u16,
    pub record_count: u16,
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = PAGE_HEADER_SIZE;

    /// Offset of each field within the header.
    pub const OFFSET_PARENT: usize = 0;
    pub const OFFSET_PRE: usize = 8;
    pub const OFFSET_NEXT: usize = 16;
    pub const OFFSET_PAGE_TYPE: usize = 24;
    pub const OFFSET_RECORD_HEAD: usize = 26;
    pub const OFFSET_FREE_HEAD: usize = 28;
    pub const OFFSET_FREE_BEGIN: usize = 30;
    pub const OFFSET_DIR_BEGIN: usize = 32;
    pub const OFFSET_RECORD_COUNT: usize = 34;

    /// Create a header for an empty page of the given type.
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            free_begin: Self::SIZE as u16,
            ..Self::default()
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[at..at + 8]);
            u64::from_be_bytes(raw)
        };
        let u16_at = |at: usize| u16::from_be_bytes([data[at], data[at + 1]]);

        Self {
            parent: PageId(u64_at(Self::OFFSET_PARENT)),
            pre: PageId(u64_at(Self::OFFSET_PRE)),
            next: PageId(u64_at(Self::OFFSET_NEXT)),
            page_type: PageType::from_u16(u16_at(Self::OFFSET_PAGE_TYPE)),
            record_head: u16_at(Self::OFFSET_RECORD_HEAD),
            free_head: u16_at(Self::OFFSET_FREE_HEAD),
            free_begin: u16_at(Self::OFFSET_FREE_BEGIN),
            dir_begin: u16_at(Self::OFFSET_DIR_BEGIN),
            record_count: u16_at(Self::OFFSET_RECORD_COUNT),
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// The reserved tail of the header is zeroed.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        data[..Self::SIZE].fill(0);
        data[Self::OFFSET_PARENT..Self::OFFSET_PARENT + 8]
            .copy_from_slice(&self.parent.0.to_be_bytes());
        data[Self::OFFSET_PRE..Self::OFFSET_PRE + 8].copy_from_slice(&self.pre.0.to_be_bytes());
        data[Self::OFFSET_NEXT..Self::OFFSET_NEXT + 8].copy_from_slice(&self.next.0.to_be_bytes());

        let fields = [
            (Self::OFFSET_PAGE_TYPE, self.page_type as u16),
            (Self::OFFSET_RECORD_HEAD, self.record_head),
            (Self::OFFSET_FREE_HEAD, self.free_head),
            (Self::OFFSET_FREE_BEGIN, self.free_begin),
            (Self::OFFSET_DIR_BEGIN, self.dir_begin),
            (Self::OFFSET_RECORD_COUNT, self.record_count),
        ];
        for (at, value) in fields {
            data[at..at + 2].copy_from_slice(&value.to_be_bytes());
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
