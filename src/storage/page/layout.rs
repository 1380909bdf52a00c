//! Geometry shared by every page of one database file.

use crate::common::config::{Options, PAGE_HEADER_SIZE};

use super::record::RECORD_HEADER_SIZE;

/// Size-derived limits for a page, computed once from [`Options`].
///
/// ```text
///  0        64                         min_dir_begin     page_size
///  ├─header─┼──records grow → ... ← directory grows──┼─────────┤
///                                        └── reserved directory region ──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    page_size: usize,
    dir_fanout: u16,
    min_dir_begin: usize,
}

impl PageLayout {
    /// Derive the layout from validated options.
    pub fn new(options: &Options) -> Self {
        let page_size = options.page_size;
        Self {
            page_size,
            dir_fanout: options.dir_fanout,
            min_dir_begin: page_size - page_size / options.dir_reserve_divisor as usize,
        }
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn dir_fanout(&self) -> u16 {
        self.dir_fanout
    }

    /// Lowest address the directory may grow down to.
    #[inline]
    pub fn min_dir_begin(&self) -> usize {
        self.min_dir_begin
    }

    /// Largest serialized record slot a page accepts.
    #[inline]
    pub fn max_record_size(&self) -> usize {
        (self.page_size - PAGE_HEADER_SIZE) / 2
    }

    /// Record bytes that always fit, whatever the directory occupies.
    #[inline]
    pub fn record_capacity(&self) -> usize {
        self.min_dir_begin - PAGE_HEADER_SIZE
    }

    /// Bytes a split keeps before handing the rest to a sibling.
    ///
    /// A page filled below this target plus one maximum-size record still
    /// fits [`record_capacity`](Self::record_capacity).
    #[inline]
    pub fn fill_target(&self) -> usize {
        self.record_capacity() - self.max_record_size()
    }

    /// Largest key/value pair a leaf accepts, counting the branch entry the
    /// key may later become.
    pub fn record_size(&self, key: &[u8], value: &[u8]) -> usize {
        RECORD_HEADER_SIZE + key.len() + value.len().max(8)
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::new(&Options::default())
    }
}
