//! Configuration for leafdb.
//!
//! Compile-time limits live here as constants; everything a caller may tune
//! per database file is carried by [`Options`].

use crate::common::{Error, Result};

/// Smallest supported page size, and the unit every page size must be a multiple of.
pub const MIN_PAGE_SIZE: usize = 4096;

/// Largest supported page size.
///
/// In-page offsets are stored as `u16`, so a page (including its end
/// boundary) must be addressable with 16 bits.
pub const MAX_PAGE_SIZE: usize = 32 * 1024;

/// Page size used when none is requested.
pub const DEFAULT_PAGE_SIZE: usize = MIN_PAGE_SIZE;

/// Reserved bytes at the start of every tree page.
pub const PAGE_HEADER_SIZE: usize = 64;

/// Records per directory bucket before the bucket is split.
pub const DEFAULT_DIR_FANOUT: u16 = 8;

/// The directory region may occupy at most `page_size / divisor` bytes.
pub const DEFAULT_DIR_RESERVE_DIVISOR: u16 = 16;

/// Per-database options.
///
/// # Example
/// ```
/// use leafdb::Options;
///
/// let options = Options::default().with_page_size(8192);
/// assert!(options.validate().is_ok());
/// assert_eq!(options.page_size, 8192);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Size of every page in the file. Must match the file when reopening.
    pub page_size: usize,
    /// Maximum records per directory bucket under normal operation.
    pub dir_fanout: u16,
    /// Bounds the directory region to `page_size / dir_reserve_divisor` bytes.
    pub dir_reserve_divisor: u16,
}

impl Options {
    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the directory bucket fanout.
    pub fn with_dir_fanout(mut self, fanout: u16) -> Self {
        self.dir_fanout = fanout;
        self
    }

    /// Set the directory reserve divisor.
    pub fn with_dir_reserve_divisor(mut self, divisor: u16) -> Self {
        self.dir_reserve_divisor = divisor;
        self
    }

    /// Check that the options describe a usable page layout.
    ///
    /// # Errors
    /// - `Error::InvalidPageSize` if the page size is out of range or not a
    ///   multiple of [`MIN_PAGE_SIZE`]
    /// - `Error::InvalidOptions` for a fanout below 2 or a divisor below 4
    pub fn validate(&self) -> Result<()> {
        if self.page_size < MIN_PAGE_SIZE
            || self.page_size > MAX_PAGE_SIZE
            || self.page_size % MIN_PAGE_SIZE != 0
        {
            return Err(Error::InvalidPageSize(self.page_size));
        }
        if self.dir_fanout < 2 {
            return Err(Error::InvalidOptions("dir_fanout must be at least 2"));
        }
        // A divisor of 4 keeps room for two maximum-size records beside a
        // full directory region.
        if self.dir_reserve_divisor < 4 {
            return Err(Error::InvalidOptions(
                "dir_reserve_divisor must be at least 4",
            ));
        }
        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            dir_fanout: DEFAULT_DIR_FANOUT,
            dir_reserve_divisor: DEFAULT_DIR_RESERVE_DIVISOR,
        }
    }
}
