//! Page identifier type.

use std::fmt;

/// Identifies a page by its byte offset in the database file.
///
/// Offset 0 is the control page, which never takes part in the tree, so
/// `PageId(0)` doubles as the "no page" sentinel in parent and sibling links.
///
/// # Example
/// ```
/// use leafdb::PageId;
///
/// let page_id = PageId::new(8192);
/// assert!(page_id.is_some());
/// assert!(PageId::NONE.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PageId(pub u64);

impl PageId {
    /// Sentinel meaning "no page".
    pub const NONE: PageId = PageId(0);

    /// Create a new PageId from a file offset.
    #[inline]
    pub fn new(offset: u64) -> Self {
        PageId(offset)
    }

    /// True unless this is the sentinel.
    #[inline]
    pub fn is_some(&self) -> bool {
        *self != Self::NONE
    }

    /// True for the sentinel.
    #[inline]
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Byte offset of the page in the file.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.0
    }

    /// Big-endian encoding, as stored in branch records.
    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode a branch record value. Returns `None` unless exactly 8 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 8] = bytes.try_into().ok()?;
        Some(PageId(u64::from_be_bytes(raw)))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Page(NONE)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_new() {
        let pid = PageId::new(4096);
        assert_eq!(pid.offset(), 4096);
        assert!(pid.is_some());
    }

    #[test]
    fn test_page_id_none() {
        assert!(PageId::NONE.is_none());
        assert_eq!(PageId::default(), PageId::NONE);
    }

    #[test]
    fn test_page_id_bytes() {
        let pid = PageId::new(0x0102_0304_0506_0708);
        assert_eq!(pid.to_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(PageId::from_bytes(&pid.to_bytes()), Some(pid));
        assert_eq!(PageId::from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(format!("{}", PageId::new(8192)), "Page(8192)");
        assert_eq!(format!("{}", PageId::NONE), "Page(NONE)");
    }
}
