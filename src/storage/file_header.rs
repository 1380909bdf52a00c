//! Control page (page 0) of a database file.

use crate::common::{Error, PageId, Result};

/// File identification bytes.
pub const MAGIC: [u8; 4] = *b"LFDB";

/// Tree anchors and format identification stored at offset 0.
///
/// # Layout (big-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       8     root page
/// 8       8     front (leftmost) leaf
/// 16      8     head of the recycled-page list (0 = empty)
/// 24      4     magic "LFDB"
/// 28      4     page size
/// 32      4     CRC32 of bytes 0..32
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub root: PageId,
    pub front: PageId,
    pub recycled: PageId,
    pub page_size: u32,
}

impl FileHeader {
    /// Size of the encoded header in bytes.
    pub const SIZE: usize = 36;

    const OFFSET_ROOT: usize = 0;
    const OFFSET_FRONT: usize = 8;
    const OFFSET_RECYCLED: usize = 16;
    const OFFSET_MAGIC: usize = 24;
    const OFFSET_PAGE_SIZE: usize = 28;
    const OFFSET_CHECKSUM: usize = 32;

    pub fn new(page_size: usize) -> Self {
        Self {
            root: PageId::NONE,
            front: PageId::NONE,
            recycled: PageId::NONE,
            page_size: page_size as u32,
        }
    }

    /// Decode and verify a header.
    ///
    /// # Errors
    /// `Error::Corrupted` on a short buffer, bad magic, or checksum mismatch.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Corrupted("control page is truncated".into()));
        }
        if data[Self::OFFSET_MAGIC..Self::OFFSET_MAGIC + 4] != MAGIC {
            return Err(Error::Corrupted("not a leafdb file (bad magic)".into()));
        }

        let stored = u32::from_be_bytes(read_array(data, Self::OFFSET_CHECKSUM));
        let computed = crc32fast::hash(&data[..Self::OFFSET_CHECKSUM]);
        if stored != computed {
            return Err(Error::Corrupted(format!(
                "control page checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }

        Ok(Self {
            root: PageId(u64::from_be_bytes(read_array(data, Self::OFFSET_ROOT))),
            front: PageId(u64::from_be_bytes(read_array(data, Self::OFFSET_FRONT))),
            recycled: PageId(u64::from_be_bytes(read_array(data, Self::OFFSET_RECYCLED))),
            page_size: u32::from_be_bytes(read_array(data, Self::OFFSET_PAGE_SIZE)),
        })
    }

    /// Encode the header, including a fresh checksum.
    ///
    /// # Panics
    /// Panics if `data.len() < FileHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        data[Self::OFFSET_ROOT..Self::OFFSET_ROOT + 8].copy_from_slice(&self.root.to_bytes());
        data[Self::OFFSET_FRONT..Self::OFFSET_FRONT + 8].copy_from_slice(&self.front.to_bytes());
        data[Self::OFFSET_RECYCLED..Self::OFFSET_RECYCLED + 8]
            .copy_from_slice(&self.recycled.to_bytes());
        data[Self::OFFSET_MAGIC..Self::OFFSET_MAGIC + 4].copy_from_slice(&MAGIC);
        data[Self::OFFSET_PAGE_SIZE..Self::OFFSET_PAGE_SIZE + 4]
            .copy_from_slice(&self.page_size.to_be_bytes());

        let checksum = crc32fast::hash(&data[..Self::OFFSET_CHECKSUM]);
        data[Self::OFFSET_CHECKSUM..Self::SIZE].copy_from_slice(&checksum.to_be_bytes());
    }
}

fn read_array<const N: usize>(data: &[u8], at: usize) -> [u8; N] {
    let mut raw = [0u8; N];
    raw.copy_from_slice(&data[at..at + N]);
    raw
}
