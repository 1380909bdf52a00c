//! Page Store - the memory-mapped database file.
//!
//! The [`PageStore`] owns the file and its mapping and hands out page views:
//! - Opening or creating the file and validating the control page
//! - Allocating pages (recycle list first, then file extension)
//! - Recycling pages that became empty
//! - Tracking the root and front leaf of the tree

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;
use tracing::{debug, info};

use crate::common::config::Options;
use crate::common::{Error, PageId, Result};
use crate::storage::file_header::FileHeader;
use crate::storage::page::{Page, PageLayout, PageType};

/// Manages the pages of a single database file through one shared mapping.
///
/// # File Layout
/// ```text
/// ┌───────────┬─────────┬─────────┬─────────┬─────────┐
/// │  Page 0   │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (control) │ (tree)  │ (tree)  │         │ (tree)  │
/// └───────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0   page_size  2×page_size  ...   N×page_size
/// ```
///
/// Pages are addressed by their byte offset ([`PageId`]). Page 0 holds the
/// [`FileHeader`]; every other page is a tree page or on the recycle list.
///
/// # Durability
/// Writes land in the shared mapping and reach the disk whenever the OS
/// writes back dirty pages, or on [`flush`](Self::flush). There is no
/// write-ahead log; a crash can leave the tree half-updated.
pub struct PageStore {
    file: File,
    mmap: MmapMut,
    layout: PageLayout,
    header: FileHeader,
    page_count: u64,
}

impl PageStore {
    /// Open a database file, creating and formatting it when empty.
    ///
    /// # Errors
    /// - `Error::InvalidPageSize` / `Error::InvalidOptions` for bad options
    /// - `Error::PageSizeMismatch` if the file was created with another page size
    /// - `Error::Corrupted` for a bad control page or a truncated file
    /// - `Error::Io` if the file cannot be opened, extended or mapped
    pub fn open<P: AsRef<Path>>(path: P, options: &Options) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let layout = PageLayout::new(options);
        let page_size = layout.page_size() as u64;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_size = file.metadata()?.len();
        let created = file_size == 0;
        if created {
            file.set_len(page_size)?;
        } else if file_size < FileHeader::SIZE as u64 {
            return Err(Error::Corrupted(format!(
                "file is {file_size} bytes, too small for a control page"
            )));
        }

        // SAFETY: MmapMut::map_mut is unsafe because the mapped file could be
        // changed by another process behind our back. The file is opened
        // read-write by this store only, and every page view borrows the
        // store, so no view outlives a remap.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut store = Self {
            file,
            mmap,
            layout,
            header: FileHeader::new(layout.page_size()),
            page_count: 1,
        };

        if created {
            store.write_header();
            let leaf = store.allocate_page(PageType::Leaf)?;
            store.header.root = leaf;
            store.header.front = leaf;
            store.write_header();
            info!(path = %path.display(), page_size, "store.create");
            return Ok(store);
        }

        let header = FileHeader::from_bytes(&store.mmap[..FileHeader::SIZE])?;
        if header.page_size as u64 != page_size {
            return Err(Error::PageSizeMismatch {
                file: header.page_size as usize,
                requested: layout.page_size(),
            });
        }
        if file_size % page_size != 0 {
            return Err(Error::Corrupted(format!(
                "file size {file_size} is not a multiple of page size {page_size}"
            )));
        }
        store.header = header;
        store.page_count = file_size / page_size;
        store.check(header.root)?;
        store.check(header.front)?;

        info!(
            path = %path.display(),
            page_size,
            pages = store.page_count,
            "store.open"
        );
        Ok(store)
    }

    #[inline]
    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    /// Number of pages in the file, including the control page.
    #[inline]
    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    /// Byte offset of a tree page, after bounds and alignment checks.
    fn check(&self, id: PageId) -> Result<usize> {
        let page_size = self.layout.page_size() as u64;
        if id.is_none() || id.0 % page_size != 0 || id.0 / page_size >= self.page_count {
            return Err(Error::Corrupted(format!(
                "{id} is not a tree page (file has {} pages)",
                self.page_count
            )));
        }
        Ok(id.0 as usize)
    }

    /// Read-only view of a tree page.
    ///
    /// # Errors
    /// `Error::Corrupted` if `id` does not address a tree page.
    pub fn page(&self, id: PageId) -> Result<Page<&[u8]>> {
        let at = self.check(id)?;
        let end = at + self.layout.page_size();
        Ok(Page::new(&self.mmap[at..end], self.layout))
    }

    /// Mutable view of a tree page.
    ///
    /// # Errors
    /// `Error::Corrupted` if `id` does not address a tree page.
    pub fn page_mut(&mut self, id: PageId) -> Result<Page<&mut [u8]>> {
        let at = self.check(id)?;
        let end = at + self.layout.page_size();
        Ok(Page::new(&mut self.mmap[at..end], self.layout))
    }

    pub fn root(&self) -> PageId {
        self.header.root
    }

    pub fn front(&self) -> PageId {
        self.header.front
    }

    pub fn set_root(&mut self, root: PageId) {
        self.header.root = root;
        self.write_header();
    }

    pub fn set_front(&mut self, front: PageId) {
        self.header.front = front;
        self.write_header();
    }

    fn write_header(&mut self) {
        self.header.write_to(&mut self.mmap[..FileHeader::SIZE]);
    }

    /// Get a formatted page of `page_type`.
    ///
    /// Reuses the head of the recycle list if there is one, otherwise grows
    /// the file by one page and remaps it.
    ///
    /// # Errors
    /// - `Error::Corrupted` if the recycle list points at a live page
    /// - `Error::Io` if the file cannot be extended or remapped
    pub fn allocate_page(&mut self, page_type: PageType) -> Result<PageId> {
        let recycled = self.header.recycled;
        if recycled.is_some() {
            let next = {
                let page = self.page(recycled)?;
                if page.page_type() != PageType::Recycled {
                    return Err(Error::Corrupted(format!(
                        "{recycled} is on the recycle list but has type {:?}",
                        page.page_type()
                    )));
                }
                page.next()
            };
            self.header.recycled = next;
            self.write_header();
            self.page_mut(recycled)?.init(page_type);
            debug!(page = recycled.0, ?page_type, "store.allocate.reuse");
            return Ok(recycled);
        }

        let page_size = self.layout.page_size() as u64;
        let id = PageId(self.page_count * page_size);
        self.file.set_len((self.page_count + 1) * page_size)?;

        // SAFETY: remapping requires &mut self, so no page view into the old
        // mapping can still be alive. The file was extended first, and the
        // old mapping is dropped on assignment.
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        self.page_count += 1;

        self.page_mut(id)?.init(page_type);
        debug!(page = id.0, ?page_type, pages = self.page_count, "store.allocate.extend");
        Ok(id)
    }

    /// Put an unlinked page on the recycle list.
    ///
    /// # Errors
    /// `Error::Corrupted` if `id` does not address a tree page.
    pub fn recycle(&mut self, id: PageId) -> Result<()> {
        let head = self.header.recycled;
        {
            let mut page = self.page_mut(id)?;
            page.init(PageType::Recycled);
            page.set_next(head);
        }
        self.header.recycled = id;
        self.write_header();
        debug!(page = id.0, "store.recycle");
        Ok(())
    }

    /// Count pages by type and measure the tree depth.
    ///
    /// Diagnostic only: this touches every page of the file.
    ///
    /// # Errors
    /// `Error::Corrupted` if the parent chain from the front leaf loops.
    pub fn statistics(&self) -> Result<PageStatistics> {
        let page_size = self.layout.page_size() as u64;
        let mut stats = PageStatistics {
            total_pages: self.page_count,
            ..PageStatistics::default()
        };

        for index in 1..self.page_count {
            match self.page(PageId(index * page_size))?.page_type() {
                PageType::Branch => stats.branch_pages += 1,
                PageType::Leaf => stats.leaf_pages += 1,
                PageType::Recycled => stats.recycled_pages += 1,
                PageType::Invalid => {}
            }
        }

        let mut current = self.header.front;
        while current.is_some() {
            stats.depth += 1;
            if stats.depth > self.page_count {
                return Err(Error::Corrupted("parent chain has a cycle".into()));
            }
            current = self.page(current)?.parent();
        }

        Ok(stats)
    }

    /// Write dirty mapped pages back to the file.
    ///
    /// # Errors
    /// `Error::Io` if msync fails.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

/// Page counts of a database file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageStatistics {
    /// All pages including the control page.
    pub total_pages: u64,
    pub branch_pages: u64,
    pub leaf_pages: u64,
    pub recycled_pages: u64,
    /// Levels from the front leaf up to the root, inclusive.
    pub depth: u64,
}

impl fmt::Display for PageStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pages {{ total: {}, branch: {}, leaf: {}, recycled: {}, depth: {} }}",
            self.total_pages, self.branch_pages, self.leaf_pages, self.recycled_pages, self.depth
        )
    }
}
