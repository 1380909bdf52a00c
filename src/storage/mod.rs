//! Storage layer - the mapped file and page formats.
//!
//! This module handles persistent storage:
//! - [`PageStore`] - File mapping, page allocation and recycling
//! - [`FileHeader`] - The control page
//! - [`page`] - Page types and layouts

mod file_header;
pub mod page;
mod page_store;

pub use file_header::FileHeader;
pub use page_store::{PageStatistics, PageStore};
