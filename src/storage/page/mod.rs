//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - A view that reads and edits one page in place
//! - [`PageHeader`] - Metadata at the start of every page
//! - [`PageType`] - Discriminator for different page formats
//! - [`PageLayout`] - Size limits derived from the options
//! - [`Record`] - An owned key/value pair moved between pages
//!
//! The record heap and the sparse directory are private halves of [`Page`].

mod directory;
mod layout;
#[allow(clippy::module_inception)]
mod page;
mod page_header;
mod record;

pub use layout::PageLayout;
pub use page::{Page, SetOutcome};
pub use page_header::{PageHeader, PageType};
pub use record::{Record, Records, RECORD_HEADER_SIZE};
