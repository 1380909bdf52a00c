//! leafdb - an embedded, single-file, ordered key/value store.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                              Db                                 │
//! │            RwLock<BTree>  ·  size checks  ·  errors             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Index Layer (index/btree)                  │   │
//! │  │   lookup · insert (front / behind splits) · delete ·     │   │
//! │  │   range scans over the leaf chain · structural stats     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Page Layer (storage/page)                 │   │
//! │  │   record heap + free list  ·  sparse directory  ·        │   │
//! │  │   get / set / delete / split on one page                 │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Storage Layer (storage/page_store)          │   │
//! │  │   memory-mapped file · control page · recycle list       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, Error, Options)
//! - [`storage`] - File mapping and page formats
//! - [`index`] - The B+Tree
//!
//! # Quick Start
//! ```no_run
//! use leafdb::{Db, Options};
//!
//! let db = Db::open_with_options("my_database.db", Options::default().with_page_size(8192))?;
//! db.set(b"user:1", b"alice")?;
//! db.set(b"user:2", b"bob")?;
//!
//! for (key, value) in db.range(b"user:", b"user:~")? {
//!     println!("{:?} = {:?}", key, value);
//! }
//! db.flush()?;
//! # Ok::<(), leafdb::Error>(())
//! ```

pub mod common;
mod db;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::Options;
pub use common::{Error, PageId, Result};
pub use db::Db;

pub use index::{BTree, StatsSnapshot, TreeStats};
pub use storage::page::{Page, PageHeader, PageLayout, PageType, Record};
pub use storage::{PageStatistics, PageStore};
