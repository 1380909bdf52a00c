//! Index structures.
//!
//! - [`btree`] - The B+Tree that orders all records of a database file

pub mod btree;

pub use btree::{BTree, StatsSnapshot, TreeStats};
