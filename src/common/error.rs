//! Error types for leafdb.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in leafdb.
///
/// Running out of space inside a single page is not an error; it triggers a
/// split and never reaches callers.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from file or mapping operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The key/value pair does not fit the page-size-derived record limit.
    #[error("record of {size} bytes exceeds the maximum of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    /// The requested key is not stored.
    #[error("record not found")]
    RecordNotFound,

    /// Page size is not a supported multiple of 4096.
    #[error("invalid page size: {0}")]
    InvalidPageSize(usize),

    /// Other option values out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    /// The file was created with a different page size.
    #[error("file uses page size {file}, but {requested} was requested")]
    PageSizeMismatch { file: usize, requested: usize },

    /// The file or a page violates a structural invariant.
    ///
    /// This indicates a damaged file or a bug; there is no self-healing.
    #[error("corrupted database: {0}")]
    Corrupted(String),
}
