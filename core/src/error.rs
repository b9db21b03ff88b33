//! Error kinds surfaced by the filesystem core (spec §7).

use std::io;

/// A filesystem operation failure.
///
/// Every variant maps to one of the diagnostics spec.md §7 enumerates.
/// Errors flow upward uninterpreted; the journal rolls back the current
/// transaction on any error returned by a mutating step.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("not a directory")]
    NotDirectory,
    #[error("name too long")]
    NameTooLong,
    #[error("already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("no such entry")]
    NotFound,
    #[error("too many links")]
    TooManyLinks,
    #[error("block or inode number out of range")]
    OutOfRange,
    #[error("file too big")]
    FileTooBig,
    #[error("no space left on device")]
    NoSpace,
    #[error("out of memory")]
    NoMemory,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("bad image: magic mismatch")]
    BadImage,
    #[error("journal error: {0}")]
    Journal(String),
    #[error("unsupported rename flags")]
    InvalidArgument,
}

pub type FsResult<T> = Result<T, FsError>;
