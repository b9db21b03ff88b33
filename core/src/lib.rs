//! `blockfs`: the core of a small block-based filesystem with
//! extent-mapped files and directories, a bitmap free-space allocator and
//! an optional write-ahead journal.
//!
//! This crate never talks to a real operating system; every operation is
//! expressed against the [`BlockDevice`](backend::BlockDevice)
//! collaborator, so it is fully testable against an in-memory backend.
//! The `mkfs` binary in this workspace is the offline formatter; mounting
//! and driving a live image is this crate's job.

pub mod backend;
pub mod bitmap;
pub mod dirent;
pub mod directory;
pub mod error;
pub mod extent;
pub mod file;
pub mod fs;
pub mod inode;
pub mod journal;
pub mod layout;
pub mod mkfs;
pub mod mount;
pub mod store;
pub mod superblock;

pub use backend::{Block, BlockDevice, FileDevice, MemDevice};
pub use dirent::{DirBlock, DirEntry};
pub use directory::{RENAME_EXCHANGE, RENAME_NOREPLACE, RENAME_WHITEOUT};
pub use error::{FsError, FsResult};
pub use extent::{Extent, ExtentTable};
pub use fs::{Fs, JournalConfig};
pub use inode::{DiskInode, FileType};
pub use journal::Journal;
pub use layout::mode;
pub use mount::MountOptions;
pub use superblock::Statfs;
