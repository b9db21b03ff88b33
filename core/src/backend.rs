//! The abstract block device collaborator (spec §2.1, §9).
//!
//! The core never talks to a real OS page cache or buffer cache; it talks
//! to whatever implements [`BlockDevice`]. Production callers back this
//! with an open file or a raw block device; tests back it with
//! [`MemDevice`], an in-memory backend that makes the whole core testable
//! without touching the filesystem.

use crate::error::{FsError, FsResult};
use crate::layout::BLOCK_SIZE;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// One 4 KiB block.
pub type Block = [u8; BLOCK_SIZE];

/// Returns a zeroed block buffer.
pub fn zero_block() -> Block {
    [0u8; BLOCK_SIZE]
}

/// A fixed-block-size storage device.
///
/// Reads and writes are whole blocks, addressed by 32-bit block number.
/// Implementations own whatever caching and dirty tracking they need;
/// the core treats every call as durable once `flush` returns.
pub trait BlockDevice {
    /// Total number of addressable blocks.
    fn block_count(&self) -> u32;

    /// Reads block `blk` into `buf`. Fails with [`FsError::OutOfRange`] if
    /// `blk >= block_count()`.
    fn read_block(&mut self, blk: u32, buf: &mut Block) -> FsResult<()>;

    /// Writes `buf` to block `blk`. Fails with [`FsError::OutOfRange`] if
    /// `blk >= block_count()`.
    fn write_block(&mut self, blk: u32, buf: &Block) -> FsResult<()>;

    /// Flushes any buffered writes to stable storage.
    fn flush(&mut self) -> FsResult<()>;

    /// Convenience wrapper returning an owned, freshly-read block.
    fn read_block_owned(&mut self, blk: u32) -> FsResult<Block> {
        let mut buf = zero_block();
        self.read_block(blk, &mut buf)?;
        Ok(buf)
    }
}

/// An in-memory block device, for tests and tooling that doesn't want to
/// touch the filesystem.
pub struct MemDevice {
    blocks: Vec<Block>,
}

impl MemDevice {
    /// Creates a new zero-filled device with `block_count` blocks.
    pub fn new(block_count: u32) -> Self {
        Self {
            blocks: vec![zero_block(); block_count as usize],
        }
    }
}

impl BlockDevice for MemDevice {
    fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    fn read_block(&mut self, blk: u32, buf: &mut Block) -> FsResult<()> {
        let b = self.blocks.get(blk as usize).ok_or(FsError::OutOfRange)?;
        buf.copy_from_slice(b);
        Ok(())
    }

    fn write_block(&mut self, blk: u32, buf: &Block) -> FsResult<()> {
        let b = self
            .blocks
            .get_mut(blk as usize)
            .ok_or(FsError::OutOfRange)?;
        b.copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> FsResult<()> {
        Ok(())
    }
}

/// A block device backed by a regular file or block special file.
pub struct FileDevice {
    file: File,
    block_count: u32,
}

impl FileDevice {
    /// Wraps `file`, which must be at least `block_count * BLOCK_SIZE` bytes.
    pub fn new(file: File, block_count: u32) -> Self {
        Self { file, block_count }
    }

    fn offset(blk: u32) -> u64 {
        blk as u64 * BLOCK_SIZE as u64
    }
}

impl BlockDevice for FileDevice {
    fn block_count(&self) -> u32 {
        self.block_count
    }

    fn read_block(&mut self, blk: u32, buf: &mut Block) -> FsResult<()> {
        if blk >= self.block_count {
            return Err(FsError::OutOfRange);
        }
        self.file.seek(SeekFrom::Start(Self::offset(blk)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, blk: u32, buf: &Block) -> FsResult<()> {
        if blk >= self.block_count {
            return Err(FsError::OutOfRange);
        }
        self.file.seek(SeekFrom::Start(Self::offset(blk)))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> FsResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}
