//! The inode store: reading, writing and allocating inode records (spec
//! §4.2).

use crate::backend::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::extent::ExtentTable;
use crate::fs::Fs;
use crate::inode::{DiskInode, FileType};
use crate::layout::BLOCK_SIZE;

impl<D: BlockDevice + 'static> Fs<D> {
    /// Reads and decodes inode `ino`.
    pub fn iget(&mut self, ino: u32) -> FsResult<DiskInode> {
        if ino == 0 || ino >= self.sb.total_inodes {
            return Err(FsError::OutOfRange);
        }
        let blk = self.sb.inode_block(ino);
        let off = self.sb.inode_offset(ino);
        let block = self.device.read_block_owned(blk)?;
        Ok(DiskInode::decode(&block, off))
    }

    /// Writes back inode `ino`, under the journal. A no-op if `ino` is out
    /// of range.
    pub fn write_inode(&mut self, ino: u32, inode: &DiskInode) -> FsResult<()> {
        if ino == 0 || ino >= self.sb.total_inodes {
            return Ok(());
        }
        let blk = self.sb.inode_block(ino);
        let off = self.sb.inode_offset(ino);
        let mut session = self.begin_session()?;
        let mut block = session.read_block(blk)?;
        inode.encode_into(&mut block, off);
        session.write_block(blk, block)?;
        session.finish()
    }

    /// Allocates a fresh inode number and, for files and directories, its
    /// extent table block. `dir` supplies uid/gid inheritance.
    pub fn new_inode(&mut self, dir: &DiskInode, mode_bits: u32, now: u32) -> FsResult<(u32, DiskInode)> {
        let ty = FileType::from_mode(mode_bits).ok_or(FsError::InvalidArgument)?;
        if self.sb.inode_bitmap.free_count() == 0 {
            return Err(FsError::NoSpace);
        }
        let needs_extent_block = !matches!(ty, FileType::Symlink);
        if needs_extent_block && self.sb.block_bitmap.free_count() == 0 {
            return Err(FsError::NoSpace);
        }

        let ino = self.sb.inode_bitmap.alloc_one();
        if ino == 0 {
            return Err(FsError::NoSpace);
        }

        let mut inode = DiskInode::zeroed();
        inode.i_mode = mode_bits;
        inode.i_uid = dir.i_uid;
        inode.i_gid = dir.i_gid;
        inode.i_ctime = now;
        inode.i_atime = now;
        inode.i_mtime = now;
        inode.i_nlink = if matches!(ty, FileType::Directory) { 2 } else { 1 };

        if needs_extent_block {
            let ei_block = self.sb.block_bitmap.alloc_one();
            if ei_block == 0 {
                self.sb.inode_bitmap.free_one(ino);
                return Err(FsError::NoSpace);
            }
            inode.ei_block = ei_block;
            inode.i_blocks = 1;
            inode.i_size = if matches!(ty, FileType::Directory) {
                BLOCK_SIZE as u32
            } else {
                0
            };

            let mut session = self.begin_session()?;
            session.write_block(ei_block, ExtentTable::empty().encode())?;
            session.finish()?;
        }

        self.write_inode(ino, &inode)?;
        Ok((ino, inode))
    }

    /// Releases an inode and, for files and directories, its extent table
    /// and every block run it references (spec §4.6). Failures scrubbing
    /// the extent table block are logged and do not abort the release:
    /// the blocks are already logically free in the bitmap.
    pub(crate) fn free_inode_and_extent(&mut self, ino: u32, inode: &DiskInode) -> FsResult<()> {
        if matches!(inode.file_type(), Some(FileType::Regular) | Some(FileType::Directory)) {
            let table = ExtentTable::decode(&self.device.read_block_owned(inode.ei_block)?);
            for e in table.extents.iter().filter(|e| e.is_used()) {
                self.sb.block_bitmap.free_run(e.ee_start, e.ee_len);
            }
            self.sb.block_bitmap.free_one(inode.ei_block);
            let scrub = self.begin_session().and_then(|mut session| {
                session.write_block(inode.ei_block, crate::backend::zero_block())?;
                session.finish()
            });
            if let Err(e) = scrub {
                log::warn!("unlink: failed to scrub extent table block {}: {e}", inode.ei_block);
            }
        }
        self.sb.inode_bitmap.free_one(ino);
        self.write_inode(ino, &DiskInode::zeroed())
    }
}
