//! Library-side implementation of the `mkfs` contract (spec §6.2): lays
//! down a fresh, empty image. The `mkfs` binary crate is a thin CLI
//! wrapper around [`format`].

use crate::backend::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::extent::ExtentTable;
use crate::inode::DiskInode;
use crate::layout::{mode, BLOCK_SIZE, EXTENT_BLOCKS, ROOT_INODE};
use crate::superblock::SuperblockState;

/// The formatter refuses images smaller than this (spec §6.2).
pub const MIN_BLOCKS: u32 = 100;

/// Formats `device`. `now` stamps the root inode's creation time.
pub fn format<D: BlockDevice>(device: &mut D, now: u32) -> FsResult<()> {
    let total_blocks = device.block_count();
    if total_blocks < MIN_BLOCKS {
        return Err(FsError::InvalidArgument);
    }
    // One inode per four blocks, the same order of magnitude ext2's
    // `mke2fs` defaults land on for small images.
    let total_inodes = (total_blocks / 4).max(32);

    let mut sb = SuperblockState::format(device, total_blocks, total_inodes)?;
    let ei_block = sb.data_area_start();

    // The root directory ships with its first dirent extent already
    // allocated, unlike directories created later by `mkdir` (which
    // allocate theirs lazily on the first `insert`, per the directory
    // engine). This keeps a `create()` in a fresh root costing exactly
    // one block (the new file's own extent table).
    let mut table = ExtentTable::empty();
    let dirent_start = sb.block_bitmap.alloc_run(EXTENT_BLOCKS);
    if dirent_start == 0 {
        return Err(FsError::NoSpace);
    }
    table.install(0, dirent_start);

    let mut root = DiskInode::zeroed();
    root.i_mode = mode::S_IFDIR | 0o755;
    root.i_nlink = 2;
    root.ei_block = ei_block;
    root.i_blocks = 1 + EXTENT_BLOCKS;
    root.i_size = EXTENT_BLOCKS * BLOCK_SIZE as u32;
    root.i_ctime = now;
    root.i_atime = now;
    root.i_mtime = now;

    let blk = sb.inode_block(ROOT_INODE);
    let off = sb.inode_offset(ROOT_INODE);
    let mut block = device.read_block_owned(blk)?;
    root.encode_into(&mut block, off);
    device.write_block(blk, &block)?;

    device.write_block(ei_block, &table.encode())?;
    sb.sync(device)?;
    device.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemDevice;
    use crate::fs::Fs;

    #[test]
    fn format_produces_a_mountable_root() {
        let mut dev = MemDevice::new(200);
        format(&mut dev, 1_700_000_000).unwrap();
        let mut fs = Fs::mount_no_journal(dev).unwrap();
        let root = fs.iget(ROOT_INODE).unwrap();
        assert_eq!(root.i_nlink, 2);
        let listing = fs.iterate(ROOT_INODE, ROOT_INODE, &root).unwrap();
        assert_eq!(listing.len(), 2);
    }

    #[test]
    fn rejects_images_smaller_than_minimum() {
        let mut dev = MemDevice::new(10);
        assert!(format(&mut dev, 0).is_err());
    }
}
