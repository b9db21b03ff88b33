//! The superblock record and the in-memory superblock manager (spec §4.7,
//! §6.1).

use crate::backend::{zero_block, Block, BlockDevice};
use crate::bitmap::Bitmap;
use crate::error::{FsError, FsResult};
use crate::inode::DiskInode;
use crate::layout::{BLOCK_SIZE, INODES_PER_BLOCK, INODE_STORE_START, MAGIC, SUPERBLOCK_BLOCK};

/// The byte-exact on-disk superblock record (spec §6.1), padded to one
/// block.
#[derive(Debug, Clone, Copy)]
pub struct SuperblockRecord {
    pub magic: u32,
    pub nr_blocks: u32,
    pub nr_inodes: u32,
    pub nr_istore_blocks: u32,
    pub nr_ifree_blocks: u32,
    pub nr_bfree_blocks: u32,
    pub nr_free_inodes: u32,
    pub nr_free_blocks: u32,
}

impl SuperblockRecord {
    pub fn decode(block: &Block) -> Self {
        let f = |o: usize| u32::from_le_bytes(block[o..o + 4].try_into().unwrap());
        Self {
            magic: f(0),
            nr_blocks: f(4),
            nr_inodes: f(8),
            nr_istore_blocks: f(12),
            nr_ifree_blocks: f(16),
            nr_bfree_blocks: f(20),
            nr_free_inodes: f(24),
            nr_free_blocks: f(28),
        }
    }

    pub fn encode(&self) -> Block {
        let mut block = zero_block();
        let mut w = |o: usize, v: u32| block[o..o + 4].copy_from_slice(&v.to_le_bytes());
        w(0, self.magic);
        w(4, self.nr_blocks);
        w(8, self.nr_inodes);
        w(12, self.nr_istore_blocks);
        w(16, self.nr_ifree_blocks);
        w(20, self.nr_bfree_blocks);
        w(24, self.nr_free_inodes);
        w(28, self.nr_free_blocks);
        block
    }
}

/// Aggregate statistics, for a `statfs`-style query (spec's data model
/// implies these counters; exposed here for callers that want `df`-style
/// reporting — see SPEC_FULL.md's supplemented features).
#[derive(Debug, Clone, Copy)]
pub struct Statfs {
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
}

/// The in-memory superblock: layout geometry plus the two bitmaps it
/// exclusively owns.
pub struct SuperblockState {
    pub total_blocks: u32,
    pub total_inodes: u32,
    pub istore_blocks: u32,
    pub ifree_blocks: u32,
    pub bfree_blocks: u32,
    pub inode_bitmap: Bitmap,
    pub block_bitmap: Bitmap,
}

impl SuperblockState {
    pub fn ifree_bitmap_start(&self) -> u32 {
        INODE_STORE_START + self.istore_blocks
    }

    pub fn bfree_bitmap_start(&self) -> u32 {
        self.ifree_bitmap_start() + self.ifree_blocks
    }

    pub fn data_area_start(&self) -> u32 {
        self.bfree_bitmap_start() + self.bfree_blocks
    }

    /// Block holding the `ino`th inode record.
    pub fn inode_block(&self, ino: u32) -> u32 {
        INODE_STORE_START + ino / INODES_PER_BLOCK as u32
    }

    /// Byte offset of the `ino`th inode record within its block.
    pub fn inode_offset(&self, ino: u32) -> usize {
        (ino as usize % INODES_PER_BLOCK) * DiskInode::ENCODED_SIZE
    }

    pub fn stat(&self) -> Statfs {
        Statfs {
            total_blocks: self.total_blocks,
            free_blocks: self.block_bitmap.free_count(),
            total_inodes: self.total_inodes,
            free_inodes: self.inode_bitmap.free_count(),
        }
    }

    /// Lays out a fresh superblock for `total_blocks` blocks / `total_inodes`
    /// inodes, computing the geometry and writing it (plus fully-free
    /// bitmaps, minus the reservations `mkfs` makes) to `device`. Used by
    /// the `mkfs` formatter (spec §6.2).
    pub fn format<D: BlockDevice>(
        device: &mut D,
        total_blocks: u32,
        total_inodes: u32,
    ) -> FsResult<Self> {
        let istore_blocks = ceil_div(total_inodes as usize * DiskInode::ENCODED_SIZE, BLOCK_SIZE) as u32;
        let ifree_blocks = ceil_div(total_inodes as usize, BLOCK_SIZE * 8) as u32;
        let bfree_blocks = ceil_div(total_blocks as usize, BLOCK_SIZE * 8) as u32;

        let mut state = Self {
            total_blocks,
            total_inodes,
            istore_blocks,
            ifree_blocks,
            bfree_blocks,
            inode_bitmap: Bitmap::new(total_inodes as usize),
            block_bitmap: Bitmap::new(total_blocks as usize),
        };

        // Reserve inode 1 (root) in addition to the sentinel bit 0.
        if total_inodes > 1 {
            state.inode_bitmap.alloc_one(); // consumes inode 1
        }
        // Reserve every metadata block plus the root directory's first
        // data block.
        let data_start = state.data_area_start();
        for blk in 0..=data_start {
            if (blk as usize) < state.block_bitmap.len() {
                if state.block_bitmap.is_free(blk as usize) {
                    // Allocate sequentially: alloc_one always takes the
                    // lowest free bit, which is exactly `blk` here since we
                    // go in increasing order from a freshly formatted map.
                    state.block_bitmap.alloc_one();
                }
            }
        }

        state.sync(device)?;
        Ok(state)
    }

    /// Mounts: reads block 0, verifies the magic, loads both bitmaps.
    pub fn mount<D: BlockDevice>(device: &mut D) -> FsResult<Self> {
        let block = device.read_block_owned(SUPERBLOCK_BLOCK)?;
        let record = SuperblockRecord::decode(&block);
        if record.magic != MAGIC {
            return Err(FsError::BadImage);
        }
        let state = Self {
            total_blocks: record.nr_blocks,
            total_inodes: record.nr_inodes,
            istore_blocks: record.nr_istore_blocks,
            ifree_blocks: record.nr_ifree_blocks,
            bfree_blocks: record.nr_bfree_blocks,
            inode_bitmap: Bitmap::from_bytes(
                &read_blocks(device, record.nr_istore_blocks + INODE_STORE_START, record.nr_ifree_blocks)?,
                record.nr_inodes as usize,
            ),
            block_bitmap: Bitmap::from_bytes(
                &read_blocks(
                    device,
                    record.nr_istore_blocks + INODE_STORE_START + record.nr_ifree_blocks,
                    record.nr_bfree_blocks,
                )?,
                record.nr_blocks as usize,
            ),
        };
        Ok(state)
    }

    /// Rewrites the superblock record from in-memory fields and flushes
    /// both bitmaps to their reserved block ranges (spec §4.7).
    pub fn sync<D: BlockDevice>(&self, device: &mut D) -> FsResult<()> {
        let record = SuperblockRecord {
            magic: MAGIC,
            nr_blocks: self.total_blocks,
            nr_inodes: self.total_inodes,
            nr_istore_blocks: self.istore_blocks,
            nr_ifree_blocks: self.ifree_blocks,
            nr_bfree_blocks: self.bfree_blocks,
            nr_free_inodes: self.inode_bitmap.free_count(),
            nr_free_blocks: self.block_bitmap.free_count(),
        };
        device.write_block(SUPERBLOCK_BLOCK, &record.encode())?;

        write_blocks(
            device,
            self.ifree_bitmap_start(),
            self.ifree_blocks,
            &self.inode_bitmap.to_bytes(self.ifree_blocks as usize * BLOCK_SIZE),
        )?;
        write_blocks(
            device,
            self.bfree_bitmap_start(),
            self.bfree_blocks,
            &self.block_bitmap.to_bytes(self.bfree_blocks as usize * BLOCK_SIZE),
        )?;
        device.flush()?;
        Ok(())
    }
}

fn ceil_div(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

fn read_blocks<D: BlockDevice>(device: &mut D, start: u32, count: u32) -> FsResult<Vec<u8>> {
    let mut out = Vec::with_capacity(count as usize * BLOCK_SIZE);
    for i in 0..count {
        out.extend_from_slice(&device.read_block_owned(start + i)?);
    }
    Ok(out)
}

fn write_blocks<D: BlockDevice>(device: &mut D, start: u32, count: u32, bytes: &[u8]) -> FsResult<()> {
    for i in 0..count {
        let mut block = zero_block();
        let off = i as usize * BLOCK_SIZE;
        block.copy_from_slice(&bytes[off..off + BLOCK_SIZE]);
        device.write_block(start + i, &block)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemDevice;

    #[test]
    fn format_then_mount_roundtrips_geometry() {
        let mut dev = MemDevice::new(200);
        let formatted = SuperblockState::format(&mut dev, 200, 64).unwrap();
        let mounted = SuperblockState::mount(&mut dev).unwrap();
        assert_eq!(mounted.total_blocks, formatted.total_blocks);
        assert_eq!(mounted.total_inodes, formatted.total_inodes);
        assert_eq!(mounted.istore_blocks, formatted.istore_blocks);
        assert_eq!(mounted.inode_bitmap.free_count(), formatted.inode_bitmap.free_count());
        assert_eq!(mounted.block_bitmap.free_count(), formatted.block_bitmap.free_count());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut dev = MemDevice::new(200);
        // leave block 0 zeroed -> magic mismatch
        assert!(matches!(SuperblockState::mount(&mut dev), Err(FsError::BadImage)));
    }
}
