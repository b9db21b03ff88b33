//! The read/write path: mapping logical file blocks to physical ones,
//! extending files with fresh extents, and truncating by releasing
//! trailing extents (spec §4.3, §4.4).

use crate::backend::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::extent::{Extent, ExtentTable, SearchResult};
use crate::fs::{Fs, Session};
use crate::inode::DiskInode;
use crate::layout::{BLOCK_SIZE, EXTENT_BLOCKS, MAX_EXTENTS, MAX_FILESIZE};

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

impl<D: BlockDevice + 'static> Fs<D> {
    /// Maps logical block `iblock` of `inode` to a physical block number.
    /// Returns `None` for an unmapped (hole) block when `create` is
    /// false; allocates a fresh extent on demand when `create` is true
    /// (spec §4.3's `get_block`).
    pub fn get_block(&mut self, inode: &mut DiskInode, iblock: u32, create: bool) -> FsResult<Option<u32>> {
        if iblock >= EXTENT_BLOCKS * MAX_EXTENTS as u32 {
            return Err(FsError::FileTooBig);
        }
        let mut table = ExtentTable::decode(&self.device.read_block_owned(inode.ei_block)?);
        match table.search(iblock) {
            SearchResult::Mapped(slot) => {
                let e = table.extents[slot];
                Ok(Some(e.ee_start + (iblock - e.ee_block)))
            }
            SearchResult::InsertAt(slot) => {
                if !create {
                    return Ok(None);
                }
                let start = self.sb.block_bitmap.alloc_run(EXTENT_BLOCKS);
                if start == 0 {
                    return Err(FsError::NoSpace);
                }
                let ee_block = table.install(slot, start);

                let txn = match &mut self.journal {
                    Some(j) => Some(j.begin()?),
                    None => None,
                };
                let mut session = Session {
                    device: &mut self.device,
                    journal: self.journal.as_mut(),
                    txn,
                };
                session.write_block(inode.ei_block, table.encode())?;
                session.finish()?;

                Ok(Some(start + (iblock - ee_block)))
            }
            SearchResult::OutOfCapacity => Err(FsError::FileTooBig),
        }
    }

    /// Reads `len` bytes at `pos`. Unmapped regions read back as zero
    /// (spec §4.4's `read`).
    pub fn read(&mut self, inode: &mut DiskInode, pos: u64, len: usize) -> FsResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        let end = pos + len as u64;
        let mut off = pos;
        while off < end {
            let iblock = (off / BLOCK_SIZE as u64) as u32;
            let in_block_off = (off % BLOCK_SIZE as u64) as usize;
            let take = (BLOCK_SIZE - in_block_off).min((end - off) as usize);
            if let Some(phys) = self.get_block(inode, iblock, false)? {
                let block = self.device.read_block_owned(phys)?;
                let out_off = (off - pos) as usize;
                out[out_off..out_off + take].copy_from_slice(&block[in_block_off..in_block_off + take]);
            }
            off += take as u64;
        }
        Ok(out)
    }

    /// Writes `data` at `pos`, extending the file and allocating extents
    /// as needed (spec §4.4's `write_begin`/`write_end`, folded into one
    /// call since this core has no separate page-cache staging step).
    /// Data blocks are never journaled (ordered-data semantics): they are
    /// written straight to the main device before the metadata update
    /// that references them commits.
    pub fn write(&mut self, inode: &mut DiskInode, pos: u64, data: &[u8], now: u32) -> FsResult<usize> {
        let len = data.len();
        if pos + len as u64 > MAX_FILESIZE {
            return Err(FsError::FileTooBig);
        }
        let new_size = (pos + len as u64).max(inode.i_size as u64);
        let new_blocks = ceil_div(new_size, BLOCK_SIZE as u64) as u32;
        let current_blocks = inode.i_blocks.saturating_sub(1);
        if new_blocks > current_blocks {
            let additional = new_blocks - current_blocks;
            if additional > self.sb.block_bitmap.free_count() {
                return Err(FsError::NoSpace);
            }
        }

        let mut off = pos;
        let end = pos + len as u64;
        while off < end {
            let iblock = (off / BLOCK_SIZE as u64) as u32;
            let in_block_off = (off % BLOCK_SIZE as u64) as usize;
            let take = (BLOCK_SIZE - in_block_off).min((end - off) as usize);
            let phys = self
                .get_block(inode, iblock, true)?
                .expect("get_block with create=true always maps a block");

            let mut block = self.device.read_block_owned(phys)?;
            let src_off = (off - pos) as usize;
            block[in_block_off..in_block_off + take].copy_from_slice(&data[src_off..src_off + take]);
            self.device.write_block(phys, &block)?;

            off += take as u64;
        }

        inode.i_size = new_size as u32;
        inode.i_blocks = new_blocks + 1;
        inode.i_mtime = now;
        inode.i_ctime = now;
        Ok(len)
    }

    /// Shrinks or grows `inode` to `new_size`, releasing trailing extents
    /// on a shrink (spec §4.3's "Truncate to size"). Growing past the
    /// current size leaves the new range as a hole; nothing is allocated
    /// until it is written.
    pub fn truncate(&mut self, inode: &mut DiskInode, new_size: u32, now: u32) -> FsResult<()> {
        if new_size as u64 > MAX_FILESIZE {
            return Err(FsError::FileTooBig);
        }
        let new_blocks = ceil_div(new_size as u64, BLOCK_SIZE as u64) as u32;

        let mut table = ExtentTable::decode(&self.device.read_block_owned(inode.ei_block)?);
        let freed: Vec<Extent> = if new_blocks == 0 {
            let freed = table.extents.iter().copied().filter(Extent::is_used).collect();
            for e in table.extents.iter_mut() {
                *e = Extent::default();
            }
            freed
        } else {
            table.truncate_to(new_blocks - 1)
        };
        for e in &freed {
            self.sb.block_bitmap.free_run(e.ee_start, e.ee_len);
        }

        let txn = match &mut self.journal {
            Some(j) => Some(j.begin()?),
            None => None,
        };
        let mut session = Session {
            device: &mut self.device,
            journal: self.journal.as_mut(),
            txn,
        };
        session.write_block(inode.ei_block, table.encode())?;
        session.finish()?;

        inode.i_size = new_size;
        inode.i_blocks = new_blocks + 1;
        inode.i_mtime = now;
        inode.i_ctime = now;
        Ok(())
    }

    /// `open(O_TRUNC)`: frees every extent and resets the file to empty
    /// (spec §4.4). Exercised under the journal, so it is crash-safe.
    pub fn open_trunc(&mut self, inode: &mut DiskInode, now: u32) -> FsResult<()> {
        self.truncate(inode, 0, now)
    }
}
