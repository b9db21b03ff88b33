//! The directory engine: lookup, insertion, compacting removal and rename
//! over a directory's extent-mapped entry array (spec §4.5), plus the
//! link/unlink/mkdir/rmdir/symlink operations built on top of it
//! (spec §4.6, SPEC_FULL.md supplemented features).

use crate::backend::BlockDevice;
use crate::dirent::{decompose, DirBlock, DirEntry};
use crate::error::{FsError, FsResult};
use crate::extent::ExtentTable;
use crate::fs::{Fs, Session};
use crate::inode::{DiskInode, FileType};
use crate::layout::{mode, EXTENT_BLOCKS, MAX_SUBFILES, SYMLINK_INLINE_LEN};

/// Reject these `rename` flags outright (spec §4.5: "Reject
/// `RENAME_EXCHANGE` and `RENAME_WHITEOUT` (unsupported)").
pub const RENAME_NOREPLACE: u32 = 1 << 0;
pub const RENAME_EXCHANGE: u32 = 1 << 1;
pub const RENAME_WHITEOUT: u32 = 1 << 2;

fn dir_entry_block(table: &ExtentTable, ei: usize, bi: usize) -> FsResult<u32> {
    let e = table.extents.get(ei).copied().ok_or(FsError::OutOfRange)?;
    if !e.is_used() {
        return Err(FsError::OutOfRange);
    }
    Ok(e.ee_start + bi as u32)
}

fn read_dir_entry<D: BlockDevice>(session: &mut Session<D>, table: &ExtentTable, idx: usize) -> FsResult<DirEntry> {
    let (ei, bi, fi) = decompose(idx);
    let blk = dir_entry_block(table, ei, bi)?;
    let block = session.read_block(blk)?;
    Ok(DirBlock::decode(&block).entries[fi])
}

fn write_dir_entry<D: BlockDevice>(
    session: &mut Session<D>,
    table: &ExtentTable,
    idx: usize,
    entry: DirEntry,
) -> FsResult<()> {
    let (ei, bi, fi) = decompose(idx);
    let blk = dir_entry_block(table, ei, bi)?;
    let mut dirblock = DirBlock::decode(&session.read_block(blk)?);
    dirblock.entries[fi] = entry;
    session.write_block(blk, dirblock.encode())
}

fn require_dir(inode: &DiskInode) -> FsResult<()> {
    if inode.file_type() != Some(FileType::Directory) {
        return Err(FsError::NotDirectory);
    }
    Ok(())
}

impl<D: BlockDevice + 'static> Fs<D> {
    /// Emits the full directory listing: a synthetic `.`/`..` pair followed
    /// by the densely-packed entries (spec §4.5's `iterate`).
    pub fn iterate(&mut self, dir_ino: u32, parent_ino: u32, dir: &DiskInode) -> FsResult<Vec<(String, u32)>> {
        require_dir(dir)?;
        let mut out = vec![(".".to_string(), dir_ino), ("..".to_string(), parent_ino)];
        let table = ExtentTable::decode(&self.device.read_block_owned(dir.ei_block)?);
        for idx in 0..table.nr_files as usize {
            let (ei, bi, fi) = decompose(idx);
            let blk = dir_entry_block(&table, ei, bi)?;
            let block = self.device.read_block_owned(blk)?;
            let entry = DirBlock::decode(&block).entries[fi];
            out.push((entry.name_str(), entry.inode));
        }
        Ok(out)
    }

    /// Finds `name` in `dir`, returning its inode number if present.
    pub fn lookup(&mut self, dir: &DiskInode, name: &str) -> FsResult<Option<u32>> {
        require_dir(dir)?;
        let table = ExtentTable::decode(&self.device.read_block_owned(dir.ei_block)?);
        for idx in 0..table.nr_files as usize {
            let (ei, bi, fi) = decompose(idx);
            let blk = dir_entry_block(&table, ei, bi)?;
            let block = self.device.read_block_owned(blk)?;
            let entry = DirBlock::decode(&block).entries[fi];
            if entry.name_matches(name) {
                return Ok(Some(entry.inode));
            }
        }
        Ok(None)
    }

    /// Appends `{ino, name}` to `dir`'s entry array (spec §4.5's `insert`).
    pub fn insert(&mut self, dir: &mut DiskInode, name: &str, ino: u32, now: u32) -> FsResult<()> {
        require_dir(dir)?;
        let entry = DirEntry::new(ino, name)?;

        let txn = match &mut self.journal {
            Some(j) => Some(j.begin()?),
            None => None,
        };
        let mut session = Session {
            device: &mut self.device,
            journal: self.journal.as_mut(),
            txn,
        };

        let mut table = ExtentTable::decode(&session.read_block(dir.ei_block)?);
        if table.nr_files as usize >= MAX_SUBFILES {
            return Err(FsError::TooManyLinks);
        }
        for idx in 0..table.nr_files as usize {
            if read_dir_entry(&mut session, &table, idx)?.name_matches(name) {
                return Err(FsError::AlreadyExists);
            }
        }

        let idx = table.nr_files as usize;
        let (ei, _, _) = decompose(idx);
        if !table.extents[ei].is_used() {
            let start = self.sb.block_bitmap.alloc_run(EXTENT_BLOCKS);
            if start == 0 {
                return Err(FsError::NoSpace);
            }
            table.install(ei, start);
        }

        write_dir_entry(&mut session, &table, idx, entry)?;
        table.nr_files += 1;
        session.write_block(dir.ei_block, table.encode())?;
        session.finish()?;

        dir.i_mtime = now;
        dir.i_blocks = 1 + table.boundary() as u32 * EXTENT_BLOCKS;
        dir.i_size = dir.i_blocks.saturating_sub(1) * crate::layout::BLOCK_SIZE as u32;
        Ok(())
    }

    /// Removes `name` from `dir`, compacting every entry above it down by
    /// one slot (spec §4.5's `remove`). Returns the removed inode number.
    pub fn remove(&mut self, dir: &mut DiskInode, name: &str, now: u32) -> FsResult<u32> {
        require_dir(dir)?;

        let txn = match &mut self.journal {
            Some(j) => Some(j.begin()?),
            None => None,
        };
        let mut session = Session {
            device: &mut self.device,
            journal: self.journal.as_mut(),
            txn,
        };

        let mut table = ExtentTable::decode(&session.read_block(dir.ei_block)?);
        let nr_files = table.nr_files as usize;
        let mut found = None;
        for idx in 0..nr_files {
            let e = read_dir_entry(&mut session, &table, idx)?;
            if e.name_matches(name) {
                found = Some((idx, e.inode));
                break;
            }
        }
        let (pos, removed_ino) = found.ok_or(FsError::NotFound)?;

        for idx in pos..nr_files - 1 {
            let next = read_dir_entry(&mut session, &table, idx + 1)?;
            write_dir_entry(&mut session, &table, idx, next)?;
        }
        write_dir_entry(&mut session, &table, nr_files - 1, DirEntry::free())?;
        table.nr_files -= 1;
        session.write_block(dir.ei_block, table.encode())?;
        session.finish()?;

        dir.i_mtime = now;
        Ok(removed_ino)
    }

    /// Renames `old_name` in `old_dir` to `new_name` in `new_dir`. When
    /// `old_dir` and `new_dir` are the same directory, pass the same
    /// inode number for `old_dir_ino`/`new_dir_ino`; the rewrite happens
    /// in place. Both mutations commit as a single journal transaction.
    pub fn rename(
        &mut self,
        old_dir_ino: u32,
        old_dir: &mut DiskInode,
        old_name: &str,
        new_dir_ino: u32,
        new_dir: &mut DiskInode,
        new_name: &str,
        flags: u32,
        now: u32,
    ) -> FsResult<()> {
        require_dir(old_dir)?;
        require_dir(new_dir)?;
        if flags & (RENAME_EXCHANGE | RENAME_WHITEOUT) != 0 {
            return Err(FsError::InvalidArgument);
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

        if old_dir_ino == new_dir_ino {
            let table = ExtentTable::decode(&session.read_block(old_dir.ei_block)?);
            let nr_files = table.nr_files as usize;
            let mut old_pos = None;
            for idx in 0..nr_files {
                let e = read_dir_entry(&mut session, &table, idx)?;
                if e.name_matches(old_name) {
                    old_pos = Some(idx);
                } else if e.name_matches(new_name) {
                    return Err(FsError::AlreadyExists);
                }
            }
            let pos = old_pos.ok_or(FsError::NotFound)?;
            let existing = read_dir_entry(&mut session, &table, pos)?;
            let renamed = DirEntry::new(existing.inode, new_name)?;
            write_dir_entry(&mut session, &table, pos, renamed)?;
            session.finish()?;
            old_dir.i_mtime = now;
            return Ok(());
        }

        let mut new_table = ExtentTable::decode(&session.read_block(new_dir.ei_block)?);
        for idx in 0..new_table.nr_files as usize {
            if read_dir_entry(&mut session, &new_table, idx)?.name_matches(new_name) {
                return Err(FsError::AlreadyExists);
            }
        }
        if new_table.nr_files as usize >= MAX_SUBFILES {
            return Err(FsError::TooManyLinks);
        }

        let mut old_table = ExtentTable::decode(&session.read_block(old_dir.ei_block)?);
        let mut old_pos = None;
        let mut moved_ino = 0u32;
        for idx in 0..old_table.nr_files as usize {
            let e = read_dir_entry(&mut session, &old_table, idx)?;
            if e.name_matches(old_name) {
                old_pos = Some(idx);
                moved_ino = e.inode;
                break;
            }
        }
        let old_pos = old_pos.ok_or(FsError::NotFound)?;
        let new_entry = DirEntry::new(moved_ino, new_name)?;

        let new_idx = new_table.nr_files as usize;
        let (ei, _, _) = decompose(new_idx);
        if !new_table.extents[ei].is_used() {
            let start = self.sb.block_bitmap.alloc_run(EXTENT_BLOCKS);
            if start == 0 {
                return Err(FsError::NoSpace);
            }
            new_table.install(ei, start);
        }
        write_dir_entry(&mut session, &new_table, new_idx, new_entry)?;
        new_table.nr_files += 1;
        session.write_block(new_dir.ei_block, new_table.encode())?;

        let old_nr_files = old_table.nr_files as usize;
        for idx in old_pos..old_nr_files - 1 {
            let next = read_dir_entry(&mut session, &old_table, idx + 1)?;
            write_dir_entry(&mut session, &old_table, idx, next)?;
        }
        write_dir_entry(&mut session, &old_table, old_nr_files - 1, DirEntry::free())?;
        old_table.nr_files -= 1;
        session.write_block(old_dir.ei_block, old_table.encode())?;

        session.finish()?;
        old_dir.i_mtime = now;
        new_dir.i_mtime = now;
        new_dir.i_blocks = 1 + new_table.boundary() as u32 * EXTENT_BLOCKS;
        new_dir.i_size = new_dir.i_blocks.saturating_sub(1) * crate::layout::BLOCK_SIZE as u32;
        Ok(())
    }

    /// Creates a regular file entry (spec §8's `create`).
    pub fn create(&mut self, parent: &mut DiskInode, name: &str, perm: u32, now: u32) -> FsResult<(u32, DiskInode)> {
        let (ino, inode) = self.new_inode(parent, mode::S_IFREG | (perm & 0o7777), now)?;
        if let Err(e) = self.insert(parent, name, ino, now) {
            if let Err(cleanup_err) = self.free_inode_and_extent(ino, &inode) {
                log::warn!("create: failed to roll back inode {ino} after insert failure: {cleanup_err}");
            }
            return Err(e);
        }
        Ok((ino, inode))
    }

    /// Creates a subdirectory (SPEC_FULL.md's supplemented `mkdir`,
    /// complementing the spec's `rmdir`).
    pub fn mkdir(
        &mut self,
        parent_ino: u32,
        parent: &mut DiskInode,
        name: &str,
        perm: u32,
        now: u32,
    ) -> FsResult<(u32, DiskInode)> {
        require_dir(parent)?;
        let (ino, child) = self.new_inode(parent, mode::S_IFDIR | (perm & 0o7777), now)?;
        if let Err(e) = self.insert(parent, name, ino, now) {
            if let Err(cleanup_err) = self.free_inode_and_extent(ino, &child) {
                log::warn!("mkdir: failed to roll back inode {ino} after insert failure: {cleanup_err}");
            }
            return Err(e);
        }
        parent.i_nlink += 1;
        self.write_inode(parent_ino, parent)?;
        Ok((ino, child))
    }

    /// Removes an empty subdirectory: `nr_files == 0` and `nlink == 2`
    /// (spec §4.5's `rmdir`).
    pub fn rmdir(&mut self, parent_ino: u32, parent: &mut DiskInode, name: &str, now: u32) -> FsResult<()> {
        require_dir(parent)?;
        let child_ino = self.lookup(parent, name)?.ok_or(FsError::NotFound)?;
        let child = self.iget(child_ino)?;
        require_dir(&child)?;

        let child_table = ExtentTable::decode(&self.device.read_block_owned(child.ei_block)?);
        if child_table.nr_files != 0 || child.i_nlink != 2 {
            return Err(FsError::NotEmpty);
        }

        self.remove(parent, name, now)?;
        parent.i_nlink -= 1;
        self.write_inode(parent_ino, parent)?;

        self.free_inode_and_extent(child_ino, &child)
    }

    /// Removes a non-directory entry, decrementing the target's `nlink`
    /// and releasing it once the last link is gone (spec §4.6).
    pub fn unlink(&mut self, parent_ino: u32, parent: &mut DiskInode, name: &str, now: u32) -> FsResult<()> {
        let ino = self.lookup(parent, name)?.ok_or(FsError::NotFound)?;
        let mut inode = self.iget(ino)?;
        if inode.file_type() == Some(FileType::Directory) {
            return Err(FsError::NotDirectory);
        }

        self.remove(parent, name, now)?;
        self.write_inode(parent_ino, parent)?;

        inode.i_nlink = inode.i_nlink.saturating_sub(1);
        if inode.i_nlink == 0 {
            self.free_inode_and_extent(ino, &inode)
        } else {
            self.write_inode(ino, &inode)
        }
    }

    /// Adds a second name for an existing non-directory inode
    /// (SPEC_FULL.md's supplemented `link`).
    pub fn link(&mut self, parent: &mut DiskInode, name: &str, target_ino: u32, now: u32) -> FsResult<()> {
        let mut target = self.iget(target_ino)?;
        if target.file_type() == Some(FileType::Directory) {
            return Err(FsError::NotDirectory);
        }
        if target.i_nlink == u32::MAX {
            return Err(FsError::TooManyLinks);
        }
        self.insert(parent, name, target_ino, now)?;
        target.i_nlink += 1;
        self.write_inode(target_ino, &target)
    }

    /// Creates a symlink whose target is stored inline in the inode
    /// (SPEC_FULL.md's supplemented `symlink`).
    pub fn symlink(&mut self, parent: &mut DiskInode, name: &str, target: &str, now: u32) -> FsResult<(u32, DiskInode)> {
        if target.len() > SYMLINK_INLINE_LEN {
            return Err(FsError::NameTooLong);
        }
        let (ino, mut inode) = self.new_inode(parent, mode::S_IFLNK | 0o777, now)?;
        let bytes = target.as_bytes();
        inode.symlink_data[..bytes.len()].copy_from_slice(bytes);
        inode.i_size = bytes.len() as u32;
        self.write_inode(ino, &inode)?;
        if let Err(e) = self.insert(parent, name, ino, now) {
            if let Err(cleanup_err) = self.free_inode_and_extent(ino, &inode) {
                log::warn!("symlink: failed to roll back inode {ino} after insert failure: {cleanup_err}");
            }
            return Err(e);
        }
        Ok((ino, inode))
    }
}
