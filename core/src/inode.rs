//! The on-disk inode record and its in-memory counterpart (spec §3, §4.2).

use crate::backend::Block;
use crate::layout::{mode, SYMLINK_INLINE_LEN};

/// A file's type, derived from the high bits of `i_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
}

impl FileType {
    pub fn from_mode(m: u32) -> Option<Self> {
        match m & mode::S_IFMT {
            mode::S_IFREG => Some(Self::Regular),
            mode::S_IFDIR => Some(Self::Directory),
            mode::S_IFLNK => Some(Self::Symlink),
            _ => None,
        }
    }
}

/// The fixed-size on-disk inode record (spec §6.1).
#[derive(Debug, Clone, Copy)]
pub struct DiskInode {
    pub i_mode: u32,
    pub i_uid: u32,
    pub i_gid: u32,
    pub i_size: u32,
    pub i_ctime: u32,
    pub i_atime: u32,
    pub i_mtime: u32,
    pub i_blocks: u32,
    pub i_nlink: u32,
    /// Block holding this inode's extent table, if it is a file or
    /// directory. Unused (zero) for symlinks.
    pub ei_block: u32,
    /// Inline symlink target, used only when `file_type() == Symlink`.
    pub symlink_data: [u8; SYMLINK_INLINE_LEN],
}

impl DiskInode {
    pub const ENCODED_SIZE: usize = 4 * 10 + SYMLINK_INLINE_LEN;

    pub fn zeroed() -> Self {
        Self {
            i_mode: 0,
            i_uid: 0,
            i_gid: 0,
            i_size: 0,
            i_ctime: 0,
            i_atime: 0,
            i_mtime: 0,
            i_blocks: 0,
            i_nlink: 0,
            ei_block: 0,
            symlink_data: [0; SYMLINK_INLINE_LEN],
        }
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.i_mode)
    }

    pub fn is_free(&self) -> bool {
        self.i_mode == 0
    }

    /// Decodes one inode record from `block` at byte offset `off`.
    pub fn decode(block: &Block, off: usize) -> Self {
        let f = |o: usize| u32::from_le_bytes(block[off + o..off + o + 4].try_into().unwrap());
        let mut symlink_data = [0u8; SYMLINK_INLINE_LEN];
        let sd_off = off + 4 * 10;
        symlink_data.copy_from_slice(&block[sd_off..sd_off + SYMLINK_INLINE_LEN]);
        Self {
            i_mode: f(0),
            i_uid: f(4),
            i_gid: f(8),
            i_size: f(12),
            i_ctime: f(16),
            i_atime: f(20),
            i_mtime: f(24),
            i_blocks: f(28),
            i_nlink: f(32),
            ei_block: f(36),
            symlink_data,
        }
    }

    /// Encodes this record into `block` at byte offset `off`.
    pub fn encode_into(&self, block: &mut Block, off: usize) {
        let mut w = |o: usize, v: u32| block[off + o..off + o + 4].copy_from_slice(&v.to_le_bytes());
        w(0, self.i_mode);
        w(4, self.i_uid);
        w(8, self.i_gid);
        w(12, self.i_size);
        w(16, self.i_ctime);
        w(20, self.i_atime);
        w(24, self.i_mtime);
        w(28, self.i_blocks);
        w(32, self.i_nlink);
        w(36, self.ei_block);
        let sd_off = off + 4 * 10;
        block[sd_off..sd_off + SYMLINK_INLINE_LEN].copy_from_slice(&self.symlink_data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::zero_block;

    #[test]
    fn encode_decode_roundtrip() {
        let mut inode = DiskInode::zeroed();
        inode.i_mode = mode::S_IFREG | 0o644;
        inode.i_size = 13_000;
        inode.i_nlink = 1;
        inode.ei_block = 7;
        let mut block = zero_block();
        inode.encode_into(&mut block, 128);
        let decoded = DiskInode::decode(&block, 128);
        assert_eq!(decoded.i_mode, inode.i_mode);
        assert_eq!(decoded.i_size, 13_000);
        assert_eq!(decoded.ei_block, 7);
        assert_eq!(decoded.file_type(), Some(FileType::Regular));
    }
}
