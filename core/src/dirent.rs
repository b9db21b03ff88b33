//! Directory entry records and the slot arithmetic over them (spec §4.5).

use crate::backend::{zero_block, Block};
use crate::error::{FsError, FsResult};
use crate::layout::{FILENAME_LEN, FILES_PER_BLOCK, FILES_PER_EXT};

/// One directory entry: a filename-to-inode mapping. `inode == 0` marks an
/// unused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub name: [u8; FILENAME_LEN],
}

impl DirEntry {
    pub const ENCODED_SIZE: usize = 4 + FILENAME_LEN;

    pub fn free() -> Self {
        Self {
            inode: 0,
            name: [0; FILENAME_LEN],
        }
    }

    pub fn new(inode: u32, name: &str) -> FsResult<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > FILENAME_LEN {
            return Err(FsError::NameTooLong);
        }
        let mut packed = [0u8; FILENAME_LEN];
        packed[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            inode,
            name: packed,
        })
    }

    pub fn is_free(&self) -> bool {
        self.inode == 0
    }

    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn name_matches(&self, other: &str) -> bool {
        self.name_str() == other
    }

    fn decode(block: &Block, off: usize) -> Self {
        let inode = u32::from_le_bytes(block[off..off + 4].try_into().unwrap());
        let mut name = [0u8; FILENAME_LEN];
        name.copy_from_slice(&block[off + 4..off + 4 + FILENAME_LEN]);
        Self { inode, name }
    }

    fn encode_into(&self, block: &mut Block, off: usize) {
        block[off..off + 4].copy_from_slice(&self.inode.to_le_bytes());
        block[off + 4..off + 4 + FILENAME_LEN].copy_from_slice(&self.name);
    }
}

/// A directory data block: a dense array of [`DirEntry`] records.
#[derive(Clone)]
pub struct DirBlock {
    pub entries: Vec<DirEntry>,
}

impl DirBlock {
    pub fn empty() -> Self {
        Self {
            entries: vec![DirEntry::free(); FILES_PER_BLOCK],
        }
    }

    pub fn decode(block: &Block) -> Self {
        let entries = (0..FILES_PER_BLOCK)
            .map(|i| DirEntry::decode(block, i * DirEntry::ENCODED_SIZE))
            .collect();
        Self { entries }
    }

    pub fn encode(&self) -> Block {
        let mut block = zero_block();
        for (i, e) in self.entries.iter().enumerate() {
            e.encode_into(&mut block, i * DirEntry::ENCODED_SIZE);
        }
        block
    }
}

/// Decomposes a dense entry index `nr_files` into `(extent_index,
/// block_index_within_extent, slot_index_within_block)`, per spec §4.5.
pub fn decompose(nr_files: usize) -> (usize, usize, usize) {
    let ei = nr_files / FILES_PER_EXT;
    let rem = nr_files % FILES_PER_EXT;
    let bi = rem / FILES_PER_BLOCK;
    let fi = rem % FILES_PER_BLOCK;
    (ei, bi, fi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_too_long_is_rejected() {
        let long = "x".repeat(FILENAME_LEN + 1);
        assert!(matches!(DirEntry::new(1, &long), Err(FsError::NameTooLong)));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut block = DirBlock::empty();
        block.entries[2] = DirEntry::new(42, "hello.txt").unwrap();
        let raw = block.encode();
        let decoded = DirBlock::decode(&raw);
        assert_eq!(decoded.entries[2].inode, 42);
        assert_eq!(decoded.entries[2].name_str(), "hello.txt");
        assert!(decoded.entries[0].is_free());
    }

    #[test]
    fn decompose_matches_slot_arithmetic() {
        assert_eq!(decompose(0), (0, 0, 0));
        assert_eq!(decompose(FILES_PER_BLOCK), (0, 1, 0));
        assert_eq!(decompose(FILES_PER_EXT), (1, 0, 0));
    }
}
