//! On-disk constants and byte-exact record sizes (spec §3, §6.1).

/// Size of a block, in bytes. The device adaptor only ever reads/writes
/// whole blocks.
pub const BLOCK_SIZE: usize = 4096;

/// Magic number identifying a valid image (ASCII hexspeak "DEADCE11").
pub const MAGIC: u32 = 0xDEAD_CE11;

/// Maximum filename length, in bytes.
pub const FILENAME_LEN: usize = 255;

/// Every extent is a run of exactly this many blocks once allocated.
pub const EXTENT_BLOCKS: u32 = 8;

/// Size of one on-disk extent record: `ee_block, ee_len, ee_start` (u32 each).
pub const EXTENT_RECORD_SIZE: usize = 12;

/// Size of the extent table header (`nr_files: u32`).
pub const EXTENT_TABLE_HEADER_SIZE: usize = 4;

/// Number of extents that fit in one extent table block after the header.
pub const MAX_EXTENTS: usize = (BLOCK_SIZE - EXTENT_TABLE_HEADER_SIZE) / EXTENT_RECORD_SIZE;

/// Size of one on-disk directory entry record: `inode: u32, name: [u8; FILENAME_LEN]`.
pub const FILE_RECORD_SIZE: usize = 4 + FILENAME_LEN;

/// Number of directory entry records per data block.
pub const FILES_PER_BLOCK: usize = BLOCK_SIZE / FILE_RECORD_SIZE;

/// Number of directory entries addressable by a single fully-allocated extent.
pub const FILES_PER_EXT: usize = FILES_PER_BLOCK * EXTENT_BLOCKS as usize;

/// Maximum number of entries a directory may hold.
///
/// Resolved from `original_source/simplefs.h`'s `SIMPLEFS_MAX_SUBFILES`: the
/// distilled spec names the constant but does not give its value.
pub const MAX_SUBFILES: usize = 128;

/// Maximum file size representable by one extent table.
pub const MAX_FILESIZE: u64 = EXTENT_BLOCKS as u64 * BLOCK_SIZE as u64 * MAX_EXTENTS as u64;

/// Symlink targets up to this length are stored inline in the inode record.
pub const SYMLINK_INLINE_LEN: usize = 32;

/// Fixed size of one on-disk inode record.
pub const INODE_RECORD_SIZE: usize = 4 * 10 + SYMLINK_INLINE_LEN;

/// Number of inode records per inode-store block.
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_RECORD_SIZE;

/// Block number of the superblock.
pub const SUPERBLOCK_BLOCK: u32 = 0;

/// First block of the inode store.
pub const INODE_STORE_START: u32 = 1;

/// Inode number of the filesystem root.
pub const ROOT_INODE: u32 = 1;

/// File type bits, borrowed from the POSIX `S_IFMT` family used throughout
/// the data model's `i_mode` field.
pub mod mode {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFLNK: u32 = 0o120000;
}
