//! The per-inode extent index (`ei_block`, spec §4.3).
//!
//! Every regular file and directory owns one extent table block: a small
//! fixed-capacity array of extents (plus, for directories, a file count)
//! kept sorted by `ee_block`, where used extents form a prefix and are
//! contiguous in the logical address space.

use crate::backend::{zero_block, Block};
use crate::layout::{EXTENT_BLOCKS, EXTENT_RECORD_SIZE, EXTENT_TABLE_HEADER_SIZE, MAX_EXTENTS};

/// One extent: a contiguous run of physical blocks mapped to a contiguous
/// logical range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Extent {
    /// First logical block this extent covers.
    pub ee_block: u32,
    /// Length in blocks (at most `EXTENT_BLOCKS`).
    pub ee_len: u32,
    /// First physical block; `0` means the slot is unused.
    pub ee_start: u32,
}

impl Extent {
    pub fn is_used(&self) -> bool {
        self.ee_start != 0
    }

    /// Whether `iblock` falls within this extent's logical range.
    pub fn contains(&self, iblock: u32) -> bool {
        self.is_used() && iblock >= self.ee_block && iblock < self.ee_block + self.ee_len
    }
}

/// Outcome of [`ExtentTable::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// `iblock` is mapped by the extent at this slot.
    Mapped(usize),
    /// `iblock` is unmapped; this is the slot a new extent should occupy.
    InsertAt(usize),
    /// The table has no room for a new extent.
    OutOfCapacity,
}

/// The on-disk extent table: a 4 KiB block holding `nr_files` (directories
/// only) and the extent array.
#[derive(Clone)]
pub struct ExtentTable {
    pub nr_files: u32,
    pub extents: Vec<Extent>,
}

impl ExtentTable {
    /// A fresh, empty table.
    pub fn empty() -> Self {
        Self {
            nr_files: 0,
            extents: vec![Extent::default(); MAX_EXTENTS],
        }
    }

    /// Decodes a table from its on-disk block representation.
    pub fn decode(buf: &Block) -> Self {
        let nr_files = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let mut extents = Vec::with_capacity(MAX_EXTENTS);
        for i in 0..MAX_EXTENTS {
            let off = EXTENT_TABLE_HEADER_SIZE + i * EXTENT_RECORD_SIZE;
            let ee_block = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            let ee_len = u32::from_le_bytes(buf[off + 4..off + 8].try_into().unwrap());
            let ee_start = u32::from_le_bytes(buf[off + 8..off + 12].try_into().unwrap());
            extents.push(Extent {
                ee_block,
                ee_len,
                ee_start,
            });
        }
        Self { nr_files, extents }
    }

    /// Encodes the table back into a block.
    pub fn encode(&self) -> Block {
        let mut buf = zero_block();
        buf[0..4].copy_from_slice(&self.nr_files.to_le_bytes());
        for (i, e) in self.extents.iter().enumerate() {
            let off = EXTENT_TABLE_HEADER_SIZE + i * EXTENT_RECORD_SIZE;
            buf[off..off + 4].copy_from_slice(&e.ee_block.to_le_bytes());
            buf[off + 4..off + 8].copy_from_slice(&e.ee_len.to_le_bytes());
            buf[off + 8..off + 12].copy_from_slice(&e.ee_start.to_le_bytes());
        }
        buf
    }

    /// The number of used extents: the smallest index whose `ee_start==0`.
    /// Binary-searched under the invariant that used extents form a prefix.
    pub fn boundary(&self) -> usize {
        let mut lo = 0usize;
        let mut hi = self.extents.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.extents[mid].ee_start == 0 {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Locates the extent mapping `iblock`, or the insertion point for a
    /// new one, or reports the table is full.
    ///
    /// Note: the original `simplefs_ext_search` compares `iblock` against
    /// `end_len` (the length) rather than `ee_block + ee_len`; that is a
    /// bug. This implementation uses the corrected comparison (spec §9).
    pub fn search(&self, iblock: u32) -> SearchResult {
        let boundary = self.boundary();
        if boundary == 0 {
            return SearchResult::InsertAt(0);
        }
        let mut lo = 0usize;
        let mut hi = boundary;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let e = &self.extents[mid];
            if iblock < e.ee_block {
                hi = mid;
            } else if iblock >= e.ee_block + e.ee_len {
                lo = mid + 1;
            } else {
                return SearchResult::Mapped(mid);
            }
        }
        if boundary < self.extents.len() {
            SearchResult::InsertAt(boundary)
        } else {
            SearchResult::OutOfCapacity
        }
    }

    /// Installs a freshly-allocated extent at `slot`, chaining its
    /// `ee_block` onto the previous extent (or `0` at slot 0).
    pub fn install(&mut self, slot: usize, ee_start: u32) -> u32 {
        let ee_block = if slot == 0 {
            0
        } else {
            let prev = self.extents[slot - 1];
            prev.ee_block + prev.ee_len
        };
        self.extents[slot] = Extent {
            ee_block,
            ee_len: EXTENT_BLOCKS,
            ee_start,
        };
        ee_block
    }

    /// Computes which extents must be released to truncate the file down
    /// to `last_used_block` (the new `i_blocks - 1`), and zeroes their
    /// table entries. Returns the freed extents (physical start + length)
    /// for the caller to return to the block bitmap.
    pub fn truncate_to(&mut self, last_used_block: u32) -> Vec<Extent> {
        // A slot that maps `last_used_block` is kept whole (extents are
        // freed or kept as a unit, never split); freeing starts one slot
        // past it. A slot returned as an insertion point is already
        // unallocated, so freeing starts there directly.
        let first_ext = match self.search(last_used_block) {
            SearchResult::Mapped(slot) => slot + 1,
            SearchResult::InsertAt(slot) => slot,
            SearchResult::OutOfCapacity => return Vec::new(),
        };
        let mut freed = Vec::new();
        for slot in first_ext..self.extents.len() {
            if !self.extents[slot].is_used() {
                break;
            }
            freed.push(self.extents[slot]);
            self.extents[slot] = Extent::default();
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_empty_table_inserts_at_zero() {
        let t = ExtentTable::empty();
        assert_eq!(t.search(0), SearchResult::InsertAt(0));
    }

    #[test]
    fn search_finds_mapped_block() {
        let mut t = ExtentTable::empty();
        t.extents[0] = Extent {
            ee_block: 0,
            ee_len: 8,
            ee_start: 100,
        };
        t.extents[1] = Extent {
            ee_block: 8,
            ee_len: 8,
            ee_start: 200,
        };
        assert_eq!(t.search(0), SearchResult::Mapped(0));
        assert_eq!(t.search(7), SearchResult::Mapped(0));
        assert_eq!(t.search(8), SearchResult::Mapped(1));
        assert_eq!(t.search(15), SearchResult::Mapped(1));
        assert_eq!(t.search(16), SearchResult::InsertAt(2));
    }

    #[test]
    fn search_full_table_is_out_of_capacity() {
        let mut t = ExtentTable::empty();
        for (i, e) in t.extents.iter_mut().enumerate() {
            *e = Extent {
                ee_block: (i as u32) * EXTENT_BLOCKS,
                ee_len: EXTENT_BLOCKS,
                ee_start: (i as u32 + 1) * EXTENT_BLOCKS,
            };
        }
        let last = &t.extents[MAX_EXTENTS - 1];
        let past_end = last.ee_block + last.ee_len;
        assert_eq!(t.search(past_end), SearchResult::OutOfCapacity);
    }

    #[test]
    fn install_chains_ee_block_onto_previous_extent() {
        let mut t = ExtentTable::empty();
        let b0 = t.install(0, 50);
        assert_eq!(b0, 0);
        let b1 = t.install(1, 60);
        assert_eq!(b1, EXTENT_BLOCKS);
    }

    #[test]
    fn truncate_keeps_partially_used_last_extent() {
        let mut t = ExtentTable::empty();
        t.install(0, 100);
        // i_blocks - 1 == 3, inside the only extent (0..8) -> keep it
        let freed = t.truncate_to(3);
        assert!(freed.is_empty());
        assert!(t.extents[0].is_used());
    }

    #[test]
    fn truncate_frees_trailing_extents() {
        let mut t = ExtentTable::empty();
        t.install(0, 100);
        t.install(1, 200);
        // last used block is the final block of extent 0 (block 7)
        let freed = t.truncate_to(7);
        assert_eq!(freed.len(), 1);
        assert_eq!(freed[0].ee_start, 200);
        assert!(!t.extents[1].is_used());
        assert!(t.extents[0].is_used());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut t = ExtentTable::empty();
        t.nr_files = 3;
        t.install(0, 42);
        let buf = t.encode();
        let t2 = ExtentTable::decode(&buf);
        assert_eq!(t2.nr_files, 3);
        assert_eq!(t2.extents[0], t.extents[0]);
    }
}
