//! The optional write-ahead journal (spec §4.8).
//!
//! The journal protects metadata buffers only: extent tables, bitmaps and
//! the superblock record. Data blocks are never journaled (ordered-data
//! semantics — callers must ensure data blocks reach the main device
//! before a transaction touching the inode that owns them commits).
//!
//! A transaction accumulates post-images of the metadata blocks it
//! touches. Nothing is written to the main device until [`Journal::commit`]
//! is called: the transaction's writes are first appended to the log and
//! flushed (the durable commit point), then checkpointed onto the main
//! device, then the log slot is marked checkpointed. If the process dies
//! between the durable commit point and the checkpoint, [`Journal::mount`]
//! replays the committed-but-unchecked slots it finds.

use crate::backend::{zero_block, Block, BlockDevice};
use crate::error::{FsError, FsResult};
use crate::layout::BLOCK_SIZE;
use std::collections::BTreeMap;

/// Maximum number of distinct metadata blocks one transaction may dirty.
pub const MAX_BLOCKS_PER_TXN: usize = 16;

/// Number of ring-buffer slots in the journal's log area.
pub const DEFAULT_JOURNAL_SLOTS: u32 = 8;

const HEADER_SEQ_OFF: usize = 0;
const HEADER_COUNT_OFF: usize = 8;
const HEADER_COMMITTED_OFF: usize = 12;
const HEADER_BLOCKS_OFF: usize = 16;

/// A set of metadata buffer pre-image/post-image pairs applied atomically
/// at commit time.
///
/// In this implementation only the post-image is retained: since nothing
/// reaches the main device before commit, discarding a transaction (simply
/// dropping it) is already a full rollback.
pub struct Transaction {
    writes: BTreeMap<u32, Box<Block>>,
}

impl Transaction {
    fn new() -> Self {
        Self {
            writes: BTreeMap::new(),
        }
    }

    /// Must precede any mutation of `blk`'s in-memory buffer. Returns the
    /// block's current content — either this transaction's own
    /// not-yet-committed post-image (read-your-own-writes) or, on first
    /// touch, the on-disk content.
    pub fn get_write_access<D: BlockDevice>(&mut self, device: &mut D, blk: u32) -> FsResult<Block> {
        if let Some(existing) = self.writes.get(&blk) {
            return Ok(**existing);
        }
        device.read_block_owned(blk)
    }

    /// Declares `data` as the post-image of `blk`, ready to commit.
    pub fn dirty_metadata(&mut self, blk: u32, data: Block) -> FsResult<()> {
        if self.writes.len() >= MAX_BLOCKS_PER_TXN && !self.writes.contains_key(&blk) {
            return Err(FsError::Journal("transaction too large".into()));
        }
        self.writes.insert(blk, Box::new(data));
        Ok(())
    }

    /// Reads `blk` through the transaction: the pending post-image if one
    /// exists, otherwise the on-disk content.
    pub fn read_through<D: BlockDevice>(&self, device: &mut D, blk: u32) -> FsResult<Block> {
        if let Some(existing) = self.writes.get(&blk) {
            Ok(**existing)
        } else {
            device.read_block_owned(blk)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// A write-ahead log of metadata buffer modifications, living on its own
/// [`BlockDevice`] (the same device as the main filesystem, or an external
/// one identified at mount time — spec §4.8, §6.3).
pub struct Journal<L: BlockDevice> {
    log: L,
    num_slots: u32,
    next_seq: u64,
}

fn slot_blocks() -> u32 {
    1 + MAX_BLOCKS_PER_TXN as u32
}

impl<L: BlockDevice> Journal<L> {
    /// Lays down a fresh, empty journal on `log`. Used by `mkfs`.
    pub fn format(mut log: L, num_slots: u32) -> FsResult<Self> {
        let empty = zero_block();
        for slot in 0..num_slots {
            log.write_block(slot * slot_blocks(), &empty)?;
        }
        log.flush()?;
        Ok(Self {
            log,
            num_slots,
            next_seq: 0,
        })
    }

    /// Opens an existing journal, replaying any committed-but-unchecked
    /// transaction onto `main` first.
    pub fn mount(mut log: L, num_slots: u32, main: &mut dyn BlockDevice) -> FsResult<Self> {
        let mut max_seq = 0u64;
        let mut pending = Vec::new();
        for slot in 0..num_slots {
            let slot_start = slot * slot_blocks();
            let header = log.read_block_owned(slot_start)?;
            let seq = read_u64(&header, HEADER_SEQ_OFF);
            let count = read_u32(&header, HEADER_COUNT_OFF);
            let committed = read_u32(&header, HEADER_COMMITTED_OFF);
            max_seq = max_seq.max(seq);
            if committed == 1 && count > 0 {
                let mut writes = Vec::new();
                for i in 0..count {
                    let blk = read_u32(&header, HEADER_BLOCKS_OFF + i as usize * 4);
                    let data = log.read_block_owned(slot_start + 1 + i)?;
                    writes.push((blk, data));
                }
                pending.push((seq, slot, writes));
            }
        }
        pending.sort_by_key(|(seq, _, _)| *seq);
        for (_, slot, writes) in pending {
            log::info!("journal: replaying committed transaction in slot {slot}");
            for (blk, data) in &writes {
                main.write_block(*blk, data)?;
            }
            main.flush()?;
            let slot_start = slot * slot_blocks();
            let mut header = log.read_block_owned(slot_start)?;
            write_u32(&mut header, HEADER_COMMITTED_OFF, 0);
            log.write_block(slot_start, &header)?;
        }
        log.flush()?;
        Ok(Self {
            log,
            num_slots,
            next_seq: max_seq + 1,
        })
    }

    /// Begins a new transaction.
    pub fn begin(&mut self) -> FsResult<Transaction> {
        Ok(Transaction::new())
    }

    /// Commits `txn`: writes it durably to the log, checkpoints it onto
    /// `main`, then marks the slot checkpointed.
    pub fn commit(&mut self, txn: Transaction, main: &mut dyn BlockDevice) -> FsResult<()> {
        if txn.is_empty() {
            return Ok(());
        }
        if txn.writes.len() > MAX_BLOCKS_PER_TXN {
            return Err(FsError::Journal("transaction too large".into()));
        }
        let slot = (self.next_seq % self.num_slots as u64) as u32;
        let slot_start = slot * slot_blocks();

        let mut header = zero_block();
        write_u64(&mut header, HEADER_SEQ_OFF, self.next_seq);
        write_u32(&mut header, HEADER_COUNT_OFF, txn.writes.len() as u32);
        write_u32(&mut header, HEADER_COMMITTED_OFF, 1);
        for (i, &blk) in txn.writes.keys().enumerate() {
            write_u32(&mut header, HEADER_BLOCKS_OFF + i * 4, blk);
        }
        self.log.write_block(slot_start, &header)?;
        for (i, data) in txn.writes.values().enumerate() {
            self.log.write_block(slot_start + 1 + i as u32, data)?;
        }
        self.log
            .flush()
            .map_err(|e| FsError::Journal(format!("commit record flush failed: {e}")))?;

        for (&blk, data) in txn.writes.iter() {
            main.write_block(blk, data)?;
        }
        main.flush()?;

        write_u32(&mut header, HEADER_COMMITTED_OFF, 0);
        self.log.write_block(slot_start, &header)?;
        self.log.flush()?;

        self.next_seq += 1;
        Ok(())
    }
}

fn read_u32(buf: &[u8; BLOCK_SIZE], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn read_u64(buf: &[u8; BLOCK_SIZE], off: usize) -> u64 {
    u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}

fn write_u32(buf: &mut [u8; BLOCK_SIZE], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn write_u64(buf: &mut [u8; BLOCK_SIZE], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemDevice;

    #[test]
    fn commit_checkpoints_onto_main_device() {
        let log = MemDevice::new(slot_blocks() * DEFAULT_JOURNAL_SLOTS);
        let mut main = MemDevice::new(16);
        let mut journal = Journal::format(log, DEFAULT_JOURNAL_SLOTS).unwrap();

        let mut txn = journal.begin().unwrap();
        let mut block = zero_block();
        block[0] = 0xAB;
        txn.dirty_metadata(3, block).unwrap();
        journal.commit(txn, &mut main).unwrap();

        let got = main.read_block_owned(3).unwrap();
        assert_eq!(got[0], 0xAB);
    }

    #[test]
    fn replay_applies_committed_but_unchecked_transaction() {
        let mut log = MemDevice::new(slot_blocks() * DEFAULT_JOURNAL_SLOTS);
        // Manually craft a committed, never-checkpointed slot 0.
        let mut header = zero_block();
        write_u64(&mut header, HEADER_SEQ_OFF, 0);
        write_u32(&mut header, HEADER_COUNT_OFF, 1);
        write_u32(&mut header, HEADER_COMMITTED_OFF, 1);
        write_u32(&mut header, HEADER_BLOCKS_OFF, 7);
        log.write_block(0, &header).unwrap();
        let mut data = zero_block();
        data[0] = 0xCD;
        log.write_block(1, &data).unwrap();

        let mut main = MemDevice::new(16);
        let _journal = Journal::mount(log, DEFAULT_JOURNAL_SLOTS, &mut main).unwrap();

        let got = main.read_block_owned(7).unwrap();
        assert_eq!(got[0], 0xCD);
    }

    #[test]
    fn dropping_a_transaction_without_commit_touches_nothing() {
        let log = MemDevice::new(slot_blocks() * DEFAULT_JOURNAL_SLOTS);
        let mut main = MemDevice::new(16);
        let mut journal = Journal::format(log, DEFAULT_JOURNAL_SLOTS).unwrap();

        let mut txn = journal.begin().unwrap();
        let mut block = zero_block();
        block[0] = 0xEE;
        txn.dirty_metadata(5, block).unwrap();
        drop(txn); // rollback

        let got = main.read_block_owned(5).unwrap();
        assert_eq!(got[0], 0);
    }
}
