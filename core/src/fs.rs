//! The filesystem object: ties the bitmap allocator, inode store, extent
//! index, directory engine and journal together behind one API surface
//! (spec §2, §9's `FsBackend` design note).
//!
//! Serialization is the caller's responsibility (spec §5): the hosting
//! VFS is expected to hold a per-inode lock across any metadata-mutating
//! call here, the same way it would around any other filesystem driver.

use crate::backend::{Block, BlockDevice, FileDevice};
use crate::error::{FsError, FsResult};
use crate::journal::{Journal, Transaction, DEFAULT_JOURNAL_SLOTS};
use crate::layout::BLOCK_SIZE;
use crate::mount::MountOptions;
use crate::superblock::{Statfs, SuperblockState};
use std::fs::OpenOptions;

/// Where the journal lives, if attached at all (spec §4.8, §6.3).
pub enum JournalConfig {
    /// No journal: mutating operations write straight to the main device
    /// and rely on its own write-back ordering. Crash safety degrades to
    /// "may leak blocks or orphan inodes" (spec §9).
    None,
    /// The journal lives on a separate device, resolved by the caller
    /// from `journal_dev=`/`journal_path=` (spec §6.3).
    External(Box<dyn BlockDevice>),
}

/// The mounted filesystem.
pub struct Fs<D: BlockDevice + 'static> {
    pub(crate) device: D,
    pub(crate) journal: Option<Journal<Box<dyn BlockDevice>>>,
    pub(crate) sb: SuperblockState,
}

impl BlockDevice for Box<dyn BlockDevice> {
    fn block_count(&self) -> u32 {
        (**self).block_count()
    }
    fn read_block(&mut self, blk: u32, buf: &mut Block) -> FsResult<()> {
        (**self).read_block(blk, buf)
    }
    fn write_block(&mut self, blk: u32, buf: &Block) -> FsResult<()> {
        (**self).write_block(blk, buf)
    }
    fn flush(&mut self) -> FsResult<()> {
        (**self).flush()
    }
}

/// A live transaction-or-direct-write scope for one metadata-mutating
/// operation. When no journal is attached this degenerates to writing
/// straight through to the main device (spec §9's "journal optionality").
pub(crate) struct Session<'a, D: BlockDevice> {
    pub(crate) device: &'a mut D,
    pub(crate) journal: Option<&'a mut Journal<Box<dyn BlockDevice>>>,
    pub(crate) txn: Option<Transaction>,
}

impl<'a, D: BlockDevice> Session<'a, D> {
    pub fn read_block(&mut self, blk: u32) -> FsResult<Block> {
        match &self.txn {
            Some(txn) => txn.read_through(&mut *self.device, blk),
            None => self.device.read_block_owned(blk),
        }
    }

    pub fn write_block(&mut self, blk: u32, data: Block) -> FsResult<()> {
        match &mut self.txn {
            Some(txn) => txn.dirty_metadata(blk, data),
            None => self.device.write_block(blk, &data),
        }
    }

    pub fn finish(self) -> FsResult<()> {
        match (self.journal, self.txn) {
            (Some(journal), Some(txn)) => journal.commit(txn, self.device),
            _ => Ok(()),
        }
    }
}

impl<D: BlockDevice + 'static> Fs<D> {
    pub(crate) fn begin_session(&mut self) -> FsResult<Session<'_, D>> {
        let txn = match &mut self.journal {
            Some(j) => Some(j.begin()?),
            None => None,
        };
        Ok(Session {
            device: &mut self.device,
            journal: self.journal.as_mut(),
            txn,
        })
    }

    /// Mounts an already-formatted image, optionally attaching a journal.
    pub fn mount(mut device: D, journal_cfg: JournalConfig) -> FsResult<Self> {
        let sb = SuperblockState::mount(&mut device)?;
        let journal = match journal_cfg {
            JournalConfig::None => None,
            JournalConfig::External(log) => {
                Some(Journal::mount(log, DEFAULT_JOURNAL_SLOTS, &mut device)?)
            }
        };
        Ok(Self {
            device,
            journal,
            sb,
        })
    }

    /// Mounts without ever attaching a journal.
    pub fn mount_no_journal(device: D) -> FsResult<Self> {
        Self::mount(device, JournalConfig::None)
    }

    /// Mounts `device`, resolving `opts` into a [`JournalConfig`] the way a
    /// real mount syscall would (spec §6.3).
    ///
    /// Only `journal_path=` is actionable here: it names a regular file this
    /// process can open directly as the journal's `FileDevice`. `journal_dev=`
    /// names a raw device number, which this userspace core has no device
    /// table to resolve; it is parsed by [`MountOptions`] but otherwise
    /// ignored by this constructor. Callers that do have such a table (e.g.
    /// a VFS built on this core) should resolve it themselves and call
    /// [`Fs::mount`] with the resulting [`JournalConfig::External`] instead.
    pub fn mount_with_options(device: D, opts: &MountOptions) -> FsResult<Self> {
        let journal_cfg = match &opts.journal_path {
            Some(path) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(path)
                    .map_err(FsError::Io)?;
                let block_count = (file.metadata().map_err(FsError::Io)?.len() / BLOCK_SIZE as u64) as u32;
                JournalConfig::External(Box::new(FileDevice::new(file, block_count)))
            }
            None => JournalConfig::None,
        };
        Self::mount(device, journal_cfg)
    }

    /// `sync_fs`: rewrites the superblock and flushes both bitmaps (spec
    /// §4.7).
    pub fn sync(&mut self) -> FsResult<()> {
        self.sb.sync(&mut self.device)?;
        self.device.flush()
    }

    /// `statfs`-style query (SPEC_FULL.md supplemented feature).
    pub fn stat(&self) -> Statfs {
        self.sb.stat()
    }

    /// Whether a journal is currently attached.
    pub fn has_journal(&self) -> bool {
        self.journal.is_some()
    }

    /// Syncs and releases the device (and journal, if any). Spec §4.7's
    /// unmount: "sync and drop all caches; if a journal is attached,
    /// destroy it cleanly first."
    pub fn unmount(mut self) -> FsResult<D> {
        self.sync()?;
        drop(self.journal.take());
        Ok(self.device)
    }
}
