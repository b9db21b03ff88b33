//! Offline formatter for `blockfs` images: lays down a fresh superblock,
//! bitmaps, inode table and root directory on a regular file or block
//! device (spec §6.2).

use blockfs::backend::FileDevice;
use blockfs::layout::BLOCK_SIZE;
use blockfs::mkfs;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::exit;
use std::time::{SystemTime, UNIX_EPOCH};

/// Creates a blockfs filesystem on a device or regular file.
#[derive(Parser)]
#[command(name = "mkfs.blockfs", version, about)]
struct Args {
    /// Path to the device or file to format.
    device_path: PathBuf,

    /// Number of blocks the image should have. Defaults to the current
    /// size of `device_path` divided by the block size.
    #[arg(short = 'b', long)]
    blocks: Option<u32>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&args.device_path)
        .unwrap_or_else(|e| {
            eprintln!("mkfs.blockfs: {}: {}", args.device_path.display(), e);
            exit(1);
        });

    let block_count = args.blocks.unwrap_or_else(|| {
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        (len / BLOCK_SIZE as u64) as u32
    });

    let mut device = FileDevice::new(file, block_count);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);

    if let Err(e) = mkfs::format(&mut device, now) {
        eprintln!(
            "mkfs.blockfs: {}: failed to create filesystem: {}",
            args.device_path.display(),
            e
        );
        exit(1);
    }

    log::info!(
        "formatted {} ({} blocks)",
        args.device_path.display(),
        block_count
    );
}
