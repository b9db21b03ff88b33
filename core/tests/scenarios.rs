//! End-to-end scenarios against an in-memory device (spec §8's concrete
//! scenario table, S1-S7).

use blockfs::layout::ROOT_INODE;
use blockfs::{mkfs, Fs, MemDevice};

fn fresh(blocks: u32) -> Fs<MemDevice> {
    let mut dev = MemDevice::new(blocks);
    mkfs::format(&mut dev, 1_700_000_000).unwrap();
    Fs::mount_no_journal(dev).unwrap()
}

#[test]
fn s1_fresh_image_readdir_root() {
    let mut fs = fresh(200);
    let root = fs.iget(ROOT_INODE).unwrap();
    let listing = fs.iterate(ROOT_INODE, ROOT_INODE, &root).unwrap();
    assert_eq!(listing, vec![(".".to_string(), ROOT_INODE), ("..".to_string(), ROOT_INODE)]);
}

#[test]
fn s2_create_allocates_inode_and_dirent() {
    let mut fs = fresh(200);
    let mut root = fs.iget(ROOT_INODE).unwrap();
    let free_blocks_before = fs.stat().free_blocks;

    let (ino, _a) = fs.create(&mut root, "a", 0o644, 1_700_000_001).unwrap();
    assert_eq!(ino, 2);

    let listing = fs.iterate(ROOT_INODE, ROOT_INODE, &root).unwrap();
    assert_eq!(listing.len(), 3); // ".", "..", "a"

    // The new file's own extent table block is charged, but it has no
    // data extent yet.
    assert_eq!(fs.stat().free_blocks, free_blocks_before - 1);
    let a = fs.iget(ino).unwrap();
    assert_eq!(a.i_blocks, 1);
    assert_eq!(a.i_size, 0);
}

#[test]
fn s3_write_allocates_one_extent_and_reads_back() {
    let mut fs = fresh(200);
    let mut root = fs.iget(ROOT_INODE).unwrap();
    let (ino, mut a) = fs.create(&mut root, "a", 0o644, 1_700_000_001).unwrap();

    let data = vec![0xABu8; 13_000];
    let n = fs.write(&mut a, 0, &data, 1_700_000_002).unwrap();
    assert_eq!(n, 13_000);
    assert_eq!(a.i_size, 13_000);
    assert_eq!(a.i_blocks, 4); // 3 data blocks (ceil(13000/4096)) + 1 extent table

    let back = fs.read(&mut a, 0, 13_000).unwrap();
    assert_eq!(back, data);

    // One 8-block extent was allocated at ee_block=0 to cover 3 logical
    // blocks; get_block for block 3 (unwritten, still inside the extent)
    // must resolve without allocating a second extent.
    let phys0 = fs.get_block(&mut a, 0, false).unwrap().unwrap();
    let phys2 = fs.get_block(&mut a, 2, false).unwrap().unwrap();
    assert_eq!(phys2, phys0 + 2);
}

#[test]
fn s4_truncate_keeps_partially_used_extent() {
    let mut fs = fresh(200);
    let mut root = fs.iget(ROOT_INODE).unwrap();
    let (_ino, mut a) = fs.create(&mut root, "a", 0o644, 1_700_000_001).unwrap();
    fs.write(&mut a, 0, &vec![0xABu8; 13_000], 1_700_000_002).unwrap();

    let free_blocks_before = fs.stat().free_blocks;
    fs.truncate(&mut a, 3_000, 1_700_000_003).unwrap();

    assert_eq!(a.i_size, 3_000);
    assert_eq!(a.i_blocks, 2); // 1 data block + 1 extent table
    // The 8-block extent covering blocks 0..7 is kept whole: block 0 is
    // still referenced, so none of its 8 blocks return to the free pool.
    assert_eq!(fs.stat().free_blocks, free_blocks_before);
    assert!(fs.get_block(&mut a, 0, false).unwrap().is_some());
}

#[test]
fn s5_unlink_frees_inode_extent_and_data_blocks() {
    let mut fs = fresh(200);
    let mut root = fs.iget(ROOT_INODE).unwrap();
    let (ino, mut a) = fs.create(&mut root, "a", 0o644, 1_700_000_001).unwrap();
    fs.write(&mut a, 0, &vec![0xABu8; 13_000], 1_700_000_002).unwrap();

    let free_blocks_before_unlink = fs.stat().free_blocks;
    fs.unlink(ROOT_INODE, &mut root, "a", 1_700_000_003).unwrap();

    // Extent table block (1) + 8 data blocks (the one allocated extent)
    // all return to the free pool.
    assert_eq!(fs.stat().free_blocks, free_blocks_before_unlink + 1 + 8);

    let listing = fs.iterate(ROOT_INODE, ROOT_INODE, &root).unwrap();
    assert_eq!(listing.len(), 2);
    assert!(fs.lookup(&root, "a").unwrap().is_none());

    let freed = fs.iget(ino).unwrap();
    assert_eq!(freed.i_mode, 0);
}

#[test]
fn s6_rename_in_place_preserves_other_entries() {
    let mut fs = fresh(400);
    let mut root = fs.iget(ROOT_INODE).unwrap();
    for i in 0..40 {
        fs.create(&mut root, &format!("f{i}"), 0o644, 1_700_000_000 + i as u32).unwrap();
    }

    fs.rename(ROOT_INODE, &mut root, "f17", ROOT_INODE, &mut root.clone(), "z", 0, 1_700_001_000)
        .unwrap();

    let listing = fs.iterate(ROOT_INODE, ROOT_INODE, &root).unwrap();
    let real: Vec<_> = listing.into_iter().skip(2).collect();
    assert_eq!(real.len(), 40);
    assert!(real.iter().any(|(name, _)| name == "z"));
    assert!(!real.iter().any(|(name, _)| name == "f17"));
    for i in (0..40).filter(|&i| i != 17) {
        assert!(real.iter().any(|(name, _)| *name == format!("f{i}")));
    }
}

#[test]
fn s7_rename_across_directories_compacts_source() {
    let mut fs = fresh(400);
    let mut root = fs.iget(ROOT_INODE).unwrap();
    let (d1_ino, mut d1) = fs.mkdir(ROOT_INODE, &mut root, "d1", 0o755, 1_700_000_000).unwrap();
    let (d2_ino, mut d2) = fs.mkdir(ROOT_INODE, &mut root, "d2", 0o755, 1_700_000_001).unwrap();
    for i in 0..40 {
        fs.create(&mut d1, &format!("f{i}"), 0o644, 1_700_000_100 + i as u32).unwrap();
    }

    fs.rename(d1_ino, &mut d1, "f0", d2_ino, &mut d2, "f0", 0, 1_700_002_000).unwrap();

    let d1_listing = fs.iterate(d1_ino, ROOT_INODE, &d1).unwrap();
    assert_eq!(d1_listing.len() - 2, 39);
    assert!(!d1_listing.iter().any(|(name, _)| name == "f0"));

    let d2_listing = fs.iterate(d2_ino, ROOT_INODE, &d2).unwrap();
    assert_eq!(d2_listing.len() - 2, 1);
    assert!(d2_listing.iter().any(|(name, _)| name == "f0"));
}

#[test]
fn create_then_unlink_restores_bitmap_and_dir_state() {
    let mut fs = fresh(200);
    let mut root = fs.iget(ROOT_INODE).unwrap();
    let before = fs.stat();
    let before_listing = fs.iterate(ROOT_INODE, ROOT_INODE, &root).unwrap();

    fs.create(&mut root, "tmp", 0o644, 1_700_000_001).unwrap();
    fs.unlink(ROOT_INODE, &mut root, "tmp", 1_700_000_002).unwrap();

    let after = fs.stat();
    assert_eq!(after.free_blocks, before.free_blocks);
    assert_eq!(after.free_inodes, before.free_inodes);
    let after_listing = fs.iterate(ROOT_INODE, ROOT_INODE, &root).unwrap();
    assert_eq!(after_listing, before_listing);
}

#[test]
fn writing_past_max_filesize_fails() {
    use blockfs::layout::MAX_FILESIZE;
    let mut fs = fresh(200);
    let mut root = fs.iget(ROOT_INODE).unwrap();
    let (_ino, mut a) = fs.create(&mut root, "big", 0o644, 1_700_000_001).unwrap();
    let err = fs.write(&mut a, MAX_FILESIZE, &[0u8; 1], 1_700_000_002).unwrap_err();
    assert!(matches!(err, blockfs::FsError::FileTooBig));
}

#[test]
fn too_many_subfiles_rejected() {
    use blockfs::layout::MAX_SUBFILES;
    let mut fs = fresh(4000);
    let mut root = fs.iget(ROOT_INODE).unwrap();
    for i in 0..MAX_SUBFILES {
        fs.create(&mut root, &format!("f{i}"), 0o644, 1_700_000_000).unwrap();
    }
    let err = fs.create(&mut root, "one_too_many", 0o644, 1_700_000_000).unwrap_err();
    assert!(matches!(err, blockfs::FsError::TooManyLinks));
}
