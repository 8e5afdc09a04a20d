mod common;

use common::*;
use snap_fs::{BlockUsage, FileId, SnapFileSystem, SnapshotKind, BLOCK_SIZE};

/// 交替向两个文件写入整块，制造交错的块布局
fn interleave(sfs: &mut SnapFileSystem, a: FileId, b: FileId, blocks: usize) -> (Vec<u8>, Vec<u8>) {
    let da = pattern(11, blocks * BLOCK_SIZE);
    let db = pattern(97, blocks * BLOCK_SIZE);
    for i in 0..blocks {
        let range = i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE;
        sfs.write(a, &da[range.clone()], range.start).unwrap();
        sfs.write(b, &db[range.clone()], range.start).unwrap();
    }
    (da, db)
}

fn contiguous(blocks: &[u32]) -> bool {
    blocks.windows(2).all(|w| w[1] == w[0] + 1)
}

#[test]
fn interleaved_files_become_contiguous() {
    let (_, mut sfs) = format(128);
    let a = sfs.create("/a").unwrap();
    let b = sfs.create("/b").unwrap();
    let (da, db) = interleave(&mut sfs, a, b, 10);
    assert!(!contiguous(&sfs.file_blocks(a).unwrap()));

    let free = free_blocks(&mut sfs);
    assert!(sfs.defragment().unwrap() > 0);

    let blocks = sfs.file_blocks(a).unwrap();
    assert_eq!(blocks[0], 4);
    assert!(contiguous(&blocks));
    assert!(contiguous(&sfs.file_blocks(b).unwrap()));
    assert_eq!(read_all(&mut sfs, a), da);
    assert_eq!(read_all(&mut sfs, b), db);
    assert_eq!(free_blocks(&mut sfs), free);
}

#[test]
fn indirect_block_follows_direct_blocks() {
    let (_, mut sfs) = format(128);
    let big = sfs.create("/big").unwrap();
    let pad = sfs.create("/pad").unwrap();
    let (dbig, dpad) = interleave(&mut sfs, big, pad, 12);

    sfs.defragment().unwrap();

    // 10 个直接块、间接块、其余 2 个块依次相连
    let blocks = sfs.file_blocks(big).unwrap();
    assert_eq!(blocks.len(), 13);
    assert!(contiguous(&blocks));
    assert_eq!(sfs.stat(big).unwrap().blocks, 13);
    assert_eq!(read_all(&mut sfs, big), dbig);
    assert_eq!(read_all(&mut sfs, pad), dpad);
}

#[test]
fn already_compact() {
    let (_, mut sfs) = format(64);
    let f = sfs.create("/f").unwrap();
    sfs.write(f, &pattern(5, 3 * BLOCK_SIZE), 0).unwrap();
    assert_eq!(sfs.defragment().unwrap(), 0);
    assert_eq!(sfs.file_blocks(f).unwrap(), [4, 5, 6]);
}

#[test]
fn files_in_subdirectories() {
    let (_, mut sfs) = format(128);
    sfs.create_dir("/d").unwrap();
    let a = sfs.create("/d/a").unwrap();
    let b = sfs.create("/b").unwrap();
    let (da, db) = interleave(&mut sfs, a, b, 4);

    sfs.defragment().unwrap();
    assert!(contiguous(&sfs.file_blocks(a).unwrap()));
    assert!(contiguous(&sfs.file_blocks(b).unwrap()));
    assert_eq!(read_all(&mut sfs, a), da);
    assert_eq!(read_all(&mut sfs, b), db);
}

#[test]
fn snapshot_log_follows_moved_blocks() {
    let (_, mut sfs) = format(128);
    let x = sfs.create("/x").unwrap();
    let y = sfs.create("/y").unwrap();
    let (mut dx, dy) = interleave(&mut sfs, x, y, 3);

    sfs.create_snapshot(SnapshotKind::Incremental, "", "s1").unwrap();
    let offset = BLOCK_SIZE + 10;
    sfs.write(x, b"patched", offset).unwrap();
    dx[offset..offset + 7].copy_from_slice(b"patched");

    sfs.defragment().unwrap();
    assert!(contiguous(&sfs.file_blocks(x).unwrap()));
    assert_eq!(read_all(&mut sfs, x), dx);
    assert_eq!(read_all(&mut sfs, y), dy);

    sfs.accept_snapshot("s1").unwrap();
    assert_eq!(read_all_committed(&mut sfs, x), dx);
}

#[test]
fn block_usage() {
    let (_, mut sfs) = format(16);
    let f = sfs.create("/f").unwrap();
    sfs.write(f, b"data", 0).unwrap();

    let usage = sfs.block_map().unwrap();
    assert_eq!(usage.len(), 16);
    assert_eq!(usage[0], BlockUsage::Reserved);
    assert_eq!(usage[1], BlockUsage::Reserved);
    assert_eq!(usage[2], BlockUsage::Bitmap);
    assert_eq!(usage[3], BlockUsage::Other);
    assert_eq!(usage[4], BlockUsage::File("f".into()));
    assert_eq!(usage[5], BlockUsage::Free);
}
