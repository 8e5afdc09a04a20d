mod common;

use common::*;
use snap_fs::{BLOCK_SIZE, FILES_PER_BLOCK};
use vfs::{DirEntryType, Error};

#[test]
fn write_then_read_across_blocks() {
    let (_, mut sfs) = format(64);
    let file = sfs.create("/notes").unwrap();
    let data = pattern(3, 2 * BLOCK_SIZE + 100);

    assert_eq!(sfs.write(file, &data, 0).unwrap(), data.len());
    assert_eq!(read_all(&mut sfs, file), data);

    let mut mid = [0; 16];
    assert_eq!(sfs.read(file, &mut mid, BLOCK_SIZE - 8).unwrap(), 16);
    assert_eq!(mid, data[BLOCK_SIZE - 8..BLOCK_SIZE + 8]);
}

#[test]
fn nested_paths() {
    let (_, mut sfs) = format(64);
    sfs.create_dir("/etc").unwrap();
    let file = sfs.create("/etc/hosts").unwrap();

    assert_eq!(sfs.open("//etc///hosts").unwrap(), file);
    assert_eq!(sfs.open("/etc/passwd"), Err(Error::NotFound));
    assert_eq!(sfs.create("/usr/bin"), Err(Error::NotFound));
    assert_eq!(sfs.create("/etc/hosts/x"), Err(Error::NotFound));
    assert_eq!(sfs.file_name(file).unwrap(), "hosts");
    let etc = sfs.open("/etc").unwrap();
    assert!(sfs.stat(etc).unwrap().is_dir());
}

#[test]
fn root_and_duplicates() {
    let (_, mut sfs) = format(64);
    assert_eq!(sfs.open("/").unwrap(), sfs.root());
    assert_eq!(sfs.open("").unwrap(), sfs.root());
    assert_eq!(sfs.create("/"), Err(Error::AlreadyExists));

    sfs.create("/a").unwrap();
    assert_eq!(sfs.create("/a"), Err(Error::AlreadyExists));
    assert_eq!(sfs.create_dir("/a"), Err(Error::AlreadyExists));
}

#[test]
fn long_component() {
    let (_, mut sfs) = format(64);
    let long = format!("/{}", "n".repeat(128));
    assert_eq!(sfs.create(&long), Err(Error::InvalidPath));

    let longest = format!("/{}", "n".repeat(127));
    let file = sfs.create(&longest).unwrap();
    assert_eq!(sfs.open(&longest).unwrap(), file);
}

#[test]
fn directory_grows_by_whole_blocks() {
    let (_, mut sfs) = format(64);
    for i in 0..=FILES_PER_BLOCK {
        sfs.create(&format!("/f{i}")).unwrap();
    }

    let root = sfs.root();
    assert_eq!(sfs.stat(root).unwrap().size, 2 * BLOCK_SIZE as u64);
    let entries = sfs.read_dir(root).unwrap();
    assert_eq!(entries.len(), FILES_PER_BLOCK + 1);
    assert!(entries.iter().all(|e| e.ty == DirEntryType::Regular));
    assert!(entries.iter().any(|e| e.name == "f16"));
}

#[test]
fn indirect_block() {
    let (_, mut sfs) = format(64);
    let file = sfs.create("/big").unwrap();
    let data = pattern(9, 12 * BLOCK_SIZE);
    sfs.write(file, &data, 0).unwrap();

    let stat = sfs.stat(file).unwrap();
    assert_eq!(stat.size, data.len() as u64);
    assert_eq!(stat.blocks, 13);
    assert_eq!(read_all(&mut sfs, file), data);

    // 缩回直接块范围后间接块一并释放
    let free = free_blocks(&mut sfs);
    sfs.set_size(file, 4 * BLOCK_SIZE).unwrap();
    assert_eq!(free_blocks(&mut sfs), free + 9);
    assert_eq!(sfs.stat(file).unwrap().blocks, 4);
}

#[test]
fn write_past_end_leaves_hole() {
    let (_, mut sfs) = format(64);
    let file = sfs.create("/sparse").unwrap();
    sfs.write(file, b"tail", 3 * BLOCK_SIZE).unwrap();

    let data = read_all(&mut sfs, file);
    assert_eq!(data.len(), 3 * BLOCK_SIZE + 4);
    assert!(data[..3 * BLOCK_SIZE].iter().all(|&b| b == 0));
    assert_eq!(&data[3 * BLOCK_SIZE..], b"tail");
}

#[test]
fn survives_remount() {
    let (device, mut sfs) = format(64);
    sfs.create_dir("/d").unwrap();
    let file = sfs.create("/d/f").unwrap();
    let data = pattern(1, 5000);
    sfs.write(file, &data, 0).unwrap();
    sfs.flush(file).unwrap();
    drop(sfs);

    let mut sfs = remount(&device);
    let file = sfs.open("/d/f").unwrap();
    assert_eq!(read_all(&mut sfs, file), data);
}

#[test]
fn volume_full() {
    let (_, mut sfs) = format(8);
    let file = sfs.create("/f").unwrap();
    // 3 个保留块、1 个根目录块，剩余 4 块
    assert_eq!(
        sfs.write(file, &pattern(0, 5 * BLOCK_SIZE), 0),
        Err(Error::NoSpace)
    );
}
