#![allow(dead_code)]

use std::sync::Arc;

use block_dev::MemoryDisk;
use snap_fs::{Clock, SnapFileSystem, BLOCK_SIZE};

/// 2023-11-14 22:13:20 UTC
pub const NOW: u64 = 1_700_000_000;

pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

pub fn format(blocks: u32) -> (Arc<MemoryDisk>, SnapFileSystem) {
    let device = Arc::new(MemoryDisk::new(blocks as usize * BLOCK_SIZE));
    let sfs = SnapFileSystem::format(device.clone(), blocks, Arc::new(FixedClock(NOW))).unwrap();
    (device, sfs)
}

pub fn remount(device: &Arc<MemoryDisk>) -> SnapFileSystem {
    SnapFileSystem::mount(device.clone(), Arc::new(FixedClock(NOW))).unwrap()
}

pub fn free_blocks(sfs: &mut SnapFileSystem) -> usize {
    (0..sfs.total_blocks())
        .filter(|&b| sfs.is_free(b).unwrap())
        .count()
}

/// 每个块内容都不同的测试数据
pub fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_add(((i / BLOCK_SIZE) as u8).wrapping_mul(31)).wrapping_add(i as u8))
        .collect()
}

pub fn read_all(sfs: &mut SnapFileSystem, file: snap_fs::FileId) -> Vec<u8> {
    let mut buf = vec![0; snap_fs::MAX_FILE_SIZE];
    let len = sfs.read(file, &mut buf, 0).unwrap();
    buf.truncate(len);
    buf
}

pub fn read_all_committed(sfs: &mut SnapFileSystem, file: snap_fs::FileId) -> Vec<u8> {
    let size = sfs.stat(file).unwrap().size as usize;
    let mut buf = vec![0; size];
    assert_eq!(sfs.read_committed(file, &mut buf, 0).unwrap(), size);
    buf
}
