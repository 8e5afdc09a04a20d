//! # 文件系统句柄
//!
//! 构建出磁盘的布局并使用。句柄独占整个卷的内存映射，
//! 所有操作都通过 `&mut self` 串行进行。

use alloc::sync::Arc;

use block_dev::BlockDevice;
use vfs::{Error, Result};

use crate::block_cache::DiskMap;
use crate::layout::*;
use crate::{BlockId, Clock, FileId, BITMAP_START, MAX_BLOCKS, ROOT, SUPER_BLOCK};

pub struct SnapFileSystem {
    pub(crate) disk: DiskMap,
    pub(crate) bitmap: Bitmap,
    pub(crate) total_blocks: u32,
    pub(crate) clock: Arc<dyn Clock>,
}

impl SnapFileSystem {
    /// 在设备上创建空文件系统：只有空的根目录，没有快照。
    ///
    /// 放不下位图以外任何数据块时返回 [`Error::InvalidArgument`]，
    /// 超过卷大小上限则 panic。
    pub fn format(
        device: Arc<dyn BlockDevice>,
        total_blocks: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        assert!(total_blocks as usize <= MAX_BLOCKS, "file system is too large");
        let bitmap = Bitmap::new(total_blocks);
        let reserved = BITMAP_START + bitmap.blocks();
        if reserved >= total_blocks {
            log::error!("{total_blocks} blocks leave no room for data");
            return Err(Error::InvalidArgument);
        }

        let mut disk = DiskMap::new(device);
        for block_id in 0..reserved {
            disk.zero(block_id)?;
        }
        disk.map_mut(SUPER_BLOCK, 0, |super_block: &mut SuperBlock| {
            super_block.init(total_blocks)
        })?;
        disk.map_mut(SUPER_BLOCK, SnapshotSlots::OFFSET, |slots: &mut SnapshotSlots| {
            *slots = SnapshotSlots::default()
        })?;

        bitmap.init(&mut disk)?;
        for block_id in 0..reserved {
            bitmap.claim(&mut disk, block_id)?;
        }
        disk.sync_all()?;
        log::info!("formatted {total_blocks} blocks, {} bitmap block(s)", bitmap.blocks());

        Ok(Self {
            disk,
            bitmap,
            total_blocks,
            clock,
        })
    }

    /// 挂载已有的文件系统。
    ///
    /// 魔数错误或卷过大属于不可恢复的损坏，直接 panic。
    pub fn mount(device: Arc<dyn BlockDevice>, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut disk = DiskMap::new(device);
        let total_blocks = disk.map(SUPER_BLOCK, 0, |super_block: &SuperBlock| {
            assert!(super_block.is_valid(), "bad file system magic number");
            super_block.total_blocks
        })?;
        assert!(total_blocks as usize <= MAX_BLOCKS, "file system is too large");
        log::info!("superblock is good");

        let mut sfs = Self {
            disk,
            bitmap: Bitmap::new(total_blocks),
            total_blocks,
            clock,
        };
        sfs.check_bitmap()?;

        Ok(sfs)
    }

    /// 保留块必须都标为已用
    fn check_bitmap(&mut self) -> Result<()> {
        for block_id in 0..BITMAP_START + self.bitmap.blocks() {
            assert!(
                !self.is_free(block_id)?,
                "reserved block {block_id} is marked free"
            );
        }
        log::info!("bitmap is good");
        Ok(())
    }

    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    #[inline]
    pub fn root(&self) -> FileId {
        ROOT
    }

    /// 块是否空闲，越界块视为非空闲
    #[inline]
    pub fn is_free(&mut self, block_id: BlockId) -> Result<bool> {
        self.bitmap.is_free(&mut self.disk, block_id)
    }

    /// 分配新块，位图的改动立即落盘
    pub fn alloc_block(&mut self) -> Result<BlockId> {
        self.bitmap.alloc(&mut self.disk)?.ok_or(Error::NoSpace)
    }

    /// 释放块。释放块 0 会 panic
    #[inline]
    pub fn free_block(&mut self, block_id: BlockId) -> Result<()> {
        self.bitmap.dealloc(&mut self.disk, block_id)
    }

    /// 把全部脏块写回设备
    #[inline]
    pub fn sync(&mut self) -> Result<()> {
        self.disk.sync_all()
    }

    pub(crate) fn file_map<V>(&mut self, file: FileId, f: impl FnOnce(&DiskFile) -> V) -> Result<V> {
        let addr = file.addr();
        self.disk.map(addr.block(), addr.offset(), f)
    }

    pub(crate) fn file_map_mut<V>(
        &mut self,
        file: FileId,
        f: impl FnOnce(&mut DiskFile) -> V,
    ) -> Result<V> {
        let addr = file.addr();
        self.disk.map_mut(addr.block(), addr.offset(), f)
    }

    #[inline]
    pub(crate) fn file_size(&mut self, file: FileId) -> Result<usize> {
        self.file_map(file, |f| f.size as usize)
    }

    pub(crate) fn snapshot_slots(&mut self) -> Result<SnapshotSlots> {
        self.disk
            .map(SUPER_BLOCK, SnapshotSlots::OFFSET, |slots: &SnapshotSlots| *slots)
    }

    /// 更新快照槽位并立即写回超级块
    pub(crate) fn store_snapshot_slots(&mut self, slots: SnapshotSlots) -> Result<()> {
        self.disk
            .map_mut(SUPER_BLOCK, SnapshotSlots::OFFSET, |s: &mut SnapshotSlots| *s = slots)?;
        self.disk.flush(SUPER_BLOCK)
    }
}

#[cfg(test)]
mod tests {
    use block_dev::MemoryDisk;

    use super::*;
    use crate::BLOCK_SIZE;

    struct Epoch;

    impl Clock for Epoch {
        fn now(&self) -> u64 {
            0
        }
    }

    fn format(blocks: u32) -> (Arc<MemoryDisk>, SnapFileSystem) {
        let device = Arc::new(MemoryDisk::new(blocks as usize * BLOCK_SIZE));
        let sfs = SnapFileSystem::format(device.clone(), blocks, Arc::new(Epoch)).unwrap();
        (device, sfs)
    }

    #[test]
    fn reserved_blocks_are_used() {
        let (_, mut sfs) = format(64);
        for block_id in 0..3 {
            assert!(!sfs.is_free(block_id).unwrap());
        }
        assert!(sfs.is_free(3).unwrap());
        assert!(!sfs.is_free(64).unwrap());
    }

    #[test]
    fn alloc_lowest_first() {
        let (_, mut sfs) = format(64);
        assert_eq!(sfs.alloc_block().unwrap(), 3);
        assert_eq!(sfs.alloc_block().unwrap(), 4);
        sfs.free_block(3).unwrap();
        assert_eq!(sfs.alloc_block().unwrap(), 3);
    }

    #[test]
    fn exhaustion() {
        let (_, mut sfs) = format(8);
        for _ in 3..8 {
            sfs.alloc_block().unwrap();
        }
        assert_eq!(sfs.alloc_block(), Err(Error::NoSpace));
    }

    #[test]
    #[should_panic(expected = "attempt to free zero block")]
    fn free_zero_block() {
        let (_, mut sfs) = format(8);
        let _ = sfs.free_block(0);
    }

    #[test]
    fn format_too_small() {
        for blocks in [0, 2, 3] {
            let device = Arc::new(MemoryDisk::new(4 * BLOCK_SIZE));
            assert!(matches!(
                SnapFileSystem::format(device, blocks, Arc::new(Epoch)),
                Err(Error::InvalidArgument)
            ));
        }
    }

    #[test]
    fn mount_formatted() {
        let (device, _) = format(32);
        let sfs = SnapFileSystem::mount(device, Arc::new(Epoch)).unwrap();
        assert_eq!(sfs.total_blocks(), 32);
    }

    #[test]
    #[should_panic(expected = "bad file system magic number")]
    fn mount_garbage() {
        let device = Arc::new(MemoryDisk::new(8 * BLOCK_SIZE));
        let _ = SnapFileSystem::mount(device, Arc::new(Epoch));
    }
}
