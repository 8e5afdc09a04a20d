//! # 块缓存层
//!
//! 整个卷按需逐块读入内存，读入后常驻，直到句柄被丢弃。
//! 上层对块的所有读写都发生在缓存中，只有显式的 `flush`/`sync_all`
//! 才会把脏块写回块设备。
//!
//! 缓存块按 8 字节对齐，磁盘数据结构可直接以 `#[repr(C)]` 类型映射。

use alloc::boxed::Box;
use alloc::collections::btree_map::{BTreeMap, Entry};
use alloc::sync::Arc;
use core::mem;

use block_dev::BlockDevice;
use vfs::Result;

use crate::{BlockId, PhysAddr, BLOCK_SIZE};

#[repr(C, align(8))]
struct DataBlock([u8; BLOCK_SIZE]);

/// 内存中的块缓存
struct BlockCache {
    data: Box<DataBlock>,
    /// 是否为脏块
    modified: bool,
}

/// 卷的内存映射
pub struct DiskMap {
    device: Arc<dyn BlockDevice>,
    blocks: BTreeMap<BlockId, BlockCache>,
}

impl BlockCache {
    fn load(block_id: BlockId, device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let mut data = Box::new(DataBlock([0; BLOCK_SIZE]));
        device.read_block(block_id as usize, &mut data.0)?;

        Ok(Self {
            data,
            modified: false,
        })
    }

    fn sync(&mut self, block_id: BlockId, device: &Arc<dyn BlockDevice>) -> Result<()> {
        if self.modified {
            device.write_block(block_id as usize, &self.data.0)?;
            self.modified = false;
        }
        Ok(())
    }

    fn get<T: Sized>(&self, offset: usize) -> &T {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        let addr = self.data.0[offset..].as_ptr().cast::<T>();
        unsafe { &*addr }
    }

    fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        self.modified = true;
        let addr = self.data.0[offset..].as_mut_ptr().cast::<T>();
        unsafe { &mut *addr }
    }
}

impl DiskMap {
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            device,
            blocks: BTreeMap::new(),
        }
    }

    fn block(&mut self, block_id: BlockId) -> Result<&mut BlockCache> {
        match self.blocks.entry(block_id) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let cache = BlockCache::load(block_id, &self.device)?;
                Ok(e.insert(cache))
            }
        }
    }

    #[inline]
    pub fn map<T: Sized, V>(
        &mut self,
        block_id: BlockId,
        offset: usize,
        f: impl FnOnce(&T) -> V,
    ) -> Result<V> {
        Ok(f(self.block(block_id)?.get(offset)))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(
        &mut self,
        block_id: BlockId,
        offset: usize,
        f: impl FnOnce(&mut T) -> V,
    ) -> Result<V> {
        Ok(f(self.block(block_id)?.get_mut(offset)))
    }

    pub fn read_bytes(&mut self, block_id: BlockId, offset: usize, buf: &mut [u8]) -> Result<()> {
        let cache = self.block(block_id)?;
        buf.copy_from_slice(&cache.data.0[offset..offset + buf.len()]);
        Ok(())
    }

    pub fn write_bytes(&mut self, block_id: BlockId, offset: usize, buf: &[u8]) -> Result<()> {
        let cache = self.block(block_id)?;
        cache.data.0[offset..offset + buf.len()].copy_from_slice(buf);
        cache.modified = true;
        Ok(())
    }

    pub fn zero(&mut self, block_id: BlockId) -> Result<()> {
        let cache = self.block(block_id)?;
        cache.data.0.fill(0);
        cache.modified = true;
        Ok(())
    }

    pub fn copy_block(&mut self, src: BlockId, dst: BlockId) -> Result<()> {
        let data = self.block(src)?.data.0;
        self.write_bytes(dst, 0, &data)
    }

    pub fn read_byte(&mut self, addr: PhysAddr) -> Result<u8> {
        let mut byte = [0];
        self.read_bytes(addr.block(), addr.offset(), &mut byte)?;
        Ok(byte[0])
    }

    pub fn write_byte(&mut self, addr: PhysAddr, value: u8) -> Result<()> {
        self.write_bytes(addr.block(), addr.offset(), &[value])
    }

    pub fn read_u32(&mut self, addr: PhysAddr) -> Result<u32> {
        let mut bytes = [0; 4];
        self.read_bytes(addr.block(), addr.offset(), &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn write_u32(&mut self, addr: PhysAddr, value: u32) -> Result<()> {
        self.write_bytes(addr.block(), addr.offset(), &value.to_le_bytes())
    }

    /// 写回单个块，未缓存或未修改的块不会触发设备写
    pub fn flush(&mut self, block_id: BlockId) -> Result<()> {
        match self.blocks.get_mut(&block_id) {
            Some(cache) => cache.sync(block_id, &self.device),
            None => Ok(()),
        }
    }

    pub fn sync_all(&mut self) -> Result<()> {
        self.blocks
            .iter_mut()
            .try_for_each(|(&block_id, cache)| cache.sync(block_id, &self.device))
    }
}

impl Drop for DiskMap {
    fn drop(&mut self) {
        if let Err(err) = self.sync_all() {
            log::warn!("dirty blocks lost on drop: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use block_dev::MemoryDisk;

    use super::*;

    fn disk_map(blocks: usize) -> (Arc<MemoryDisk>, DiskMap) {
        let device = Arc::new(MemoryDisk::new(blocks * BLOCK_SIZE));
        (device.clone(), DiskMap::new(device))
    }

    #[test]
    fn dirty_blocks_stay_cached_until_flush() {
        let (device, mut disk) = disk_map(4);
        disk.write_u32(PhysAddr::new(2, 8), 0xdead_beef).unwrap();

        let mut raw = [0; BLOCK_SIZE];
        device.read_block(2, &mut raw).unwrap();
        assert_eq!(&raw[8..12], &[0; 4]);

        disk.flush(2).unwrap();
        device.read_block(2, &mut raw).unwrap();
        assert_eq!(&raw[8..12], &0xdead_beef_u32.to_le_bytes());
    }

    #[test]
    fn typed_view() {
        let (_, mut disk) = disk_map(2);
        disk.map_mut(1, 16, |words: &mut [u32; 2]| *words = [1, 2])
            .unwrap();
        assert_eq!(disk.read_u32(PhysAddr::new(1, 20)).unwrap(), 2);
        assert_eq!(disk.read_byte(PhysAddr::new(1, 16)).unwrap(), 1);
    }

    #[test]
    fn copy_then_sync() {
        let (device, mut disk) = disk_map(3);
        disk.write_bytes(0, 100, b"block").unwrap();
        disk.copy_block(0, 2).unwrap();
        disk.sync_all().unwrap();

        let mut raw = [0; BLOCK_SIZE];
        device.read_block(2, &mut raw).unwrap();
        assert_eq!(&raw[100..105], b"block");
    }

    #[test]
    fn out_of_range_block() {
        let (_, mut disk) = disk_map(2);
        assert!(disk.read_byte(PhysAddr::new(5, 0)).is_err());
    }
}
