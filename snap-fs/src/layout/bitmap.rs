use vfs::Result;

use crate::block_cache::DiskMap;
use crate::{BlockId, BITMAP_START, BLOCK_BITS, BLOCK_SIZE};

/// 位图区域内块的结构
type BitmapBlock = [u32; BLOCK_SIZE / 4];

/// 空闲位图，置位表示空闲。
///
/// 位图覆盖整个卷，保留块(引导块、超级块、位图自身)在格式化时清位。
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: BlockId,
    /// 位图占用块数
    blocks: u32,
    /// 卷的总块数
    total_blocks: u32,
}

impl Bitmap {
    pub fn new(total_blocks: u32) -> Self {
        Self {
            start_block_id: BITMAP_START,
            blocks: (total_blocks as usize).div_ceil(BLOCK_BITS) as u32,
            total_blocks,
        }
    }

    #[inline]
    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    /// 块是否属于位图区域
    #[inline]
    pub fn contains(&self, block_id: BlockId) -> bool {
        (self.start_block_id..self.start_block_id + self.blocks).contains(&block_id)
    }

    /// 把卷内的全部块标为空闲，越界的位保持为 0
    pub fn init(&self, disk: &mut DiskMap) -> Result<()> {
        for block_id in 0..self.total_blocks {
            let (block, group, bit) = self.locate(block_id);
            disk.map_mut(block, 0, |bits: &mut BitmapBlock| bits[group] |= 1 << bit)?;
        }
        Ok(())
    }

    /// 越界块一律视为非空闲
    pub fn is_free(&self, disk: &mut DiskMap, block_id: BlockId) -> Result<bool> {
        if block_id >= self.total_blocks {
            return Ok(false);
        }
        let (block, group, bit) = self.locate(block_id);
        disk.map(block, 0, |bits: &BitmapBlock| bits[group] & (1 << bit) != 0)
    }

    /// 分配编号最小的空闲块，并立即写回所在的位图块
    pub fn alloc(&self, disk: &mut DiskMap) -> Result<Option<BlockId>> {
        for block_index in 0..self.blocks {
            let block = self.start_block_id + block_index;
            let found = disk.map(block, 0, |bits: &BitmapBlock| {
                bits.iter()
                    .enumerate()
                    .find_map(|(group, &word)| (word != 0).then(|| (group, word.trailing_zeros())))
            })?;
            let Some((group, bit)) = found else {
                continue;
            };

            let block_id = block_index * BLOCK_BITS as u32 + group as u32 * 32 + bit;
            if block_id >= self.total_blocks {
                break;
            }
            disk.map_mut(block, 0, |bits: &mut BitmapBlock| bits[group] &= !(1 << bit))?;
            disk.flush(block)?;
            return Ok(Some(block_id));
        }

        Ok(None)
    }

    /// 保留块 0 永不被释放
    pub fn dealloc(&self, disk: &mut DiskMap, block_id: BlockId) -> Result<()> {
        assert!(block_id != 0, "attempt to free zero block");
        assert!(block_id < self.total_blocks, "free of out-of-range block {block_id}");
        let (block, group, bit) = self.locate(block_id);
        disk.map_mut(block, 0, |bits: &mut BitmapBlock| bits[group] |= 1 << bit)?;
        disk.flush(block)
    }

    /// 把指定的空闲块标为已用
    pub fn claim(&self, disk: &mut DiskMap, block_id: BlockId) -> Result<()> {
        let (block, group, bit) = self.locate(block_id);
        disk.map_mut(block, 0, |bits: &mut BitmapBlock| bits[group] &= !(1 << bit))?;
        disk.flush(block)
    }

    /// 块号 -> (位图块, 字, 位)
    #[inline]
    fn locate(&self, block_id: BlockId) -> (BlockId, usize, u32) {
        let block_id = block_id as usize;
        let block = self.start_block_id + (block_id / BLOCK_BITS) as u32;
        let in_block = block_id % BLOCK_BITS;
        (block, in_block / 32, (in_block % 32) as u32)
    }
}
