//! # 块索引层
//!
//! 逻辑块号 `bno` 到块号槽位的映射：
//! `bno < N_DIRECT` 的槽位在文件记录内，其余在一级间接块中。

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use vfs::{Error, Result};

use crate::layout::DiskFile;
use crate::{BlockId, FileId, PhysAddr, SnapFileSystem, BLOCK_SIZE, MAX_FILE_BLOCKS, N_DIRECT};

impl SnapFileSystem {
    /// 找到逻辑块号 `bno` 对应的块号槽位。
    ///
    /// 需要间接块而它尚不存在时：`alloc` 为假返回 [`Error::NotFound`]，
    /// 为真则分配一个清零的间接块。
    pub fn resolve_slot(&mut self, file: FileId, bno: usize, alloc: bool) -> Result<PhysAddr> {
        if bno >= MAX_FILE_BLOCKS {
            return Err(Error::InvalidArgument);
        }
        if bno < N_DIRECT {
            return Ok(file.addr() + DiskFile::DIRECT_OFFSET + 4 * bno);
        }

        let mut indirect = self.file_map(file, |f| f.indirect)?;
        if indirect == 0 {
            if !alloc {
                return Err(Error::NotFound);
            }
            indirect = self.alloc_block()?;
            self.disk.zero(indirect)?;
            self.file_map_mut(file, |f| f.indirect = indirect)?;
        }

        Ok(PhysAddr::new(indirect, 4 * (bno - N_DIRECT)))
    }

    /// 返回 `bno` 对应的块号，必要时分配。
    ///
    /// 新分配的块不清零，第二项为真表示块是刚分配的，由调用者决定是否清零。
    pub fn materialize_block(&mut self, file: FileId, bno: usize) -> Result<(BlockId, bool)> {
        let slot = self.resolve_slot(file, bno, true)?;
        let block_id = self.disk.read_u32(slot)?;
        if block_id != 0 {
            return Ok((block_id, false));
        }
        let block_id = self.alloc_block()?;
        self.disk.write_u32(slot, block_id)?;
        Ok((block_id, true))
    }

    /// 只查不分配，空洞返回 `None`
    pub(crate) fn lookup_block(&mut self, file: FileId, bno: usize) -> Result<Option<BlockId>> {
        match self.resolve_slot(file, bno, false) {
            Ok(slot) => {
                let block_id = self.disk.read_u32(slot)?;
                Ok((block_id != 0).then_some(block_id))
            }
            Err(Error::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// 释放新大小之外的数据块，间接块不再需要时一并释放
    pub(crate) fn truncate_blocks(&mut self, file: FileId, new_size: usize) -> Result<()> {
        self.release_blocks(file, new_size, &BTreeSet::new())
    }

    /// 释放 `size` 之外的全部块，`pinned` 中的块保留。
    ///
    /// 扫描所有槽位而不只是旧大小覆盖的部分：快照期间分配的块号
    /// 直接写进文件记录，可能落在磁盘上的大小之外。
    pub(crate) fn release_blocks(
        &mut self,
        file: FileId,
        size: usize,
        pinned: &BTreeSet<BlockId>,
    ) -> Result<()> {
        let kept_blocks = size.div_ceil(BLOCK_SIZE);
        let mut released = 0;

        for bno in kept_blocks..N_DIRECT {
            let slot = file.addr() + DiskFile::DIRECT_OFFSET + 4 * bno;
            if self.release_slot(slot, pinned)? == Some(true) {
                released += 1;
            }
        }

        let indirect = self.file_map(file, |f| f.indirect)?;
        if indirect != 0 {
            let mut still_used = kept_blocks > N_DIRECT;
            for bno in kept_blocks.max(N_DIRECT)..MAX_FILE_BLOCKS {
                let slot = PhysAddr::new(indirect, 4 * (bno - N_DIRECT));
                match self.release_slot(slot, pinned)? {
                    Some(true) => released += 1,
                    Some(false) => still_used = true,
                    None => {}
                }
            }
            if !still_used {
                self.free_block(indirect)?;
                self.file_map_mut(file, |f| f.indirect = 0)?;
                released += 1;
            }
        }

        if released > 0 {
            log::debug!("released {released} block(s) of {file} beyond {size} bytes");
        }
        Ok(())
    }

    /// 空槽位返回 `None`；否则释放其中的块并返回 `true`，块被保留时返回 `false`
    fn release_slot(&mut self, slot: PhysAddr, pinned: &BTreeSet<BlockId>) -> Result<Option<bool>> {
        let block_id = self.disk.read_u32(slot)?;
        if block_id == 0 {
            return Ok(None);
        }
        if pinned.contains(&block_id) {
            return Ok(Some(false));
        }
        self.free_block(block_id)?;
        self.disk.write_u32(slot, 0)?;
        Ok(Some(true))
    }

    /// 文件大小覆盖的全部块，按整理时的排列顺序：
    /// 直接块、间接块、间接块所指的块
    pub fn file_blocks(&mut self, file: FileId) -> Result<Vec<BlockId>> {
        let (count, indirect) = self.file_map(file, |f| (f.block_count(), f.indirect))?;
        let mut blocks = Vec::with_capacity(count + 1);
        for bno in 0..count {
            if bno == N_DIRECT && indirect != 0 {
                blocks.push(indirect);
            }
            if let Some(block_id) = self.lookup_block(file, bno)? {
                blocks.push(block_id);
            }
        }
        Ok(blocks)
    }
}
