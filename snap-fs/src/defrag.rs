//! # 碎片整理
//!
//! 按目录树的先序依次处理普通文件，把每个文件的块按
//! "直接块 → 间接块 → 间接块所指的块" 的顺序搬到从块 2 起的连续位置。
//!
//! 目标位置被别的文件占用时，借助一个临时块做三方交换。
//! 每次搬动后，快照日志里指向旧位置的地址同步改写，覆盖层因此保持一致。
//! 目录块、位图块与快照的位图副本不会被搬动。

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;

use vfs::Result;

use crate::layout::{DiffEntry, DiskFile, SnapshotHeader};
use crate::{BlockId, FileId, PhysAddr, SnapFileSystem, BITMAP_START, N_DIRECT, ROOT};

/// 文件中保存块号的槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Direct(usize),
    Indirect,
    /// 间接块中的项，以逻辑块号标识
    Entry(usize),
}

#[derive(Debug, Clone, Copy)]
struct Owner {
    file: FileId,
    slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relocation {
    InPlace,
    Moved,
    /// 目标块被不可搬动的数据占用
    Pinned,
}

/// 块的用途
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockUsage {
    /// 引导块与超级块
    Reserved,
    Bitmap,
    Free,
    /// 属于某个普通文件
    File(String),
    /// 目录块、间接块以外的元数据等
    Other,
}

impl SnapFileSystem {
    /// 整理碎片，返回搬动的块数
    pub fn defragment(&mut self) -> Result<usize> {
        let mut scratch = self.alloc_block()?;
        let mut placed = BTreeSet::new();
        let mut moved = 0;

        let mut target = BITMAP_START;
        'scan: while target < self.total_blocks {
            if self.bitmap.contains(target) {
                target += 1;
                continue;
            }
            let Some(owner) = self.find_owner(ROOT, target)? else {
                target += 1;
                continue;
            };
            if !placed.insert(owner.file) {
                target += 1;
                continue;
            }

            for slot in self.placement(owner.file)? {
                let src = Owner {
                    file: owner.file,
                    slot,
                };
                if self.read_slot(src)? == 0 {
                    continue;
                }
                loop {
                    while self.bitmap.contains(target) {
                        target += 1;
                    }
                    if target >= self.total_blocks {
                        break 'scan;
                    }
                    let result = self.relocate(src, target, &mut scratch)?;
                    target += 1;
                    match result {
                        Relocation::Moved => {
                            moved += 1;
                            break;
                        }
                        Relocation::InPlace => break,
                        Relocation::Pinned => {}
                    }
                }
            }
        }

        self.free_block(scratch)?;
        self.sync()?;
        log::info!("defragmented {} file(s), {moved} block(s) moved", placed.len());

        Ok(moved)
    }

    /// 每个块的用途，下标即块号
    pub fn block_map(&mut self) -> Result<Vec<BlockUsage>> {
        let mut owners = BTreeMap::new();
        self.collect_owners(ROOT, &mut owners)?;

        let mut usage = Vec::with_capacity(self.total_blocks as usize);
        for block_id in 0..self.total_blocks {
            usage.push(if block_id < BITMAP_START {
                BlockUsage::Reserved
            } else if self.bitmap.contains(block_id) {
                BlockUsage::Bitmap
            } else if let Some(&file) = owners.get(&block_id) {
                BlockUsage::File(self.file_name(file)?)
            } else if self.is_free(block_id)? {
                BlockUsage::Free
            } else {
                BlockUsage::Other
            });
        }
        Ok(usage)
    }

    fn collect_owners(&mut self, dir: FileId, owners: &mut BTreeMap<BlockId, FileId>) -> Result<()> {
        for file in self.dir_files(dir)? {
            if self.file_map(file, DiskFile::is_dir)? {
                self.collect_owners(file, owners)?;
                continue;
            }
            for slot in self.placement(file)? {
                let block_id = self.read_slot(Owner { file, slot })?;
                if block_id != 0 {
                    owners.insert(block_id, file);
                }
            }
        }
        Ok(())
    }

    /// 文件的块应当排列的顺序
    fn placement(&mut self, file: FileId) -> Result<Vec<Slot>> {
        let count = self.file_map(file, DiskFile::block_count)?;
        let mut slots: Vec<Slot> = (0..count.min(N_DIRECT)).map(Slot::Direct).collect();
        if count > N_DIRECT {
            slots.push(Slot::Indirect);
            slots.extend((N_DIRECT..count).map(Slot::Entry));
        }
        Ok(slots)
    }

    /// 槽位地址，间接块不存在时间接项没有地址
    fn slot_addr(&mut self, owner: Owner) -> Result<Option<PhysAddr>> {
        let base = owner.file.addr();
        Ok(match owner.slot {
            Slot::Direct(i) => Some(base + DiskFile::DIRECT_OFFSET + 4 * i),
            Slot::Indirect => Some(base + DiskFile::INDIRECT_OFFSET),
            Slot::Entry(bno) => {
                let indirect = self.file_map(owner.file, |f| f.indirect)?;
                (indirect != 0).then(|| PhysAddr::new(indirect, 4 * (bno - N_DIRECT)))
            }
        })
    }

    fn read_slot(&mut self, owner: Owner) -> Result<BlockId> {
        match self.slot_addr(owner)? {
            Some(addr) => self.disk.read_u32(addr),
            None => Ok(0),
        }
    }

    fn write_slot(&mut self, owner: Owner, block_id: BlockId) -> Result<()> {
        if let Some(addr) = self.slot_addr(owner)? {
            self.disk.write_u32(addr, block_id)?;
            self.disk.flush(addr.block())?;
        }
        Ok(())
    }

    /// 先序遍历目录树，找到引用该块的普通文件槽位
    fn find_owner(&mut self, dir: FileId, block_id: BlockId) -> Result<Option<Owner>> {
        for file in self.dir_files(dir)? {
            let found = if self.file_map(file, DiskFile::is_dir)? {
                self.find_owner(file, block_id)?
            } else {
                self.owned_slot(file, block_id)?
                    .map(|slot| Owner { file, slot })
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    fn owned_slot(&mut self, file: FileId, block_id: BlockId) -> Result<Option<Slot>> {
        for slot in self.placement(file)? {
            if self.read_slot(Owner { file, slot })? == block_id {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    fn relocate(&mut self, src: Owner, target: BlockId, scratch: &mut BlockId) -> Result<Relocation> {
        let current = self.read_slot(src)?;
        if current == target {
            return Ok(Relocation::InPlace);
        }

        if target == *scratch {
            self.disk.copy_block(current, target)?;
            self.disk.flush(target)?;
            self.write_slot(src, target)?;
            *scratch = current;
            self.remap_snapshot_logs(&[(current, target)])?;
        } else if let Some(other) = self.find_owner(ROOT, target)? {
            self.disk.copy_block(target, *scratch)?;
            self.disk.copy_block(current, target)?;
            self.disk.copy_block(*scratch, current)?;
            for block_id in [*scratch, target, current] {
                self.disk.flush(block_id)?;
            }

            // 间接块挪动后，经由它定位的槽位才能正确改写
            if src.slot == Slot::Indirect {
                self.write_slot(src, target)?;
                self.write_slot(other, current)?;
            } else {
                self.write_slot(other, current)?;
                self.write_slot(src, target)?;
            }
            self.remap_snapshot_logs(&[(current, target), (target, current)])?;
        } else if self.is_free(target)? {
            self.bitmap.claim(&mut self.disk, target)?;
            self.disk.copy_block(current, target)?;
            self.disk.flush(target)?;
            self.write_slot(src, target)?;
            self.free_block(current)?;
            self.remap_snapshot_logs(&[(current, target)])?;
        } else {
            log::debug!("block {target} is pinned, block {current} of {} stays", src.file);
            return Ok(Relocation::Pinned);
        }

        Ok(Relocation::Moved)
    }

    /// 改写活动链与暂存链中落在被搬动块上的日志地址
    fn remap_snapshot_logs(&mut self, moves: &[(BlockId, BlockId)]) -> Result<()> {
        let (active, pending) = (self.active_snapshot()?, self.pending_snapshot()?);
        let mut snaps = self.snapshot_chain(active)?;
        snaps.extend(self.snapshot_chain(pending)?);

        for snap in snaps {
            let mut entries = self.snapshot_entries(snap)?;
            let mut changed = false;
            for entry in entries.iter_mut() {
                let from = entry.addr.block();
                if let Some(&(_, to)) = moves.iter().find(|&&(f, _)| f == from) {
                    entry.addr = PhysAddr::new(to, entry.addr.offset());
                    changed = true;
                }
            }
            if changed {
                let raw: Vec<u8> = entries.iter().flat_map(DiffEntry::encode).collect();
                self.write_committed(snap, &raw, SnapshotHeader::SIZE)?;
            }
        }
        Ok(())
    }
}
