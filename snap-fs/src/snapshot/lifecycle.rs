use alloc::collections::BTreeSet;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use vfs::{Error, Result};

use crate::layout::{DiffEntry, DiskFile, SnapshotHeader, SnapshotKind, SnapshotSlots, COMMENT_LEN};
use crate::{DateTime, FileId, PhysAddr, SnapFileSystem, BITMAP_START, FILE_ENTRY_SIZE, ROOT};

/// 快照链上一个快照的概要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub id: FileId,
    pub name: String,
    pub comment: String,
    pub kind: SnapshotKind,
    /// 创建时间，Unix 秒
    pub created: u64,
    /// 差异日志项数
    pub entries: usize,
}

impl fmt::Display for SnapshotInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "   Name: {}", self.name)?;
        writeln!(f, "Comment: {}", self.comment)?;
        write!(f, "   Time: {}", DateTime::from_unix(self.created))
    }
}

/// 日志项若落在某个文件记录的大小字段上，返回该记录
fn size_field_owner(addr: PhysAddr) -> Option<FileId> {
    let offset = addr.offset();
    let in_record = offset % FILE_ENTRY_SIZE;
    (DiskFile::SIZE_OFFSET..DiskFile::SIZE_OFFSET + 4)
        .contains(&in_record)
        .then(|| FileId::new(PhysAddr::new(addr.block(), offset - in_record)))
}

impl SnapFileSystem {
    /// 在根目录下创建快照文件并把它设为新的链头。
    ///
    /// 链被接受后暂存期间不能创建新快照。
    pub fn create_snapshot(&mut self, kind: SnapshotKind, comment: &str, name: &str) -> Result<FileId> {
        if comment.len() >= COMMENT_LEN {
            return Err(Error::InvalidArgument);
        }
        let slots = self.snapshot_slots()?;
        if slots.active == 0 && slots.pending != 0 {
            return Err(Error::InvalidState);
        }

        let snap = self.create(name)?;
        let prev = FileId::from_raw(slots.active);
        match prev {
            Some(head) => self.flush(head)?,
            None => self.sync()?,
        }

        let old_bitmap = self.alloc_block()?;
        self.disk.copy_block(BITMAP_START, old_bitmap)?;
        self.disk.flush(old_bitmap)?;

        let header = SnapshotHeader::new(
            kind,
            comment,
            self.clock.now(),
            old_bitmap,
            FileId::to_raw(prev),
        );
        self.store_snapshot_slots(SnapshotSlots {
            active: FileId::to_raw(Some(snap)),
            ..slots
        })?;
        self.write_committed(snap, header.as_bytes(), 0)?;
        self.flush(snap)?;
        log::info!("created {kind} snapshot {name} at {snap}");

        Ok(snap)
    }

    /// 从链上摘除并删除快照，其日志中的改动随之丢弃
    pub fn delete_snapshot(&mut self, name: &str) -> Result<()> {
        let (newer, snap) = self.find_snapshot(name)?;
        let discarded = self.snapshot_entries(snap)?;
        self.remove_snapshot(newer, snap)?;
        self.reclaim_blocks(&discarded)?;
        self.sync()?;
        log::info!("deleted snapshot {name}");
        Ok(())
    }

    fn remove_snapshot(&mut self, newer: Option<FileId>, snap: FileId) -> Result<()> {
        let header = self.snapshot_header(snap)?;
        let prev = FileId::from_raw(header.prev);
        match newer {
            Some(newer) => self.set_snapshot_prev(newer, prev)?,
            None => {
                let slots = self.snapshot_slots()?;
                self.store_snapshot_slots(SnapshotSlots {
                    active: FileId::to_raw(prev),
                    ..slots
                })?;
            }
        }

        if header.old_bitmap != 0 {
            self.free_block(header.old_bitmap)?;
        }
        self.set_size_committed(snap, 0)?;
        self.file_map_mut(snap, DiskFile::clear)?;
        self.disk.flush(snap.addr().block())
    }

    /// 把按名字找到的快照与它的前一个快照合并，没有前一个快照时返回 `false`
    pub fn merge_snapshot(&mut self, name: &str) -> Result<bool> {
        let (_, snap) = self.find_snapshot(name)?;
        self.merge_with_prev(snap)
    }

    fn merge_with_prev(&mut self, snap: FileId) -> Result<bool> {
        let Some(older) = self.snapshot_prev(snap)? else {
            return Ok(false);
        };

        // 较新的值优先，只补入本快照没有记录的地址
        let known: BTreeSet<PhysAddr> = self
            .snapshot_entries(snap)?
            .into_iter()
            .map(|entry| entry.addr)
            .collect();
        let folded: Vec<u8> = self
            .snapshot_entries(older)?
            .into_iter()
            .filter(|entry| !known.contains(&entry.addr))
            .flat_map(|entry| entry.encode())
            .collect();
        if !folded.is_empty() {
            let end = self.file_size(snap)?;
            self.write_committed(snap, &folded, end)?;
        }

        let superseded = self.snapshot_entries(older)?;
        self.remove_snapshot(Some(snap), older)?;
        self.reclaim_blocks(&superseded)?;
        self.flush(snap)?;
        self.sync()?;
        log::debug!("merged {older} into {snap}");

        Ok(true)
    }

    /// 接受快照：先并入全部更旧的快照，再把日志重放到磁盘。
    ///
    /// 快照本身保留，日志清空；之后整条链转入暂存槽位，活动槽位清空，
    /// 可由 [`Self::enable_snapshot`] 恢复。
    pub fn accept_snapshot(&mut self, name: &str) -> Result<()> {
        let (_, snap) = self.find_snapshot(name)?;
        while self.merge_with_prev(snap)? {}

        let entries = self.snapshot_entries(snap)?;
        for entry in &entries {
            self.disk.write_byte(entry.addr, entry.value)?;
        }
        self.set_size_committed(snap, SnapshotHeader::SIZE)?;
        self.reclaim_blocks(&entries)?;
        self.sync()?;

        let slots = self.snapshot_slots()?;
        self.store_snapshot_slots(SnapshotSlots {
            active: 0,
            pending: slots.active,
        })?;
        log::info!("accepted snapshot {name}, {} bytes replayed", entries.len());

        Ok(())
    }

    /// 日志被丢弃或重放后，回收文件记录中不再可见的块。
    ///
    /// 快照期间分配的块号直接写入文件记录，而大小只记在日志里。
    /// 对大小字段出现在 `entries` 中的普通文件，保留磁盘上的大小与
    /// 各条链上任一快照所见大小中的最大者，其余的块释放，
    /// 仍被某条日志引用的块除外。
    fn reclaim_blocks(&mut self, entries: &[DiffEntry]) -> Result<()> {
        let mut files = Vec::new();
        self.regular_files(ROOT, &mut files)?;
        let touched: BTreeSet<FileId> = entries
            .iter()
            .filter_map(|entry| size_field_owner(entry.addr))
            .filter(|file| files.contains(file))
            .collect();
        if touched.is_empty() {
            return Ok(());
        }

        let (active, pending) = (self.active_snapshot()?, self.pending_snapshot()?);
        let mut snaps = self.snapshot_chain(active)?;
        snaps.extend(self.snapshot_chain(pending)?);

        let mut pinned = BTreeSet::new();
        for &snap in &snaps {
            pinned.extend(self.snapshot_entries(snap)?.iter().map(|entry| entry.addr.block()));
        }

        for file in touched {
            let mut keep = self.file_size(file)?;
            for &snap in &snaps {
                keep = keep.max(self.size_from(Some(snap), file)? as usize);
            }
            self.release_blocks(file, keep, &pinned)?;
            self.disk.flush(file.addr().block())?;
        }
        Ok(())
    }

    /// 恢复被接受后暂存的链
    pub fn enable_snapshot(&mut self) -> Result<()> {
        let slots = self.snapshot_slots()?;
        if slots.pending == 0 || slots.active != 0 {
            return Err(Error::InvalidState);
        }
        self.store_snapshot_slots(SnapshotSlots {
            active: slots.pending,
            pending: 0,
        })
    }

    /// 活动链上的全部快照，最旧的在前
    pub fn snapshots(&mut self) -> Result<Vec<SnapshotInfo>> {
        let head = self.active_snapshot()?;
        let mut chain = self.snapshot_chain(head)?;
        chain.reverse();

        let mut infos = Vec::with_capacity(chain.len());
        for snap in chain {
            let header = self.snapshot_header(snap)?;
            let size = self.file_size(snap)?;
            infos.push(SnapshotInfo {
                id: snap,
                name: self.file_name(snap)?,
                comment: header.comment().to_string(),
                kind: header.kind(),
                created: header.date,
                entries: size.saturating_sub(SnapshotHeader::SIZE) / DiffEntry::SIZE,
            });
        }
        Ok(infos)
    }
}
