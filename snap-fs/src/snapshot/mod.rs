//! # 快照层
//!
//! 快照是根目录下的普通文件：128 字节的 [`SnapshotHeader`] 后跟差异日志。
//! 快照经 `prev` 从新到旧串成链，超级块中的活动槽位指向链头。
//!
//! 链头快照激活期间，普通文件的写入只追加到链头的差异日志中，
//! 磁盘上的内容保持为创建快照时的状态，直到快照被接受。

mod lifecycle;
mod overlay;

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use vfs::{Error, Result};

pub use lifecycle::SnapshotInfo;

use crate::layout::{DiffEntry, SnapshotHeader};
use crate::{FileId, SnapFileSystem};

impl SnapFileSystem {
    pub fn active_snapshot(&mut self) -> Result<Option<FileId>> {
        Ok(FileId::from_raw(self.snapshot_slots()?.active))
    }

    /// 被接受后暂存、可由 [`Self::enable_snapshot`] 恢复的链
    pub fn pending_snapshot(&mut self) -> Result<Option<FileId>> {
        Ok(FileId::from_raw(self.snapshot_slots()?.pending))
    }

    pub(crate) fn snapshot_header(&mut self, snap: FileId) -> Result<SnapshotHeader> {
        let mut header = SnapshotHeader::zeroed();
        self.read_committed(snap, header.as_bytes_mut(), 0)?;
        Ok(header)
    }

    pub(crate) fn snapshot_prev(&mut self, snap: FileId) -> Result<Option<FileId>> {
        Ok(FileId::from_raw(self.snapshot_header(snap)?.prev))
    }

    pub(crate) fn set_snapshot_prev(&mut self, snap: FileId, prev: Option<FileId>) -> Result<()> {
        let raw = FileId::to_raw(prev).to_le_bytes();
        self.write_committed(snap, &raw, SnapshotHeader::PREV_OFFSET)?;
        Ok(())
    }

    /// 从 `head` 起沿链走到底，新的在前
    pub(crate) fn snapshot_chain(&mut self, head: Option<FileId>) -> Result<Vec<FileId>> {
        let mut chain = Vec::new();
        let mut snap = head;
        while let Some(s) = snap {
            chain.push(s);
            snap = self.snapshot_prev(s)?;
        }
        Ok(chain)
    }

    /// 文件是否属于活动链
    pub(crate) fn in_snapshot_chain(&mut self, file: FileId) -> Result<bool> {
        let mut snap = self.active_snapshot()?;
        while let Some(s) = snap {
            if s == file {
                return Ok(true);
            }
            snap = self.snapshot_prev(s)?;
        }
        Ok(false)
    }

    /// 按路径找到活动链中的快照，同时返回比它新一级的快照
    pub(crate) fn find_snapshot(&mut self, path: &str) -> Result<(Option<FileId>, FileId)> {
        let target = self.open(path)?;
        let mut newer = None;
        let mut snap = self.active_snapshot()?.ok_or(Error::NotFound)?;
        while snap != target {
            newer = Some(snap);
            snap = self.snapshot_prev(snap)?.ok_or(Error::NotFound)?;
        }
        Ok((newer, snap))
    }

    /// 快照的全部差异日志，按追加顺序
    pub(crate) fn snapshot_entries(&mut self, snap: FileId) -> Result<Vec<DiffEntry>> {
        let size = self.file_size(snap)?;
        if size <= SnapshotHeader::SIZE {
            return Ok(Vec::new());
        }

        let mut raw = vec![0; size - SnapshotHeader::SIZE];
        self.read_committed(snap, &mut raw, SnapshotHeader::SIZE)?;
        Ok(raw.chunks_exact(DiffEntry::SIZE).map(DiffEntry::decode).collect())
    }

    /// 按名字导出快照的差异日志
    pub fn snapshot_log(&mut self, name: &str) -> Result<Vec<DiffEntry>> {
        let (_, snap) = self.find_snapshot(name)?;
        self.snapshot_entries(snap)
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {:#04x}", self.addr, self.value)
    }
}
