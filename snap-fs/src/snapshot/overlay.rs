//! 差异日志覆盖层
//!
//! 日志以物理地址为键，每个地址在一个快照里至多一项，值总是最新写入的字节。
//! 读取时从链头向旧快照查找，都没有记录才读磁盘。

use alloc::vec;

use vfs::{Error, Result};

use crate::file::write_end;
use crate::layout::{DiffEntry, DiskFile, SnapshotHeader};
use crate::{FileId, PhysAddr, SnapFileSystem, BLOCK_SIZE};

/// 扫描日志时每次读入的字节数，取日志项大小的整数倍
const SCAN_CHUNK: usize = BLOCK_SIZE / DiffEntry::SIZE * DiffEntry::SIZE;

impl SnapFileSystem {
    /// 在单个快照的日志中查找地址，返回日志项在快照文件中的偏移
    pub fn find_in_snapshot(&mut self, snap: FileId, addr: PhysAddr) -> Result<Option<usize>> {
        let size = self.file_size(snap)?;
        let mut chunk = vec![0; SCAN_CHUNK];

        let mut pos = SnapshotHeader::SIZE;
        while pos < size {
            let len = self.read_committed(snap, &mut chunk, pos)?;
            if len == 0 {
                break;
            }
            let hit = chunk[..len]
                .chunks_exact(DiffEntry::SIZE)
                .position(|raw| DiffEntry::decode(raw).addr == addr);
            if let Some(i) = hit {
                return Ok(Some(pos + i * DiffEntry::SIZE));
            }
            pos += len;
        }

        Ok(None)
    }

    /// 从链头开始查找，返回第一个记录了该地址的快照及日志项偏移
    pub fn find_in_chain(&mut self, addr: PhysAddr) -> Result<Option<(FileId, usize)>> {
        let head = self.active_snapshot()?;
        self.find_from(head, addr)
    }

    fn find_from(&mut self, head: Option<FileId>, addr: PhysAddr) -> Result<Option<(FileId, usize)>> {
        let mut snap = head;
        while let Some(s) = snap {
            if let Some(offset) = self.find_in_snapshot(s, addr)? {
                return Ok(Some((s, offset)));
            }
            snap = self.snapshot_prev(s)?;
        }
        Ok(None)
    }

    /// 以 `head` 为链头看到的字节：链上的记录优先，否则读磁盘
    fn byte_from(&mut self, head: Option<FileId>, addr: PhysAddr) -> Result<u8> {
        match self.find_from(head, addr)? {
            Some((snap, offset)) => {
                let mut value = [0];
                self.read_committed(snap, &mut value, offset + 4)?;
                Ok(value[0])
            }
            None => self.disk.read_byte(addr),
        }
    }

    fn chain_byte(&mut self, addr: PhysAddr) -> Result<u8> {
        let head = self.active_snapshot()?;
        self.byte_from(head, addr)
    }

    /// 在链头记下一个字节，已有记录则原地更新
    fn record(&mut self, head: FileId, addr: PhysAddr, value: u8) -> Result<()> {
        match self.find_in_snapshot(head, addr)? {
            Some(offset) => self.write_committed(head, &[value], offset + 4)?,
            None => {
                let end = self.file_size(head)?;
                self.write_committed(head, &DiffEntry { addr, value }.encode(), end)?
            }
        };
        Ok(())
    }

    fn record_size(&mut self, head: FileId, file: FileId, size: u32) -> Result<()> {
        let field = file.addr() + DiskFile::SIZE_OFFSET;
        for (i, byte) in size.to_le_bytes().into_iter().enumerate() {
            self.record(head, field + i, byte)?;
        }
        Ok(())
    }

    /// 逐字节重放得到的文件大小
    pub fn reconstructed_size(&mut self, file: FileId) -> Result<u32> {
        let head = self.active_snapshot()?;
        self.size_from(head, file)
    }

    /// 以 `head` 为链头重放得到的文件大小
    pub(crate) fn size_from(&mut self, head: Option<FileId>, file: FileId) -> Result<u32> {
        let field = file.addr() + DiskFile::SIZE_OFFSET;
        let mut bytes = [0; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.byte_from(head, field + i)?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    /// 写入只进入链头快照的日志，不写穿到磁盘。
    ///
    /// 数据块仍按需分配，块号直接写入文件记录。
    pub(crate) fn overlay_write(&mut self, file: FileId, buf: &[u8], offset: usize) -> Result<usize> {
        let head = self.active_snapshot()?.ok_or(Error::InvalidState)?;
        let end = write_end(offset, buf.len())?;
        if end > self.reconstructed_size(file)? as usize {
            self.record_size(head, file, end as u32)?;
        }

        let mut pos = offset;
        while pos < end {
            let inner = pos % BLOCK_SIZE;
            let len = (BLOCK_SIZE - inner).min(end - pos);
            // 新块在磁盘上清零，日志之外的字节读出 0
            let (block_id, fresh) = self.materialize_block(file, pos / BLOCK_SIZE)?;
            if fresh {
                self.disk.zero(block_id)?;
            }
            for (i, &byte) in buf[pos - offset..pos - offset + len].iter().enumerate() {
                self.record(head, PhysAddr::new(block_id, inner + i), byte)?;
            }
            pos += len;
        }

        Ok(buf.len())
    }

    pub(crate) fn overlay_read(&mut self, file: FileId, buf: &mut [u8], offset: usize) -> Result<usize> {
        let size = self.reconstructed_size(file)? as usize;
        if offset >= size {
            return Ok(0);
        }
        let end = size.min(offset.saturating_add(buf.len()));

        let mut pos = offset;
        while pos < end {
            let inner = pos % BLOCK_SIZE;
            let len = (BLOCK_SIZE - inner).min(end - pos);
            let dest = &mut buf[pos - offset..pos - offset + len];
            match self.lookup_block(file, pos / BLOCK_SIZE)? {
                Some(block_id) => {
                    for (i, byte) in dest.iter_mut().enumerate() {
                        *byte = self.chain_byte(PhysAddr::new(block_id, inner + i))?;
                    }
                }
                None => dest.fill(0),
            }
            pos += len;
        }

        Ok(end - offset)
    }

    pub(crate) fn overlay_set_size(&mut self, file: FileId, size: u32) -> Result<()> {
        let head = self.active_snapshot()?.ok_or(Error::InvalidState)?;
        self.record_size(head, file, size)
    }
}
