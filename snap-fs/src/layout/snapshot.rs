use core::{ptr, slice};

use derive_more::Display;

use crate::PhysAddr;

/// 注释缓冲区长度，含结尾的 \0
pub const COMMENT_LEN: usize = 100;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SnapshotKind {
    #[default]
    #[display(fmt = "incremental")]
    Incremental = b'i',
    #[display(fmt = "full")]
    Full = b'f',
}

/// 快照文件的前 128 字节，其后是差异日志
#[derive(Debug, Clone)]
#[repr(C)]
pub struct SnapshotHeader {
    comment: [u8; COMMENT_LEN],
    kind: u8,
    _pad: [u8; 3],
    /// 创建时间，Unix 秒
    pub date: u64,
    /// 创建时刻位图副本所在的块
    pub old_bitmap: u32,
    _pad2: u32,
    /// 更旧快照的文件记录地址
    pub prev: u64,
}

impl SnapshotHeader {
    pub const SIZE: usize = 128;
    pub const PREV_OFFSET: usize = 120;

    pub fn new(kind: SnapshotKind, comment: &str, date: u64, old_bitmap: u32, prev: u64) -> Self {
        let bytes = comment.as_bytes();
        let mut comment = [0; COMMENT_LEN];
        comment[..bytes.len()].copy_from_slice(bytes);

        Self {
            comment,
            kind: kind as u8,
            _pad: [0; 3],
            date,
            old_bitmap,
            _pad2: 0,
            prev,
        }
    }

    #[inline]
    pub fn zeroed() -> Self {
        Self::new(SnapshotKind::Incremental, "", 0, 0, 0)
    }

    pub fn comment(&self) -> &str {
        let len = self
            .comment
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(COMMENT_LEN);
        core::str::from_utf8(&self.comment[..len]).unwrap_or_default()
    }

    pub fn kind(&self) -> SnapshotKind {
        match self.kind {
            b'f' => SnapshotKind::Full,
            _ => SnapshotKind::Incremental,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}

/// 差异日志项：地址 4 字节小端 + 字节值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffEntry {
    pub addr: PhysAddr,
    pub value: u8,
}

impl DiffEntry {
    pub const SIZE: usize = 5;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let [a, b, c, d] = u32::from(self.addr).to_le_bytes();
        [a, b, c, d, self.value]
    }

    pub fn decode(raw: &[u8]) -> Self {
        let addr = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Self {
            addr: addr.into(),
            value: raw[4],
        }
    }
}
