//! 卷内的字节地址
//!
//! 整个卷被看作从映射基址开始的一段平坦字节区，
//! [`PhysAddr`] 就是相对基址的偏移：`块号 * BLOCK_SIZE + 块内偏移`。
//! 它与哪个文件、哪个逻辑块无关，差异日志以它为键。

use core::ops::Add;

use derive_more::{Display, From, Into};

use crate::{BlockId, BLOCK_SIZE};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, From, Into)]
#[display(fmt = "{:#x}", _0)]
#[repr(transparent)]
pub struct PhysAddr(u32);

impl PhysAddr {
    #[inline]
    pub const fn new(block_id: BlockId, offset: usize) -> Self {
        Self(block_id * BLOCK_SIZE as u32 + offset as u32)
    }

    #[inline]
    pub const fn block(self) -> BlockId {
        self.0 / BLOCK_SIZE as u32
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0 as usize % BLOCK_SIZE
    }
}

impl Add<usize> for PhysAddr {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs as u32)
    }
}

/// 文件记录的句柄：记录本身所在的物理地址。
///
/// 快照链和超级块中的快照槽位持久化的都是它，0 表示空。
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct FileId(PhysAddr);

impl FileId {
    #[inline]
    pub const fn new(addr: PhysAddr) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn addr(self) -> PhysAddr {
        self.0
    }

    /// 解码磁盘上的 8 字节槽位
    #[inline]
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then(|| Self(PhysAddr(raw as u32)))
    }

    #[inline]
    pub fn to_raw(id: Option<Self>) -> u64 {
        id.map_or(0, |id| u32::from(id.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_and_offset() {
        let addr = PhysAddr::new(7, 300);
        assert_eq!(addr.block(), 7);
        assert_eq!(addr.offset(), 300);
        assert_eq!((addr + 4096).block(), 8);
        assert_eq!(u32::from(addr), 7 * 4096 + 300);
    }

    #[test]
    fn raw_slot_encoding() {
        assert_eq!(FileId::from_raw(0), None);
        let id = FileId::new(PhysAddr::new(3, 256));
        assert_eq!(FileId::from_raw(FileId::to_raw(Some(id))), Some(id));
        assert_eq!(FileId::to_raw(None), 0);
    }
}
