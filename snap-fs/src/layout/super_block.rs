use core::mem;

use super::{DiskFile, FileKind};
use crate::FS_MAGIC;

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 内嵌根目录的文件记录
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub root: DiskFile,
}

impl SuperBlock {
    pub const ROOT_OFFSET: usize = 8;

    pub fn init(&mut self, total_blocks: u32) {
        self.magic = FS_MAGIC;
        self.total_blocks = total_blocks;
        self.root.init("/", FileKind::Directory);
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == FS_MAGIC
    }
}

/// 紧随超级块之后的两个快照槽位，存放快照文件记录的地址
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SnapshotSlots {
    /// 活动链的链头，0 表示无快照
    pub active: u64,
    /// 已接受后暂存的链
    pub pending: u64,
}

impl SnapshotSlots {
    pub const OFFSET: usize = mem::size_of::<SuperBlock>();
}
