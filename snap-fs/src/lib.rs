#![no_std]

extern crate alloc;

/* snap-fs 的整体架构，自上而下 */

// 碎片整理：在保持全部索引一致的前提下搬动物理块
mod defrag;

// 快照层：差异日志覆盖层与快照链的生命周期
mod snapshot;

// 文件读写层：按快照状态分派读写、截断与落盘
mod file;

// 目录层：路径解析、目录项查找与创建
mod dir;

// 块索引层：直接/一级间接块号的查找与分配
mod index;

// 文件系统句柄：格式化、挂载与块分配
mod sfs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：整个卷按块映射进内存
mod block_cache;

mod addr;
mod time;

pub use self::{
    addr::{FileId, PhysAddr},
    defrag::BlockUsage,
    dir::Lookup,
    layout::{DiffEntry, FileKind, SnapshotKind},
    sfs::SnapFileSystem,
    snapshot::SnapshotInfo,
    time::{Clock, DateTime},
};

pub const FS_MAGIC: u32 = 0x4A05_30AE;
pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// 卷的最大字节数
pub const DISK_SIZE: usize = 0xC000_0000;
pub const MAX_BLOCKS: usize = DISK_SIZE / BLOCK_SIZE;

/// 文件记录内的直接块号个数
pub const N_DIRECT: usize = 10;
/// 一级间接块可容纳的块号个数
pub const N_INDIRECT: usize = BLOCK_SIZE / 4;
pub const MAX_FILE_BLOCKS: usize = N_DIRECT + N_INDIRECT;
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

/// 文件名缓冲区长度，含结尾的 \0
pub const MAX_NAME_LEN: usize = 128;
pub const FILE_ENTRY_SIZE: usize = 256;
pub const FILES_PER_BLOCK: usize = BLOCK_SIZE / FILE_ENTRY_SIZE;

/// 块号，0 是空指针
pub type BlockId = u32;

pub const SUPER_BLOCK: BlockId = 1;
pub const BITMAP_START: BlockId = 2;

/// 根目录的文件记录内嵌在超级块中
pub const ROOT: FileId = FileId::new(PhysAddr::new(SUPER_BLOCK, layout::SuperBlock::ROOT_OFFSET));
