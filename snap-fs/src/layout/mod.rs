//! # 磁盘数据结构层
//!
//! snap-fs 的磁盘布局：
//! 引导块 | 超级块(内嵌根目录记录与快照槽位) | 空闲位图 | 数据块
//!
//! 多字节整数一律小端序。

mod super_block;
pub use super_block::{SnapshotSlots, SuperBlock};

mod bitmap;
pub use bitmap::Bitmap;

mod file;
pub use file::{DiskFile, FileKind};

/// 快照文件头与差异日志项
mod snapshot;
pub use snapshot::{DiffEntry, SnapshotHeader, SnapshotKind, COMMENT_LEN};
