//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 文件系统只通过块设备驱动读写块设备，块的大小由调用者的缓冲区长度决定。

#![no_std]

extern crate alloc;

mod memory;

use core::any::Any;

use derive_more::Display;

pub use self::memory::MemoryDisk;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError>;
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError>;
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// 块号超出了设备容量
    #[display(fmt = "block {} is beyond the end of the device", _0)]
    OutOfRange(usize),
    /// 底层介质读写失败
    #[display(fmt = "transfer of block {} failed", _0)]
    Transfer(usize),
}
