use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::{BlockDevice, DeviceError};

/// 内存中的块设备，整片区域初始全为零。
///
/// 多次挂载同一个 `Arc<MemoryDisk>` 可以模拟重启后的读盘。
#[derive(Debug)]
pub struct MemoryDisk {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryDisk {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; len]),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 块所在的字节区间，越界则报错
    fn span(&self, block_id: usize, block_size: usize) -> Result<(usize, usize), DeviceError> {
        let start = block_id
            .checked_mul(block_size)
            .ok_or(DeviceError::OutOfRange(block_id))?;
        let end = start + block_size;
        if end > self.len() {
            return Err(DeviceError::OutOfRange(block_id));
        }
        Ok((start, end))
    }
}

impl BlockDevice for MemoryDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        let (start, end) = self.span(block_id, buf.len())?;
        buf.copy_from_slice(&self.bytes.lock()[start..end]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        let (start, end) = self.span(block_id, buf.len())?;
        self.bytes.lock()[start..end].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_roundtrip() {
        let disk = MemoryDisk::new(4 * 512);
        let data = [0xA5u8; 512];
        disk.write_block(3, &data).unwrap();

        let mut buf = [0u8; 512];
        disk.read_block(3, &mut buf).unwrap();
        assert_eq!(buf, data);

        disk.read_block(2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn out_of_range() {
        let disk = MemoryDisk::new(2 * 512);
        let mut buf = [0u8; 512];
        assert_eq!(
            disk.read_block(2, &mut buf),
            Err(DeviceError::OutOfRange(2))
        );
        assert_eq!(disk.write_block(9, &buf), Err(DeviceError::OutOfRange(9)));
    }
}
