//! 宿主机上的块设备与时钟，供维护工具与测试挂载镜像文件

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::{BlockDevice, DeviceError};
use snap_fs::Clock;

/// 以镜像文件充当块设备，块大小由缓冲区长度决定
#[derive(Debug)]
pub struct BlockFile(Mutex<File>);

impl BlockFile {
    pub fn new(fd: File) -> Self {
        Self(Mutex::new(fd))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        let mut file = self.0.lock().map_err(|_| DeviceError::Transfer(block_id))?;
        file.seek(SeekFrom::Start((block_id * buf.len()) as u64))
            .and_then(|_| file.read_exact(buf))
            .map_err(|err| {
                log::error!("reading block {block_id}: {err}");
                DeviceError::Transfer(block_id)
            })
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        let mut file = self.0.lock().map_err(|_| DeviceError::Transfer(block_id))?;
        file.seek(SeekFrom::Start((block_id * buf.len()) as u64))
            .and_then(|_| file.write_all(buf))
            .map_err(|err| {
                log::error!("writing block {block_id}: {err}");
                DeviceError::Transfer(block_id)
            })
    }
}

/// 宿主机的实时时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}
