//! # 文件读写层
//!
//! 快照激活时，不在快照链上的文件走差异日志覆盖层；
//! 其余情况(无快照、快照文件自身)直接读写磁盘映射。

use vfs::{Error, Result};

use crate::layout::DiskFile;
use crate::{FileId, SnapFileSystem, BLOCK_SIZE, MAX_FILE_SIZE};

impl SnapFileSystem {
    /// 读取 `offset` 起的数据，返回读到的字节数。
    ///
    /// 快照激活时读到的是重放全部差异日志后的最新内容，目录除外。
    pub fn read(&mut self, file: FileId, buf: &mut [u8], offset: usize) -> Result<usize> {
        if self.overlay_applies(file)? && !self.file_map(file, DiskFile::is_dir)? {
            return self.overlay_read(file, buf, offset);
        }
        self.read_committed(file, buf, offset)
    }

    /// 只读已提交的内容，忽略快照覆盖层。空洞读出 0
    pub fn read_committed(&mut self, file: FileId, buf: &mut [u8], offset: usize) -> Result<usize> {
        let size = self.file_size(file)?;
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
                Some(block_id) => self.disk.read_bytes(block_id, inner, dest)?,
                None => dest.fill(0),
            }
            pos += len;
        }

        Ok(end - offset)
    }

    /// 写入 `buf`，超出文件大小时先扩展文件
    pub fn write(&mut self, file: FileId, buf: &[u8], offset: usize) -> Result<usize> {
        write_end(offset, buf.len())?;
        if self.overlay_applies(file)? {
            return self.overlay_write(file, buf, offset);
        }
        self.write_committed(file, buf, offset)
    }

    pub(crate) fn write_committed(&mut self, file: FileId, buf: &[u8], offset: usize) -> Result<usize> {
        let end = write_end(offset, buf.len())?;
        if end > self.file_size(file)? {
            self.set_size_committed(file, end)?;
        }

        let mut pos = offset;
        while pos < end {
            let inner = pos % BLOCK_SIZE;
            let len = (BLOCK_SIZE - inner).min(end - pos);
            let (block_id, fresh) = self.materialize_block(file, pos / BLOCK_SIZE)?;
            if fresh && len < BLOCK_SIZE {
                self.disk.zero(block_id)?;
            }
            self.disk
                .write_bytes(block_id, inner, &buf[pos - offset..pos - offset + len])?;
            pos += len;
        }

        Ok(buf.len())
    }

    /// 改变文件大小。快照激活时只在差异日志中记下新的大小
    pub fn set_size(&mut self, file: FileId, size: usize) -> Result<()> {
        if size > MAX_FILE_SIZE {
            return Err(Error::InvalidArgument);
        }
        if self.overlay_applies(file)? {
            return self.overlay_set_size(file, size as u32);
        }
        self.set_size_committed(file, size)
    }

    /// 不增大时释放新大小之外的块；文件记录所在块立即落盘
    pub(crate) fn set_size_committed(&mut self, file: FileId, size: usize) -> Result<()> {
        if self.file_size(file)? >= size {
            self.truncate_blocks(file, size)?;
        }
        self.file_map_mut(file, |f| f.size = size as u32)?;
        self.disk.flush(file.addr().block())
    }

    /// 把文件落盘。
    ///
    /// 快照激活时普通文件的改动都在链头快照里，落盘的是链头。
    pub fn flush(&mut self, file: FileId) -> Result<()> {
        match self.active_snapshot()? {
            Some(head) if !self.in_snapshot_chain(file)? => self.flush_file(head),
            _ => self.flush_file(file),
        }
    }

    /// 写回数据块、记录所在块与间接块
    fn flush_file(&mut self, file: FileId) -> Result<()> {
        let (count, indirect) = self.file_map(file, |f| (f.block_count(), f.indirect))?;
        for bno in 0..count {
            if let Some(block_id) = self.lookup_block(file, bno)? {
                self.disk.flush(block_id)?;
            }
        }
        self.disk.flush(file.addr().block())?;
        if indirect != 0 {
            self.disk.flush(indirect)?;
        }
        Ok(())
    }

    /// 快照激活且文件不在快照链上
    fn overlay_applies(&mut self, file: FileId) -> Result<bool> {
        Ok(self.active_snapshot()?.is_some() && !self.in_snapshot_chain(file)?)
    }
}

/// 写入的结束位置，不能超过最大文件大小
pub(crate) fn write_end(offset: usize, len: usize) -> Result<usize> {
    offset
        .checked_add(len)
        .filter(|&end| end <= MAX_FILE_SIZE)
        .ok_or(Error::InvalidArgument)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec;

    use block_dev::MemoryDisk;

    use super::*;
    use crate::Clock;

    struct Epoch;

    impl Clock for Epoch {
        fn now(&self) -> u64 {
            0
        }
    }

    fn sfs() -> SnapFileSystem {
        let device = Arc::new(MemoryDisk::new(128 * BLOCK_SIZE));
        SnapFileSystem::format(device, 128, Arc::new(Epoch)).unwrap()
    }

    #[test]
    fn read_past_end() {
        let mut sfs = sfs();
        let file = sfs.create("/f").unwrap();
        sfs.write(file, b"abc", 0).unwrap();
        let mut buf = [0; 8];
        assert_eq!(sfs.read(file, &mut buf, 3).unwrap(), 0);
        assert_eq!(sfs.read(file, &mut buf, 1).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
    }

    #[test]
    fn holes_read_as_zero() {
        let mut sfs = sfs();
        let file = sfs.create("/sparse").unwrap();
        sfs.set_size(file, 3 * BLOCK_SIZE).unwrap();
        let before = sfs.stat(file).unwrap().blocks;

        let mut buf = vec![0xff; BLOCK_SIZE];
        assert_eq!(sfs.read(file, &mut buf, BLOCK_SIZE).unwrap(), BLOCK_SIZE);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(sfs.stat(file).unwrap().blocks, before);
    }

    #[test]
    fn shrink_frees_blocks() {
        let mut sfs = sfs();
        let file = sfs.create("/f").unwrap();
        sfs.write(file, &vec![7; 3 * BLOCK_SIZE], 0).unwrap();
        let blocks = sfs.file_blocks(file).unwrap();
        assert_eq!(blocks.len(), 3);

        sfs.set_size(file, 10).unwrap();
        assert_eq!(sfs.file_blocks(file).unwrap(), blocks[..1]);
        assert!(sfs.is_free(blocks[1]).unwrap());
        assert!(sfs.is_free(blocks[2]).unwrap());
    }

    #[test]
    fn too_large() {
        let mut sfs = sfs();
        let file = sfs.create("/f").unwrap();
        assert_eq!(sfs.write(file, b"x", MAX_FILE_SIZE), Err(Error::InvalidArgument));
        assert_eq!(sfs.set_size(file, MAX_FILE_SIZE + 1), Err(Error::InvalidArgument));
        assert_eq!(sfs.write(file, b"x", usize::MAX), Err(Error::InvalidArgument));
        assert_eq!(sfs.stat(file).unwrap().size, 0);

        let mut buf = [0; 4];
        sfs.write(file, b"abc", 0).unwrap();
        assert_eq!(sfs.read(file, &mut buf, usize::MAX), Ok(0));
        assert_eq!(sfs.read(file, &mut buf, 1).unwrap(), 2);
    }

    #[test]
    fn reused_block_is_zeroed() {
        let mut sfs = sfs();
        let a = sfs.create("/a").unwrap();
        sfs.write(a, &vec![0xaa; BLOCK_SIZE], 0).unwrap();
        let block = sfs.file_blocks(a).unwrap()[0];
        sfs.set_size(a, 0).unwrap();

        let b = sfs.create("/b").unwrap();
        sfs.write(b, b"tail", 100).unwrap();
        assert_eq!(sfs.file_blocks(b).unwrap(), [block]);

        let mut buf = [0xff; 104];
        assert_eq!(sfs.read(b, &mut buf, 0).unwrap(), 104);
        assert!(buf[..100].iter().all(|&byte| byte == 0));
        assert_eq!(&buf[100..], b"tail");
    }

    #[test]
    fn stray_blocks_past_size_are_released() {
        let mut sfs = sfs();
        let file = sfs.create("/f").unwrap();
        // 块号已写入记录而大小未变，快照被丢弃后就是这种状态
        let (stray, _) = sfs.materialize_block(file, 11).unwrap();
        let indirect = sfs.file_map(file, |f| f.indirect).unwrap();
        assert_ne!(indirect, 0);

        sfs.set_size(file, 0).unwrap();
        assert!(sfs.is_free(stray).unwrap());
        assert!(sfs.is_free(indirect).unwrap());
        assert_eq!(sfs.file_map(file, |f| f.indirect).unwrap(), 0);
    }
}
