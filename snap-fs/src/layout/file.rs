use crate::{BlockId, BLOCK_SIZE, FILE_ENTRY_SIZE, MAX_NAME_LEN, N_DIRECT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular = 0,
    Directory = 1,
}

/// 磁盘上的文件记录，固定 256 字节。
///
/// 名字首字节为 0 即空闲记录。
#[derive(Debug)]
#[repr(C)]
pub struct DiskFile {
    name: [u8; MAX_NAME_LEN],
    pub size: u32,
    kind: u32,
    pub direct: [BlockId; N_DIRECT],
    pub indirect: BlockId,
    _pad: [u8; FILE_ENTRY_SIZE - MAX_NAME_LEN - 12 - 4 * N_DIRECT],
}

impl DiskFile {
    pub const SIZE_OFFSET: usize = MAX_NAME_LEN;
    pub const DIRECT_OFFSET: usize = MAX_NAME_LEN + 8;
    pub const INDIRECT_OFFSET: usize = Self::DIRECT_OFFSET + 4 * N_DIRECT;

    /// 清空记录后写入名字与类型
    pub fn init(&mut self, name: &str, kind: FileKind) {
        self.clear();
        let bytes = name.as_bytes();
        self.name[..bytes.len()].copy_from_slice(bytes);
        self.kind = kind as u32;
    }

    pub fn clear(&mut self) {
        *self = Self {
            name: [0; MAX_NAME_LEN],
            size: 0,
            kind: 0,
            direct: [0; N_DIRECT],
            indirect: 0,
            _pad: [0; FILE_ENTRY_SIZE - MAX_NAME_LEN - 12 - 4 * N_DIRECT],
        };
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    #[inline]
    pub fn kind(&self) -> FileKind {
        match self.kind {
            1 => FileKind::Directory,
            _ => FileKind::Regular,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    /// 文件大小覆盖的块数
    #[inline]
    pub fn block_count(&self) -> usize {
        (self.size as usize).div_ceil(BLOCK_SIZE)
    }
}
