//! # 目录层
//!
//! 目录就是内容为一串 256 字节文件记录的文件，大小总是块大小的整数倍。
//! 路径按 `/` 切分，连续的斜杠视为一个，空路径即根目录。

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use vfs::{DirEntry, DirEntryType, Error, Result, Stat, StatKind};

use crate::layout::{DiskFile, FileKind};
use crate::{FileId, PhysAddr, SnapFileSystem, BLOCK_SIZE, FILES_PER_BLOCK, FILE_ENTRY_SIZE};
use crate::{MAX_NAME_LEN, ROOT};

/// 路径解析的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// 路径存在；`dir` 是其父目录，根目录没有父目录
    Found { dir: Option<FileId>, file: FileId },
    /// 只有最后一个分量不存在
    Missing { dir: FileId, name: String },
}

impl SnapFileSystem {
    /// 目录中的全部记录槽位，空闲的也包括在内
    pub(crate) fn dir_slots(&mut self, dir: FileId) -> Result<Vec<FileId>> {
        let size = self.file_size(dir)?;
        debug_assert_eq!(size % BLOCK_SIZE, 0);

        let mut slots = Vec::new();
        for bno in 0..size / BLOCK_SIZE {
            let Some(block_id) = self.lookup_block(dir, bno)? else {
                continue;
            };
            slots.extend(
                (0..FILES_PER_BLOCK)
                    .map(|i| FileId::new(PhysAddr::new(block_id, i * FILE_ENTRY_SIZE))),
            );
        }
        Ok(slots)
    }

    /// 目录中已被占用的记录
    pub(crate) fn dir_files(&mut self, dir: FileId) -> Result<Vec<FileId>> {
        let mut files = Vec::new();
        for slot in self.dir_slots(dir)? {
            if !self.file_map(slot, DiskFile::is_free)? {
                files.push(slot);
            }
        }
        Ok(files)
    }

    fn dir_lookup(&mut self, dir: FileId, name: &str) -> Result<FileId> {
        for file in self.dir_files(dir)? {
            if self.file_map(file, |f| f.name() == name)? {
                return Ok(file);
            }
        }
        Err(Error::NotFound)
    }

    /// 取一个空闲槽位，没有就给目录追加一个清零的块
    fn dir_alloc_file(&mut self, dir: FileId) -> Result<FileId> {
        for slot in self.dir_slots(dir)? {
            if self.file_map(slot, DiskFile::is_free)? {
                return Ok(slot);
            }
        }

        let size = self.file_size(dir)?;
        let (block_id, _) = self.materialize_block(dir, size / BLOCK_SIZE)?;
        self.disk.zero(block_id)?;
        self.file_map_mut(dir, |d| d.size += BLOCK_SIZE as u32)?;
        Ok(FileId::new(PhysAddr::new(block_id, 0)))
    }

    /// 从根目录逐级解析路径。
    ///
    /// 只缺最后一个分量时返回 [`Lookup::Missing`]，供创建使用。
    pub fn walk(&mut self, path: &str) -> Result<Lookup> {
        let mut dir = None;
        let mut file = ROOT;
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();

        while let Some(name) = components.next() {
            if name.len() >= MAX_NAME_LEN {
                return Err(Error::InvalidPath);
            }
            if !self.file_map(file, DiskFile::is_dir)? {
                return Err(Error::NotFound);
            }

            dir = Some(file);
            match self.dir_lookup(file, name) {
                Ok(found) => file = found,
                Err(Error::NotFound) if components.peek().is_none() => {
                    return Ok(Lookup::Missing {
                        dir: file,
                        name: name.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(Lookup::Found { dir, file })
    }

    fn create_kind(&mut self, path: &str, kind: FileKind) -> Result<FileId> {
        let (dir, name) = match self.walk(path)? {
            Lookup::Found { .. } => return Err(Error::AlreadyExists),
            Lookup::Missing { dir, name } => (dir, name),
        };

        let file = self.dir_alloc_file(dir)?;
        self.file_map_mut(file, |f| f.init(&name, kind))?;
        self.flush(dir)?;
        log::debug!("created {kind:?} {path} at {file}");

        Ok(file)
    }

    /// 创建空的普通文件，父目录必须存在
    #[inline]
    pub fn create(&mut self, path: &str) -> Result<FileId> {
        self.create_kind(path, FileKind::Regular)
    }

    #[inline]
    pub fn create_dir(&mut self, path: &str) -> Result<FileId> {
        self.create_kind(path, FileKind::Directory)
    }

    pub fn open(&mut self, path: &str) -> Result<FileId> {
        match self.walk(path)? {
            Lookup::Found { file, .. } => Ok(file),
            Lookup::Missing { .. } => Err(Error::NotFound),
        }
    }

    pub fn read_dir(&mut self, dir: FileId) -> Result<Vec<DirEntry>> {
        if !self.file_map(dir, DiskFile::is_dir)? {
            return Err(Error::InvalidArgument);
        }

        let mut entries = Vec::new();
        for file in self.dir_files(dir)? {
            let entry = self.file_map(file, |f| DirEntry {
                inode: u32::from(file.addr()) as u64,
                ty: f.kind().into(),
                name: f.name().to_string(),
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// 已提交的元数据，快照覆盖层中的大小不反映在这里
    pub fn stat(&mut self, file: FileId) -> Result<Stat> {
        let (size, kind) = self.file_map(file, |f| (f.size, f.kind()))?;
        let blocks = self.file_blocks(file)?.len();

        Ok(Stat {
            inode: u32::from(file.addr()) as u64,
            kind: StatKind::from(DirEntryType::from(kind)),
            size: size as u64,
            blocks: blocks as u64,
            block_size: BLOCK_SIZE as u64,
        })
    }

    pub fn file_name(&mut self, file: FileId) -> Result<String> {
        self.file_map(file, |f| f.name().to_string())
    }

    /// 先序收集目录树下的全部普通文件
    pub(crate) fn regular_files(&mut self, dir: FileId, files: &mut Vec<FileId>) -> Result<()> {
        for file in self.dir_files(dir)? {
            if self.file_map(file, DiskFile::is_dir)? {
                self.regular_files(file, files)?;
            } else {
                files.push(file);
            }
        }
        Ok(())
    }
}

impl From<FileKind> for DirEntryType {
    #[inline]
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Directory => Self::Directory,
            FileKind::Regular => Self::Regular,
        }
    }
}
