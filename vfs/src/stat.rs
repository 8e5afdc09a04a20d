use enumflags2::bitflags;

use crate::DirEntryType;

#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct Stat {
    pub inode: u64,
    pub kind: StatKind,
    /// File size
    pub size: u64,
    /// Occupying blocks, the indirect block included
    pub blocks: u64,
    /// Optimal I/O block size
    pub block_size: u64,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}

impl Stat {
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == StatKind::DIR
    }
}

impl From<DirEntryType> for StatKind {
    #[inline]
    fn from(ty: DirEntryType) -> Self {
        match ty {
            DirEntryType::Directory => Self::DIR,
            DirEntryType::Regular => Self::FILE,
        }
    }
}
