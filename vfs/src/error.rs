use block_dev::DeviceError;
use derive_more::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 位图中已没有空闲块
    #[display(fmt = "no free block left on the volume")]
    NoSpace,
    #[display(fmt = "no such file, directory or snapshot")]
    NotFound,
    /// 逻辑块号越界等参数错误
    #[display(fmt = "invalid argument")]
    InvalidArgument,
    /// 路径分量过长
    #[display(fmt = "path component is too long")]
    InvalidPath,
    #[display(fmt = "file already exists")]
    AlreadyExists,
    /// 快照链处于不允许该操作的状态
    #[display(fmt = "snapshot chain is not in a state that allows this")]
    InvalidState,
    #[display(fmt = "device I/O failure: {}", _0)]
    Io(DeviceError),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<DeviceError> for Error {
    #[inline]
    fn from(err: DeviceError) -> Self {
        Self::Io(err)
    }
}
