use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("id is out of range or does not name a live object")]
    InvalidId,
    #[error("object is already free")]
    DoubleFree,
    #[error("logical block index out of range")]
    OutOfRange,
    #[error("no free block or inode left")]
    ResourceExhausted,
    #[error("allocator bookkeeping is inconsistent")]
    Inconsistent,
}

pub type Result<T> = core::result::Result<T, FsError>;
