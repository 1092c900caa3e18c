use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    // Caller misuse.
    #[error("bad file descriptor {0}")]
    BadFd(usize),

    #[error("bad cursor: offset {offset} from {base} is negative")]
    BadCursor { base: usize, offset: i64 },

    #[error("bad whence {0}")]
    BadWhence(i32),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid file name {0:?}")]
    InvalidName(String),

    #[error("too many open files")]
    TooManyOpenFiles,

    // Image and layout errors.
    #[error("disk image not found: {0}")]
    NoDisk(String),

    #[error("bad superblock")]
    BadSuperBlock,

    #[error("image too small: {total_blocks} blocks cannot hold the layout")]
    ImageTooSmall { total_blocks: u32 },

    #[error("no free data blocks")]
    DiskFull,

    #[error("no free inodes")]
    NoInodes,

    #[error("file too large: {blocks} blocks requested, at most {max} supported")]
    FileTooLarge { blocks: usize, max: usize },

    #[error("block {fbn} of inode {inum} is not allocated ({allocated} blocks)")]
    UnallocatedBlock { inum: u32, fbn: usize, allocated: usize },

    #[error("block {0} is outside the device")]
    BlockOutOfRange(usize),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, FsError>;
