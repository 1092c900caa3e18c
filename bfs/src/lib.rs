mod bitmap;
mod block;
mod block_dev;
pub mod config;
mod cursor;
mod dir;
mod error;
mod fs;
mod growth;
mod layout;
mod oft;
pub mod span;
mod translator;
mod vfs;

pub use block::DataBlock;
pub use block_dev::{BlockDevice, BlockFile, MemBlockDevice};
pub use config::{FormatOptions, BLOCK_SZ};
pub use cursor::{Whence, SEEK_CUR, SEEK_END, SEEK_SET};
pub use error::{FsError, Result};
pub use fs::{FileSystem, ROOT_INODE};
pub use growth::{blocks_for, growth_target, Allocation};
pub use layout::{MAX_FILE_BLOCKS, NAME_LENGTH_LIMIT};
pub use translator::{InodeService, Translator};
pub use vfs::Bfs;
