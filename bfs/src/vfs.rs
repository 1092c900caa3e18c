use crate::{
    block_dev::BlockDevice,
    config::{FormatOptions, MAX_OPEN_FILES},
    cursor::{cursor_after_read, seek_target, Whence},
    dir,
    error::FsError,
    fs::FileSystem,
    growth::end_offset,
    layout::InodeKind,
    oft::OpenFileTable,
    translator::InodeService,
    Result,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// A mounted file system and its descriptor table.
pub struct Bfs {
    fs: FileSystem,
    files: OpenFileTable,
}

impl Bfs {
    /// Format `block_device` and mount the result.
    pub fn format(block_device: Arc<dyn BlockDevice>, options: &FormatOptions) -> Result<Self> {
        Ok(Self::with_fs(FileSystem::format(block_device, options)?))
    }

    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        Ok(Self::with_fs(FileSystem::mount(block_device)?))
    }

    fn with_fs(fs: FileSystem) -> Self {
        Self {
            fs,
            files: OpenFileTable::new(MAX_OPEN_FILES),
        }
    }

    /// Create `name`, or empty it if it already exists, and open it.
    pub fn create(&mut self, name: &str) -> Result<usize> {
        dir::validate_name(name)?;
        let inode_id = match dir::find(&mut self.fs, name)? {
            Some(inode_id) => {
                debug!(name, inode_id, "create over existing file");
                self.fs.truncate(inode_id)?;
                inode_id
            }
            None => {
                let inode_id = self.fs.alloc_inode(InodeKind::File)?;
                if let Err(e) = dir::insert(&mut self.fs, name, inode_id) {
                    warn!(name, inode_id, "create: {e}");
                    self.fs.dealloc_inode(inode_id)?;
                    return Err(e);
                }
                inode_id
            }
        };
        self.files.open(inode_id)
    }

    pub fn open(&mut self, name: &str) -> Result<usize> {
        let inode_id =
            dir::find(&mut self.fs, name)?.ok_or_else(|| FsError::NotFound(name.to_string()))?;
        if !self.fs.read_inode(inode_id, |disk_inode| disk_inode.is_file())? {
            return Err(FsError::NotFound(name.to_string()));
        }
        self.files.open(inode_id)
    }

    pub fn close(&mut self, fd: usize) -> Result<()> {
        let inode_id = self.files.close(fd).inspect_err(|e| warn!(fd, "close: {e}"))?;
        if self.files.open_count(inode_id) == 0 {
            debug!(inode_id, "last descriptor closed");
        }
        if self.files.is_empty() {
            debug!("no open files");
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes at the cursor. Fewer bytes come back when
    /// the read reaches the end of the file, in which case the cursor stops
    /// at the end.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let file = *self.files.entry(fd)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let size = self.fs.size(file.inode_id)?;
        let read = self.fs.translator().read_at(file.inode_id, file.cursor, buf)?;
        self.files.entry_mut(fd)?.cursor = cursor_after_read(file.cursor, buf.len(), size);
        Ok(read)
    }

    /// Write all of `buf` at the cursor, growing the file as needed.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<()> {
        let file = *self.files.entry(fd)?;
        self.fs.translator().write_at(file.inode_id, file.cursor, buf)?;
        if !buf.is_empty() {
            self.files.entry_mut(fd)?.cursor = end_offset(file.cursor, buf.len())?;
        }
        Ok(())
    }

    pub fn seek(&mut self, fd: usize, offset: i64, whence: Whence) -> Result<()> {
        let file = *self.files.entry(fd)?;
        let size = self.fs.size(file.inode_id)?;
        let cursor = seek_target(file.cursor, size, offset, whence)
            .inspect_err(|e| warn!(fd, "seek: {e}"))?;
        self.files.entry_mut(fd)?.cursor = cursor;
        Ok(())
    }

    pub fn tell(&self, fd: usize) -> Result<usize> {
        Ok(self.files.entry(fd)?.cursor)
    }

    pub fn size(&self, fd: usize) -> Result<usize> {
        self.fs.size(self.files.inode_of(fd)?)
    }

    /// Number of blocks in the block map of the file open on `fd`.
    pub fn allocated_blocks(&self, fd: usize) -> Result<usize> {
        Ok(self.fs.allocation(self.files.inode_of(fd)?)?.blocks())
    }

    /// Names in the directory, in creation order.
    pub fn list(&mut self) -> Result<Vec<String>> {
        dir::list(&mut self.fs)
    }

    pub fn open_count(&self, fd: usize) -> Result<usize> {
        Ok(self.files.open_count(self.files.inode_of(fd)?))
    }
}
