use crate::{error::FsError, Result};
use std::collections::BTreeMap;

/// One open instance of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode_id: u32,
    pub cursor: usize,
}

/// Descriptor table of a mounted file system. Each descriptor owns its own
/// cursor; inodes are counted by how many descriptors refer to them.
pub struct OpenFileTable {
    fd_table: Vec<Option<OpenFile>>,
    capacity: usize,
    open_counts: BTreeMap<u32, usize>,
}

impl OpenFileTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            fd_table: Vec::new(),
            capacity,
            open_counts: BTreeMap::new(),
        }
    }

    fn alloc_fd(&mut self) -> Result<usize> {
        if let Some(fd) = (0..self.fd_table.len()).find(|fd| self.fd_table[*fd].is_none()) {
            Ok(fd)
        } else if self.fd_table.len() < self.capacity {
            self.fd_table.push(None);
            Ok(self.fd_table.len() - 1)
        } else {
            Err(FsError::TooManyOpenFiles)
        }
    }

    /// Open `inode_id` with the cursor at 0, returning the lowest free descriptor.
    pub fn open(&mut self, inode_id: u32) -> Result<usize> {
        let fd = self.alloc_fd()?;
        self.fd_table[fd] = Some(OpenFile {
            inode_id,
            cursor: 0,
        });
        *self.open_counts.entry(inode_id).or_insert(0) += 1;
        Ok(fd)
    }

    /// Release `fd`, returning the inode it referred to.
    pub fn close(&mut self, fd: usize) -> Result<u32> {
        let file = self
            .fd_table
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(FsError::BadFd(fd))?;
        if let Some(count) = self.open_counts.get_mut(&file.inode_id) {
            *count -= 1;
            if *count == 0 {
                self.open_counts.remove(&file.inode_id);
            }
        }
        Ok(file.inode_id)
    }

    pub fn entry(&self, fd: usize) -> Result<&OpenFile> {
        self.fd_table
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(FsError::BadFd(fd))
    }

    pub fn entry_mut(&mut self, fd: usize) -> Result<&mut OpenFile> {
        self.fd_table
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(FsError::BadFd(fd))
    }

    pub fn inode_of(&self, fd: usize) -> Result<u32> {
        Ok(self.entry(fd)?.inode_id)
    }

    /// Number of descriptors currently open on `inode_id`.
    pub fn open_count(&self, inode_id: u32) -> usize {
        self.open_counts.get(&inode_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.open_counts.is_empty()
    }
}
