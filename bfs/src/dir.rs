//! The flat root directory: an array of `DirEntry`s stored in inode 0.

use crate::{
    error::FsError,
    fs::{FileSystem, ROOT_INODE},
    layout::{DirEntry, DIRENTRY_SZ, NAME_LENGTH_LIMIT},
    translator::InodeService,
    Result,
};

pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > NAME_LENGTH_LIMIT || name.contains('\0') {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn entry_count(fs: &FileSystem) -> Result<usize> {
    let size = fs.size(ROOT_INODE)?;
    assert_eq!(size % DIRENTRY_SZ, 0, "corrupt directory size {size}");
    Ok(size / DIRENTRY_SZ)
}

fn read_entry(fs: &mut FileSystem, index: usize) -> Result<DirEntry> {
    let mut dirent = DirEntry::zero_init();
    let len = fs
        .translator()
        .read_at(ROOT_INODE, index * DIRENTRY_SZ, dirent.as_bytes_mut())?;
    assert_eq!(len, DIRENTRY_SZ);
    Ok(dirent)
}

/// Inode bound to `name`, if any.
pub fn find(fs: &mut FileSystem, name: &str) -> Result<Option<u32>> {
    for index in 0..entry_count(fs)? {
        let dirent = read_entry(fs, index)?;
        if dirent.name() == name {
            return Ok(Some(dirent.inode_id()));
        }
    }
    Ok(None)
}

/// Append an entry binding `name` to `inode_id`. The caller checks that the
/// name is new.
pub fn insert(fs: &mut FileSystem, name: &str, inode_id: u32) -> Result<()> {
    validate_name(name)?;
    let offset = entry_count(fs)? * DIRENTRY_SZ;
    let dirent = DirEntry::new(name, inode_id);
    fs.translator()
        .write_at(ROOT_INODE, offset, dirent.as_bytes())
}

pub fn list(fs: &mut FileSystem) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for index in 0..entry_count(fs)? {
        names.push(read_entry(fs, index)?.name().to_string());
    }
    Ok(names)
}
