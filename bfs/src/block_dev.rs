use crate::{config::BLOCK_SZ, error::FsError, Result};
use spin::Mutex;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

/// Whole-block transfers by absolute block number.
pub trait BlockDevice: Send + Sync {
    /// read block `block_id` into `buf`, which is exactly one block long
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()>;

    /// write `buf`, exactly one block long, to block `block_id`
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()>;
}

/// A disk image on the host file system.
pub struct BlockFile {
    file: std::sync::Mutex<File>,
    total_blocks: usize,
}

impl BlockFile {
    /// Create (or overwrite) an image holding `total_blocks` zeroed blocks.
    pub fn create(path: impl AsRef<Path>, total_blocks: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(total_blocks as u64 * BLOCK_SZ as u64)?;
        Ok(Self {
            file: std::sync::Mutex::new(file),
            total_blocks: total_blocks as usize,
        })
    }

    /// Open an existing image. A missing image is `FsError::NoDisk`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FsError::NoDisk(path.display().to_string()));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let total_blocks = (file.metadata()?.len() / BLOCK_SZ as u64) as usize;
        Ok(Self {
            file: std::sync::Mutex::new(file),
            total_blocks,
        })
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    fn seek_to(&self, file: &mut File, block_id: usize) -> Result<()> {
        if block_id >= self.total_blocks {
            return Err(FsError::BlockOutOfRange(block_id));
        }
        file.seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))?;
        Ok(())
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()> {
        assert_eq!(buf.len(), BLOCK_SZ, "Not a complete block!");
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        self.seek_to(&mut file, block_id)?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()> {
        assert_eq!(buf.len(), BLOCK_SZ, "Not a complete block!");
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        self.seek_to(&mut file, block_id)?;
        file.write_all(buf)?;
        Ok(())
    }
}

/// A zero-filled image kept in memory.
pub struct MemBlockDevice {
    blocks: Mutex<Vec<[u8; BLOCK_SZ]>>,
}

impl MemBlockDevice {
    pub fn new(total_blocks: u32) -> Self {
        Self {
            blocks: Mutex::new(vec![[0u8; BLOCK_SZ]; total_blocks as usize]),
        }
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()> {
        assert_eq!(buf.len(), BLOCK_SZ, "Not a complete block!");
        let blocks = self.blocks.lock();
        let block = blocks
            .get(block_id)
            .ok_or(FsError::BlockOutOfRange(block_id))?;
        buf.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()> {
        assert_eq!(buf.len(), BLOCK_SZ, "Not a complete block!");
        let mut blocks = self.blocks.lock();
        let block = blocks
            .get_mut(block_id)
            .ok_or(FsError::BlockOutOfRange(block_id))?;
        block.copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_device_round_trip() {
        let dev = MemBlockDevice::new(4);
        let data = [0xabu8; BLOCK_SZ];
        dev.write_block(2, &data).unwrap();

        let mut out = [0u8; BLOCK_SZ];
        dev.read_block(2, &mut out).unwrap();
        assert_eq!(out, data);
        dev.read_block(1, &mut out).unwrap();
        assert!(out.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_mem_device_out_of_range() {
        let dev = MemBlockDevice::new(2);
        let mut out = [0u8; BLOCK_SZ];
        assert!(matches!(
            dev.read_block(2, &mut out),
            Err(FsError::BlockOutOfRange(2))
        ));
    }

    #[test]
    fn test_block_file_create_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fs.img");
        {
            let dev = BlockFile::create(&path, 8).unwrap();
            dev.write_block(7, &[7u8; BLOCK_SZ]).unwrap();
        }
        let dev = BlockFile::open(&path).unwrap();
        assert_eq!(dev.total_blocks(), 8);
        let mut out = [0u8; BLOCK_SZ];
        dev.read_block(7, &mut out).unwrap();
        assert_eq!(out, [7u8; BLOCK_SZ]);
        assert!(dev.write_block(8, &out).is_err());
    }

    #[test]
    fn test_block_file_missing_image() {
        let tmp = tempfile::tempdir().unwrap();
        let res = BlockFile::open(tmp.path().join("missing.img"));
        assert!(matches!(res, Err(FsError::NoDisk(_))));
    }
}
