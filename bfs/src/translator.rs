//! Byte-range reads and writes on top of an inode's block map.

use crate::{
    block::DataBlock,
    block_dev::BlockDevice,
    growth::{end_offset, growth_target, Allocation},
    span::{merge_block, spans},
    Result,
};
use std::sync::Arc;
use tracing::debug;

/// Block-map and size bookkeeping the translator relies on.
pub trait InodeService {
    /// Proof for the blocks currently in the map of `inode_id`.
    fn allocation(&self, inode_id: u32) -> Result<Allocation>;

    /// Grow the map of `inode_id` to at least `total_blocks` blocks.
    fn extend(&mut self, inode_id: u32, total_blocks: usize) -> Result<Allocation>;

    /// Physical block behind logical block `fbn`.
    fn translate_block(&self, allocation: &Allocation, fbn: usize) -> Result<u32>;

    fn size(&self, inode_id: u32) -> Result<usize>;

    fn set_size(&mut self, inode_id: u32, size: usize) -> Result<()>;
}

pub struct Translator<'a, S: InodeService + ?Sized> {
    inodes: &'a mut S,
    block_device: Arc<dyn BlockDevice>,
}

impl<'a, S: InodeService + ?Sized> Translator<'a, S> {
    pub fn new(inodes: &'a mut S, block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            inodes,
            block_device,
        }
    }

    /// Read up to `buf.len()` bytes at `offset`, stopping at the end of the
    /// file. Returns the number of bytes copied.
    pub fn read_at(&self, inode_id: u32, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let size = self.inodes.size(inode_id)?;
        let len = if offset < size {
            buf.len().min(size - offset)
        } else {
            0
        };
        if len == 0 {
            return Ok(0);
        }
        let allocation = self.inodes.allocation(inode_id)?;
        let mut buf_ptr = 0usize;
        for span in spans(offset, len) {
            let block_id = self.inodes.translate_block(&allocation, span.fbn)?;
            let block = DataBlock::load(block_id as usize, self.block_device.as_ref())?;
            buf[buf_ptr..buf_ptr + span.len].copy_from_slice(&block[span.range()]);
            buf_ptr += span.len;
        }
        Ok(buf_ptr)
    }

    /// Write all of `buf` at `offset`, growing the file first if needed.
    pub fn write_at(&mut self, inode_id: u32, offset: usize, buf: &[u8]) -> Result<()> {
        let new_end = end_offset(offset, buf.len())?;
        let size = self.inodes.size(inode_id)?;
        let allocation = match growth_target(size, new_end) {
            Some(total_blocks) => {
                debug!(inode_id, size, new_end, total_blocks, "extend block map");
                self.inodes.extend(inode_id, total_blocks)?
            }
            None => self.inodes.allocation(inode_id)?,
        };
        if new_end > size {
            self.inodes.set_size(inode_id, new_end)?;
        }
        if buf.is_empty() {
            return Ok(());
        }

        let mut buf_ptr = 0usize;
        for span in spans(offset, buf.len()) {
            let block_id = self.inodes.translate_block(&allocation, span.fbn)? as usize;
            // partial blocks must keep the bytes around the written range
            let existing = DataBlock::load(block_id, self.block_device.as_ref())?;
            let merged = merge_block(&existing, span.offset, &buf[buf_ptr..buf_ptr + span.len]);
            merged.store(block_id, self.block_device.as_ref())?;
            buf_ptr += span.len;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block_dev::MemBlockDevice, config::BLOCK_SZ, error::FsError};
    use std::collections::HashMap;

    /// Hands out physical blocks in order and remembers every extend call.
    #[derive(Default)]
    struct FakeInodes {
        maps: HashMap<u32, Vec<u32>>,
        sizes: HashMap<u32, usize>,
        next_block: u32,
        extends: Vec<(u32, usize)>,
    }

    impl InodeService for FakeInodes {
        fn allocation(&self, inode_id: u32) -> Result<Allocation> {
            let blocks = self.maps.get(&inode_id).map_or(0, Vec::len);
            Ok(Allocation::new(inode_id, blocks))
        }

        fn extend(&mut self, inode_id: u32, total_blocks: usize) -> Result<Allocation> {
            self.extends.push((inode_id, total_blocks));
            let map = self.maps.entry(inode_id).or_default();
            while map.len() < total_blocks {
                map.push(self.next_block);
                self.next_block += 1;
            }
            Ok(Allocation::new(inode_id, map.len()))
        }

        fn translate_block(&self, allocation: &Allocation, fbn: usize) -> Result<u32> {
            allocation.check(fbn)?;
            Ok(self.maps[&allocation.inode_id()][fbn])
        }

        fn size(&self, inode_id: u32) -> Result<usize> {
            Ok(self.sizes.get(&inode_id).copied().unwrap_or(0))
        }

        fn set_size(&mut self, inode_id: u32, size: usize) -> Result<()> {
            self.sizes.insert(inode_id, size);
            Ok(())
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_write_600_then_patch() {
        let dev: Arc<dyn BlockDevice> = Arc::new(MemBlockDevice::new(8));
        let mut inodes = FakeInodes::default();
        let data = pattern(600);
        {
            let mut t = Translator::new(&mut inodes, dev.clone());
            t.write_at(1, 0, &data).unwrap();
        }
        assert_eq!(inodes.sizes[&1], 600);
        assert_eq!(inodes.extends, vec![(1, 2)]);

        let block0 = DataBlock::load(0, dev.as_ref()).unwrap();
        let block1 = DataBlock::load(1, dev.as_ref()).unwrap();
        assert_eq!(&block0[..], &data[..512]);
        assert_eq!(&block1[..88], &data[512..]);
        assert!(block1[88..].iter().all(|b| *b == 0));

        // mark the unused tail, then write 10 bytes at 550
        let mut marked = block1.clone();
        marked[88..].fill(0x5a);
        marked.store(1, dev.as_ref()).unwrap();
        {
            let mut t = Translator::new(&mut inodes, dev.clone());
            t.write_at(1, 550, &[0xff; 10]).unwrap();
        }
        let block1 = DataBlock::load(1, dev.as_ref()).unwrap();
        assert_eq!(&block1[..38], &data[512..550]);
        assert_eq!(&block1[38..48], &[0xff; 10]);
        assert_eq!(&block1[48..88], &data[560..600]);
        assert!(block1[88..].iter().all(|b| *b == 0x5a));
        assert_eq!(inodes.sizes[&1], 600);
        assert_eq!(inodes.extends.len(), 1);
    }

    #[test]
    fn test_read_clamps_at_size() {
        let dev: Arc<dyn BlockDevice> = Arc::new(MemBlockDevice::new(8));
        let mut inodes = FakeInodes::default();
        let data = pattern(1000);
        let mut t = Translator::new(&mut inodes, dev);
        t.write_at(7, 0, &data).unwrap();

        let mut buf = [0u8; 200];
        assert_eq!(t.read_at(7, 900, &mut buf).unwrap(), 100);
        assert_eq!(&buf[..100], &data[900..]);
        assert_eq!(t.read_at(7, 1000, &mut buf).unwrap(), 0);
        assert_eq!(t.read_at(7, 4000, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_round_trip_mid_block() {
        let dev: Arc<dyn BlockDevice> = Arc::new(MemBlockDevice::new(16));
        let mut inodes = FakeInodes::default();
        let mut t = Translator::new(&mut inodes, dev);
        let data = pattern(3 * BLOCK_SZ + 17);
        t.write_at(2, 301, &data).unwrap();

        let mut out = vec![0u8; data.len()];
        assert_eq!(t.read_at(2, 301, &mut out).unwrap(), data.len());
        assert_eq!(out, data);

        // the hole before the write reads as zeros
        let mut head = vec![0xffu8; 301];
        assert_eq!(t.read_at(2, 0, &mut head).unwrap(), 301);
        assert!(head.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_zero_length_write_past_end_grows() {
        let dev: Arc<dyn BlockDevice> = Arc::new(MemBlockDevice::new(8));
        let mut inodes = FakeInodes::default();
        let mut t = Translator::new(&mut inodes, dev);
        t.write_at(4, 700, &[]).unwrap();
        assert_eq!(inodes.sizes[&4], 700);
        assert_eq!(inodes.extends, vec![(4, 2)]);
    }

    #[test]
    fn test_translate_refuses_unallocated_block() {
        let inodes = FakeInodes::default();
        let alloc = inodes.allocation(9).unwrap();
        assert!(matches!(
            inodes.translate_block(&alloc, 0),
            Err(FsError::UnallocatedBlock { inum: 9, .. })
        ));
    }
}
