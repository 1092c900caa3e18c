use crate::{
    block::{modify_block, read_block, OnDisk},
    block_dev::BlockDevice,
    config::BLOCK_SZ,
    error::FsError,
    Result,
};

const BFS_MAGIC: u32 = 0x4246_5331;
/// the max number of direct blocks
pub const INODE_DIRECT_COUNT: usize = 28;
/// the number of block ids held by the indirect block
pub const INODE_INDIRECT_COUNT: usize = BLOCK_SZ / 4;
/// the max number of blocks one file can hold
pub const MAX_FILE_BLOCKS: usize = INODE_DIRECT_COUNT + INODE_INDIRECT_COUNT;
/// the max length of a file name
pub const NAME_LENGTH_LIMIT: usize = 27;

#[repr(C)]
pub struct SuperBlock {
    magic: u32,
    pub total_blocks: u32,
    pub inode_bitmap_blocks: u32,
    pub inode_area_blocks: u32,
    pub data_bitmap_blocks: u32,
    pub data_area_blocks: u32,
}

unsafe impl OnDisk for SuperBlock {}

impl SuperBlock {
    pub fn initialize(
        &mut self,
        total_blocks: u32,
        inode_bitmap_blocks: u32,
        inode_area_blocks: u32,
        data_bitmap_blocks: u32,
        data_area_blocks: u32,
    ) {
        *self = Self {
            magic: BFS_MAGIC,
            total_blocks,
            inode_bitmap_blocks,
            inode_area_blocks,
            data_bitmap_blocks,
            data_area_blocks,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == BFS_MAGIC
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InodeKind {
    File = 1,
    Directory = 2,
}

type IndirectBlock = [u32; INODE_INDIRECT_COUNT];

/// 128 bytes, four per block.
#[repr(C)]
pub struct DiskInode {
    pub size: u32,
    /// number of data blocks in the block map
    pub blocks: u32,
    kind: u32,
    pub direct: [u32; INODE_DIRECT_COUNT],
    pub indirect: u32,
}

unsafe impl OnDisk for DiskInode {}

pub const DISK_INODE_SZ: usize = core::mem::size_of::<DiskInode>();

impl DiskInode {
    pub fn initialize(&mut self, kind: InodeKind) {
        self.size = 0;
        self.blocks = 0;
        self.kind = kind as u32;
        self.direct.fill(0);
        self.indirect = 0;
    }

    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory as u32
    }

    pub fn is_file(&self) -> bool {
        self.kind == InodeKind::File as u32
    }

    /// Physical block holding block `inner_id` of the map. `inner_id` must be
    /// below `self.blocks`.
    pub fn get_block_id(&self, inner_id: usize, block_device: &dyn BlockDevice) -> Result<u32> {
        debug_assert!(inner_id < self.blocks as usize);
        if inner_id < INODE_DIRECT_COUNT {
            Ok(self.direct[inner_id])
        } else {
            read_block(
                self.indirect as usize,
                0,
                block_device,
                |indirect: &IndirectBlock| indirect[inner_id - INODE_DIRECT_COUNT],
            )
        }
    }

    /// Grow the block map to `total` blocks, taking fresh block ids from `alloc`.
    /// The map stays consistent if `alloc` fails part way.
    pub fn grow_to(
        &mut self,
        total: usize,
        mut alloc: impl FnMut() -> Result<u32>,
        block_device: &dyn BlockDevice,
    ) -> Result<()> {
        if total > MAX_FILE_BLOCKS {
            return Err(FsError::FileTooLarge {
                blocks: total,
                max: MAX_FILE_BLOCKS,
            });
        }
        let mut current = self.blocks as usize;
        while current < total.min(INODE_DIRECT_COUNT) {
            self.direct[current] = alloc()?;
            current += 1;
            self.blocks = current as u32;
        }
        if total <= INODE_DIRECT_COUNT {
            return Ok(());
        }
        if self.indirect == 0 {
            self.indirect = alloc()?;
        }
        modify_block(
            self.indirect as usize,
            0,
            block_device,
            |indirect: &mut IndirectBlock| -> Result<()> {
                while current < total {
                    indirect[current - INODE_DIRECT_COUNT] = alloc()?;
                    current += 1;
                    self.blocks = current as u32;
                }
                Ok(())
            },
        )?
    }

    /// Drop the whole block map, returning every block it referenced
    /// (the indirect block included).
    pub fn clear(&mut self, block_device: &dyn BlockDevice) -> Result<Vec<u32>> {
        let blocks = self.blocks as usize;
        let mut freed: Vec<u32> = self.direct[..blocks.min(INODE_DIRECT_COUNT)].to_vec();
        if blocks > INODE_DIRECT_COUNT {
            read_block(
                self.indirect as usize,
                0,
                block_device,
                |indirect: &IndirectBlock| {
                    freed.extend_from_slice(&indirect[..blocks - INODE_DIRECT_COUNT]);
                },
            )?;
        }
        if self.indirect != 0 {
            freed.push(self.indirect);
        }
        self.size = 0;
        self.blocks = 0;
        self.direct.fill(0);
        self.indirect = 0;
        Ok(freed)
    }
}

#[repr(C)]
pub struct DirEntry {
    name: [u8; NAME_LENGTH_LIMIT + 1],
    inode_id: u32,
}

unsafe impl OnDisk for DirEntry {}

/// the size of struct DirEntry
pub const DIRENTRY_SZ: usize = 32;

impl DirEntry {
    pub fn zero_init() -> Self {
        Self {
            name: [0u8; NAME_LENGTH_LIMIT + 1],
            inode_id: 0,
        }
    }

    /// `name` must already be validated to fit.
    pub fn new(name: &str, inode_id: u32) -> Self {
        let mut bytes = [0u8; NAME_LENGTH_LIMIT + 1];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            name: bytes,
            inode_id,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const _ as *const u8, DIRENTRY_SZ) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self as *mut _ as *mut u8, DIRENTRY_SZ) }
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(NAME_LENGTH_LIMIT);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::DataBlock, block_dev::MemBlockDevice};

    #[test]
    fn test_struct_sizes() {
        assert_eq!(DISK_INODE_SZ, 128);
        assert_eq!(core::mem::size_of::<DirEntry>(), DIRENTRY_SZ);
        assert!(core::mem::size_of::<SuperBlock>() <= BLOCK_SZ);
    }

    #[test]
    fn test_dir_entry_name() {
        let entry = DirEntry::new("hello.txt", 9);
        assert_eq!(entry.name(), "hello.txt");
        assert_eq!(entry.inode_id(), 9);

        let mut copy = DirEntry::zero_init();
        copy.as_bytes_mut().copy_from_slice(entry.as_bytes());
        assert_eq!(copy.name(), "hello.txt");
        assert_eq!(copy.inode_id(), 9);
    }

    #[test]
    fn test_grow_into_indirect_and_clear() {
        let dev = MemBlockDevice::new(256);
        let mut block = DataBlock::zeroed();
        let inode: &mut DiskInode = block.get_mut(0);
        inode.initialize(InodeKind::File);

        let mut next = 100u32;
        let total = INODE_DIRECT_COUNT + 3;
        inode
            .grow_to(
                total,
                || {
                    next += 1;
                    Ok(next)
                },
                &dev,
            )
            .unwrap();
        assert_eq!(inode.blocks as usize, total);
        // direct blocks first, then the indirect block itself
        assert_eq!(inode.get_block_id(0, &dev).unwrap(), 101);
        assert_eq!(inode.indirect, 101 + INODE_DIRECT_COUNT as u32);
        assert_eq!(
            inode.get_block_id(INODE_DIRECT_COUNT, &dev).unwrap(),
            102 + INODE_DIRECT_COUNT as u32
        );

        // growing to a smaller count is a no-op
        inode.grow_to(4, || unreachable!(), &dev).unwrap();
        assert_eq!(inode.blocks as usize, total);

        let freed = inode.clear(&dev).unwrap();
        assert_eq!(freed.len(), total + 1);
        assert_eq!(inode.blocks, 0);
        assert_eq!(inode.indirect, 0);
    }

    #[test]
    fn test_grow_past_limit() {
        let dev = MemBlockDevice::new(4);
        let mut block = DataBlock::zeroed();
        let inode: &mut DiskInode = block.get_mut(0);
        inode.initialize(InodeKind::File);
        let res = inode.grow_to(MAX_FILE_BLOCKS + 1, || Ok(1), &dev);
        assert!(matches!(res, Err(FsError::FileTooLarge { .. })));
        assert_eq!(inode.blocks, 0);
    }

    #[test]
    fn test_grow_keeps_partial_progress_on_failure() {
        let dev = MemBlockDevice::new(4);
        let mut block = DataBlock::zeroed();
        let inode: &mut DiskInode = block.get_mut(0);
        inode.initialize(InodeKind::File);
        let mut budget = 2;
        let res = inode.grow_to(
            5,
            || {
                if budget == 0 {
                    return Err(FsError::DiskFull);
                }
                budget -= 1;
                Ok(10 + budget)
            },
            &dev,
        );
        assert!(matches!(res, Err(FsError::DiskFull)));
        assert_eq!(inode.blocks, 2);
    }
}
