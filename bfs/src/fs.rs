use crate::{
    bitmap::Bitmap,
    block::{modify_block, read_block, DataBlock},
    block_dev::BlockDevice,
    config::{FormatOptions, BLOCK_SZ},
    error::FsError,
    growth::Allocation,
    layout::{DiskInode, InodeKind, SuperBlock, DISK_INODE_SZ},
    translator::{InodeService, Translator},
    Result,
};
use std::sync::Arc;
use tracing::{debug, info};

const BLOCK_BITS: usize = BLOCK_SZ * 8;
const INODES_PER_BLOCK: usize = BLOCK_SZ / DISK_INODE_SZ;

/// inode 0 is the only directory
pub const ROOT_INODE: u32 = 0;

pub struct FileSystem {
    pub block_device: Arc<dyn BlockDevice>,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    inode_area_start_block: u32,
    data_area_start_block: u32,
}

impl FileSystem {
    /// Lay out a fresh image on `block_device`: superblock, inode bitmap,
    /// inode area, data bitmap, data area. Every block is zeroed first.
    pub fn format(block_device: Arc<dyn BlockDevice>, options: &FormatOptions) -> Result<Self> {
        let total_blocks = options.total_blocks as usize;
        let inode_area_blocks = (options.max_inodes.max(1) as usize).div_ceil(INODES_PER_BLOCK);
        let inode_num = inode_area_blocks * INODES_PER_BLOCK;
        let inode_bitmap_blocks = inode_num.div_ceil(BLOCK_BITS);
        let inode_total_blocks = inode_bitmap_blocks + inode_area_blocks;
        // superblock + inodes + one bitmap block + at least one data block
        if total_blocks < 1 + inode_total_blocks + 2 {
            return Err(FsError::ImageTooSmall {
                total_blocks: options.total_blocks,
            });
        }
        let data_total_blocks = total_blocks - 1 - inode_total_blocks;
        let data_bitmap_blocks = (data_total_blocks + BLOCK_BITS) / (BLOCK_BITS + 1);
        let data_area_blocks = data_total_blocks - data_bitmap_blocks;

        let zero = DataBlock::zeroed();
        for block_id in 0..total_blocks {
            zero.store(block_id, block_device.as_ref())?;
        }
        modify_block(0, 0, block_device.as_ref(), |super_block: &mut SuperBlock| {
            super_block.initialize(
                options.total_blocks,
                inode_bitmap_blocks as u32,
                inode_area_blocks as u32,
                data_bitmap_blocks as u32,
                data_area_blocks as u32,
            );
        })?;
        let fs = Self {
            block_device,
            inode_bitmap: Bitmap::new(1, inode_bitmap_blocks, inode_num),
            data_bitmap: Bitmap::new(
                1 + inode_total_blocks,
                data_bitmap_blocks,
                data_area_blocks,
            ),
            inode_area_start_block: (1 + inode_bitmap_blocks) as u32,
            data_area_start_block: (1 + inode_total_blocks + data_bitmap_blocks) as u32,
        };
        let root = fs.alloc_inode(InodeKind::Directory)?;
        assert_eq!(root, ROOT_INODE);
        info!(total_blocks, inode_num, data_area_blocks, "formatted file system");
        Ok(fs)
    }

    /// Load the layout of an image written by `format`.
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let fs = read_block(0, 0, block_device.as_ref(), |super_block: &SuperBlock| {
            if !super_block.is_valid() {
                return Err(FsError::BadSuperBlock);
            }
            let inode_bitmap_blocks = super_block.inode_bitmap_blocks as usize;
            let inode_total_blocks = inode_bitmap_blocks + super_block.inode_area_blocks as usize;
            let data_bitmap_blocks = super_block.data_bitmap_blocks as usize;
            Ok(Self {
                block_device: block_device.clone(),
                inode_bitmap: Bitmap::new(
                    1,
                    inode_bitmap_blocks,
                    super_block.inode_area_blocks as usize * INODES_PER_BLOCK,
                ),
                data_bitmap: Bitmap::new(
                    1 + inode_total_blocks,
                    data_bitmap_blocks,
                    super_block.data_area_blocks as usize,
                ),
                inode_area_start_block: 1 + inode_bitmap_blocks as u32,
                data_area_start_block: (1 + inode_total_blocks + data_bitmap_blocks) as u32,
            })
        })??;
        if !fs.read_inode(ROOT_INODE, |disk_inode| disk_inode.is_dir())? {
            return Err(FsError::BadSuperBlock);
        }
        info!("mounted file system");
        Ok(fs)
    }

    /// Return the (block_id, block_offset) of inode `inode_id`.
    pub fn get_disk_inode_pos(&self, inode_id: u32) -> (usize, usize) {
        let inode_id = inode_id as usize;
        (
            self.inode_area_start_block as usize + inode_id / INODES_PER_BLOCK,
            inode_id % INODES_PER_BLOCK * DISK_INODE_SZ,
        )
    }

    pub fn read_inode<V>(&self, inode_id: u32, f: impl FnOnce(&DiskInode) -> V) -> Result<V> {
        let (block_id, offset) = self.get_disk_inode_pos(inode_id);
        read_block(block_id, offset, self.block_device.as_ref(), f)
    }

    pub fn modify_inode<V>(
        &self,
        inode_id: u32,
        f: impl FnOnce(&mut DiskInode) -> V,
    ) -> Result<V> {
        let (block_id, offset) = self.get_disk_inode_pos(inode_id);
        modify_block(block_id, offset, self.block_device.as_ref(), f)
    }

    pub fn alloc_inode(&self, kind: InodeKind) -> Result<u32> {
        let inode_id = self
            .inode_bitmap
            .alloc(self.block_device.as_ref())?
            .ok_or(FsError::NoInodes)? as u32;
        self.modify_inode(inode_id, |disk_inode| disk_inode.initialize(kind))?;
        Ok(inode_id)
    }

    /// Release an inode that no directory entry refers to.
    pub fn dealloc_inode(&self, inode_id: u32) -> Result<()> {
        assert_ne!(inode_id, ROOT_INODE);
        self.inode_bitmap
            .dealloc(self.block_device.as_ref(), inode_id as usize)
    }

    /// Allocate a data block and return its absolute block id. Data blocks
    /// are zeroed when formatted and when freed.
    pub fn alloc_data(&self) -> Result<u32> {
        let bit = self
            .data_bitmap
            .alloc(self.block_device.as_ref())?
            .ok_or(FsError::DiskFull)?;
        Ok(bit as u32 + self.data_area_start_block)
    }

    pub fn dealloc_data(&self, block_id: u32) -> Result<()> {
        assert!(block_id >= self.data_area_start_block);
        DataBlock::zeroed().store(block_id as usize, self.block_device.as_ref())?;
        self.data_bitmap.dealloc(
            self.block_device.as_ref(),
            (block_id - self.data_area_start_block) as usize,
        )
    }

    /// Free every data block of `inode_id` and set its size to 0.
    pub fn truncate(&self, inode_id: u32) -> Result<()> {
        let (block_id, offset) = self.get_disk_inode_pos(inode_id);
        let mut block = DataBlock::load(block_id, self.block_device.as_ref())?;
        let freed = block.modify(offset, |disk_inode: &mut DiskInode| {
            disk_inode.clear(self.block_device.as_ref())
        })?;
        block.store(block_id, self.block_device.as_ref())?;
        debug!(inode_id, blocks = freed.len(), "truncate");
        for data_block in freed {
            self.dealloc_data(data_block)?;
        }
        Ok(())
    }

    /// Number of blocks in the data area.
    #[cfg(test)]
    pub fn data_capacity(&self) -> usize {
        self.data_bitmap.capacity()
    }

    /// Byte-range access to this file system's inodes.
    pub fn translator(&mut self) -> Translator<'_, Self> {
        let block_device = self.block_device.clone();
        Translator::new(self, block_device)
    }
}

impl InodeService for FileSystem {
    fn allocation(&self, inode_id: u32) -> Result<Allocation> {
        let blocks = self.read_inode(inode_id, |disk_inode| disk_inode.blocks)?;
        Ok(Allocation::new(inode_id, blocks as usize))
    }

    fn extend(&mut self, inode_id: u32, total_blocks: usize) -> Result<Allocation> {
        let (block_id, offset) = self.get_disk_inode_pos(inode_id);
        let mut block = DataBlock::load(block_id, self.block_device.as_ref())?;
        let disk_inode: &mut DiskInode = block.get_mut(offset);
        // keep whatever got allocated even when the disk fills up part way
        let grown = disk_inode.grow_to(
            total_blocks,
            || self.alloc_data(),
            self.block_device.as_ref(),
        );
        let blocks = disk_inode.blocks as usize;
        block.store(block_id, self.block_device.as_ref())?;
        grown?;
        Ok(Allocation::new(inode_id, blocks))
    }

    fn translate_block(&self, allocation: &Allocation, fbn: usize) -> Result<u32> {
        allocation.check(fbn)?;
        let block_device = self.block_device.as_ref();
        self.read_inode(allocation.inode_id(), |disk_inode| {
            disk_inode.get_block_id(fbn, block_device)
        })?
    }

    fn size(&self, inode_id: u32) -> Result<usize> {
        self.read_inode(inode_id, |disk_inode| disk_inode.size as usize)
    }

    fn set_size(&mut self, inode_id: u32, size: usize) -> Result<()> {
        let size = u32::try_from(size).map_err(|_| FsError::FileTooLarge {
            blocks: crate::growth::blocks_for(size),
            max: crate::layout::MAX_FILE_BLOCKS,
        })?;
        self.modify_inode(inode_id, |disk_inode| disk_inode.size = size)
    }
}
