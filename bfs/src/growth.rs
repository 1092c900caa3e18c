//! Block-map sizing for writes that run past the allocated blocks.

use crate::{config::BLOCK_SZ, error::FsError, Result};

/// Blocks needed to hold `bytes` bytes.
pub fn blocks_for(bytes: usize) -> usize {
    bytes.div_ceil(BLOCK_SZ)
}

/// The block count an inode of `size` bytes must be extended to before bytes
/// up to `new_end` can be addressed, or `None` if its blocks already reach.
pub fn growth_target(size: usize, new_end: usize) -> Option<usize> {
    let current_blocks = blocks_for(size);
    let current_space = current_blocks * BLOCK_SZ;
    if current_space >= new_end {
        return None;
    }
    let needed_blocks = blocks_for(new_end - current_space);
    Some(current_blocks + needed_blocks)
}

/// End offset of `len` bytes at `offset`.
pub fn end_offset(offset: usize, len: usize) -> Result<usize> {
    offset.checked_add(len).ok_or(FsError::FileTooLarge {
        blocks: usize::MAX,
        max: crate::layout::MAX_FILE_BLOCKS,
    })
}

/// Proof that the first `blocks` logical blocks of inode `inode_id` are backed
/// by physical blocks. Only an inode service hands these out, either for the
/// current block map or as the result of an extension, and block translation
/// refuses any block past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    inode_id: u32,
    blocks: usize,
}

impl Allocation {
    pub(crate) fn new(inode_id: u32, blocks: usize) -> Self {
        Self { inode_id, blocks }
    }

    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn covers(&self, fbn: usize) -> bool {
        fbn < self.blocks
    }

    /// `Ok(())` if `fbn` may be translated under this proof.
    pub fn check(&self, fbn: usize) -> Result<()> {
        if self.covers(fbn) {
            Ok(())
        } else {
            Err(FsError::UnallocatedBlock {
                inum: self.inode_id,
                fbn,
                allocated: self.blocks,
            })
        }
    }
}
