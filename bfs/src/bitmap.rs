use crate::{block::modify_block, block_dev::BlockDevice, config::BLOCK_SZ, Result};

const BLOCK_BITS: usize = BLOCK_SZ * 8;

type BitmapBlock = [u64; 64];

pub struct Bitmap {
    start_block_id: usize,
    blocks: usize,
    /// bits past this one are never handed out
    capacity: usize,
}

impl Bitmap {
    pub fn new(start_block_id: usize, blocks: usize, capacity: usize) -> Self {
        debug_assert!(capacity <= blocks * BLOCK_BITS);
        Self {
            start_block_id,
            blocks,
            capacity,
        }
    }

    /// Set the first clear bit and return its position.
    pub fn alloc(&self, block_device: &dyn BlockDevice) -> Result<Option<usize>> {
        for block_pos in 0..self.blocks {
            let capacity = self.capacity;
            let pos = modify_block(
                block_pos + self.start_block_id,
                0,
                block_device,
                |bitmap_block: &mut BitmapBlock| {
                    let (bits64_pos, inner_pos) = bitmap_block
                        .iter()
                        .enumerate()
                        .find(|(_, bits64)| **bits64 != u64::MAX)
                        .map(|(bits64_pos, bits64)| (bits64_pos, bits64.trailing_ones() as usize))?;
                    let bit = block_pos * BLOCK_BITS + bits64_pos * 64 + inner_pos;
                    if bit >= capacity {
                        return None;
                    }
                    bitmap_block[bits64_pos] |= 1u64 << inner_pos;
                    Some(bit)
                },
            )?;
            if pos.is_some() {
                return Ok(pos);
            }
        }
        Ok(None)
    }

    pub fn dealloc(&self, block_device: &dyn BlockDevice, bit: usize) -> Result<()> {
        let (block_pos, bits64_pos, inner_pos) = decomposition(bit);
        modify_block(
            block_pos + self.start_block_id,
            0,
            block_device,
            |bitmap_block: &mut BitmapBlock| {
                assert!(
                    bitmap_block[bits64_pos] & (1u64 << inner_pos) > 0,
                    "bit {bit} freed twice"
                );
                bitmap_block[bits64_pos] &= !(1u64 << inner_pos);
            },
        )
    }

    /// Get the max number of allocatable bits.
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn decomposition(bit: usize) -> (usize, usize, usize) {
    (bit / BLOCK_BITS, bit % BLOCK_BITS / 64, bit % 64)
}
