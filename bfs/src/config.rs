/// the size of a block is 512 bytes
pub const BLOCK_SZ: usize = 512;

/// 4096 blocks make a 2MB image
pub const DEFAULT_TOTAL_BLOCKS: u32 = 4096;
pub const DEFAULT_MAX_INODES: u32 = 64;

/// the max number of descriptors open at the same time
pub const MAX_OPEN_FILES: usize = 20;

pub const DEFAULT_IMAGE: &str = "BFSDISK";

/// Geometry of a freshly formatted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub total_blocks: u32,
    /// Rounded up to fill whole inode blocks.
    pub max_inodes: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            total_blocks: DEFAULT_TOTAL_BLOCKS,
            max_inodes: DEFAULT_MAX_INODES,
        }
    }
}
