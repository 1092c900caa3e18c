use crate::{block_dev::BlockDevice, config::BLOCK_SZ, Result};
use core::ops::{Deref, DerefMut};

/// Plain on-disk structs that may be viewed in place inside a block.
///
/// # Safety
/// Implementors must be `#[repr(C)]`, made only of integers (every bit
/// pattern valid) and aligned to at most 8 bytes.
pub unsafe trait OnDisk: Sized {}

unsafe impl<const N: usize> OnDisk for [u8; N] {}
unsafe impl<const N: usize> OnDisk for [u32; N] {}
unsafe impl<const N: usize> OnDisk for [u64; N] {}

/// One block worth of bytes, aligned so on-disk structs can be borrowed in place.
#[derive(Clone)]
#[repr(C, align(8))]
pub struct DataBlock([u8; BLOCK_SZ]);

impl DataBlock {
    pub const fn zeroed() -> Self {
        Self([0u8; BLOCK_SZ])
    }

    pub fn load(block_id: usize, block_device: &dyn BlockDevice) -> Result<Self> {
        let mut block = Self::zeroed();
        block_device.read_block(block_id, &mut block.0)?;
        Ok(block)
    }

    pub fn store(&self, block_id: usize, block_device: &dyn BlockDevice) -> Result<()> {
        block_device.write_block(block_id, &self.0)
    }

    pub fn get_ref<T: OnDisk>(&self, offset: usize) -> &T {
        let size = core::mem::size_of::<T>();
        assert!(offset + size <= BLOCK_SZ);
        assert_eq!(offset % core::mem::align_of::<T>(), 0);
        unsafe { &*(self.0.as_ptr().add(offset) as *const T) }
    }

    pub fn get_mut<T: OnDisk>(&mut self, offset: usize) -> &mut T {
        let size = core::mem::size_of::<T>();
        assert!(offset + size <= BLOCK_SZ);
        assert_eq!(offset % core::mem::align_of::<T>(), 0);
        unsafe { &mut *(self.0.as_mut_ptr().add(offset) as *mut T) }
    }

    pub fn read<T: OnDisk, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get_ref(offset))
    }

    pub fn modify<T: OnDisk, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

impl Deref for DataBlock {
    type Target = [u8; BLOCK_SZ];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DataBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Load block `block_id` and run `f` on the struct at `offset`.
pub fn read_block<T: OnDisk, V>(
    block_id: usize,
    offset: usize,
    block_device: &dyn BlockDevice,
    f: impl FnOnce(&T) -> V,
) -> Result<V> {
    Ok(DataBlock::load(block_id, block_device)?.read(offset, f))
}

/// Load block `block_id`, let `f` change the struct at `offset`, write it back.
pub fn modify_block<T: OnDisk, V>(
    block_id: usize,
    offset: usize,
    block_device: &dyn BlockDevice,
    f: impl FnOnce(&mut T) -> V,
) -> Result<V> {
    let mut block = DataBlock::load(block_id, block_device)?;
    let ret = block.modify(offset, f);
    block.store(block_id, block_device)?;
    Ok(ret)
}
