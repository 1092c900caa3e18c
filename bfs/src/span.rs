//! Splitting a byte range of a file into per-block pieces.

use crate::{block::DataBlock, config::BLOCK_SZ};
use core::ops::Range;

/// The part of logical block `fbn` covered by a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub fbn: usize,
    /// offset inside the block
    pub offset: usize,
    pub len: usize,
}

impl BlockSpan {
    pub fn new(fbn: usize, offset: usize, len: usize) -> Self {
        debug_assert!(offset + len <= BLOCK_SZ);
        Self { fbn, offset, len }
    }

    /// Bytes of the block taking part.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    #[cfg(test)]
    pub fn is_full(&self) -> bool {
        self.len == BLOCK_SZ
    }
}

/// `[first, last]` logical blocks touched by `len` bytes at `offset`,
/// `None` for an empty range.
pub fn block_range(offset: usize, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    Some((offset / BLOCK_SZ, (offset + len - 1) / BLOCK_SZ))
}

/// Iterate the blocks of `len` bytes at `offset` in ascending order.
pub fn spans(offset: usize, len: usize) -> SpanIter {
    SpanIter {
        cursor: offset,
        remaining: len,
    }
}

pub struct SpanIter {
    /// Current absolute position
    cursor: usize,
    remaining: usize,
}

impl Iterator for SpanIter {
    type Item = BlockSpan;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let fbn = self.cursor / BLOCK_SZ;
        let offset = self.cursor % BLOCK_SZ;
        let take = self.remaining.min(BLOCK_SZ - offset);

        self.cursor += take;
        self.remaining -= take;
        Some(BlockSpan::new(fbn, offset, take))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = match block_range(self.cursor, self.remaining) {
            Some((first, last)) => last - first + 1,
            None => 0,
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for SpanIter {}

/// Copy of `existing` with `data` laid over it at `offset`. Bytes outside
/// `offset..offset + data.len()` are kept.
pub fn merge_block(existing: &DataBlock, offset: usize, data: &[u8]) -> DataBlock {
    assert!(
        offset + data.len() <= BLOCK_SZ,
        "merge of {} bytes at {offset} overflows the block",
        data.len()
    );
    let mut merged = existing.clone();
    merged[offset..offset + data.len()].copy_from_slice(data);
    merged
}
