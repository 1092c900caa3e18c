use crate::{error::FsError, Result};

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// from the start of the file
    Set,
    /// from the current cursor
    Cur,
    /// from the end of the file
    End,
}

impl TryFrom<i32> for Whence {
    type Error = FsError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            SEEK_SET => Ok(Whence::Set),
            SEEK_CUR => Ok(Whence::Cur),
            SEEK_END => Ok(Whence::End),
            other => Err(FsError::BadWhence(other)),
        }
    }
}

/// Cursor after seeking `offset` bytes from `whence`. The result may lie past
/// `size` but never below 0.
pub fn seek_target(cursor: usize, size: usize, offset: i64, whence: Whence) -> Result<usize> {
    let base = match whence {
        Whence::Set => {
            if offset < 0 {
                return Err(FsError::BadCursor { base: 0, offset });
            }
            0
        }
        Whence::Cur => cursor,
        Whence::End => size,
    };
    let target = if offset >= 0 {
        base.checked_add(offset as usize)
    } else {
        base.checked_sub(offset.unsigned_abs() as usize)
    };
    target.ok_or(FsError::BadCursor { base, offset })
}

/// Cursor after asking for `len` bytes at `cursor` of a `size` byte file: it
/// moves past what was asked for but stops at the end of the file.
pub fn cursor_after_read(cursor: usize, len: usize, size: usize) -> usize {
    match cursor.checked_add(len) {
        Some(end) if end <= size => end,
        _ => size,
    }
}
