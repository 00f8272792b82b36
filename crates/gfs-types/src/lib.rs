#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// GrahaFS superblock magic ("GRAHAOS!" read as a little-endian u64).
pub const GRAHAFS_MAGIC: u64 = 0x4752_4148_414F_5321;

/// Fixed atomic addressing unit of a GrahaFS image.
pub const GRAHAFS_BLOCK_SIZE: usize = 4096;

/// The superblock occupies exactly one block at byte offset 0.
pub const GRAHAFS_SUPERBLOCK_SIZE: usize = GRAHAFS_BLOCK_SIZE;

/// Fixed on-disk inode record size.
pub const GRAHAFS_INODE_RECORD_SIZE: usize = 128;

/// Fixed on-disk directory entry record size.
pub const GRAHAFS_DIRENT_RECORD_SIZE: usize = 32;

/// Bytes of NUL-terminated name in a directory entry record.
pub const GRAHAFS_DIRENT_NAME_LEN: usize = 28;

/// Inode `kind` value for a regular file.
pub const GRAHAFS_INODE_TYPE_FILE: u16 = 1;

/// Inode `kind` value for a directory.
pub const GRAHAFS_INODE_TYPE_DIRECTORY: u16 = 2;

/// GrahaFS block address (u32 on disk, block units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u32);

/// GrahaFS inode number (u32 on disk, 0-indexed into the inode table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u32);

/// Byte offset into the image (pread semantics).
///
/// This is a unit-carrying wrapper to prevent mixing bytes and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteOffset(pub u64);

impl ByteOffset {
    pub const ZERO: Self = Self(0);

    /// Add a byte count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl BlockNumber {
    /// Convert this block address to its byte offset in the image.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub fn to_byte_offset(self) -> Option<ByteOffset> {
        u64::from(self.0)
            .checked_mul(GRAHAFS_BLOCK_SIZE as u64)
            .map(ByteOffset)
    }
}

/// Compute the byte offset of an inode record in the inode table.
///
/// The table starts at `inode_start * BLOCK_SIZE`; records are packed at
/// 128-byte stride, 0-indexed. Returns `None` on overflow.
#[must_use]
pub fn inode_record_offset(inode_start: BlockNumber, ino: InodeNumber) -> Option<ByteOffset> {
    let table = inode_start.to_byte_offset()?;
    let index = u64::from(ino.0).checked_mul(GRAHAFS_INODE_RECORD_SIZE as u64)?;
    table.checked_add(index)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u64, actual: u64 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_le_u64(data: &[u8], offset: usize) -> Result<u64, ParseError> {
    let bytes = ensure_slice(data, offset, 8)?;
    Ok(u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

/// Decode a NUL-terminated byte field permissively.
///
/// Bytes after the first NUL are not part of the value; invalid UTF-8
/// sequences are replaced rather than causing failure.
#[must_use]
pub fn nul_terminated_lossy(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Narrow a `u64` to `usize` with an explicit error path.
///
/// The `field` label is included in the error for diagnostics.
pub fn u64_to_usize(value: u64, field: &'static str) -> Result<usize, ParseError> {
    usize::try_from(value).map_err(|_| ParseError::IntegerConversion { field })
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
