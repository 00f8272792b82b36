#![forbid(unsafe_code)]
//! On-disk format parsing for GrahaFS structures.
//!
//! Pure parsing crate — no I/O, no side effects. Parses byte slices into
//! typed Rust structures representing the GrahaFS superblock, inode
//! records, directory entry records, and the free-space bitmap.

use gfs_types::{
    BlockNumber, InodeNumber, ParseError, ensure_slice, nul_terminated_lossy, read_le_u16,
    read_le_u32, read_le_u64, GRAHAFS_DIRENT_NAME_LEN, GRAHAFS_DIRENT_RECORD_SIZE,
    GRAHAFS_INODE_RECORD_SIZE, GRAHAFS_INODE_TYPE_DIRECTORY, GRAHAFS_INODE_TYPE_FILE,
    GRAHAFS_MAGIC, GRAHAFS_SUPERBLOCK_SIZE,
};
use serde::{Deserialize, Serialize};

// ── Superblock ──────────────────────────────────────────────────────────────

/// The GrahaFS superblock: one 4096-byte block at byte offset 0.
///
/// All region start fields are in block units; byte offset =
/// `field * GRAHAFS_BLOCK_SIZE`. `root_inode` is an inode number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub magic: u64,
    pub total_blocks: u32,
    pub bitmap_start: BlockNumber,
    pub inode_start: BlockNumber,
    pub data_start: BlockNumber,
    pub root_inode: InodeNumber,
    pub free_blocks: u32,
    pub free_inodes: u32,
}

impl Superblock {
    /// Parse a GrahaFS superblock from a 4096-byte superblock region.
    ///
    /// The magic is checked first; on mismatch every other field is left
    /// unparsed and the observed value is carried in the error. No
    /// cross-field consistency (region ordering, total_blocks vs image
    /// length) is validated here.
    pub fn parse_superblock_region(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < GRAHAFS_SUPERBLOCK_SIZE {
            return Err(ParseError::InsufficientData {
                needed: GRAHAFS_SUPERBLOCK_SIZE,
                offset: 0,
                actual: region.len(),
            });
        }

        let magic = read_le_u64(region, 0x00)?;
        if magic != GRAHAFS_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: GRAHAFS_MAGIC,
                actual: magic,
            });
        }

        Ok(Self {
            magic,
            total_blocks: read_le_u32(region, 0x08)?,
            bitmap_start: BlockNumber(read_le_u32(region, 0x0C)?),
            inode_start: BlockNumber(read_le_u32(region, 0x10)?),
            data_start: BlockNumber(read_le_u32(region, 0x14)?),
            root_inode: InodeNumber(read_le_u32(region, 0x18)?),
            free_blocks: read_le_u32(region, 0x1C)?,
            free_inodes: read_le_u32(region, 0x20)?,
        })
    }

    /// Parse a GrahaFS superblock from a full image buffer.
    pub fn parse_from_image(image: &[u8]) -> Result<Self, ParseError> {
        if image.len() < GRAHAFS_SUPERBLOCK_SIZE {
            return Err(ParseError::InsufficientData {
                needed: GRAHAFS_SUPERBLOCK_SIZE,
                offset: 0,
                actual: image.len(),
            });
        }
        Self::parse_superblock_region(&image[..GRAHAFS_SUPERBLOCK_SIZE])
    }
}

// ── Inode records ───────────────────────────────────────────────────────────

/// A parsed GrahaFS inode record (128 bytes in the inode table).
///
/// `kind`, `size`, and `first_block` drive the analysis; the remaining
/// fields are decoded for diagnostic display and never validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub kind: u16,
    pub link_count: u16,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub size: u64,
    pub creation_time: u64,
    pub modification_time: u64,
    pub access_time: u64,
    /// Block address of the object's first data block; 0 means "no data".
    pub first_block: BlockNumber,
}

impl Inode {
    /// Parse a GrahaFS inode from a 128-byte record.
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < GRAHAFS_INODE_RECORD_SIZE {
            return Err(ParseError::InsufficientData {
                needed: GRAHAFS_INODE_RECORD_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            kind: read_le_u16(bytes, 0x00)?,
            link_count: read_le_u16(bytes, 0x02)?,
            uid: read_le_u32(bytes, 0x04)?,
            gid: read_le_u32(bytes, 0x08)?,
            mode: read_le_u32(bytes, 0x0C)?,
            size: read_le_u64(bytes, 0x10)?,
            creation_time: read_le_u64(bytes, 0x18)?,
            modification_time: read_le_u64(bytes, 0x20)?,
            access_time: read_le_u64(bytes, 0x28)?,
            first_block: BlockNumber(read_le_u32(bytes, 0x38)?),
        })
    }

    /// Whether this inode describes a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind == GRAHAFS_INODE_TYPE_DIRECTORY
    }

    /// Whether this inode describes a regular file.
    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.kind == GRAHAFS_INODE_TYPE_FILE
    }

    /// Whether this inode has any data to scan.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.first_block.0 > 0
    }
}

// ── Directory entry records ─────────────────────────────────────────────────

/// A borrowed directory entry (zero-copy reference into the block buffer).
///
/// `index` is the record's position within the scanned block, counting
/// empty slots. The name borrows the bytes up to the first NUL; use
/// [`name_str`](DirEntryRef::name_str) for a permissive string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntryRef<'a> {
    pub index: usize,
    pub inode: InodeNumber,
    pub name: &'a [u8],
}

impl DirEntryRef<'_> {
    /// Convert to an owned [`DirEntry`] (allocates name bytes).
    #[must_use]
    pub fn to_owned(&self) -> DirEntry {
        DirEntry {
            index: self.index,
            inode: self.inode,
            name: self.name.to_vec(),
        }
    }

    /// Return the name as a UTF-8 string (lossy).
    #[must_use]
    pub fn name_str(&self) -> String {
        nul_terminated_lossy(self.name)
    }
}

/// An owned directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub index: usize,
    pub inode: InodeNumber,
    pub name: Vec<u8>,
}

impl DirEntry {
    /// Return the name as a UTF-8 string (lossy).
    #[must_use]
    pub fn name_str(&self) -> String {
        nul_terminated_lossy(&self.name)
    }
}

/// A bounded iterator over GrahaFS directory entry records in a data block.
///
/// Records are fixed 32-byte units packed sequentially. Entries whose
/// `inode` field is 0 are empty slots: they are skipped silently but still
/// count toward the record bound (the bound limits records *read*, not
/// records emitted). Iteration stops, without error, when either the bound
/// is reached or fewer than 32 bytes remain.
pub struct DirBlockIter<'a> {
    block: &'a [u8],
    limit: usize,
    records_read: usize,
    offset: usize,
}

impl<'a> DirBlockIter<'a> {
    /// Create a new iterator reading at most `limit` records from `block`.
    #[must_use]
    pub fn new(block: &'a [u8], limit: usize) -> Self {
        Self {
            block,
            limit,
            records_read: 0,
            offset: 0,
        }
    }
}

impl<'a> Iterator for DirBlockIter<'a> {
    type Item = DirEntryRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Stop condition 1: record bound reached.
            if self.records_read >= self.limit {
                return None;
            }
            // Stop condition 2: fewer than 32 bytes remain (end of data).
            let Ok(record) = ensure_slice(self.block, self.offset, GRAHAFS_DIRENT_RECORD_SIZE)
            else {
                return None;
            };

            let index = self.records_read;
            self.records_read += 1;
            self.offset += GRAHAFS_DIRENT_RECORD_SIZE;

            // Fixed-width records cannot fail to parse past the length check.
            let inode = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
            if inode == 0 {
                continue;
            }

            let name_field = &record[4..4 + GRAHAFS_DIRENT_NAME_LEN];
            let name_end = name_field
                .iter()
                .position(|b| *b == 0)
                .unwrap_or(GRAHAFS_DIRENT_NAME_LEN);

            return Some(DirEntryRef {
                index,
                inode: InodeNumber(inode),
                name: &name_field[..name_end],
            });
        }
    }
}

/// Create a bounded iterator over directory entries in a block buffer.
///
/// This is a convenience wrapper around [`DirBlockIter::new`].
#[must_use]
pub fn iter_dir_block(block: &[u8], limit: usize) -> DirBlockIter<'_> {
    DirBlockIter::new(block, limit)
}

// ── Free-space bitmap ───────────────────────────────────────────────────────

/// Count allocated blocks in a free-space bitmap region.
///
/// Each set bit marks one allocated block; the result is the population
/// count over every byte supplied. No per-block interpretation is done.
#[must_use]
pub fn count_used_blocks(bitmap: &[u8]) -> u64 {
    bitmap.iter().map(|byte| u64::from(byte.count_ones())).sum()
}

// ── Synthetic record encoders (test support) ────────────────────────────────

/// Encode a superblock into the first 36 bytes of `region`.
///
/// Only meaningful for building synthetic images in tests and fixtures;
/// the analyzer itself never writes.
pub fn encode_superblock(region: &mut [u8], sb: &Superblock) {
    region[0x00..0x08].copy_from_slice(&sb.magic.to_le_bytes());
    region[0x08..0x0C].copy_from_slice(&sb.total_blocks.to_le_bytes());
    region[0x0C..0x10].copy_from_slice(&sb.bitmap_start.0.to_le_bytes());
    region[0x10..0x14].copy_from_slice(&sb.inode_start.0.to_le_bytes());
    region[0x14..0x18].copy_from_slice(&sb.data_start.0.to_le_bytes());
    region[0x18..0x1C].copy_from_slice(&sb.root_inode.0.to_le_bytes());
    region[0x1C..0x20].copy_from_slice(&sb.free_blocks.to_le_bytes());
    region[0x20..0x24].copy_from_slice(&sb.free_inodes.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfs_types::GRAHAFS_BLOCK_SIZE;

    fn sample_superblock() -> Superblock {
        Superblock {
            magic: GRAHAFS_MAGIC,
            total_blocks: 100,
            bitmap_start: BlockNumber(1),
            inode_start: BlockNumber(2),
            data_start: BlockNumber(10),
            root_inode: InodeNumber(0),
            free_blocks: 50,
            free_inodes: 50,
        }
    }

    fn sample_region() -> Vec<u8> {
        let mut region = vec![0_u8; GRAHAFS_SUPERBLOCK_SIZE];
        encode_superblock(&mut region, &sample_superblock());
        region
    }

    #[test]
    fn superblock_round_trip() {
        let region = sample_region();
        let sb = Superblock::parse_superblock_region(&region).expect("parse");
        assert_eq!(sb, sample_superblock());
    }

    #[test]
    fn superblock_magic_bytes_are_on_disk_order() {
        // The example image from the format docs: magic stored as
        // 21 53 4F 41 48 41 52 47.
        let region = sample_region();
        assert_eq!(
            &region[..8],
            &[0x21, 0x53, 0x4F, 0x41, 0x48, 0x41, 0x52, 0x47]
        );
    }

    #[test]
    fn superblock_rejects_bad_magic() {
        let mut region = sample_region();
        region[0] ^= 0xFF;
        let err = Superblock::parse_superblock_region(&region).unwrap_err();
        match err {
            ParseError::InvalidMagic { expected, actual } => {
                assert_eq!(expected, GRAHAFS_MAGIC);
                assert_eq!(actual, GRAHAFS_MAGIC ^ 0xFF);
            }
            other => panic!("expected InvalidMagic, got {other:?}"),
        }
    }

    #[test]
    fn superblock_rejects_short_region() {
        let region = vec![0_u8; GRAHAFS_SUPERBLOCK_SIZE - 1];
        assert_eq!(
            Superblock::parse_superblock_region(&region),
            Err(ParseError::InsufficientData {
                needed: GRAHAFS_SUPERBLOCK_SIZE,
                offset: 0,
                actual: GRAHAFS_SUPERBLOCK_SIZE - 1,
            })
        );
    }

    #[test]
    fn superblock_parse_from_image() {
        let mut image = sample_region();
        image.extend_from_slice(&vec![0xAB_u8; GRAHAFS_BLOCK_SIZE]);
        let sb = Superblock::parse_from_image(&image).expect("parse");
        assert_eq!(sb.total_blocks, 100);
        assert_eq!(sb.data_start, BlockNumber(10));
    }

    fn encode_inode(kind: u16, size: u64, first_block: u32) -> [u8; GRAHAFS_INODE_RECORD_SIZE] {
        let mut rec = [0_u8; GRAHAFS_INODE_RECORD_SIZE];
        rec[0x00..0x02].copy_from_slice(&kind.to_le_bytes());
        rec[0x02..0x04].copy_from_slice(&2_u16.to_le_bytes()); // link_count
        rec[0x0C..0x10].copy_from_slice(&0o755_u32.to_le_bytes()); // mode
        rec[0x10..0x18].copy_from_slice(&size.to_le_bytes());
        rec[0x38..0x3C].copy_from_slice(&first_block.to_le_bytes());
        rec
    }

    #[test]
    fn inode_round_trip() {
        let rec = encode_inode(GRAHAFS_INODE_TYPE_DIRECTORY, 96, 10);
        let inode = Inode::parse_from_bytes(&rec).expect("parse");
        assert_eq!(inode.kind, GRAHAFS_INODE_TYPE_DIRECTORY);
        assert!(inode.is_directory());
        assert!(!inode.is_regular());
        assert_eq!(inode.link_count, 2);
        assert_eq!(inode.mode, 0o755);
        assert_eq!(inode.size, 96);
        assert_eq!(inode.first_block, BlockNumber(10));
        assert!(inode.has_data());
    }

    #[test]
    fn inode_first_block_zero_means_no_data() {
        let rec = encode_inode(GRAHAFS_INODE_TYPE_FILE, 0, 0);
        let inode = Inode::parse_from_bytes(&rec).expect("parse");
        assert!(!inode.has_data());
    }

    #[test]
    fn inode_rejects_short_record() {
        let rec = [0_u8; GRAHAFS_INODE_RECORD_SIZE - 1];
        assert_eq!(
            Inode::parse_from_bytes(&rec),
            Err(ParseError::InsufficientData {
                needed: GRAHAFS_INODE_RECORD_SIZE,
                offset: 0,
                actual: GRAHAFS_INODE_RECORD_SIZE - 1,
            })
        );
    }

    fn encode_dirent(inode: u32, name: &[u8]) -> [u8; GRAHAFS_DIRENT_RECORD_SIZE] {
        let mut rec = [0_u8; GRAHAFS_DIRENT_RECORD_SIZE];
        rec[0..4].copy_from_slice(&inode.to_le_bytes());
        rec[4..4 + name.len()].copy_from_slice(name);
        rec
    }

    #[test]
    fn dir_iter_skips_empty_slots_and_preserves_order() {
        let mut block = Vec::new();
        block.extend_from_slice(&encode_dirent(5, b"alpha"));
        block.extend_from_slice(&encode_dirent(0, b""));
        block.extend_from_slice(&encode_dirent(7, b"beta"));
        block.extend_from_slice(&encode_dirent(9, b"gamma"));

        let entries: Vec<_> = iter_dir_block(&block, 10).collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].index, 0);
        assert_eq!(entries[0].inode, InodeNumber(5));
        assert_eq!(entries[0].name_str(), "alpha");
        assert_eq!(entries[1].index, 2);
        assert_eq!(entries[1].name_str(), "beta");
        assert_eq!(entries[2].index, 3);
        assert_eq!(entries[2].name_str(), "gamma");
    }

    #[test]
    fn dir_iter_stops_at_record_bound() {
        let mut block = Vec::new();
        for i in 1..=20_u32 {
            block.extend_from_slice(&encode_dirent(i, b"entry"));
        }
        let entries: Vec<_> = iter_dir_block(&block, 10).collect();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries.last().expect("entry").inode, InodeNumber(10));
    }

    #[test]
    fn dir_iter_bound_counts_records_read_not_emitted() {
        // 3 live entries after 8 empty slots: with a bound of 10, only
        // 2 of the live entries fit inside the 10 records read.
        let mut block = Vec::new();
        for _ in 0..8 {
            block.extend_from_slice(&encode_dirent(0, b""));
        }
        for i in 1..=3_u32 {
            block.extend_from_slice(&encode_dirent(i, b"late"));
        }
        let entries: Vec<_> = iter_dir_block(&block, 10).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 8);
        assert_eq!(entries[1].index, 9);
    }

    #[test]
    fn dir_iter_stops_on_short_data() {
        let mut block = Vec::new();
        block.extend_from_slice(&encode_dirent(5, b"whole"));
        block.extend_from_slice(&[0xAA_u8; 20]); // partial trailing record

        let entries: Vec<_> = iter_dir_block(&block, 10).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name_str(), "whole");
    }

    #[test]
    fn dir_iter_empty_block_yields_nothing() {
        assert_eq!(iter_dir_block(&[], 10).count(), 0);
    }

    #[test]
    fn dir_entry_name_is_nul_delimited_and_lossy() {
        let mut rec = encode_dirent(3, b"name");
        // Garbage after the terminator must not leak into the name.
        rec[9] = 0xFF;
        rec[10] = 0xFE;
        let block = rec.to_vec();
        let entries: Vec<_> = iter_dir_block(&block, 10).collect();
        assert_eq!(entries[0].name_str(), "name");

        // A name with invalid UTF-8 decodes with substitution.
        let rec = encode_dirent(4, b"bad\xFFname");
        let block = rec.to_vec();
        let entries: Vec<_> = iter_dir_block(&block, 10).collect();
        assert_eq!(entries[0].name_str(), "bad\u{FFFD}name");
    }

    #[test]
    fn dir_entry_to_owned() {
        let rec = encode_dirent(11, b"kept");
        let block = rec.to_vec();
        let owned: Vec<DirEntry> = iter_dir_block(&block, 10).map(|e| e.to_owned()).collect();
        assert_eq!(owned[0].inode, InodeNumber(11));
        assert_eq!(owned[0].name_str(), "kept");
    }

    #[test]
    fn bitmap_popcount() {
        assert_eq!(count_used_blocks(&[0_u8; GRAHAFS_BLOCK_SIZE]), 0);
        assert_eq!(count_used_blocks(&[0xFF_u8; GRAHAFS_BLOCK_SIZE]), 32_768);
        assert_eq!(count_used_blocks(&[0b1010_0001]), 3);
        assert_eq!(count_used_blocks(&[]), 0);
    }
}
