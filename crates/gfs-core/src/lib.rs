#![forbid(unsafe_code)]
//! Analysis orchestration for GrahaFS images.
//!
//! Sequences the decode stages — superblock, free-space bitmap, root
//! inode, directory scan, whole-image digest — over a single `ByteSource`
//! and assembles the structured [`Report`].
//!
//! # Stage policy
//!
//! The superblock stage is a hard gate: an unreadable or short region, or
//! a magic mismatch, aborts the run with a `GfsError` carrying what was
//! observed, and nothing else executes. After a valid superblock, each
//! remaining stage fails independently: a failure is recorded in the
//! report's stage-failure list and stages that do not depend on the
//! missing data still run (the bitmap count and the digest never depend
//! on inode validity). Advisory findings — a root inode whose type is not
//! "directory" — are accumulated without halting anything.

use gfs_block::{ByteSource, FileByteSource};
use gfs_error::{GfsError, Result};
use gfs_ondisk::{count_used_blocks, iter_dir_block, Inode, Superblock};
use gfs_types::{
    inode_record_offset, u64_to_usize, BlockNumber, ByteOffset, InodeNumber, ParseError,
    GRAHAFS_BLOCK_SIZE, GRAHAFS_DIRENT_RECORD_SIZE, GRAHAFS_INODE_RECORD_SIZE,
    GRAHAFS_INODE_TYPE_DIRECTORY, GRAHAFS_SUPERBLOCK_SIZE,
};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Directory records inspected per scan.
///
/// The scan is diagnostic, not a traversal: it caps the records *read*
/// at a small fixed bound to keep output bounded.
pub const DIR_SCAN_LIMIT: usize = 10;

// ── Report model ────────────────────────────────────────────────────────────

/// Analysis stages that can fail independently after the superblock gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Bitmap,
    RootInode,
    DirectoryScan,
    Digest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bitmap => "bitmap",
            Self::RootInode => "root inode",
            Self::DirectoryScan => "directory scan",
            Self::Digest => "digest",
        };
        f.write_str(name)
    }
}

/// A stage that could not complete; the rest of the report stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub detail: String,
}

/// A non-fatal structural finding, recorded without halting analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// The root inode's type field is not the directory type.
    RootInodeNotDirectory { expected: u16, actual: u16 },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootInodeNotDirectory { expected, actual } => write!(
                f,
                "root inode type is {actual}, expected {expected} (directory)"
            ),
        }
    }
}

/// The root inode as decoded, paired with its number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InodeSummary {
    pub number: InodeNumber,
    pub inode: Inode,
}

/// One live directory entry surfaced by the bounded scan.
///
/// `index` is the record's position within the scanned block, counting
/// empty slots; the name is decoded permissively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedEntry {
    pub index: usize,
    pub inode: InodeNumber,
    pub name: String,
}

/// Structural-health report for one GrahaFS image.
///
/// Assembled fresh on every run; nothing persists between analyses.
/// Optional fields are `None` when their stage failed (the failure is in
/// `stage_failures`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub superblock: Superblock,
    pub bitmap_used_blocks: Option<u64>,
    pub root_inode: Option<InodeSummary>,
    pub entries: Vec<ScannedEntry>,
    pub digest: Option<String>,
    pub advisories: Vec<Advisory>,
    pub stage_failures: Vec<StageFailure>,
}

impl Report {
    fn new(superblock: Superblock) -> Self {
        Self {
            superblock,
            bitmap_used_blocks: None,
            root_inode: None,
            entries: Vec::new(),
            digest: None,
            advisories: Vec::new(),
            stage_failures: Vec::new(),
        }
    }

    fn record_failure(&mut self, stage: Stage, err: &GfsError) {
        self.stage_failures.push(StageFailure {
            stage,
            detail: err.to_string(),
        });
    }

    /// Whether every stage completed.
    ///
    /// Advisories do not affect cleanliness — they are findings, not
    /// failures — but they are listed in the report.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.stage_failures.is_empty()
    }
}

// ── Boundary conversion ─────────────────────────────────────────────────────

/// Convert a `ParseError` into the user-facing `GfsError`, adding the
/// region context the parse layer does not know.
///
/// This is the crate-boundary conversion described in the `gfs-error`
/// taxonomy: `gfs-ondisk` stays I/O- and policy-free and returns
/// `ParseError`; the region label is attached here.
fn parse_error_to_gfs(e: &ParseError, region: &'static str) -> GfsError {
    match e {
        ParseError::InsufficientData {
            needed,
            offset,
            actual,
        } => GfsError::Truncated {
            region,
            needed: *needed,
            offset: *offset as u64,
            actual: *actual,
        },
        ParseError::InvalidMagic { actual, .. } => GfsError::InvalidMagic { actual: *actual },
        ParseError::InvalidField { .. } | ParseError::IntegerConversion { .. } => {
            GfsError::Format(e.to_string())
        }
    }
}

/// Read `len` bytes at `offset`, relabeling truncation with the region
/// being decoded.
fn read_region(
    src: &dyn ByteSource,
    region: &'static str,
    offset: ByteOffset,
    len: usize,
) -> Result<Vec<u8>> {
    let mut buf = vec![0_u8; len];
    src.read_exact_at(offset.0, &mut buf).map_err(|err| match err {
        GfsError::Truncated {
            needed,
            offset,
            actual,
            ..
        } => GfsError::Truncated {
            region,
            needed,
            offset,
            actual,
        },
        other => other,
    })?;
    Ok(buf)
}

// ── Stages ──────────────────────────────────────────────────────────────────

fn bitmap_stage(src: &dyn ByteSource, sb: &Superblock) -> Result<u64> {
    let offset = sb
        .bitmap_start
        .to_byte_offset()
        .ok_or_else(|| GfsError::Format("bitmap_start byte offset overflows u64".to_owned()))?;
    let block = read_region(src, "bitmap", offset, GRAHAFS_BLOCK_SIZE)?;
    let used = count_used_blocks(&block);
    debug!(bitmap_start = %sb.bitmap_start, used_blocks = used, "bitmap counted");
    Ok(used)
}

fn root_inode_stage(src: &dyn ByteSource, sb: &Superblock) -> Result<Inode> {
    let offset = inode_record_offset(sb.inode_start, sb.root_inode)
        .ok_or_else(|| GfsError::Format("inode record byte offset overflows u64".to_owned()))?;
    let record = read_region(src, "root inode", offset, GRAHAFS_INODE_RECORD_SIZE)?;
    let inode =
        Inode::parse_from_bytes(&record).map_err(|e| parse_error_to_gfs(&e, "root inode"))?;
    debug!(
        root_inode = %sb.root_inode,
        kind = inode.kind,
        size = inode.size,
        first_block = %inode.first_block,
        "root inode decoded"
    );
    Ok(inode)
}

fn scan_directory_block(src: &dyn ByteSource, first_block: BlockNumber) -> Result<Vec<ScannedEntry>> {
    let offset = first_block
        .to_byte_offset()
        .ok_or_else(|| GfsError::Format("first_block byte offset overflows u64".to_owned()))?;

    // The bound limits records read, so only that span is fetched; a block
    // ending early just shortens the scan, it is not an error.
    let span = (DIR_SCAN_LIMIT * GRAHAFS_DIRENT_RECORD_SIZE).min(GRAHAFS_BLOCK_SIZE);
    let available = src.len_bytes().saturating_sub(offset.0);
    let take = u64_to_usize(available.min(span as u64), "directory span")
        .map_err(|e| parse_error_to_gfs(&e, "directory block"))?;
    let block = read_region(src, "directory block", offset, take)?;

    let entries: Vec<ScannedEntry> = iter_dir_block(&block, DIR_SCAN_LIMIT)
        .map(|e| ScannedEntry {
            index: e.index,
            inode: e.inode,
            name: e.name_str(),
        })
        .collect();
    debug!(first_block = %first_block, entries = entries.len(), "directory block scanned");
    Ok(entries)
}

/// Compute the whole-image content fingerprint.
///
/// Streams every byte from offset 0 to end-of-file through a blake3
/// hasher, rereading regardless of earlier stage reads, and returns the
/// hex form. Identification only — not an integrity guarantee.
pub fn compute_digest(src: &dyn ByteSource) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    let len = src.len_bytes();
    let mut buf = vec![0_u8; GRAHAFS_BLOCK_SIZE];
    let mut offset = 0_u64;
    while offset < len {
        #[allow(clippy::cast_possible_truncation)] // bounded by block size
        let chunk = (len - offset).min(GRAHAFS_BLOCK_SIZE as u64) as usize;
        src.read_exact_at(offset, &mut buf[..chunk])?;
        hasher.update(&buf[..chunk]);
        offset += chunk as u64;
    }
    Ok(hasher.finalize().to_hex().to_string())
}

// ── Orchestration ───────────────────────────────────────────────────────────

/// Analyze a GrahaFS image over an open byte source.
///
/// Fatal early failures — the superblock region unreadable or short, or a
/// magic mismatch — return `Err` carrying the failure kind and the partial
/// observation (the observed magic value); no later stage executes. Once
/// the superblock is valid a report is always produced: per-stage
/// truncation failures land in [`Report::stage_failures`] while
/// independent stages still run, and [`Report::is_clean`] tells callers
/// whether everything completed.
pub fn analyze_source(src: &dyn ByteSource) -> Result<Report> {
    let region = read_region(src, "superblock", ByteOffset::ZERO, GRAHAFS_SUPERBLOCK_SIZE)?;
    let superblock = Superblock::parse_superblock_region(&region)
        .map_err(|e| parse_error_to_gfs(&e, "superblock"))?;
    debug!(
        total_blocks = superblock.total_blocks,
        bitmap_start = %superblock.bitmap_start,
        inode_start = %superblock.inode_start,
        data_start = %superblock.data_start,
        root_inode = %superblock.root_inode,
        "superblock decoded"
    );

    let mut report = Report::new(superblock);

    match bitmap_stage(src, &report.superblock) {
        Ok(used) => report.bitmap_used_blocks = Some(used),
        Err(err) => report.record_failure(Stage::Bitmap, &err),
    }

    match root_inode_stage(src, &report.superblock) {
        Ok(inode) => {
            if !inode.is_directory() {
                report.advisories.push(Advisory::RootInodeNotDirectory {
                    expected: GRAHAFS_INODE_TYPE_DIRECTORY,
                    actual: inode.kind,
                });
            }
            // first_block == 0 means no data: never seek, never read.
            if inode.has_data() {
                match scan_directory_block(src, inode.first_block) {
                    Ok(entries) => report.entries = entries,
                    Err(err) => report.record_failure(Stage::DirectoryScan, &err),
                }
            }
            report.root_inode = Some(InodeSummary {
                number: report.superblock.root_inode,
                inode,
            });
        }
        Err(err) => report.record_failure(Stage::RootInode, &err),
    }

    // Last, so the fingerprint reflects the image as analyzed.
    match compute_digest(src) {
        Ok(digest) => report.digest = Some(digest),
        Err(err) => report.record_failure(Stage::Digest, &err),
    }

    info!(
        clean = report.is_clean(),
        advisories = report.advisories.len(),
        entries = report.entries.len(),
        "analysis complete"
    );
    Ok(report)
}

/// Analyze the GrahaFS image at `path`.
///
/// The file handle is scoped to this call and released on every exit
/// path, including early fatal failure.
pub fn analyze_at_path(path: impl AsRef<Path>) -> Result<Report> {
    let src = FileByteSource::open(path)?;
    analyze_source(&src)
}
