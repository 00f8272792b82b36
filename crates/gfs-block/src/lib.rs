#![forbid(unsafe_code)]
//! Random-access byte layer over a GrahaFS image.
//!
//! Provides the `ByteSource` trait with pread-style fixed-offset reads,
//! a read-only file-backed implementation, and an in-memory implementation
//! for byte slices (used heavily by tests and fixtures). The analyzer
//! never writes, so no write or sync path exists here.

use gfs_error::{GfsError, Result};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Random-access, seekable view over an on-disk image.
///
/// All reads use pread semantics (no shared seek position). A read past
/// the end of the source fails with `GfsError::Truncated`; callers that
/// know which fixed record they are decoding relabel the region.
pub trait ByteSource: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// File-backed byte source using `pread`-style I/O.
///
/// Opened read-only: the analyzer never mutates the image. The handle is
/// released when the source is dropped, on every exit path.
#[derive(Debug)]
pub struct FileByteSource {
    file: File,
    len: u64,
}

impl FileByteSource {
    /// Open an image file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl ByteSource for FileByteSource {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_in_bounds(self.len, offset, buf.len())?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }
}

impl ByteSource for [u8] {
    fn len_bytes(&self) -> u64 {
        self.len() as u64
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_in_bounds(self.len_bytes(), offset, buf.len())?;
        let start = usize::try_from(offset)
            .map_err(|_| GfsError::Format("read offset does not fit usize".to_owned()))?;
        buf.copy_from_slice(&self[start..start + buf.len()]);
        Ok(())
    }
}

fn check_in_bounds(len: u64, offset: u64, needed: usize) -> Result<()> {
    let end = offset
        .checked_add(
            u64::try_from(needed)
                .map_err(|_| GfsError::Format("read length overflows u64".to_owned()))?,
        )
        .ok_or_else(|| GfsError::Format("read range overflows u64".to_owned()))?;
    if end > len {
        return Err(GfsError::Truncated {
            region: "image",
            needed,
            offset,
            actual: usize::try_from(len.saturating_sub(offset)).unwrap_or(usize::MAX),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn slice_source_reads_at_offset() {
        let data: Vec<u8> = (0..=255).collect();
        let src: &dyn ByteSource = data.as_slice();
        assert_eq!(src.len_bytes(), 256);

        let mut buf = [0_u8; 4];
        src.read_exact_at(16, &mut buf).expect("read");
        assert_eq!(buf, [16, 17, 18, 19]);
    }

    #[test]
    fn slice_source_rejects_out_of_range() {
        let data = vec![0_u8; 32];
        let src: &dyn ByteSource = data.as_slice();

        let mut buf = [0_u8; 8];
        let err = src.read_exact_at(30, &mut buf).unwrap_err();
        match err {
            GfsError::Truncated {
                needed,
                offset,
                actual,
                ..
            } => {
                assert_eq!(needed, 8);
                assert_eq!(offset, 30);
                assert_eq!(actual, 2);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn file_source_reads_and_reports_length() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        tmp.write_all(b"grahafs test image bytes").expect("write");
        tmp.flush().expect("flush");

        let src = FileByteSource::open(tmp.path()).expect("open");
        assert_eq!(src.len_bytes(), 24);

        let mut buf = [0_u8; 7];
        src.read_exact_at(0, &mut buf).expect("read");
        assert_eq!(&buf, b"grahafs");

        src.read_exact_at(13, &mut buf).expect("read");
        assert_eq!(&buf, b"image b");
    }

    #[test]
    fn file_source_read_past_eof_is_truncated() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        tmp.write_all(&[0_u8; 100]).expect("write");
        tmp.flush().expect("flush");

        let src = FileByteSource::open(tmp.path()).expect("open");
        let mut buf = [0_u8; 128];
        assert!(matches!(
            src.read_exact_at(0, &mut buf),
            Err(GfsError::Truncated { .. })
        ));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = FileByteSource::open("/nonexistent/grahafs.img").unwrap_err();
        assert!(matches!(err, GfsError::Unreadable(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
