#![forbid(unsafe_code)]
//! Error types for the GrahaFS analyzer.
//!
//! # Error Taxonomy
//!
//! The analyzer uses a two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `gfs-types` | On-disk format violations detected during byte parsing |
//! | Analysis | `GfsError` | `gfs-error` (this crate) | User-facing errors for CLI and API consumers |
//!
//! ## Mapping Policy: ParseError → GfsError
//!
//! `gfs-error` is intentionally independent of `gfs-types` and `gfs-ondisk`
//! to avoid cyclic dependencies. The conversion from `ParseError` to
//! `GfsError` is implemented in `gfs-core`, which depends on both crates
//! and adds the region context (which fixed record was being decoded).
//!
//! | ParseError Variant | GfsError Variant | Rationale |
//! |--------------------|------------------|-----------|
//! | `InsufficientData` | `Truncated { region, .. }` | A required region is shorter than its fixed record size |
//! | `InvalidMagic` | `InvalidMagic { actual }` | Wrong magic means not a GrahaFS image; the observed value is reported |
//! | `InvalidField` | `Format(detail)` | Residual structural violations |
//! | `IntegerConversion` | `Format(detail)` | Arithmetic overflow in derived offsets |
//!
//! Advisory findings (e.g. a root inode whose type is not "directory") are
//! NOT errors: they are accumulated in the report and never halt analysis.
//!
//! ## Exit-Code Mapping
//!
//! Every `GfsError` variant maps to exactly one process exit code via
//! [`GfsError::exit_code`]. The mapping is exhaustive (no wildcard arms)
//! so adding a new variant is a compile error until its code is assigned.
//!
//! | Variant | Exit code | Meaning |
//! |---------|-----------|---------|
//! | `Unreadable` | 1 | Image path missing or unreadable |
//! | `Truncated` | 1 | A required region is shorter than its record |
//! | `InvalidMagic` | 2 | Not a GrahaFS image |
//! | `Format` | 1 | Residual structural violation |

use thiserror::Error;

/// Unified error type for all GrahaFS analysis operations.
///
/// This is the canonical error type returned by CLI commands and public
/// API surfaces. Parse-layer errors (`ParseError` from `gfs-types`) are
/// converted into `GfsError` at the `gfs-core` boundary.
#[derive(Debug, Error)]
pub enum GfsError {
    /// The image path is missing or unreadable (wraps `std::io::Error`).
    ///
    /// Fatal: surfaced immediately, before any parsing starts.
    #[error("cannot read image: {0}")]
    Unreadable(#[from] std::io::Error),

    /// A required region is shorter than its fixed record size.
    ///
    /// Fatal for the stage that needed the region; independent stages
    /// (bitmap counting, whole-image digest) may still be attempted when
    /// they do not depend on the missing data.
    #[error("truncated image: {region} needs {needed} bytes at offset {offset}, got {actual}")]
    Truncated {
        region: &'static str,
        needed: usize,
        offset: u64,
        actual: usize,
    },

    /// The superblock signature does not match the GrahaFS sentinel.
    ///
    /// Fatal: halts all further stages. Carries the raw value observed so
    /// the report can show what was actually on disk.
    #[error("invalid magic: image is not GrahaFS (observed {actual:#018x})")]
    InvalidMagic { actual: u64 },

    /// Residual structural violation (derived-offset overflow and the like).
    #[error("invalid on-disk structure: {0}")]
    Format(String),
}

impl GfsError {
    /// Convert this error into a process exit code.
    ///
    /// The mapping is exhaustive — every variant has an explicit arm.
    /// Adding a new variant without updating this function is a compile
    /// error.
    ///
    /// Policy notes:
    /// - `InvalidMagic` → 2: distinguishes "this is some other file" from
    ///   "this GrahaFS image is damaged", which scripting callers care
    ///   about when triaging a directory of images.
    /// - Everything else → 1.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreadable(_) | Self::Truncated { .. } | Self::Format(_) => 1,
            Self::InvalidMagic { .. } => 2,
        }
    }
}

/// Result alias using `GfsError`.
pub type Result<T> = std::result::Result<T, GfsError>;
