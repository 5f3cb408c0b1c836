//! Compression format detection.
//!
//! The gzip backend uses the magic number check to decide between
//! decompressing and transparent reading; callers use [`detect_compression`]
//! to pick a backend for a file they know nothing about.

use crate::error::{HandleError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Gzip magic number (RFC 1952)
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression formats the handle can tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// Stored as-is
    None,
    /// RFC 1952 stream, possibly several members
    Gzip,
}

impl CompressionType {
    /// Label used in log output
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
        }
    }

    /// Whether reading needs the gzip backend
    pub fn is_compressed(&self) -> bool {
        *self == Self::Gzip
    }
}

/// Detect compression type from magic numbers, falling back to the extension
///
/// Reads at most the first two bytes of the file. A file too short to hold a
/// magic number is judged by its extension alone.
pub fn detect_compression(path: &Path) -> Result<CompressionType> {
    let mut file = File::open(path).map_err(|e| HandleError::open(path, "rb", e))?;
    let mut magic = [0u8; GZIP_MAGIC.len()];
    let mut filled = 0;
    while filled < magic.len() {
        match file.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HandleError::open(path, "rb", e)),
        }
    }

    if let Some(format) = detect_by_magic(&magic[..filled]) {
        return Ok(format);
    }

    Ok(detect_by_extension(path).unwrap_or(CompressionType::None))
}

/// Classify the leading bytes of a stream; `None` when they prove nothing
pub fn detect_by_magic(magic: &[u8]) -> Option<CompressionType> {
    if magic.starts_with(&GZIP_MAGIC) {
        Some(CompressionType::Gzip)
    } else {
        None
    }
}

/// Guess from the file name when the content is inconclusive
fn detect_by_extension(path: &Path) -> Option<CompressionType> {
    let ext = path.extension()?.to_str()?;
    match ext.to_ascii_lowercase().as_str() {
        "gz" | "gzip" => Some(CompressionType::Gzip),
        _ => None,
    }
}
