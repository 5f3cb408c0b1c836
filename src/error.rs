//! Error types and signalling conventions for fhandle.
//!
//! Only opening a file is modeled as a fallible operation returning
//! [`HandleError`]. Every other operation on a [`FileHandle`] reports the
//! backend's native signal as an ordinary return value, the way `stdio` and
//! zlib do:
//!
//! - byte counts are returned as `isize`; a count below the request is a short
//!   transfer (end of stream, pipe boundary), not an error
//! - [`IO_ERROR`] (`-1`) means the backend failed; the underlying
//!   [`std::io::Error`] is kept in [`FileHandle::last_error`]
//! - [`EOF`] (`-1`) is the out-of-band value of `getc`
//! - [`UNKNOWN_SIZE`] is what `probe_size` returns for a path it cannot open
//!
//! A short read is never an error. Callers inspect the count after every call.
//!
//! [`FileHandle`]: crate::file_handler::FileHandle
//! [`FileHandle::last_error`]: crate::file_handler::FileHandle::last_error

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Count returned by transfer operations when the backend failed.
pub const IO_ERROR: isize = -1;

/// Value returned by `getc` at end of stream or on error.
pub const EOF: i32 = -1;

/// Size reported by `probe_size` when the path cannot be opened.
pub const UNKNOWN_SIZE: u64 = u64::MAX;

/// Failures that can occur while opening a file handle.
#[derive(Error, Debug)]
pub enum HandleError {
    /// The backend could not acquire the file (missing file, permission
    /// denied, unreadable stream header, ...)
    #[error("Could not open file at {} with mode '{mode}'", .path.display())]
    Open {
        path: PathBuf,
        mode: String,
        #[source]
        source: std::io::Error,
    },

    /// The mode string is not valid for the selected backend
    #[error("Invalid mode '{mode}': {reason}")]
    InvalidMode { mode: String, reason: String },
}

/// Standard Result type for fhandle operations.
pub type Result<T> = std::result::Result<T, HandleError>;

impl HandleError {
    /// Create an Open error for `path` opened with `mode`
    pub fn open(path: &Path, mode: &str, source: std::io::Error) -> Self {
        Self::Open {
            path: path.to_path_buf(),
            mode: mode.to_string(),
            source,
        }
    }

    /// Create an InvalidMode error with a descriptive reason
    pub fn invalid_mode(mode: &str, reason: impl Into<String>) -> Self {
        Self::InvalidMode {
            mode: mode.to_string(),
            reason: reason.into(),
        }
    }

    /// The I/O error behind an Open failure, if any
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::InvalidMode { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display_messages() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let open_err = HandleError::open(Path::new("/test/file.gz"), "rb", io_err);
        assert_eq!(
            open_err.to_string(),
            "Could not open file at /test/file.gz with mode 'rb'"
        );

        let mode_err = HandleError::invalid_mode("q", "unknown access mode");
        assert_eq!(mode_err.to_string(), "Invalid mode 'q': unknown access mode");
    }

    #[test]
    fn test_open_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = HandleError::open(Path::new("/root/secret"), "w", io_err);

        assert!(err.source().is_some());
        assert_eq!(
            err.io_error().map(|e| e.kind()),
            Some(std::io::ErrorKind::PermissionDenied)
        );

        match err {
            HandleError::Open { path, mode, .. } => {
                assert_eq!(path, PathBuf::from("/root/secret"));
                assert_eq!(mode, "w");
            }
            _ => panic!("Expected Open variant"),
        }
    }

    #[test]
    fn test_invalid_mode_has_no_io_error() {
        let err = HandleError::invalid_mode("r+", "gzip streams cannot be opened for update");
        assert!(err.io_error().is_none());
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(UNKNOWN_SIZE, u64::MAX);
        assert_eq!(IO_ERROR, -1);
        assert_eq!(EOF, -1);
    }
}
