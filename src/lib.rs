//! # fhandle - One File Handle, Two Backends
//!
//! A file handle that reads, writes, seeks and queries files through the same
//! calls whether the file is stored plain or gzip-compressed. The backend is
//! chosen at compile time through a type parameter, so there is no runtime
//! branching on the file kind.
//!
//! ## Features
//!
//! - **Uniform surface**: `read`, `write`, `seek`, `tell`, `eof`, `getc`,
//!   typed value I/O and formatted writes on both backends
//! - **Plain backend**: buffered file access with a resizable staging buffer
//!   and an unbuffered bulk read path
//! - **Gzip backend**: transparent decompression via `flate2`, emulated seeking
//! - **Size probing**: O(1) for plain files, full decompression scan for gzip
//!
//! ## Architecture
//!
//! - [`error`] - Open errors and the return-value signalling conventions
//! - [`file_handler`] - Backends, the generic handle and size probing
//!
//! ```no_run
//! use fhandle::{probe_size, Gzip, GzFile, UNKNOWN_SIZE};
//!
//! # fn main() -> fhandle::Result<()> {
//! let size = probe_size::<Gzip>("data.gz");
//! if size != UNKNOWN_SIZE {
//!     let mut handle = GzFile::from_path("data.gz", "rb")?;
//!     let mut buf = vec![0u8; size as usize];
//!     assert_eq!(handle.read(&mut buf), size as isize);
//! }
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod error;
pub mod file_handler;

// Re-export commonly used types for convenience
pub use error::{HandleError, Result, EOF, IO_ERROR, UNKNOWN_SIZE};

// Public API surface for external usage
pub use file_handler::{
    probe_size, Backend, FileHandle, GzFile, Gzip, Plain, PlainFile, DEFAULT_BUFFER_SIZE,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
