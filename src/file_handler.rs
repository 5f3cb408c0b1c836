//! File handle abstraction over plain and gzip-compressed files.
//!
//! This module provides [`FileHandle`], a single-file handle whose backend is
//! a type parameter, and [`probe_size`], which measures a file the way a
//! backend would read it.

pub mod backend;
pub mod compression;
pub mod gzip;
pub mod handle;
pub mod mode;
pub mod plain;
pub mod probe;

pub use backend::{Backend, Gzip, Plain, Stream};
pub use compression::{detect_compression, CompressionType};
pub use gzip::GzipStream;
pub use handle::{FileHandle, GzFile, PlainFile};
pub use mode::{Access, OpenMode};
pub use plain::PlainStream;
pub use probe::probe_size;

/// Buffer size used by handles that were not given one (`BUFSIZ` on glibc)
pub const DEFAULT_BUFFER_SIZE: usize = 8192;
