//! Backend kinds and the stream capability set they share.
//!
//! A backend kind is a zero-sized marker type implementing [`Backend`]. It is
//! chosen through the type parameter of [`FileHandle`], so every operation is
//! dispatched statically to the backend's [`Stream`] type.
//!
//! [`FileHandle`]: crate::file_handler::FileHandle

use crate::error::Result;
use crate::file_handler::gzip::GzipStream;
use crate::file_handler::plain::PlainStream;
use crate::file_handler::probe;
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::Path;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Plain {}
    impl Sealed for super::Gzip {}
}

/// Operations every open backend stream supports.
///
/// Streams report failures as `io::Error`; [`FileHandle`] turns them into
/// native return-value signals.
///
/// [`FileHandle`]: crate::file_handler::FileHandle
pub trait Stream: Send {
    /// Read until `buf` is full or the stream ends; returns the count
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Read with as little buffering as the backend allows; may return short
    fn bulk_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data`; returns its length
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// String-write primitive
    fn puts(&mut self, s: &str) -> io::Result<usize> {
        self.write(s.as_bytes())
    }

    /// Formatted write; the text is rendered before it reaches the stream
    fn write_formatted(&mut self, args: fmt::Arguments<'_>) -> io::Result<usize> {
        match args.as_str() {
            Some(literal) => self.write(literal.as_bytes()),
            None => self.write(args.to_string().as_bytes()),
        }
    }

    /// Reposition the stream; returns the new logical offset
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Current logical offset
    fn tell(&self) -> io::Result<u64>;

    /// Whether a read has hit the end of the stream
    fn eof(&self) -> bool;

    /// Next byte, `None` at end of stream
    fn getc(&mut self) -> io::Result<Option<u8>>;

    fn seekable(&self) -> bool;

    fn resize_buffer(&mut self, size: usize) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Flush, finish and release the stream
    ///
    /// Errors cover staged bytes and stream trailers only. The descriptor is
    /// released by dropping the `File`, which gives no result, so a failure
    /// of the final `close(2)` goes unreported.
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// A compile-time I/O strategy for [`FileHandle`].
///
/// Sealed: the only kinds are [`Plain`] and [`Gzip`].
///
/// [`FileHandle`]: crate::file_handler::FileHandle
pub trait Backend: sealed::Sealed + Sized + 'static {
    /// Stream type owned by an open handle
    type Stream: Stream + fmt::Debug;

    /// Short name used in log messages
    const NAME: &'static str;

    /// Whether the on-disk bytes are compressed
    const COMPRESSED: bool;

    /// Acquire a stream for `path`
    fn open(path: &Path, mode: &str, buffer_size: usize) -> Result<Self::Stream>;

    /// Logical size of the file at `path`, or `UNKNOWN_SIZE`
    fn probe_size(path: &Path) -> u64;
}

/// Uncompressed files through a staging buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Plain;

/// Gzip-compressed streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gzip;

impl Backend for Plain {
    type Stream = PlainStream;
    const NAME: &'static str = "plain";
    const COMPRESSED: bool = false;

    fn open(path: &Path, mode: &str, buffer_size: usize) -> Result<PlainStream> {
        PlainStream::open(path, mode, buffer_size)
    }

    fn probe_size(path: &Path) -> u64 {
        probe::metadata_size(path)
    }
}

impl Backend for Gzip {
    type Stream = GzipStream;
    const NAME: &'static str = "gzip";
    const COMPRESSED: bool = true;

    fn open(path: &Path, mode: &str, buffer_size: usize) -> Result<GzipStream> {
        GzipStream::open(path, mode, buffer_size)
    }

    fn probe_size(path: &Path) -> u64 {
        probe::decompressed_size(path)
    }
}
