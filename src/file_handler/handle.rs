//! The uniform file handle.
//!
//! [`FileHandle<K>`] owns at most one open stream of backend kind `K` and
//! forwards every operation to it. Opening is the only fallible call; the
//! other calls return native signals as described in [`crate::error`].

use crate::error::{Result, EOF, IO_ERROR};
use crate::file_handler::backend::{Backend, Gzip, Plain, Stream};
use crate::file_handler::DEFAULT_BUFFER_SIZE;
use bytemuck::Pod;
use std::ffi::CStr;
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

/// Handle over uncompressed files
pub type PlainFile = FileHandle<Plain>;

/// Handle over gzip streams
pub type GzFile = FileHandle<Gzip>;

/// File handle with a backend fixed at compile time
///
/// # Lifecycle
/// A handle starts closed. [`open`](Self::open) acquires a stream, closing any
/// previous one first. [`close`](Self::close) releases it and clears the path.
/// Dropping an open handle closes it.
///
/// # Example
/// ```no_run
/// use fhandle::{GzFile, PlainFile};
///
/// # fn main() -> fhandle::Result<()> {
/// let mut out = GzFile::from_path("log.gz", "wb")?;
/// out.puts("compressed line\n");
/// out.close();
///
/// let mut input = PlainFile::from_path("notes.txt", "rb")?;
/// let mut buf = [0u8; 128];
/// let n = input.read(&mut buf);
/// if n < 0 {
///     eprintln!("read failed: {:?}", input.last_error());
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileHandle<K: Backend> {
    stream: Option<K::Stream>,
    buffer_size: usize,
    path: PathBuf,
    last_error: Option<io::Error>,
}

impl<K: Backend> FileHandle<K> {
    /// Create a closed handle with the default buffer size
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a closed handle that opens streams with `buffer_size`
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            stream: None,
            buffer_size,
            path: PathBuf::new(),
            last_error: None,
        }
    }

    /// Create a handle and open `path` with `mode`
    pub fn from_path(path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        let mut handle = Self::new();
        handle.open(path, mode)?;
        Ok(handle)
    }

    /// Whether this handle decompresses
    pub const fn is_gz() -> bool {
        K::COMPRESSED
    }

    /// Whether handles of this kind can ever be seekable
    pub const fn maybe_seekable() -> bool {
        !K::COMPRESSED
    }

    /// Open `path` with `mode`, closing the current stream first
    ///
    /// # Errors
    /// * [`HandleError::Open`](crate::HandleError::Open) when the backend cannot acquire the file
    /// * [`HandleError::InvalidMode`](crate::HandleError::InvalidMode) when `mode` is not valid for `K`
    ///
    /// The handle is closed after a failed open.
    pub fn open(&mut self, path: impl AsRef<Path>, mode: &str) -> Result<()> {
        let path = path.as_ref();
        if self.is_open() {
            self.close();
        }

        let stream = K::open(path, mode, self.buffer_size)?;
        self.stream = Some(stream);
        self.path = path.to_path_buf();
        self.last_error = None;
        log::debug!(
            "opened {} file at {} with mode '{mode}'",
            K::NAME,
            path.display()
        );
        Ok(())
    }

    /// Release the stream and clear the path
    ///
    /// Returns `0`, or [`EOF`] if flushing or finishing the stream failed.
    /// The stream is released either way. Closing a closed handle is a no-op.
    pub fn close(&mut self) -> i32 {
        let Some(stream) = self.stream.take() else {
            return 0;
        };
        let path = std::mem::take(&mut self.path);
        match stream.close() {
            Ok(()) => {
                log::debug!("closed {} file at {}", K::NAME, path.display());
                0
            }
            Err(e) => {
                log::warn!("error closing {} file at {}: {e}", K::NAME, path.display());
                self.last_error = Some(e);
                EOF
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Path of the open file; empty when closed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer size used by the current stream and by later opens
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// The error behind the most recent `-1`/[`EOF`] return
    pub fn last_error(&self) -> Option<&io::Error> {
        self.last_error.as_ref()
    }

    /// Read up to `buf.len()` bytes
    ///
    /// Returns the count read (`0` at end of stream) or `-1` on error.
    pub fn read(&mut self, buf: &mut [u8]) -> isize {
        let Some(stream) = self.stream.as_mut() else {
            return self.not_open();
        };
        let result = stream.read(buf);
        self.count(result)
    }

    /// Read the bytes of a single plain-old-data value
    ///
    /// No byte order conversion. A count below `size_of::<T>()` leaves
    /// `value` partially overwritten.
    pub fn read_value<T: Pod>(&mut self, value: &mut T) -> isize {
        self.read(bytemuck::bytes_of_mut(value))
    }

    /// Read bypassing the staging buffer where the backend has one
    ///
    /// Plain streams hand over already staged bytes and then issue one raw
    /// read on the descriptor, so the count may be short before end of
    /// stream. Gzip streams behave like [`read`](Self::read).
    pub fn bulk_read(&mut self, buf: &mut [u8]) -> isize {
        let Some(stream) = self.stream.as_mut() else {
            return self.not_open();
        };
        let result = stream.bulk_read(buf);
        self.count(result)
    }

    /// Write `buf`; returns the count written or `-1`
    pub fn write(&mut self, buf: &[u8]) -> isize {
        let Some(stream) = self.stream.as_mut() else {
            return self.not_open();
        };
        let result = stream.write(buf);
        self.count(result)
    }

    /// Write the content of a NUL-terminated string, without the terminator
    pub fn write_cstr(&mut self, s: &CStr) -> isize {
        self.write(s.to_bytes())
    }

    /// Write the bytes of a single plain-old-data value
    pub fn write_value<T: Pod>(&mut self, value: &T) -> isize {
        self.write(bytemuck::bytes_of(value))
    }

    /// Write a string through the backend's string primitive
    pub fn puts(&mut self, s: &str) -> isize {
        let Some(stream) = self.stream.as_mut() else {
            return self.not_open();
        };
        let result = stream.puts(s);
        self.count(result)
    }

    /// Formatted write, e.g. `handle.write_formatted(format_args!("{id}\t{name}\n"))`
    pub fn write_formatted(&mut self, args: fmt::Arguments<'_>) -> isize {
        let Some(stream) = self.stream.as_mut() else {
            return self.not_open();
        };
        let result = stream.write_formatted(args);
        self.count(result)
    }

    /// Reposition the stream; returns the new offset or `-1`
    pub fn seek(&mut self, pos: SeekFrom) -> i64 {
        let Some(stream) = self.stream.as_mut() else {
            return self.not_open() as i64;
        };
        let result = stream.seek(pos);
        self.offset(result)
    }

    /// Current logical offset (decompressed for gzip) or `-1`
    pub fn tell(&self) -> i64 {
        match self.stream.as_ref().map(|stream| stream.tell()) {
            Some(Ok(offset)) => i64::try_from(offset).unwrap_or(i64::MAX),
            _ => -1,
        }
    }

    /// Whether a read has reached the end of the stream
    ///
    /// Only set by a read attempt past the end, so it is not a pre-check.
    pub fn eof(&self) -> bool {
        self.stream.as_ref().map_or(false, |stream| stream.eof())
    }

    /// Whether the open stream supports random access
    ///
    /// Always false for gzip; false for a plain FIFO or a closed handle.
    pub fn seekable(&self) -> bool {
        Self::maybe_seekable() && self.stream.as_ref().map_or(false, |stream| stream.seekable())
    }

    /// Change the buffer size for the open stream and later opens
    ///
    /// Returns `0` or `-1`. See the backend stream types for what a resize
    /// does to a stream that has already moved data.
    pub fn resize_buffer(&mut self, size: usize) -> i32 {
        self.buffer_size = size;
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };
        match stream.resize_buffer(size) {
            Ok(()) => 0,
            Err(e) => {
                self.last_error = Some(e);
                -1
            }
        }
    }

    /// Next byte, or [`EOF`] at end of stream or on error
    pub fn getc(&mut self) -> i32 {
        let Some(stream) = self.stream.as_mut() else {
            return self.not_open() as i32;
        };
        match stream.getc() {
            Ok(Some(byte)) => i32::from(byte),
            Ok(None) => EOF,
            Err(e) => {
                self.last_error = Some(e);
                EOF
            }
        }
    }

    /// Push staged bytes to the OS (plain) or sync-flush the compressor (gzip)
    pub fn flush(&mut self) -> i32 {
        let Some(stream) = self.stream.as_mut() else {
            return self.not_open() as i32;
        };
        match stream.flush() {
            Ok(()) => 0,
            Err(e) => {
                self.last_error = Some(e);
                EOF
            }
        }
    }

    fn not_open(&mut self) -> isize {
        self.last_error = Some(not_open_error());
        IO_ERROR
    }

    fn count(&mut self, result: io::Result<usize>) -> isize {
        match result {
            Ok(n) => isize::try_from(n).unwrap_or(isize::MAX),
            Err(e) => {
                self.last_error = Some(e);
                IO_ERROR
            }
        }
    }

    fn offset(&mut self, result: io::Result<u64>) -> i64 {
        match result {
            Ok(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            Err(e) => {
                self.last_error = Some(e);
                -1
            }
        }
    }

    fn stream_mut(&mut self) -> io::Result<&mut K::Stream> {
        self.stream.as_mut().ok_or_else(not_open_error)
    }
}

fn not_open_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "file handle is not open")
}

impl<K: Backend> Default for FileHandle<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Backend> Drop for FileHandle<K> {
    fn drop(&mut self) {
        if self.is_open() {
            self.close();
        }
    }
}

impl<K: Backend> fmt::Debug for FileHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("backend", &K::NAME)
            .field("path", &self.path)
            .field("buffer_size", &self.buffer_size)
            .field("stream", &self.stream)
            .finish()
    }
}

/// `std::io` view of the handle, reporting real errors instead of signals
impl<K: Backend> io::Read for FileHandle<K> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream_mut()?.read(buf)
    }
}

impl<K: Backend> io::Write for FileHandle<K> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream_mut()?.flush()
    }
}

impl<K: Backend> io::Seek for FileHandle<K> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.stream_mut()?.seek(pos)
    }
}
