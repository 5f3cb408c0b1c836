//! Buffered access to uncompressed files.
//!
//! [`PlainStream`] owns a `File` and a staging buffer used in one direction at
//! a time, the way a `stdio` stream does: read-ahead is discarded (by seeking
//! back) before a write, and pending writes are flushed before a read or seek.

use crate::error::{HandleError, Result};
use crate::file_handler::mode::{Access, OpenMode};
use crate::file_handler::Stream;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Uncompressed file stream with an owned staging buffer
#[derive(Debug)]
pub struct PlainStream {
    file: File,

    /// Staging buffer. Its length is at least `capacity`; it can be longer
    /// while read-ahead carried over by a resize is still unconsumed.
    buf: Vec<u8>,

    /// Requested buffer size; 0 means unbuffered
    capacity: usize,

    /// Read cursor and fill level of buffered read-ahead
    rpos: usize,
    rfilled: usize,

    /// Bytes staged for writing
    wlen: usize,

    readable: bool,
    writable: bool,
    eof: bool,
}

impl PlainStream {
    /// Open `path` with an `fopen`-style mode string
    pub fn open(path: &Path, mode: &str, buffer_size: usize) -> Result<Self> {
        let parsed = OpenMode::parse(mode)?;
        if let Some(flag) = parsed.gzip_only_flag() {
            return Err(HandleError::invalid_mode(
                mode,
                format!("'{flag}' is only meaningful for gzip streams"),
            ));
        }

        let mut file = parsed
            .options()
            .open(path)
            .map_err(|e| HandleError::open(path, mode, e))?;

        // Append streams start at the end so offsets are stable across flushes
        if parsed.access == Access::Append {
            match file.seek(SeekFrom::End(0)) {
                Ok(_) => {}
                Err(_) if is_fifo(&file) => {}
                Err(e) => return Err(HandleError::open(path, mode, e)),
            }
        }

        Ok(Self {
            file,
            buf: vec![0; buffer_size],
            capacity: buffer_size,
            rpos: 0,
            rfilled: 0,
            wlen: 0,
            readable: parsed.readable(),
            writable: parsed.writable(),
            eof: false,
        })
    }

    /// Current staging buffer size
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn unread(&self) -> usize {
        self.rfilled - self.rpos
    }

    fn take_buffered(&mut self, out: &mut [u8]) -> usize {
        let n = self.unread().min(out.len());
        out[..n].copy_from_slice(&self.buf[self.rpos..self.rpos + n]);
        self.rpos += n;
        n
    }

    fn fill(&mut self) -> io::Result<usize> {
        if self.buf.len() != self.capacity {
            self.buf.resize(self.capacity, 0);
            self.buf.shrink_to_fit();
        }
        let n = read_retrying(&mut self.file, &mut self.buf)?;
        self.rpos = 0;
        self.rfilled = n;
        Ok(n)
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        if self.wlen > 0 {
            self.file.write_all(&self.buf[..self.wlen])?;
            self.wlen = 0;
        }
        Ok(())
    }

    /// Give back read-ahead to the OS so the next write lands at the logical position
    fn drop_read_ahead(&mut self) -> io::Result<()> {
        let unread = self.unread();
        if unread > 0 {
            self.file.seek(SeekFrom::Current(-(unread as i64)))?;
        }
        self.rpos = 0;
        self.rfilled = 0;
        Ok(())
    }

    fn ensure_readable(&self) -> io::Result<()> {
        if self.readable {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stream was not opened for reading",
            ))
        }
    }

    fn ensure_writable(&self) -> io::Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stream was not opened for writing",
            ))
        }
    }
}

impl Stream for PlainStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.ensure_readable()?;
        self.flush_pending()?;

        let mut total = 0;
        while total < out.len() {
            let step = if self.unread() > 0 {
                Ok(self.take_buffered(&mut out[total..]))
            } else if out.len() - total >= self.capacity {
                // Large requests skip the staging buffer
                read_retrying(&mut self.file, &mut out[total..])
            } else {
                self.fill().map(|_| self.take_buffered(&mut out[total..]))
            };

            match step {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => total += n,
                Err(e) if total > 0 => {
                    log::debug!("short read after {total} bytes: {e}");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    fn bulk_read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.ensure_readable()?;
        self.flush_pending()?;
        if out.is_empty() {
            return Ok(0);
        }

        let mut total = self.take_buffered(out);
        if total < out.len() {
            match read_retrying(&mut self.file, &mut out[total..]) {
                Ok(0) if total == 0 => self.eof = true,
                Ok(n) => total += n,
                Err(e) if total == 0 => return Err(e),
                Err(e) => log::debug!("short bulk read after {total} bytes: {e}"),
            }
        }
        Ok(total)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.ensure_writable()?;
        self.drop_read_ahead()?;

        if self.wlen + data.len() > self.capacity {
            self.flush_pending()?;
        }
        if data.len() >= self.capacity {
            self.file.write_all(data)?;
        } else {
            self.buf[self.wlen..self.wlen + data.len()].copy_from_slice(data);
            self.wlen += data.len();
        }
        Ok(data.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.flush_pending()?;
        let pos = match pos {
            SeekFrom::Current(offset) => offset
                .checked_sub(self.unread() as i64)
                .map(SeekFrom::Current)
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset out of range")
                })?,
            other => other,
        };
        let offset = self.file.seek(pos)?;
        self.rpos = 0;
        self.rfilled = 0;
        self.eof = false;
        Ok(offset)
    }

    fn tell(&self) -> io::Result<u64> {
        let mut file = &self.file;
        let os_offset = file.stream_position()?;
        Ok(os_offset.saturating_sub(self.unread() as u64) + self.wlen as u64)
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn getc(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn seekable(&self) -> bool {
        !is_fifo(&self.file)
    }

    /// Pending writes are flushed first. Unread read-ahead is carried into
    /// the new buffer, which stays large enough to hold it until it is consumed.
    fn resize_buffer(&mut self, size: usize) -> io::Result<()> {
        self.flush_pending()?;
        let unread = self.unread();
        let mut buf = vec![0; size.max(unread)];
        buf[..unread].copy_from_slice(&self.buf[self.rpos..self.rfilled]);
        self.buf = buf;
        self.capacity = size;
        self.rpos = 0;
        self.rfilled = unread;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_pending()?;
        self.file.flush()
    }

    fn close(mut self) -> io::Result<()> {
        let result = self.flush_pending();
        // A partial write is not retried by Drop
        self.wlen = 0;
        result
    }
}

impl Drop for PlainStream {
    fn drop(&mut self) {
        if let Err(e) = self.flush_pending() {
            log::warn!("dropping {} unwritten bytes: {e}", self.wlen);
        }
    }
}

/// FIFOs have no file offset. Unreadable metadata counts as one.
fn is_fifo(file: &File) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        match file.metadata() {
            Ok(metadata) => metadata.file_type().is_fifo(),
            Err(_) => true,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        false
    }
}

fn read_retrying(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(path: &Path, mode: &str, buffer_size: usize) -> PlainStream {
        PlainStream::open(path, mode, buffer_size).expect("open plain stream")
    }

    #[test]
    fn test_buffered_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");

        let mut writer = open(&path, "wb", 16);
        assert_eq!(writer.write(b"hello ").unwrap(), 6);
        assert_eq!(writer.write(b"buffered world").unwrap(), 14);
        // Staged bytes are not on disk until flushed
        assert!(std::fs::read(&path).unwrap().len() < 20);
        writer.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello buffered world");

        let mut reader = open(&path, "rb", 4);
        let mut out = [0u8; 20];
        assert_eq!(reader.read(&mut out).unwrap(), 20);
        assert_eq!(&out, b"hello buffered world");
        assert!(!reader.eof());
        assert_eq!(reader.read(&mut out).unwrap(), 0);
        assert!(reader.eof());
    }

    #[test]
    fn test_unbuffered_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.bin");

        let mut writer = open(&path, "w", 0);
        writer.write(b"direct").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"direct");
        drop(writer);

        let mut reader = open(&path, "r", 0);
        assert_eq!(reader.getc().unwrap(), Some(b'd'));
        assert_eq!(reader.tell().unwrap(), 1);
    }

    #[test]
    fn test_tell_accounts_for_buffers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tell.txt");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut stream = open(&path, "r+", 8);
        let mut two = [0u8; 2];
        stream.read(&mut two).unwrap();
        // The OS offset is 8 after the fill, the logical offset is 2
        assert_eq!(stream.tell().unwrap(), 2);

        stream.write(b"ab").unwrap();
        assert_eq!(stream.tell().unwrap(), 4);
        stream.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"01ab456789");
    }

    #[test]
    fn test_seek_current_skips_read_ahead() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seek.txt");
        std::fs::write(&path, b"abcdefghij").unwrap();

        let mut stream = open(&path, "r", 8);
        assert_eq!(stream.getc().unwrap(), Some(b'a'));
        assert_eq!(stream.seek(SeekFrom::Current(2)).unwrap(), 3);
        assert_eq!(stream.getc().unwrap(), Some(b'd'));
        assert_eq!(stream.seek(SeekFrom::End(-1)).unwrap(), 9);
        assert_eq!(stream.getc().unwrap(), Some(b'j'));
        assert_eq!(stream.getc().unwrap(), None);
        assert!(stream.eof());

        stream.seek(SeekFrom::Start(0)).unwrap();
        assert!(!stream.eof());
    }

    #[test]
    fn test_bulk_read_drains_staged_bytes_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bulk.txt");
        std::fs::write(&path, b"abcdefghijklmnop").unwrap();

        let mut stream = open(&path, "r", 4);
        assert_eq!(stream.getc().unwrap(), Some(b'a'));

        let mut out = [0u8; 15];
        let n = stream.bulk_read(&mut out).unwrap();
        assert_eq!(&out[..n], &b"bcdefghijklmnop"[..n]);
        assert!(n >= 3);

        let mut rest = vec![0u8; 32];
        let mut collected = out[..n].to_vec();
        loop {
            let m = stream.bulk_read(&mut rest).unwrap();
            if m == 0 {
                break;
            }
            collected.extend_from_slice(&rest[..m]);
        }
        assert_eq!(collected, b"bcdefghijklmnop");
        assert!(stream.eof());
    }

    #[test]
    fn test_resize_keeps_read_ahead() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resize.txt");
        std::fs::write(&path, b"abcdefghijklmnopqrstuvwxyz").unwrap();

        let mut stream = open(&path, "r", 16);
        assert_eq!(stream.getc().unwrap(), Some(b'a'));
        stream.resize_buffer(2).unwrap();
        assert_eq!(stream.capacity(), 2);

        let mut out = vec![0u8; 25];
        assert_eq!(stream.read(&mut out).unwrap(), 25);
        assert_eq!(out, b"bcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_resize_flushes_pending_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resize_w.txt");

        let mut stream = open(&path, "w", 64);
        stream.write(b"pending").unwrap();
        stream.resize_buffer(4).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"pending");
    }

    #[test]
    fn test_direction_checks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dir.txt");
        std::fs::write(&path, b"x").unwrap();

        let mut reader = open(&path, "r", 8);
        let err = reader.write(b"y").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        let mut writer = open(&path, "a", 8);
        let mut out = [0u8; 1];
        assert!(writer.read(&mut out).is_err());
    }

    #[test]
    fn test_append_mode_writes_at_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("append.txt");
        std::fs::write(&path, b"head").unwrap();

        let mut stream = open(&path, "ab", 8);
        stream.write(b"-tail").unwrap();
        stream.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"head-tail");
    }

    #[test]
    fn test_append_offset_is_stable_across_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("append_tell.txt");
        std::fs::write(&path, b"head").unwrap();

        let mut stream = open(&path, "a", 16);
        assert_eq!(stream.tell().unwrap(), 4);
        stream.write(b"-tail").unwrap();
        assert_eq!(stream.tell().unwrap(), 9);
        stream.flush().unwrap();
        assert_eq!(stream.tell().unwrap(), 9);
        stream.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"head-tail");
    }

    #[test]
    fn test_seek_current_out_of_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("range.txt");
        std::fs::write(&path, b"abcdef").unwrap();

        let mut stream = open(&path, "r", 8);
        assert_eq!(stream.getc().unwrap(), Some(b'a'));
        let err = stream.seek(SeekFrom::Current(i64::MIN)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        // Position is untouched
        assert_eq!(stream.getc().unwrap(), Some(b'b'));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_close_reports_error_once() {
        // Every write to /dev/full fails with ENOSPC
        let mut stream = open(Path::new("/dev/full"), "w", 16);
        assert_eq!(stream.write(b"staged").unwrap(), 6);
        assert!(stream.close().is_err());
    }

    #[test]
    fn test_rejects_gzip_only_modes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mode.txt");

        match PlainStream::open(&path, "wb9", 8) {
            Err(HandleError::InvalidMode { reason, .. }) => assert!(reason.contains("'9'")),
            other => panic!("Expected InvalidMode, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_flushes_pending_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("drop.txt");
        {
            let mut stream = open(&path, "w", 64);
            stream.write(b"unflushed").unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"unflushed");
    }

    #[test]
    fn test_regular_file_is_seekable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seekable.txt");
        std::fs::write(&path, b"x").unwrap();

        assert!(open(&path, "r", 8).seekable());
    }
}
