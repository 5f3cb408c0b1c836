//! Gzip stream access on top of `flate2`.
//!
//! A [`GzipStream`] is opened in one direction. Reading is transparent: files
//! without the gzip magic number are passed through unchanged, and
//! concatenated gzip members are decoded as one stream. Bytes after a member
//! that do not start another gzip header (padding, zero tails) end the
//! stream and are ignored. Writing compresses
//! into a single gzip member per open, or passes bytes through for the `T`
//! mode flag.
//!
//! Offsets are always in decompressed bytes. Seeking is emulated: forward by
//! decompressing and discarding, backward (reading only) by rewinding to the
//! start of the file.

use crate::error::{HandleError, Result};
use crate::file_handler::compression::{detect_by_magic, CompressionType};
use crate::file_handler::mode::{Access, OpenMode};
use crate::file_handler::Stream;
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Smallest buffer a gzip stream will use
pub const MIN_BUFFER_SIZE: usize = 8;

const SKIP_CHUNK: usize = 8192;

/// Decompressed input
enum Source {
    /// Current gzip member; the next one is started by `next_member`
    Gzip(GzDecoder<BufReader<File>>),
    Raw(BufReader<File>),
}

impl Source {
    /// Wrap `file` and decide from its first bytes whether to decompress
    fn detect(file: File, capacity: usize) -> io::Result<Self> {
        let mut reader = BufReader::with_capacity(capacity, file);
        let head = reader.fill_buf()?;
        if detect_by_magic(head) == Some(CompressionType::Gzip) {
            Ok(Self::Gzip(GzDecoder::new(reader)))
        } else {
            Ok(Self::Raw(reader))
        }
    }

    /// After a member ended: whether another gzip member follows
    fn member_follows(&mut self) -> io::Result<bool> {
        let Self::Gzip(decoder) = self else {
            return Ok(false);
        };
        let head = decoder.get_mut().fill_buf()?;
        if detect_by_magic(head) == Some(CompressionType::Gzip) {
            return Ok(true);
        }
        if !head.is_empty() {
            log::debug!("ignoring trailing bytes after the last gzip member");
        }
        Ok(false)
    }

    fn next_member(self) -> Self {
        match self {
            Self::Gzip(decoder) => Self::Gzip(GzDecoder::new(decoder.into_inner())),
            raw => raw,
        }
    }

    fn into_file(self) -> File {
        match self {
            Self::Gzip(decoder) => decoder.into_inner().into_inner(),
            Self::Raw(reader) => reader.into_inner(),
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(decoder) => decoder.read(buf),
            Self::Raw(reader) => reader.read(buf),
        }
    }
}

/// Compressed output
enum Sink {
    Gzip(GzEncoder<File>),
    Raw(File),
}

impl Sink {
    /// Write the gzip trailer and hand back the file
    fn finish(self) -> io::Result<File> {
        match self {
            Self::Gzip(encoder) => encoder.finish(),
            Self::Raw(file) => Ok(file),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(encoder) => encoder.write(buf),
            Self::Raw(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.flush(),
            Self::Raw(file) => file.flush(),
        }
    }
}

/// Outcome of one decoder read inside `read`
enum Step {
    Data(usize),
    NextMember,
    End,
}

enum State {
    Reading(Source),
    Writing(BufWriter<Sink>),
    /// Left behind when a rewind failed half way; every operation errors
    Detached,
}

/// Gzip-compressed file stream
pub struct GzipStream {
    state: State,
    /// Logical offset in decompressed bytes
    pos: u64,
    eof: bool,
    buffer_size: usize,
    /// Whether any data moved since the stream was opened
    transferred: bool,
}

impl std::fmt::Debug for GzipStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Reading(Source::Gzip(_)) => "reading gzip",
            State::Reading(Source::Raw(_)) => "reading raw",
            State::Writing(_) => "writing",
            State::Detached => "detached",
        };
        f.debug_struct("GzipStream")
            .field("state", &state)
            .field("pos", &self.pos)
            .field("eof", &self.eof)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl GzipStream {
    /// Open `path` with a `gzopen`-style mode string
    pub fn open(path: &Path, mode: &str, buffer_size: usize) -> Result<Self> {
        let parsed = OpenMode::parse(mode)?;
        if parsed.update {
            return Err(HandleError::invalid_mode(
                mode,
                "gzip streams cannot be opened for update",
            ));
        }
        if let Some(strategy) = parsed.strategy {
            log::debug!("ignoring deflate strategy {strategy:?} for {}", path.display());
        }

        let capacity = buffer_size.max(MIN_BUFFER_SIZE);
        let file = parsed
            .options()
            .open(path)
            .map_err(|e| HandleError::open(path, mode, e))?;

        let state = match parsed.access {
            Access::Read => State::Reading(
                Source::detect(file, capacity).map_err(|e| HandleError::open(path, mode, e))?,
            ),
            Access::Write | Access::Append => {
                let sink = if parsed.transparent {
                    Sink::Raw(file)
                } else {
                    let level = parsed.level.map(Compression::new).unwrap_or_default();
                    Sink::Gzip(GzEncoder::new(file, level))
                };
                State::Writing(BufWriter::with_capacity(capacity, sink))
            }
        };

        Ok(Self {
            state,
            pos: 0,
            eof: false,
            buffer_size: capacity,
            transferred: false,
        })
    }

    /// Buffer size in effect, after applying the floor
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Whether the input is passed through without decompression
    pub fn is_transparent(&self) -> bool {
        matches!(self.state, State::Reading(Source::Raw(_)))
    }

    fn source_mut(&mut self) -> io::Result<&mut Source> {
        match &mut self.state {
            State::Reading(source) => Ok(source),
            State::Writing(_) => Err(wrong_direction("read from")),
            State::Detached => Err(detached()),
        }
    }

    fn next_member(&mut self) {
        self.state = match std::mem::replace(&mut self.state, State::Detached) {
            State::Reading(source) => State::Reading(source.next_member()),
            other => other,
        };
    }

    /// Reopen the input from the first byte with the current buffer size
    fn rewind(&mut self) -> io::Result<()> {
        match std::mem::replace(&mut self.state, State::Detached) {
            State::Reading(source) => {
                let mut file = source.into_file();
                file.seek(SeekFrom::Start(0))?;
                self.state = State::Reading(Source::detect(file, self.buffer_size)?);
                self.pos = 0;
                Ok(())
            }
            other => {
                self.state = other;
                Err(wrong_direction("rewind"))
            }
        }
    }

    /// Decompress and discard up to `target`; stops early at end of stream
    fn skip_to(&mut self, target: u64) -> io::Result<()> {
        let mut scratch = [0u8; SKIP_CHUNK];
        while self.pos < target {
            let want = (target - self.pos).min(SKIP_CHUNK as u64) as usize;
            if self.read(&mut scratch[..want])? < want {
                break;
            }
        }
        Ok(())
    }
}

impl Stream for GzipStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.source_mut()?;
        self.transferred = true;

        let mut total = 0;
        while total < out.len() {
            let source = self.source_mut()?;
            let step = match source.read(&mut out[total..]) {
                Ok(0) => source.member_follows().map(|more| {
                    if more {
                        Step::NextMember
                    } else {
                        Step::End
                    }
                }),
                Ok(n) => Ok(Step::Data(n)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
            match step {
                Ok(Step::Data(n)) => total += n,
                Ok(Step::NextMember) => self.next_member(),
                Ok(Step::End) => {
                    self.eof = true;
                    break;
                }
                Err(e) if total > 0 => {
                    log::debug!("short gzip read after {total} bytes: {e}");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        self.pos += total as u64;
        Ok(total)
    }

    fn bulk_read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.read(out)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let writer = match &mut self.state {
            State::Writing(writer) => writer,
            State::Reading(_) => return Err(wrong_direction("write to")),
            State::Detached => return Err(detached()),
        };
        self.transferred = true;
        writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(data.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "seek to a negative offset",
                )
            })?,
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "gzip streams cannot seek relative to the end",
                ))
            }
        };

        if let State::Writing(writer) = &mut self.state {
            if target < self.pos {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "gzip output cannot seek backwards",
                ));
            }
            io::copy(&mut io::repeat(0).take(target - self.pos), writer)?;
            self.transferred = true;
            self.pos = target;
            self.eof = false;
            return Ok(self.pos);
        }
        if matches!(self.state, State::Detached) {
            return Err(detached());
        }

        self.eof = false;
        if target < self.pos {
            self.rewind()?;
        }
        self.skip_to(target)?;
        Ok(self.pos)
    }

    fn tell(&self) -> io::Result<u64> {
        match self.state {
            State::Detached => Err(detached()),
            _ => Ok(self.pos),
        }
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
        false
    }

    /// Writers flush staged bytes into the compressor and get a new staging
    /// buffer. Readers that have not delivered data yet are reopened with the
    /// new input buffer; later resizes only apply to the next open.
    fn resize_buffer(&mut self, size: usize) -> io::Result<()> {
        let capacity = size.max(MIN_BUFFER_SIZE);
        self.buffer_size = capacity;

        match std::mem::replace(&mut self.state, State::Detached) {
            State::Writing(writer) => match writer.into_inner() {
                Ok(sink) => {
                    self.state = State::Writing(BufWriter::with_capacity(capacity, sink));
                    Ok(())
                }
                Err(e) => {
                    let (error, writer) = e.into_parts();
                    self.state = State::Writing(writer);
                    Err(error)
                }
            },
            State::Reading(source) if !self.transferred => {
                let mut file = source.into_file();
                file.seek(SeekFrom::Start(0))?;
                self.state = State::Reading(Source::detect(file, capacity)?);
                Ok(())
            }
            other => {
                log::debug!("gzip input buffer resize to {capacity} deferred to the next open");
                self.state = other;
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            State::Writing(writer) => writer.flush(),
            State::Reading(_) => Ok(()),
            State::Detached => Err(detached()),
        }
    }

    fn close(self) -> io::Result<()> {
        match self.state {
            State::Writing(writer) => {
                let sink = writer.into_inner().map_err(|e| e.into_error())?;
                sink.finish()?;
                Ok(())
            }
            State::Reading(_) | State::Detached => Ok(()),
        }
    }
}

fn wrong_direction(op: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot {op} a gzip stream opened in the other direction"),
    )
}

fn detached() -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        "gzip stream lost its file during a failed rewind",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::MultiGzDecoder as ReadDecoder;
    use tempfile::TempDir;

    fn open(path: &Path, mode: &str) -> GzipStream {
        GzipStream::open(path, mode, 64).expect("open gzip stream")
    }

    fn decompress(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        ReadDecoder::new(File::open(path).unwrap())
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    fn write_gz(path: &Path, content: &[u8]) {
        let mut stream = open(path, "wb");
        assert_eq!(stream.write(content).unwrap(), content.len());
        stream.close().unwrap();
    }

    #[test]
    fn test_write_produces_gzip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.gz");
        write_gz(&path, b"compressed line\n");

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        assert_eq!(decompress(&path), b"compressed line\n");
    }

    #[test]
    fn test_read_decompresses_and_tracks_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.gz");
        write_gz(&path, b"0123456789");

        let mut stream = open(&path, "rb");
        assert!(!stream.is_transparent());
        let mut out = [0u8; 4];
        assert_eq!(stream.read(&mut out).unwrap(), 4);
        assert_eq!(&out, b"0123");
        assert_eq!(stream.tell().unwrap(), 4);

        let mut rest = [0u8; 16];
        assert_eq!(stream.read(&mut rest).unwrap(), 6);
        assert_eq!(&rest[..6], b"456789");
        assert!(stream.eof());
        assert_eq!(stream.getc().unwrap(), None);
    }

    #[test]
    fn test_transparent_read_of_plain_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, b"not gzip at all").unwrap();

        let mut stream = open(&path, "r");
        assert!(stream.is_transparent());
        let mut out = vec![0u8; 64];
        let n = stream.read(&mut out).unwrap();
        assert_eq!(&out[..n], b"not gzip at all");
    }

    #[test]
    fn test_empty_file_reads_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let mut stream = open(&path, "r");
        assert_eq!(stream.getc().unwrap(), None);
        assert!(stream.eof());
    }

    #[test]
    fn test_transparent_write_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain_out");

        let mut stream = open(&path, "wT");
        stream.write(b"as is").unwrap();
        stream.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"as is");
    }

    #[test]
    fn test_append_adds_member() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("multi.gz");
        write_gz(&path, b"first ");

        let mut stream = open(&path, "ab");
        stream.write(b"second").unwrap();
        stream.close().unwrap();

        let mut reader = open(&path, "rb");
        let mut out = vec![0u8; 32];
        let n = reader.read(&mut out).unwrap();
        assert_eq!(&out[..n], b"first second");
    }

    #[test]
    fn test_compression_level_from_mode() {
        let dir = TempDir::new().unwrap();
        let stored = dir.path().join("stored.gz");
        let best = dir.path().join("best.gz");
        let content = b"abcabcabc".repeat(1000);

        let mut stream = open(&stored, "wb0");
        stream.write(&content).unwrap();
        stream.close().unwrap();

        let mut stream = open(&best, "wb9");
        stream.write(&content).unwrap();
        stream.close().unwrap();

        let stored_len = std::fs::metadata(&stored).unwrap().len();
        let best_len = std::fs::metadata(&best).unwrap().len();
        assert!(best_len < stored_len);
        assert_eq!(decompress(&stored), content);
        assert_eq!(decompress(&best), content);
    }

    #[test]
    fn test_seek_forward_and_backward_on_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seek.gz");
        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        write_gz(&path, &content);

        let mut stream = open(&path, "rb");
        assert_eq!(stream.seek(SeekFrom::Start(15_000)).unwrap(), 15_000);
        assert_eq!(stream.getc().unwrap(), Some(content[15_000]));

        assert_eq!(stream.seek(SeekFrom::Current(-10_001)).unwrap(), 5_000);
        assert_eq!(stream.getc().unwrap(), Some(content[5_000]));

        assert_eq!(stream.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert_eq!(stream.getc().unwrap(), Some(content[0]));
    }

    #[test]
    fn test_seek_past_end_stops_at_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.gz");
        write_gz(&path, b"tiny");

        let mut stream = open(&path, "rb");
        assert_eq!(stream.seek(SeekFrom::Start(100)).unwrap(), 4);
        assert!(stream.eof());
    }

    #[test]
    fn test_seek_restrictions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("restrict.gz");
        write_gz(&path, b"data");

        let mut reader = open(&path, "rb");
        let err = reader.seek(SeekFrom::End(0)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        let err = reader.seek(SeekFrom::Current(-1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let mut writer = open(&path, "wb");
        writer.write(b"abc").unwrap();
        let err = writer.seek(SeekFrom::Start(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_forward_seek_on_write_pads_with_zeros() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pad.gz");

        let mut writer = open(&path, "wb");
        writer.write(b"ab").unwrap();
        assert_eq!(writer.seek(SeekFrom::Current(3)).unwrap(), 5);
        writer.write(b"cd").unwrap();
        assert_eq!(writer.tell().unwrap(), 7);
        writer.close().unwrap();

        assert_eq!(decompress(&path), b"ab\0\0\0cd");
    }

    #[test]
    fn test_update_mode_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.gz");

        match GzipStream::open(&path, "r+", 64) {
            Err(HandleError::InvalidMode { reason, .. }) => {
                assert!(reason.contains("update"))
            }
            other => panic!("Expected InvalidMode, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let result = GzipStream::open(Path::new("/this/file/does/not/exist.gz"), "rb", 64);
        assert!(matches!(result, Err(HandleError::Open { .. })));
    }

    #[test]
    fn test_resize_buffer_before_first_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resize.gz");
        write_gz(&path, b"resized input");

        let mut stream = open(&path, "rb");
        stream.resize_buffer(1).unwrap();
        assert_eq!(stream.buffer_size(), MIN_BUFFER_SIZE);

        let mut out = vec![0u8; 32];
        let n = stream.read(&mut out).unwrap();
        assert_eq!(&out[..n], b"resized input");

        // After data moved the new size only applies to the next open
        stream.resize_buffer(4096).unwrap();
        assert_eq!(stream.buffer_size(), 4096);
        assert!(stream.eof());
    }

    #[test]
    fn test_resize_buffer_while_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resize_w.gz");

        let mut stream = open(&path, "wb");
        stream.write(b"before ").unwrap();
        stream.resize_buffer(16).unwrap();
        stream.write(b"after").unwrap();
        stream.close().unwrap();

        assert_eq!(decompress(&path), b"before after");
    }

    #[test]
    fn test_zero_padding_after_member_ends_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("padded.gz");
        write_gz(&path, &[b'x'; 100]);
        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(&[0u8; 512]);
        std::fs::write(&path, &raw).unwrap();

        let mut stream = open(&path, "rb");
        let mut chunk = [0u8; 64];
        assert_eq!(stream.read(&mut chunk).unwrap(), 64);
        assert_eq!(stream.read(&mut chunk).unwrap(), 36);
        assert!(stream.eof());
        assert_eq!(stream.read(&mut chunk).unwrap(), 0);
        assert_eq!(stream.tell().unwrap(), 100);
    }

    #[test]
    fn test_members_then_trailing_garbage() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.gz");
        let second = dir.path().join("second.gz");
        write_gz(&first, b"first ");
        write_gz(&second, b"second");

        let path = dir.path().join("joined.gz");
        let mut raw = std::fs::read(&first).unwrap();
        raw.extend(std::fs::read(&second).unwrap());
        raw.extend_from_slice(b"not a header");
        std::fs::write(&path, &raw).unwrap();

        let mut stream = open(&path, "rb");
        let mut out = vec![0u8; 64];
        let n = stream.read(&mut out).unwrap();
        assert_eq!(&out[..n], b"first second");
        assert!(stream.eof());

        // Rewinding starts again from the first member
        assert_eq!(stream.seek(SeekFrom::Start(6)).unwrap(), 6);
        assert_eq!(stream.getc().unwrap(), Some(b's'));
    }

    #[test]
    fn test_not_seekable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ns.gz");
        write_gz(&path, b"x");
        assert!(!open(&path, "rb").seekable());
    }
}
