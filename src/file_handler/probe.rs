//! Logical file size without an open handle.
//!
//! The two backends have very different costs here: a plain file's size is a
//! metadata lookup, while the decompressed length of a gzip stream is not
//! stored anywhere reliable and has to be found by decompressing everything.

use crate::error::UNKNOWN_SIZE;
use crate::file_handler::backend::{Backend, Stream};
use crate::file_handler::gzip::GzipStream;
use crate::file_handler::DEFAULT_BUFFER_SIZE;
use std::fs::File;
use std::path::Path;

/// Chunk size of the decompressed size scan
pub const PROBE_CHUNK_SIZE: usize = 1 << 15;

/// Logical byte length of the file at `path` as backend `K` would read it
///
/// Returns [`UNKNOWN_SIZE`] when the path cannot be opened. That value is a
/// sentinel, not a size.
///
/// # Performance
/// * `Plain`: O(1), one metadata query
/// * `Gzip`: O(n), decompresses the whole stream
pub fn probe_size<K: Backend>(path: impl AsRef<Path>) -> u64 {
    K::probe_size(path.as_ref())
}

/// Size from filesystem metadata of the opened file
pub(crate) fn metadata_size(path: &Path) -> u64 {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            log::debug!("cannot probe {}: {e}", path.display());
            return UNKNOWN_SIZE;
        }
    };
    match file.metadata() {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            log::debug!("cannot read metadata of {}: {e}", path.display());
            UNKNOWN_SIZE
        }
    }
}

/// Size found by decompressing the stream in fixed chunks
///
/// A read error ends the scan with a warning; the bytes counted so far are
/// returned.
pub(crate) fn decompressed_size(path: &Path) -> u64 {
    let mut stream = match GzipStream::open(path, "rb", DEFAULT_BUFFER_SIZE) {
        Ok(stream) => stream,
        Err(e) => {
            log::debug!("cannot probe {}: {e}", path.display());
            return UNKNOWN_SIZE;
        }
    };

    let mut chunk = vec![0u8; PROBE_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        match stream.read(&mut chunk) {
            Ok(n) => {
                total += n as u64;
                if n < chunk.len() {
                    break;
                }
            }
            Err(e) => {
                log::warn!(
                    "error reading gzip stream {} after {total} bytes: {e}",
                    path.display()
                );
                break;
            }
        }
    }

    if let Err(e) = stream.close() {
        log::debug!("error closing {} after probe: {e}", path.display());
    }
    total
}
