//! Streaming gzip compression with a small deflate window.
//!
//! This crate provides [`GzStream`], a write-only implementation of [`std::io::Write`] that
//! deflates everything written to it and frames the result as a single gzip member. Unlike
//! [`flate2::write::GzEncoder`] the deflate window is configurable, and defaults to 1 KiB
//! (10 window bits) instead of 32 KiB. Lower window sizes trade compression ratio for the
//! memory needed by the compressor and by whoever inflates the output.
//!
//! The gzip header and trailer are written by hand around a raw deflate stream, since the
//! zlib gzip wrapper always assumes the default window.
//!
//! # Examples
//!
//! ```
//! use std::io::{Read, Write};
//!
//! use flate2::read::GzDecoder;
//! use smallgz::GzStream;
//!
//! let mut stream = GzStream::builder().from_writer(vec![], Some("lines.txt")).unwrap();
//! stream.write_all(b"This is a first test line\n").unwrap();
//! stream.write_all(b"This is a second test line\n").unwrap();
//! let compressed = stream.finish().unwrap();
//!
//! let mut decoded = String::new();
//! GzDecoder::new(&compressed[..]).read_to_string(&mut decoded).unwrap();
//! assert_eq!(decoded, "This is a first test line\nThis is a second test line\n");
//! ```
use std::io;

use thiserror::Error;

pub use flate2::Compression;

pub use crate::header::{GzipHeader, NameWarning};
pub use crate::stream::{GzStream, GzStreamBuilder};

pub mod check;
pub mod header;
pub mod stream;

#[cfg(not(feature = "any_zlib"))]
compile_error!("smallgz needs a zlib backend for flate2, enable one of the `deflate_zlib*` features");

/// 128 KB default size of the buffer compressed bytes are staged in.
pub const BUFSIZE: usize = 64 * (1 << 10) * 2;

/// Smallest staging buffer that will be used, regardless of what was requested.
pub const MIN_BUFSIZE: usize = 64;

/// 1 KB window, the default for [`GzStream`].
pub const DEFAULT_WINDOW_BITS: u8 = 10;

/// Smallest window zlib will produce for raw deflate.
pub const MIN_WINDOW_BITS: u8 = 9;

/// 32 KB window, the standard gzip window.
pub const MAX_WINDOW_BITS: u8 = 15;

#[derive(Error, Debug)]
pub enum GzError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    DeflateCompress(#[from] flate2::CompressError),
    #[error("I/O operation on closed stream")]
    Closed,
    #[error("Cannot read write-only stream")]
    WriteOnly,
    #[error("Stream is unusable after an earlier compression or write error")]
    Poisoned,
    #[error("Invalid compression level: {0}, must be at most 9")]
    CompressionLevel(u32),
    #[error("Invalid window bits: {0}, must be in {}..={}", MIN_WINDOW_BITS, MAX_WINDOW_BITS)]
    WindowBits(u8),
}

impl From<GzError> for io::Error {
    fn from(err: GzError) -> Self {
        match err {
            GzError::Io(e) => e,
            GzError::WriteOnly => io::Error::new(io::ErrorKind::Unsupported, err),
            GzError::CompressionLevel(_) | GzError::WindowBits(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            GzError::Closed | GzError::Poisoned | GzError::DeflateCompress(_) => {
                io::Error::new(io::ErrorKind::Other, err)
            }
        }
    }
}
