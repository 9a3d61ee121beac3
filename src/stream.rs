//! Single threaded, write-only gzip compression with a configurable window.
//!
//! # Examples
//!
//! ```no_run
//! use std::io::Write;
//!
//! use smallgz::{Compression, GzStream};
//!
//! // Writes to `access.log.gz`
//! let mut stream = GzStream::builder()
//!     .compression_level(Compression::new(6))
//!     .unwrap()
//!     .window_bits(12)
//!     .unwrap()
//!     .create("access.log")
//!     .unwrap();
//! stream.write_all(b"GET / 200\n").unwrap();
//! stream.close().unwrap();
//! ```
use std::fs::File;
use std::io::{self, Read, Write};
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use flate2::{Compress, Compression, FlushCompress, Status};
use tracing::{debug, warn};

use crate::check::{Check, Crc32};
use crate::header::{embedded_name, footer, gz_path, latin1_name, GzipHeader, NameWarning};
use crate::{GzError, BUFSIZE, DEFAULT_WINDOW_BITS, MAX_WINDOW_BITS, MIN_BUFSIZE, MIN_WINDOW_BITS};

/// The [`GzStream`] builder.
#[derive(Debug, Clone)]
pub struct GzStreamBuilder {
    /// The compression level of the output, see [`Compression`]. Defaults to [`Compression::best`].
    compression_level: Compression,
    /// Base two log of the deflate window size. Defaults to [`DEFAULT_WINDOW_BITS`].
    window_bits: u8,
    /// Capacity of the buffer compressed bytes are staged in. Defaults to [`BUFSIZE`].
    buffer_size: usize,
}

impl GzStreamBuilder {
    /// Create a new [`GzStreamBuilder`] object.
    pub fn new() -> Self {
        Self {
            compression_level: Compression::best(),
            window_bits: DEFAULT_WINDOW_BITS,
            buffer_size: BUFSIZE,
        }
    }

    /// Set the [`compression_level`](GzStreamBuilder.compression_level).
    ///
    /// # Errors
    /// - [`GzError::CompressionLevel`] if the level is above 9.
    pub fn compression_level(mut self, compression_level: Compression) -> Result<Self, GzError> {
        if compression_level.level() > Compression::best().level() {
            return Err(GzError::CompressionLevel(compression_level.level()));
        }
        self.compression_level = compression_level;
        Ok(self)
    }

    /// Set the [`window_bits`](GzStreamBuilder.window_bits).
    ///
    /// # Errors
    /// - [`GzError::WindowBits`] if not in [`MIN_WINDOW_BITS`]..=[`MAX_WINDOW_BITS`].
    pub fn window_bits(mut self, window_bits: u8) -> Result<Self, GzError> {
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits) {
            return Err(GzError::WindowBits(window_bits));
        }
        self.window_bits = window_bits;
        Ok(self)
    }

    /// Set the [`buffer_size`](GzStreamBuilder.buffer_size). Values below [`MIN_BUFSIZE`] are
    /// raised to it.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(MIN_BUFSIZE);
        self
    }

    /// Create the file at `path`, with `.gz` appended if it isn't already there, and write
    /// the gzip header to it.
    ///
    /// The base name of the file, minus the `.gz`, is recorded in the header when it can be
    /// encoded as Latin-1. Otherwise it is left out and the reason is available from
    /// [`GzStream::name_warning`].
    ///
    /// # Errors
    /// - [`GzError::Io`] if the file can't be created or the header can't be written.
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<GzStream<File>, GzError> {
        let path = gz_path(path.as_ref());
        let name = embedded_name(&path);
        let file = File::create(&path)?;
        self.build(file, Some(path), name)
    }

    /// Write the gzip header to `writer` and compress into it.
    ///
    /// `name` is recorded in the header as-is when it can be encoded as Latin-1.
    pub fn from_writer<W: Write>(self, writer: W, name: Option<&str>) -> Result<GzStream<W>, GzError> {
        let name = match name {
            Some(name) => latin1_name(name),
            None => Ok(None),
        };
        self.build(writer, None, name)
    }

    fn build<W: Write>(
        self,
        mut writer: W,
        path: Option<PathBuf>,
        name: Result<Option<Vec<u8>>, NameWarning>,
    ) -> Result<GzStream<W>, GzError> {
        let (name, name_warning) = match name {
            Ok(name) => (name, None),
            Err(warning) => {
                warn!(path = ?path, %warning, "omitting file name from gzip header");
                (None, Some(warning))
            }
        };

        let header = GzipHeader::new(self.compression_level).with_name(name);
        let compressor =
            Compress::new_with_window_bits(self.compression_level, false, self.window_bits);
        header.write_to(&mut writer)?;
        debug!(
            path = ?path,
            level = self.compression_level.level(),
            window_bits = self.window_bits,
            "opened gzip stream"
        );

        Ok(GzStream {
            writer: Some(writer),
            compressor,
            check: Crc32::new(),
            buffer: Vec::with_capacity(self.buffer_size),
            header,
            name_warning,
            path,
            compression_level: self.compression_level,
            window_bits: self.window_bits,
            total_out: 0,
            poisoned: false,
        })
    }
}

impl Default for GzStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A write-only stream that gzips everything written to it.
///
/// Data is compressed as it is written, nothing beyond the compressor's own state and one
/// staging buffer is held in memory. The stream must be finished with [`GzStream::close`] or
/// [`GzStream::finish`] for errors in writing the trailer to be seen. Dropping an open stream
/// finishes it and ignores any error.
pub struct GzStream<W: Write = File> {
    /// The sink, `None` once the stream is closed.
    writer: Option<W>,
    compressor: Compress,
    check: Crc32,
    buffer: Vec<u8>,
    header: GzipHeader,
    name_warning: Option<NameWarning>,
    path: Option<PathBuf>,
    compression_level: Compression,
    window_bits: u8,
    total_out: u64,
    /// Set once compressing or writing has failed, the output can no longer be trusted.
    poisoned: bool,
}

impl GzStream<File> {
    /// Create a [`GzStreamBuilder`].
    pub fn builder() -> GzStreamBuilder {
        GzStreamBuilder::new()
    }

    /// Create a file backed stream with the default configuration, see
    /// [`GzStreamBuilder::create`].
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, GzError> {
        GzStreamBuilder::new().create(path)
    }
}

impl<W: Write> GzStream<W> {
    /// Compress `data` and write whatever the compressor emits to the sink.
    ///
    /// Returns the length of `data`, not the number of compressed bytes written. Empty input
    /// is a no-op.
    ///
    /// # Errors
    /// - [`GzError::Closed`] if the stream has been closed.
    /// - [`GzError::Poisoned`] if an earlier call failed.
    /// - [`GzError::Io`] or [`GzError::DeflateCompress`] if compressing or writing failed. The
    ///   stream is poisoned afterwards.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<usize, GzError> {
        let writer = self.writer.as_mut().ok_or(GzError::Closed)?;
        if self.poisoned {
            return Err(GzError::Poisoned);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let written = match deflate_into(
            &mut self.compressor,
            &mut self.buffer,
            writer,
            data,
            FlushCompress::None,
        ) {
            Ok(written) => written,
            Err(e) => {
                self.poisoned = true;
                return Err(e);
            }
        };
        self.total_out += written;
        self.check.update(data);
        Ok(data.len())
    }

    /// Compress the UTF-8 bytes of `text`, see [`GzStream::write_bytes`].
    pub fn write_text(&mut self, text: &str) -> Result<usize, GzError> {
        self.write_bytes(text.as_bytes())
    }

    /// Sync flush the compressor and flush the sink.
    ///
    /// Everything written so far can be decompressed from the sink afterwards, at the cost of
    /// some compression ratio. Only call this when that matters.
    pub fn sync_flush(&mut self) -> Result<(), GzError> {
        let writer = self.writer.as_mut().ok_or(GzError::Closed)?;
        if self.poisoned {
            return Err(GzError::Poisoned);
        }
        let flushed = deflate_into(
            &mut self.compressor,
            &mut self.buffer,
            writer,
            &[],
            FlushCompress::Sync,
        )
        .and_then(|written| {
            writer.flush()?;
            Ok(written)
        });
        match flushed {
            Ok(written) => {
                self.total_out += written;
                Ok(())
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Finish the deflate stream, write the trailer and close the sink.
    ///
    /// Closing an already closed stream does nothing. A poisoned stream is closed without a
    /// trailer and [`GzError::Poisoned`] is returned.
    pub fn close(&mut self) -> Result<(), GzError> {
        self.finalize().map(drop)
    }

    /// Like [`GzStream::close`] but hands the sink back.
    ///
    /// # Errors
    /// - [`GzError::Closed`] if the stream was already closed.
    pub fn finish(mut self) -> Result<W, GzError> {
        self.finalize()?.ok_or(GzError::Closed)
    }

    fn finalize(&mut self) -> Result<Option<W>, GzError> {
        // Taking the sink marks the stream closed before anything else is attempted
        let mut writer = match self.writer.take() {
            Some(writer) => writer,
            None => return Ok(None),
        };
        if self.poisoned {
            warn!(path = ?self.path, "closing poisoned gzip stream without a trailer");
            return Err(GzError::Poisoned);
        }
        let written = deflate_into(
            &mut self.compressor,
            &mut self.buffer,
            &mut writer,
            &[],
            FlushCompress::Finish,
        )?;
        self.total_out += written;
        writer.write_all(&footer(&self.check))?;
        writer.flush()?;
        debug!(
            path = ?self.path,
            total_in = self.check.amount(),
            total_out = self.total_out,
            crc = self.check.sum(),
            "closed gzip stream"
        );
        Ok(Some(writer))
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Whether an earlier compression or write error left the output unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Reading is not supported.
    pub fn read_line(&mut self, _buf: &mut String) -> Result<usize, GzError> {
        Err(GzError::WriteOnly)
    }

    /// Reading is not supported.
    pub fn read_lines(&mut self) -> Result<Vec<String>, GzError> {
        Err(GzError::WriteOnly)
    }

    /// Reading is not supported.
    pub fn read_into(&mut self, _buf: &mut [u8]) -> Result<usize, GzError> {
        Err(GzError::WriteOnly)
    }

    pub fn readable(&self) -> bool {
        false
    }

    pub fn seekable(&self) -> bool {
        false
    }

    pub fn writable(&self) -> bool {
        true
    }

    pub fn is_tty(&self) -> bool {
        false
    }

    /// The resolved `.gz` path for streams made with [`GzStreamBuilder::create`].
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The Latin-1 file name recorded in the header.
    pub fn name(&self) -> Option<&[u8]> {
        self.header.name()
    }

    pub fn header(&self) -> &GzipHeader {
        &self.header
    }

    /// Why the file name was left out of the header, if it was.
    pub fn name_warning(&self) -> Option<&NameWarning> {
        self.name_warning.as_ref()
    }

    /// CRC32 of everything written so far.
    pub fn crc(&self) -> u32 {
        self.check.sum()
    }

    /// Number of uncompressed bytes written so far.
    pub fn total_in(&self) -> u64 {
        self.check.amount()
    }

    /// Number of compressed payload bytes written to the sink so far, header and trailer excluded.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    pub fn compression_level(&self) -> Compression {
        self.compression_level
    }

    pub fn window_bits(&self) -> u8 {
        self.window_bits
    }

    /// The sink, `None` once the stream is closed.
    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

#[cfg(unix)]
impl<W: Write + AsRawFd> GzStream<W> {
    /// The raw file descriptor of the sink.
    pub fn fileno(&self) -> Result<RawFd, GzError> {
        self.writer
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(GzError::Closed)
    }
}

/// Run `input` through the compressor with the given flush mode, writing all output to
/// `writer`. Returns the number of compressed bytes written.
fn deflate_into<W: Write>(
    compressor: &mut Compress,
    buffer: &mut Vec<u8>,
    writer: &mut W,
    mut input: &[u8],
    flush: FlushCompress,
) -> Result<u64, GzError> {
    let mut written = 0;
    loop {
        buffer.clear();
        let before = compressor.total_in();
        let status = compressor.compress_vec(input, buffer, flush)?;
        input = &input[(compressor.total_in() - before) as usize..];

        writer.write_all(buffer)?;
        written += buffer.len() as u64;

        let done = match flush {
            FlushCompress::Finish => status == Status::StreamEnd,
            // A full buffer means the compressor may have more to give, and zlib wants the same
            // flush mode repeated until it doesn't fill the buffer
            _ => input.is_empty() && buffer.len() < buffer.capacity(),
        };
        if done || (status == Status::BufError && buffer.is_empty()) {
            return Ok(written);
        }
    }
}

impl<W: Write> Write for GzStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.sync_flush()?)
    }
}

impl<W: Write> Read for GzStream<W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf)?)
    }
}

impl<W: Write> Drop for GzStream<W> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = self.close();
        }
    }
}
