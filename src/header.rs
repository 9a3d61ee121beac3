//! Gzip member header and trailer.
//!
//! The header always records deflate compression, an unknown OS and a modification time of 0,
//! so the same name and compression level produce the same bytes on every run. The original
//! file name is embedded when it can be represented in Latin-1, as RFC 1952 requires.
use std::convert::TryFrom;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use flate2::Compression;
use thiserror::Error;

use crate::check::Check;

/// Gzip magic bytes.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression method: deflate.
pub const CM_DEFLATE: u8 = 8;

/// Flag set when an original file name follows the fixed header.
pub const FNAME: u8 = 0x08;

/// Operating system: unknown.
pub const OS_UNKNOWN: u8 = 255;

/// Suffix every output path ends with.
pub const GZ_SUFFIX: &str = ".gz";

/// Size of the fixed part of the header.
pub const HEADER_SIZE: usize = 10;

/// Size of the CRC32 + ISIZE trailer.
pub const FOOTER_SIZE: usize = 8;

/// Why a file name was left out of the header.
///
/// Omitting the name still produces a valid gzip member, so this is reported alongside a
/// successfully created stream rather than as an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameWarning {
    #[error("file name {0:?} is not representable in Latin-1")]
    NotLatin1(String),
    #[error("file name {0:?} is not valid unicode")]
    NotUnicode(OsString),
}

/// The header of a single gzip member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipHeader {
    name: Option<Vec<u8>>,
    extra_flags: u8,
}

impl GzipHeader {
    /// Create a header without a file name.
    pub fn new(compression_level: Compression) -> Self {
        Self {
            name: None,
            extra_flags: extra_flags(compression_level),
        }
    }

    /// Set the Latin-1 encoded file name. An empty name is treated as no name.
    pub fn with_name(mut self, name: Option<Vec<u8>>) -> Self {
        self.name = name.filter(|n| !n.is_empty());
        self
    }

    /// The embedded file name, without its nul terminator.
    pub fn name(&self) -> Option<&[u8]> {
        self.name.as_deref()
    }

    pub fn flags(&self) -> u8 {
        if self.name.is_some() {
            FNAME
        } else {
            0
        }
    }

    pub fn extra_flags(&self) -> u8 {
        self.extra_flags
    }

    /// Number of bytes [`GzipHeader::write_to`] will write.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.name.as_ref().map_or(0, |n| n.len() + 1)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&GZIP_MAGIC)?;
        writer.write_u8(CM_DEFLATE)?;
        writer.write_u8(self.flags())?;
        writer.write_u32::<LittleEndian>(0)?; // mtime
        writer.write_u8(self.extra_flags)?;
        writer.write_u8(OS_UNKNOWN)?;
        if let Some(name) = &self.name {
            writer.write_all(name)?;
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

/// Compression level hint for the XFL byte.
///
/// Only the exact maximum and fastest levels get a hint.
pub fn extra_flags(compression_level: Compression) -> u8 {
    match compression_level.level() {
        9 => 2,
        1 => 4,
        _ => 0,
    }
}

/// Build the trailer: the CRC32 then the input size modulo 2^32, both little-endian.
pub fn footer<C: Check>(check: &C) -> [u8; FOOTER_SIZE] {
    let mut footer = [0; FOOTER_SIZE];
    LittleEndian::write_u32(&mut footer[..4], check.sum());
    LittleEndian::write_u32(&mut footer[4..], (check.amount() & 0xffff_ffff) as u32);
    footer
}

/// Append [`GZ_SUFFIX`] to `path` unless it already ends with it.
pub fn gz_path(path: &Path) -> PathBuf {
    if path.to_string_lossy().ends_with(GZ_SUFFIX) {
        return path.to_path_buf();
    }
    let mut with_suffix = path.as_os_str().to_os_string();
    with_suffix.push(GZ_SUFFIX);
    PathBuf::from(with_suffix)
}

/// The name to embed for an output path that ends in [`GZ_SUFFIX`]: the base name with the
/// suffix stripped, Latin-1 encoded.
pub fn embedded_name(path: &Path) -> Result<Option<Vec<u8>>, NameWarning> {
    let base = match path.file_name() {
        Some(base) => base,
        None => return Ok(None),
    };
    let base = base
        .to_str()
        .ok_or_else(|| NameWarning::NotUnicode(base.to_os_string()))?;
    latin1_name(base.strip_suffix(GZ_SUFFIX).unwrap_or(base))
}

/// Latin-1 encode `name`. Empty names encode to `None`.
pub fn latin1_name(name: &str) -> Result<Option<Vec<u8>>, NameWarning> {
    if name.is_empty() {
        return Ok(None);
    }
    name.chars()
        .map(u8::try_from)
        .collect::<Result<Vec<u8>, _>>()
        .map(Some)
        .map_err(|_| NameWarning::NotLatin1(name.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    struct HugeCheck;

    impl Check for HugeCheck {
        fn sum(&self) -> u32 {
            0xdead_beef
        }

        fn amount(&self) -> u64 {
            (1 << 32) + 5
        }

        fn new() -> Self {
            HugeCheck
        }

        fn update(&mut self, _bytes: &[u8]) {}
    }

    fn to_bytes(header: &GzipHeader) -> Vec<u8> {
        let mut bytes = vec![];
        header.write_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_header_without_name() {
        let header = GzipHeader::new(Compression::best());
        let bytes = to_bytes(&header);
        assert_eq!(bytes, [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x02, 0xff]);
        assert_eq!(bytes.len(), header.encoded_len());
    }

    #[test]
    fn test_header_with_name() {
        let header = GzipHeader::new(Compression::new(6)).with_name(Some(b"notes.txt".to_vec()));
        let bytes = to_bytes(&header);
        assert_eq!(&bytes[..10], &[0x1f, 0x8b, 0x08, 0x08, 0, 0, 0, 0, 0x00, 0xff]);
        assert_eq!(&bytes[10..], b"notes.txt\0");
        assert_eq!(bytes.len(), header.encoded_len());
    }

    #[test]
    fn test_empty_name_is_omitted() {
        let header = GzipHeader::new(Compression::fast()).with_name(Some(vec![]));
        assert_eq!(header.flags(), 0);
        assert_eq!(header.name(), None);
        assert_eq!(to_bytes(&header).len(), HEADER_SIZE);
    }

    #[test]
    fn test_extra_flags() {
        assert_eq!(extra_flags(Compression::best()), 2);
        assert_eq!(extra_flags(Compression::fast()), 4);
        assert_eq!(extra_flags(Compression::new(6)), 0);
        assert_eq!(extra_flags(Compression::none()), 0);
    }

    #[test]
    fn test_footer_truncates_size() {
        let footer = footer(&HugeCheck::new());
        assert_eq!(footer, [0xef, 0xbe, 0xad, 0xde, 5, 0, 0, 0]);
    }

    #[test]
    fn test_gz_path() {
        assert_eq!(gz_path(Path::new("a")), PathBuf::from("a.gz"));
        assert_eq!(gz_path(Path::new("a.gz")), PathBuf::from("a.gz"));
        assert_eq!(gz_path(Path::new("dir/a.tar")), PathBuf::from("dir/a.tar.gz"));
        assert_eq!(gz_path(Path::new("a.gzip")), PathBuf::from("a.gzip.gz"));
    }

    #[test]
    fn test_embedded_name() {
        assert_eq!(
            embedded_name(Path::new("some/dir/data.csv.gz")),
            Ok(Some(b"data.csv".to_vec()))
        );
        assert_eq!(embedded_name(Path::new(".gz")), Ok(None));
    }

    #[test]
    fn test_latin1_name() {
        assert_eq!(latin1_name("café"), Ok(Some(vec![b'c', b'a', b'f', 0xe9])));
        assert_eq!(latin1_name(""), Ok(None));
        assert_eq!(
            latin1_name("snow\u{2603}"),
            Err(NameWarning::NotLatin1("snow\u{2603}".to_string()))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_name() {
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(std::ffi::OsStr::from_bytes(b"bad\xff.gz"));
        assert!(matches!(
            embedded_name(path),
            Err(NameWarning::NotUnicode(_))
        ));
    }
}
