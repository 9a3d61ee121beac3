//! Running checksums for the gzip trailer.
//!
//! A `Check` computes the checksum over everything fed to it and keeps track of the number
//! of bytes that went into that checksum.
//!
//! The [`flate2::Crc`] implementation is used for Crc32 with a thin wrapper. The byte count is
//! kept separately as a `u64` since the gzip trailer only stores it modulo 2^32 and the stream
//! itself has no size limit.
use flate2::Crc;

pub trait Check {
    /// Current checksum
    fn sum(&self) -> u32;

    /// Amount input to the check
    fn amount(&self) -> u64;

    /// Create a new [`Check`] Object
    fn new() -> Self
    where
        Self: Sized;

    /// Update the [`Check`] object with more bytes.
    fn update(&mut self, bytes: &[u8]);
}

/// The crc32 check implementation for Gzip
pub struct Crc32 {
    crc: Crc,
    amount: u64,
}

impl Check for Crc32 {
    #[inline]
    fn sum(&self) -> u32 {
        self.crc.sum()
    }

    #[inline]
    fn amount(&self) -> u64 {
        self.amount
    }

    #[inline]
    fn new() -> Self {
        Self {
            crc: Crc::new(),
            amount: 0,
        }
    }

    #[inline]
    fn update(&mut self, bytes: &[u8]) {
        self.amount += bytes.len() as u64;
        self.crc.update(bytes);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_crc() {
        let check = Crc32::new();
        assert_eq!(check.sum(), 0);
        assert_eq!(check.amount(), 0);
    }

    #[test]
    fn test_known_crc() {
        // Check value from the CRC-32/ISO-HDLC catalogue entry
        let mut check = Crc32::new();
        check.update(b"123456789");
        assert_eq!(check.sum(), 0xcbf4_3926);
        assert_eq!(check.amount(), 9);
    }

    #[test]
    fn test_incremental_matches_whole() {
        let input = b"The quick brown fox jumped over the moon\n".repeat(50);

        let mut whole = Crc32::new();
        whole.update(&input);

        let mut parts = Crc32::new();
        for chunk in input.chunks(7) {
            parts.update(chunk);
        }

        assert_eq!(whole.sum(), parts.sum());
        assert_eq!(whole.amount(), parts.amount());
    }
}
