//! Gzip pack/unpack helper used to wrap datagrams on the wire.
//!
//! `plain_mode` is fixed at startup: when it's set, [`Compression::pack`] and
//! [`Compression::unpack`] both become the identity function and the broker
//! never touches a gzip stream.

use crate::errors::CompressionError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use std::io::{Read, Write};

/// `pack`/`unpack` each build a fresh gzip stream per call, so there's no
/// shared encoder state for concurrent callers to contend over.
pub struct Compression {
    plain_mode: bool,
}

impl Compression {
    pub fn new(plain_mode: bool) -> Self {
        Self { plain_mode }
    }

    pub fn plain_mode(&self) -> bool {
        self.plain_mode
    }

    /// Gzip-frames `data`, or returns it unchanged when `plain_mode` is set.
    pub fn pack(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if self.plain_mode {
            return Ok(data.to_vec());
        }

        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(data).map_err(CompressionError::Pack)?;
        encoder.finish().map_err(CompressionError::Pack)
    }

    /// Un-gzips `data`, or returns it unchanged when `plain_mode` is set.
    ///
    /// An unexpected-EOF error is surfaced to the caller rather than
    /// swallowed here — the ingest path is the one that knows to log and
    /// drop rather than abort (see [`CompressionError::is_unexpected_eof`]).
    pub fn unpack(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if self.plain_mode {
            return Ok(data.to_vec());
        }

        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(CompressionError::Unpack)?;
        Ok(out)
    }
}
