//! Payload compression applied before logs leave the process.
//!
//! The transport only sees the [`Compression`] trait: it hands over the raw
//! payload, gets back the bytes to send and lets the strategy mark the request
//! headers. Adding an algorithm means adding an implementation, call sites do
//! not change.

use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io::Write;

use flate2::write::GzEncoder;
use reqwest::header::{CONTENT_ENCODING, HeaderMap, HeaderValue};

pub const GZIP_CONTENT_ENCODING: &str = "gzip";

pub trait Compression: Send + Sync + Debug {
    /// Transforms the payload into the bytes that go on the wire.
    ///
    /// The returned bytes are always complete: for stream formats the trailer
    /// has been written and a reader needs nothing else to decode them.
    fn compress<'a>(&self, payload: &'a [u8]) -> Result<Cow<'a, [u8]>, CompressionError>;

    /// Marks the outgoing headers with the encoding used by [`Compression::compress`].
    fn set_header(&self, headers: &mut HeaderMap);
}

/// Sends payloads as they are.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoCompression;

impl Compression for NoCompression {
    fn compress<'a>(&self, payload: &'a [u8]) -> Result<Cow<'a, [u8]>, CompressionError> {
        Ok(Cow::Borrowed(payload))
    }

    fn set_header(&self, _headers: &mut HeaderMap) {}
}

/// Gzip stream compression at a fixed level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GzipCompression {
    level: u32,
}

impl GzipCompression {
    /// Stored blocks only, the output is still a gzip stream.
    pub const MIN_LEVEL: i32 = 0;
    pub const MAX_LEVEL: i32 = 9;
    pub const DEFAULT_LEVEL: i32 = 6;

    /// Out of range levels are clamped to the closest supported level.
    pub fn new(level: i32) -> Self {
        let clamped = level.clamp(Self::MIN_LEVEL, Self::MAX_LEVEL);
        if clamped != level {
            tracing::debug!(requested = level, level = clamped, "gzip level out of range, clamped");
        }

        GzipCompression {
            level: clamped as u32,
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for GzipCompression {
    fn default() -> Self {
        GzipCompression::new(Self::DEFAULT_LEVEL)
    }
}

impl Compression for GzipCompression {
    fn compress<'a>(&self, payload: &'a [u8]) -> Result<Cow<'a, [u8]>, CompressionError> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(payload.len() / 2 + 32),
            flate2::Compression::new(self.level),
        );

        encoder.write_all(payload).map_err(CompressionError::Write)?;
        encoder.flush().map_err(CompressionError::Flush)?;
        let compressed = encoder.finish().map_err(CompressionError::Finish)?;

        Ok(Cow::Owned(compressed))
    }

    fn set_header(&self, headers: &mut HeaderMap) {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(GZIP_CONTENT_ENCODING));
    }
}

#[derive(Debug)]
pub enum CompressionError {
    Write(std::io::Error),
    Flush(std::io::Error),
    Finish(std::io::Error),
}

impl Display for CompressionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionError::Write(e) => write!(f, "failed to write payload to compressor: {}", e),
            CompressionError::Flush(e) => write!(f, "failed to flush compressor: {}", e),
            CompressionError::Finish(e) => write!(f, "failed to finalize compressed stream: {}", e),
        }
    }
}

impl Error for CompressionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CompressionError::Write(e) | CompressionError::Flush(e) | CompressionError::Finish(e) => Some(e),
        }
    }
}
