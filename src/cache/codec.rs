//! Encoding pipeline for the persistent store file.
//!
//! The encoding is chosen from the store file name:
//! - `*.gz`  → compact JSON, gzip compressed
//! - `*.zst` → compact JSON, zstd compressed
//! - anything else → indented JSON

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzipLevel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression stream failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk encoding of the store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEncoding {
    /// Human-readable, indented JSON.
    Json,
    /// Gzip-compressed compact JSON.
    Gzip,
    /// Zstd-compressed compact JSON.
    Zstd,
}

impl StoreEncoding {
    /// Pick the encoding from the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => StoreEncoding::Gzip,
            Some("zst") | Some("zstd") => StoreEncoding::Zstd,
            _ => StoreEncoding::Json,
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, StoreEncoding::Json)
    }
}

impl std::fmt::Display for StoreEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreEncoding::Json => write!(f, "json"),
            StoreEncoding::Gzip => write!(f, "json+gzip"),
            StoreEncoding::Zstd => write!(f, "json+zstd"),
        }
    }
}

/// Serializes values to and from the configured store encoding.
#[derive(Debug, Clone)]
pub struct Codec {
    encoding: StoreEncoding,
    zstd_level: i32,
}

impl Codec {
    pub fn new(encoding: StoreEncoding, zstd_level: i32) -> Self {
        Self {
            encoding,
            zstd_level,
        }
    }

    /// Codec for a store file, encoding inferred from its name.
    pub fn for_path(path: &Path, zstd_level: i32) -> Self {
        Self::new(StoreEncoding::from_path(path), zstd_level)
    }

    pub fn encoding(&self) -> StoreEncoding {
        self.encoding
    }

    /// Encode a value into the bytes written to disk.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self.encoding {
            StoreEncoding::Json => Ok(serde_json::to_vec_pretty(value)?),
            StoreEncoding::Gzip => {
                let json = serde_json::to_vec(value)?;
                self.gzip_compress(&json)
            }
            StoreEncoding::Zstd => {
                let json = serde_json::to_vec(value)?;
                self.zstd_compress(&json)
            }
        }
    }

    /// Decode bytes read from disk.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        let value = match self.encoding {
            StoreEncoding::Json => serde_json::from_slice(data)?,
            StoreEncoding::Gzip => serde_json::from_slice(&self.gzip_decompress(data)?)?,
            StoreEncoding::Zstd => serde_json::from_slice(&self.zstd_decompress(data)?)?,
        };
        Ok(value)
    }

    fn gzip_compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::new(), GzipLevel::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn gzip_decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn zstd_compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(zstd::encode_all(data, self.zstd_level)?)
    }

    fn zstd_decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(zstd::decode_all(data)?)
    }
}
