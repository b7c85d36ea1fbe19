//! Per-resource compression
//!
//! Every resource in a container is compressed on its own so the boot side
//! can decompress a single class or file without touching its neighbours.

use crate::{PackError, PackResult};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Inputs at or below this size are always stored
const MIN_COMPRESS_SIZE: usize = 16;

/// Extensions of formats that are already compressed
const STORED_EXTENSIONS: &[&str] = &[
    "png", "apng", "jpg", "jpeg", "webp", "heic", "heif", "avif", // images
    "aac", "flac", "mp3", // audio
    "mp4", "mkv", "webm", // video
    "gz", "tgz", "xz", "br", "zst", "bz2", "tbz2", // archives
];

/// Initial buffer size per compressed byte when decompressing
const PREALLOCATE_RATIO: usize = 4;

/// Upper bound of the lz4 block format's expansion
const LZ4_MAX_RATIO: usize = 255;

/// Compression method of a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    /// Stored as-is
    None,
    /// Raw deflate (no zlib header)
    #[default]
    Deflate,
    /// Zstandard frame
    Zstd,
    /// LZ4 block (size known from the resource entry)
    Lz4,
}

impl CompressionMethod {
    /// Stable numeric id
    pub fn id(self) -> u8 {
        match self {
            CompressionMethod::None => 0,
            CompressionMethod::Deflate => 1,
            CompressionMethod::Zstd => 2,
            CompressionMethod::Lz4 => 3,
        }
    }

    /// Method for a numeric id
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CompressionMethod::None),
            1 => Some(CompressionMethod::Deflate),
            2 => Some(CompressionMethod::Zstd),
            3 => Some(CompressionMethod::Lz4),
            _ => None,
        }
    }

    /// Name used in manifests and on the command line
    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Deflate => "deflate",
            CompressionMethod::Zstd => "zstd",
            CompressionMethod::Lz4 => "lz4",
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionMethod {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "store" => Ok(CompressionMethod::None),
            "deflate" => Ok(CompressionMethod::Deflate),
            "zstd" => Ok(CompressionMethod::Zstd),
            "lz4" => Ok(CompressionMethod::Lz4),
            other => Err(PackError::Config(format!(
                "Unknown compression method: {}",
                other
            ))),
        }
    }
}

/// Output of a compressor
#[derive(Debug, Clone)]
pub struct CompressResult {
    /// Method actually applied
    pub method: CompressionMethod,
    /// Bytes to write into the container
    pub data: Vec<u8>,
}

impl CompressResult {
    /// Uncompressed result
    pub fn stored(data: &[u8]) -> Self {
        Self {
            method: CompressionMethod::None,
            data: data.to_vec(),
        }
    }
}

/// Chooses and applies a compression method for a resource
pub trait Compressor: Send + Sync {
    /// Compress `data`; `ext` is the lower-case file extension if known
    fn compress(&self, data: &[u8], ext: Option<&str>) -> PackResult<CompressResult>;
}

/// Extension-aware compressor with a configurable default method
#[derive(Debug, Clone)]
pub struct DefaultCompressor {
    method: CompressionMethod,
    level: i32,
    stored: HashSet<String>,
}

impl Default for DefaultCompressor {
    fn default() -> Self {
        Self::new(CompressionMethod::default())
    }
}

impl DefaultCompressor {
    /// Create a compressor using `method` for compressible data
    pub fn new(method: CompressionMethod) -> Self {
        Self {
            method,
            level: default_level(method),
            stored: STORED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Set the compression level (meaning depends on the method)
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Always store files with these extensions
    pub fn store_extensions(mut self, extensions: &[&str]) -> Self {
        self.stored
            .extend(extensions.iter().map(|e| e.to_ascii_lowercase()));
        self
    }

    /// Default method
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Configured level
    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Compressor for DefaultCompressor {
    fn compress(&self, data: &[u8], ext: Option<&str>) -> PackResult<CompressResult> {
        if data.len() <= MIN_COMPRESS_SIZE {
            return Ok(CompressResult::stored(data));
        }

        let method = match ext {
            Some(ext) if self.stored.contains(&ext.to_ascii_lowercase()) => {
                CompressionMethod::None
            }
            _ => self.method,
        };

        if method == CompressionMethod::None {
            return Ok(CompressResult::stored(data));
        }

        let compressed = compress_with(method, data, self.level)?;
        if compressed.len() < data.len() {
            Ok(CompressResult {
                method,
                data: compressed,
            })
        } else {
            Ok(CompressResult::stored(data))
        }
    }
}

/// Default level for a method
pub fn default_level(method: CompressionMethod) -> i32 {
    match method {
        CompressionMethod::Deflate => 6,
        CompressionMethod::Zstd => 19,
        CompressionMethod::None | CompressionMethod::Lz4 => 0,
    }
}

/// Compress `data` with an explicit method
pub fn compress_with(method: CompressionMethod, data: &[u8], level: i32) -> PackResult<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Deflate => {
            let level = Compression::new(level.clamp(0, 9) as u32);
            let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), level);
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        CompressionMethod::Zstd => {
            zstd::encode_all(data, level).map_err(|e| PackError::Compression(e.to_string()))
        }
        CompressionMethod::Lz4 => Ok(lz4_flex::compress(data)),
    }
}

/// Decompress resource bytes, checking the produced length
///
/// `expected_size` comes from container metadata and is not trusted: output
/// is read at most one byte past it and preallocation is bounded by the
/// compressed size.
pub fn decompress(
    method: CompressionMethod,
    data: &[u8],
    expected_size: u64,
) -> PackResult<Vec<u8>> {
    let expected = usize::try_from(expected_size)
        .map_err(|_| PackError::Compression(format!("Resource too large: {}", expected_size)))?;
    let capacity = expected.min(data.len().saturating_mul(PREALLOCATE_RATIO));
    let limit = expected_size.saturating_add(1);

    let output = match method {
        CompressionMethod::None => data.to_vec(),
        CompressionMethod::Deflate => {
            let mut output = Vec::with_capacity(capacity);
            DeflateDecoder::new(data)
                .take(limit)
                .read_to_end(&mut output)?;
            output
        }
        CompressionMethod::Zstd => {
            let mut output = Vec::with_capacity(capacity);
            zstd::stream::read::Decoder::new(data)?
                .take(limit)
                .read_to_end(&mut output)
                .map_err(|e| PackError::Compression(e.to_string()))?;
            output
        }
        CompressionMethod::Lz4 => {
            if expected > data.len().saturating_mul(LZ4_MAX_RATIO) {
                return Err(PackError::Compression(format!(
                    "lz4 cannot expand {} bytes to {}",
                    data.len(),
                    expected
                )));
            }
            lz4_flex::decompress(data, expected)
                .map_err(|e| PackError::Compression(e.to_string()))?
        }
    };

    if output.len() != expected {
        return Err(PackError::Compression(format!(
            "{} produced {} bytes, expected {}",
            method,
            output.len(),
            expected
        )));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_ids_are_stable() {
        for method in [
            CompressionMethod::None,
            CompressionMethod::Deflate,
            CompressionMethod::Zstd,
            CompressionMethod::Lz4,
        ] {
            assert_eq!(CompressionMethod::from_id(method.id()), Some(method));
        }
        assert_eq!(CompressionMethod::from_id(9), None);
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!(
            "ZSTD".parse::<CompressionMethod>().unwrap(),
            CompressionMethod::Zstd
        );
        assert_eq!(
            "store".parse::<CompressionMethod>().unwrap(),
            CompressionMethod::None
        );
        assert!("brotli".parse::<CompressionMethod>().is_err());
    }

    #[test]
    fn test_decompress_length_mismatch() {
        let data = vec![b'a'; 1024];
        let compressed = compress_with(CompressionMethod::Zstd, &data, 3).unwrap();
        assert!(decompress(CompressionMethod::Zstd, &compressed, 1000).is_err());
    }
}
