//! Tests for japp-pack compression

use japp_pack::compress::{compress_with, decompress};
use japp_pack::{CompressionMethod, Compressor, DefaultCompressor};

fn text() -> Vec<u8> {
    "public final class Main { static void main(String[] args) {} }\n"
        .repeat(32)
        .into_bytes()
}

/// Deterministic bytes that no method can shrink
fn noise(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

#[test]
fn test_small_inputs_are_stored() {
    let compressor = DefaultCompressor::default();
    let result = compressor.compress(b"0123456789abcdef", Some("class")).unwrap();
    assert_eq!(result.method, CompressionMethod::None);
    assert_eq!(result.data, b"0123456789abcdef");
}

#[test]
fn test_compressed_media_is_stored() {
    let compressor = DefaultCompressor::default();
    let data = text();
    for ext in ["png", "JPG", "zst", "gz"] {
        let result = compressor.compress(&data, Some(ext)).unwrap();
        assert_eq!(result.method, CompressionMethod::None, "ext {}", ext);
    }
}

#[test]
fn test_default_method_is_deflate() {
    let data = text();
    let result = DefaultCompressor::default()
        .compress(&data, Some("class"))
        .unwrap();
    assert_eq!(result.method, CompressionMethod::Deflate);
    assert!(result.data.len() < data.len());
    assert_eq!(
        decompress(result.method, &result.data, data.len() as u64).unwrap(),
        data
    );
}

#[test]
fn test_every_method_decompresses() {
    let data = text();
    for method in [
        CompressionMethod::Deflate,
        CompressionMethod::Zstd,
        CompressionMethod::Lz4,
    ] {
        let result = DefaultCompressor::new(method).compress(&data, None).unwrap();
        assert_eq!(result.method, method);
        let restored = decompress(result.method, &result.data, data.len() as u64).unwrap();
        assert_eq!(restored, data, "method {}", method);
    }
}

#[test]
fn test_incompressible_falls_back_to_store() {
    let data = noise(4096);
    for method in [CompressionMethod::Deflate, CompressionMethod::Zstd] {
        let result = DefaultCompressor::new(method).compress(&data, None).unwrap();
        assert_eq!(result.method, CompressionMethod::None);
        assert_eq!(result.data, data);
    }
}

#[test]
fn test_extra_store_extensions() {
    let compressor = DefaultCompressor::default().store_extensions(&["DAT"]);
    let result = compressor.compress(&text(), Some("dat")).unwrap();
    assert_eq!(result.method, CompressionMethod::None);
}

#[test]
fn test_corrupt_payload_is_an_error() {
    assert!(decompress(CompressionMethod::Deflate, b"\xff\xff\xff", 10).is_err());

    let data = text();
    let mut compressed = compress_with(CompressionMethod::Lz4, &data, 0).unwrap();
    compressed.truncate(compressed.len() / 2);
    assert!(decompress(CompressionMethod::Lz4, &compressed, data.len() as u64).is_err());
}

#[test]
fn test_oversized_expected_length_is_an_error() {
    // An empty final deflate block
    assert!(decompress(CompressionMethod::Deflate, &[3, 0], u64::MAX).is_err());

    let data = text();
    for method in [
        CompressionMethod::Deflate,
        CompressionMethod::Zstd,
        CompressionMethod::Lz4,
    ] {
        let compressed = compress_with(method, &data, 3).unwrap();
        for size in [u64::MAX, 1 << 40, data.len() as u64 + 1] {
            let err = decompress(method, &compressed, size);
            assert!(err.is_err(), "{} accepted size {}", method, size);
        }
        // Longer output than recorded is caught too.
        assert!(decompress(method, &compressed, data.len() as u64 - 1).is_err());
    }
}
