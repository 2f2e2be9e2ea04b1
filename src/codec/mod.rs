//! Lossless frame compression
//!
//! Wraps LZ4 block compression for fixed-size raw pixel buffers. Compressed
//! blobs carry no size prefix: the cache knows the decoded frame length from
//! the sticker dimensions, so decompression targets a scratch buffer that is
//! allocated once per cache and reused for every read.

use crate::error::{Error, Result};

/// Compress a raw frame buffer.
///
/// Fails on empty input and on buffers whose length does not fit the
/// cache's `i32` length fields.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(Error::Compression("empty frame buffer".to_string()));
    }
    if data.len() > i32::MAX as usize {
        return Err(Error::Compression(format!(
            "frame buffer too large: {} bytes",
            data.len()
        )));
    }

    let compressed = lz4_flex::block::compress(data);
    if compressed.len() > i32::MAX as usize {
        return Err(Error::Compression(format!(
            "compressed frame too large: {} bytes",
            compressed.len()
        )));
    }
    Ok(compressed)
}

/// Reusable decompression context
pub struct Decompressor {
    /// Scratch output buffer, sized for the largest frame this cache holds
    scratch: Vec<u8>,
}

impl Decompressor {
    /// Create a decompressor able to produce frames up to `max_length` bytes
    pub fn new(max_length: usize) -> Self {
        Self {
            scratch: vec![0u8; max_length],
        }
    }

    /// Scratch capacity in bytes
    pub fn capacity(&self) -> usize {
        self.scratch.len()
    }

    /// Decompress `data`, which must expand to exactly `expected_length` bytes.
    ///
    /// The returned slice borrows the scratch buffer and is overwritten by the
    /// next call; callers copy it out.
    pub fn decompress(&mut self, data: &[u8], expected_length: usize) -> Result<&[u8]> {
        if expected_length > self.scratch.len() {
            return Err(Error::Decompression(format!(
                "expected {} bytes, scratch holds {}",
                expected_length,
                self.scratch.len()
            )));
        }

        let written = lz4_flex::block::decompress_into(data, &mut self.scratch[..expected_length])
            .map_err(|e| Error::Decompression(e.to_string()))?;

        if written != expected_length {
            return Err(Error::Decompression(format!(
                "decoded {} bytes, expected {}",
                written, expected_length
            )));
        }

        Ok(&self.scratch[..written])
    }
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decompressor")
            .field("capacity", &self.scratch.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i / 7) % 251) as u8).collect()
    }

    #[test]
    fn test_round_trip() {
        let data = gradient(64 * 64 * 2);
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());

        let mut decompressor = Decompressor::new(data.len());
        let decoded = decompressor.decompress(&compressed, data.len()).unwrap();
        assert_eq!(decoded, &data[..]);
    }

    #[test]
    fn test_scratch_reused_across_frames() {
        let first = vec![17u8; 4096];
        let second = gradient(4096);
        let mut decompressor = Decompressor::new(4096);

        let a = decompressor
            .decompress(&compress(&first).unwrap(), 4096)
            .unwrap()
            .to_vec();
        let b = decompressor
            .decompress(&compress(&second).unwrap(), 4096)
            .unwrap()
            .to_vec();

        assert_eq!(a, first);
        assert_eq!(b, second);
        assert_eq!(decompressor.capacity(), 4096);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(compress(&[]), Err(Error::Compression(_))));
    }

    #[test]
    fn test_truncated_input_fails() {
        let data = gradient(8192);
        let compressed = compress(&data).unwrap();
        let truncated = &compressed[..compressed.len() / 2];

        let mut decompressor = Decompressor::new(data.len());
        assert!(decompressor.decompress(truncated, data.len()).is_err());
    }

    #[test]
    fn test_wrong_length_fails() {
        let data = gradient(1024);
        let compressed = compress(&data).unwrap();

        let mut decompressor = Decompressor::new(4096);
        assert!(decompressor.decompress(&compressed, 2048).is_err());
        assert!(decompressor.decompress(&compressed, 8192).is_err());
    }
}
