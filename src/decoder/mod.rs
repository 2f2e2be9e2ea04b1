//! Decoder collaborators
//!
//! The frame source treats video and still-image decoding as black boxes.
//! [`VideoBackend`] opens a [`VideoDecoder`] for a sticker file (again on every
//! loop), and [`StillImageDecoder`] turns a whole file into a single image.

use std::path::Path;

use crate::convert::FrameGeometry;
use crate::error::{Error, Result};

#[cfg(feature = "ffmpeg")]
pub(crate) mod ffmpeg_decoder;
mod image_decoder;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg_decoder::{FfmpegBackend, FfmpegDecoder};
pub use image_decoder::ImageCrateDecoder;

/// A decoded video frame at the decoder's native size.
///
/// Pixels are ARGB (B, G, R, A in memory) with straight alpha.
#[derive(Clone)]
pub struct SourceFrame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub bytes_per_row: usize,
}

impl SourceFrame {
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height, self.bytes_per_row)
    }
}

impl std::fmt::Debug for SourceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes_per_row", &self.bytes_per_row)
            .field("data_size", &self.data.len())
            .finish()
    }
}

/// Result of asking a video decoder for its next frame
#[derive(Debug)]
pub enum ReadResult {
    Frame(SourceFrame),
    EndOfStream,
    /// Try again on the next tick
    NeedMoreInput,
    Error(Error),
}

/// Sequential video frame reader
pub trait VideoDecoder: Send {
    fn read_next_frame(&mut self) -> ReadResult;

    /// Frames per second reported by the container
    fn frame_rate(&self) -> f64;

    /// Stream duration in seconds
    fn duration(&self) -> f64;
}

/// Opens video decoders for sticker files
pub trait VideoBackend: Send {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>>;
}

/// A single decoded image, packed RGBA
#[derive(Clone)]
pub struct StillImage {
    pub rgba: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl std::fmt::Debug for StillImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StillImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Decodes a whole file as one image
pub trait StillImageDecoder: Send {
    fn decode(&self, data: &[u8]) -> Result<StillImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_frame_geometry() {
        let frame = SourceFrame {
            data: vec![0u8; 40 * 3],
            width: 8,
            height: 3,
            bytes_per_row: 40,
        };
        assert_eq!(frame.geometry(), FrameGeometry::new(8, 3, 40));
        assert!(format!("{:?}", frame).contains("data_size: 120"));
    }
}
