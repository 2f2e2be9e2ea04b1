//! Output frame types

use crate::convert;

/// Pixel layout of a [`DecodedFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameFormat {
    /// B, G, R, A per pixel, straight alpha
    Argb = 0,
    /// Y plane, alpha plane, interleaved CbCr at half resolution
    Yuva = 1,
}

/// A frame ready for display, owned by the caller
#[derive(Clone)]
pub struct DecodedFrame {
    /// Pixel data
    pub data: Vec<u8>,

    /// Pixel layout
    pub format: FrameFormat,

    /// Frame width
    pub width: usize,

    /// Frame height
    pub height: usize,

    /// Row stride
    pub bytes_per_row: usize,

    /// Position in the animation
    pub index: usize,

    /// Last frame of a pass
    pub is_last_frame: bool,

    /// Frames per pass, or the best estimate while unknown
    pub total_frames: usize,

    /// Alpha must be premultiplied before compositing
    pub requires_alpha_premultiply: bool,
}

impl DecodedFrame {
    pub(crate) fn argb(
        data: Vec<u8>,
        width: usize,
        height: usize,
        index: usize,
        is_last_frame: bool,
        total_frames: usize,
    ) -> Self {
        Self {
            data,
            format: FrameFormat::Argb,
            width,
            height,
            bytes_per_row: convert::argb_bytes_per_row(width),
            index,
            is_last_frame,
            total_frames,
            requires_alpha_premultiply: true,
        }
    }

    pub(crate) fn yuva(
        data: Vec<u8>,
        width: usize,
        height: usize,
        index: usize,
        is_last_frame: bool,
        total_frames: usize,
    ) -> Self {
        Self {
            data,
            format: FrameFormat::Yuva,
            width,
            height,
            bytes_per_row: convert::yuva_bytes_per_row(width),
            index,
            is_last_frame,
            total_frames,
            requires_alpha_premultiply: false,
        }
    }

    /// Get data size in bytes
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Get data pointer
    pub fn data_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

impl std::fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("index", &self.index)
            .field("is_last_frame", &self.is_last_frame)
            .field("total_frames", &self.total_frames)
            .field("data_size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_frame() {
        let frame = DecodedFrame::argb(vec![0u8; 64 * 10], 10, 10, 3, false, 12);
        assert_eq!(frame.format, FrameFormat::Argb);
        assert_eq!(frame.bytes_per_row, 64);
        assert!(frame.requires_alpha_premultiply);
        assert_eq!(frame.data_size(), 640);
    }

    #[test]
    fn test_yuva_frame() {
        let frame = DecodedFrame::yuva(vec![0u8; convert::yuva_len(10, 10)], 10, 10, 9, true, 10);
        assert_eq!(frame.format, FrameFormat::Yuva);
        assert_eq!(frame.bytes_per_row, 20);
        assert!(!frame.requires_alpha_premultiply);
        assert!(format!("{:?}", frame).contains("is_last_frame: true"));
    }
}
