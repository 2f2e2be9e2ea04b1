//! Still image decoding with the `image` crate

use super::{StillImage, StillImageDecoder};
use crate::error::{Error, Result};

/// Decodes WebP and PNG stickers
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl StillImageDecoder for ImageCrateDecoder {
    fn decode(&self, data: &[u8]) -> Result<StillImage> {
        let image = image::load_from_memory(data)
            .map_err(|e| Error::ImageDecode(e.to_string()))?
            .to_rgba8();

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }

        Ok(StillImage {
            rgba: image.into_raw(),
            width: width as usize,
            height: height as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([x as u8 * 10, y as u8 * 10, 200, 255])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_png() {
        let still = ImageCrateDecoder.decode(&png_bytes(4, 3)).unwrap();
        assert_eq!((still.width, still.height), (4, 3));
        assert_eq!(still.rgba.len(), 4 * 3 * 4);
        assert_eq!(&still.rgba[4..8], &[10, 0, 200, 255]);
    }

    #[test]
    fn test_video_bytes_rejected() {
        // EBML magic of a WebM file
        let webm = [0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x86, 0x81, 0x01];
        assert!(matches!(
            ImageCrateDecoder.decode(&webm),
            Err(Error::ImageDecode(_))
        ));
    }
}
