//! Pixel format conversion and scaling
//!
//! ARGB buffers are 4 bytes per pixel laid out B, G, R, A in memory (32-bit
//! ARGB words in little-endian order, the layout FFmpeg calls BGRA) with
//! straight alpha. Rows may carry padding, so every function takes the row
//! stride explicitly.
//!
//! YUVA buffers are what the frame cache stores:
//!
//! ```text
//! [0 .. w*h]                 Y plane, packed
//! [w*h .. 2*w*h]             alpha plane, packed
//! [2*w*h .. end]             interleaved Cb/Cr at half resolution,
//!                            ceil(w/2) pairs per row, ceil(h/2) rows
//! ```
//!
//! Colour math is BT.601 full range with 8-bit fixed-point coefficients.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, RgbaImage};

/// Bytes per ARGB pixel
pub const ARGB_BYTES_PER_PIXEL: usize = 4;

/// ARGB row alignment in bytes
pub const ROW_ALIGNMENT: usize = 64;

/// Width, height and row stride of a pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
    pub bytes_per_row: usize,
}

impl FrameGeometry {
    pub fn new(width: usize, height: usize, bytes_per_row: usize) -> Self {
        Self {
            width,
            height,
            bytes_per_row,
        }
    }

    /// Geometry of a display-ready ARGB buffer with aligned rows
    pub fn argb(width: usize, height: usize) -> Self {
        Self::new(width, height, argb_bytes_per_row(width))
    }

    /// Total buffer length in bytes
    pub fn len(&self) -> usize {
        self.bytes_per_row * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Minimum bytes a buffer must hold to cover every visible pixel
    fn min_len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.bytes_per_row * (self.height - 1) + self.width * ARGB_BYTES_PER_PIXEL
    }

    fn is_valid_argb(&self) -> bool {
        !self.is_empty() && self.bytes_per_row >= self.width * ARGB_BYTES_PER_PIXEL
    }
}

/// Row stride for a display-ready ARGB buffer of `width` pixels
pub fn argb_bytes_per_row(width: usize) -> usize {
    let unaligned = width * ARGB_BYTES_PER_PIXEL;
    (unaligned + ROW_ALIGNMENT - 1) & !(ROW_ALIGNMENT - 1)
}

/// Length of a YUVA buffer for the given dimensions
pub fn yuva_len(width: usize, height: usize) -> usize {
    let (chroma_width, chroma_height) = chroma_dimensions(width, height);
    width * height * 2 + chroma_width * chroma_height * 2
}

/// Bytes per row reported for YUVA frames (luma + alpha)
pub fn yuva_bytes_per_row(width: usize) -> usize {
    width * 2
}

fn chroma_dimensions(width: usize, height: usize) -> (usize, usize) {
    ((width + 1) / 2, (height + 1) / 2)
}

fn alloc_zeroed(len: usize) -> Option<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).ok()?;
    buffer.resize(len, 0);
    Some(buffer)
}

/// Scale an ARGB buffer to the target geometry with a triangle filter.
///
/// Writes exactly `target.bytes_per_row * target.height` bytes; row padding is
/// zeroed. Returns `None` for unusable geometry, an undersized source, or if
/// the destination cannot be allocated.
pub fn scale_and_convert(
    source: &[u8],
    source_geometry: FrameGeometry,
    target: FrameGeometry,
) -> Option<Vec<u8>> {
    if !source_geometry.is_valid_argb() || !target.is_valid_argb() {
        return None;
    }
    if source.len() < source_geometry.min_len() {
        return None;
    }

    let mut dest = alloc_zeroed(target.len())?;
    let row_bytes = target.width * ARGB_BYTES_PER_PIXEL;

    if source_geometry.width == target.width && source_geometry.height == target.height {
        for y in 0..target.height {
            let src = &source[y * source_geometry.bytes_per_row..][..row_bytes];
            dest[y * target.bytes_per_row..][..row_bytes].copy_from_slice(src);
        }
        return Some(dest);
    }

    // Channels are filtered independently, so BGRA passes through as Rgba
    let image = pack_rows(source, source_geometry)?;
    let scaled = imageops::resize(
        &image,
        u32::try_from(target.width).ok()?,
        u32::try_from(target.height).ok()?,
        FilterType::Triangle,
    );

    for (y, row) in scaled.as_raw().chunks_exact(row_bytes).enumerate() {
        dest[y * target.bytes_per_row..][..row_bytes].copy_from_slice(row);
    }

    Some(dest)
}

/// Copy strided ARGB rows into a tightly packed image buffer
fn pack_rows(source: &[u8], geometry: FrameGeometry) -> Option<RgbaImage> {
    let row_bytes = geometry.width * ARGB_BYTES_PER_PIXEL;
    let mut packed = Vec::new();
    packed.try_reserve_exact(row_bytes * geometry.height).ok()?;
    for y in 0..geometry.height {
        packed.extend_from_slice(&source[y * geometry.bytes_per_row..][..row_bytes]);
    }
    ImageBuffer::from_raw(
        u32::try_from(geometry.width).ok()?,
        u32::try_from(geometry.height).ok()?,
        packed,
    )
}

/// Reorder packed RGBA pixels into an ARGB buffer with the given geometry.
pub fn rgba_to_argb(rgba: &[u8], target: FrameGeometry) -> Option<Vec<u8>> {
    if !target.is_valid_argb() || rgba.len() < target.width * target.height * 4 {
        return None;
    }

    let mut dest = alloc_zeroed(target.len())?;
    for y in 0..target.height {
        let src = &rgba[y * target.width * 4..][..target.width * 4];
        let out = &mut dest[y * target.bytes_per_row..][..target.width * 4];
        for (s, d) in src.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
            d[0] = s[2];
            d[1] = s[1];
            d[2] = s[0];
            d[3] = s[3];
        }
    }
    Some(dest)
}

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    ((77 * r + 150 * g + 29 * b + 128) >> 8).clamp(0, 255) as u8
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert an ARGB buffer to the packed YUVA layout.
///
/// Returns `None` if the buffer is smaller than its geometry claims.
pub fn argb_to_yuva(argb: &[u8], geometry: FrameGeometry) -> Option<Vec<u8>> {
    if !geometry.is_valid_argb() || argb.len() < geometry.min_len() {
        return None;
    }

    let FrameGeometry {
        width,
        height,
        bytes_per_row,
    } = geometry;
    let (chroma_width, chroma_height) = chroma_dimensions(width, height);
    let mut out = alloc_zeroed(yuva_len(width, height))?;
    let (planes, chroma) = out.split_at_mut(width * height * 2);
    let (y_plane, a_plane) = planes.split_at_mut(width * height);

    for y in 0..height {
        let row = &argb[y * bytes_per_row..][..width * 4];
        for (x, px) in row.chunks_exact(4).enumerate() {
            let (b, g, r, a) = (px[0] as i32, px[1] as i32, px[2] as i32, px[3]);
            y_plane[y * width + x] = luma(r, g, b);
            a_plane[y * width + x] = a;
        }
    }

    for cy in 0..chroma_height {
        for cx in 0..chroma_width {
            let (mut r, mut g, mut b, mut n) = (0i32, 0i32, 0i32, 0i32);
            for y in (cy * 2)..((cy * 2 + 2).min(height)) {
                for x in (cx * 2)..((cx * 2 + 2).min(width)) {
                    let px = &argb[y * bytes_per_row + x * 4..][..4];
                    b += px[0] as i32;
                    g += px[1] as i32;
                    r += px[2] as i32;
                    n += 1;
                }
            }
            let (r, g, b) = ((r + n / 2) / n, (g + n / 2) / n, (b + n / 2) / n);
            let cb = ((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128;
            let cr = ((128 * r - 107 * g - 21 * b + 128) >> 8) + 128;
            chroma[(cy * chroma_width + cx) * 2] = clamp_u8(cb);
            chroma[(cy * chroma_width + cx) * 2 + 1] = clamp_u8(cr);
        }
    }

    Some(out)
}

/// Convert a packed YUVA buffer back to ARGB with the given row stride.
pub fn yuva_to_argb(yuva: &[u8], target: FrameGeometry) -> Option<Vec<u8>> {
    if !target.is_valid_argb() || yuva.len() < yuva_len(target.width, target.height) {
        return None;
    }

    let FrameGeometry {
        width,
        height,
        bytes_per_row,
    } = target;
    let (chroma_width, _) = chroma_dimensions(width, height);
    let y_plane = &yuva[..width * height];
    let a_plane = &yuva[width * height..width * height * 2];
    let chroma = &yuva[width * height * 2..];

    let mut out = alloc_zeroed(target.len())?;
    for y in 0..height {
        let row = &mut out[y * bytes_per_row..][..width * 4];
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let luma = (y_plane[y * width + x] as i32) << 8;
            let c = ((y / 2) * chroma_width + x / 2) * 2;
            let cb = chroma[c] as i32 - 128;
            let cr = chroma[c + 1] as i32 - 128;

            px[0] = clamp_u8((luma + 454 * cb + 128) >> 8);
            px[1] = clamp_u8((luma - 88 * cb - 183 * cr + 128) >> 8);
            px[2] = clamp_u8((luma + 359 * cr + 128) >> 8);
            px[3] = a_plane[y * width + x];
        }
    }
    Some(out)
}
