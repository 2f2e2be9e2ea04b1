//! FFmpeg video decoding using ffmpeg-next
//!
//! Decodes the best video stream of a sticker file and converts every frame
//! to ARGB (FFmpeg `BGRA`) at its native size. Scaling to the output size is
//! left to the frame source.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::format::context::Input as FormatContext;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::media::Type as MediaType;
use ffmpeg_next::software::scaling::{Context as ScalerContext, Flags as ScalerFlags};
use ffmpeg_next::util::frame::video::Video as VideoFrameFFmpeg;
use ffmpeg_next::Rational;

use super::{ReadResult, SourceFrame, VideoBackend, VideoDecoder};
use crate::error::{Error, Result};

/// Packets read per call before giving up until the next tick
const MAX_PACKETS_PER_READ: usize = 500;

/// Decoder that keeps the alpha plane of VP9 WebM stickers
const LIBVPX_VP9: &str = "libvpx-vp9";

/// Opens [`FfmpegDecoder`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend {
    /// Prefer libvpx for VP9 streams; FFmpeg's native VP9 decoder drops alpha
    pub hint_vp9: bool,
}

impl FfmpegBackend {
    pub fn new(hint_vp9: bool) -> Self {
        Self { hint_vp9 }
    }
}

impl VideoBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>> {
        Ok(Box::new(FfmpegDecoder::open(path, self.hint_vp9)?))
    }
}

/// Outcome of one `receive_frame` call
enum Received {
    Frame(SourceFrame),
    /// Decoder wants another packet
    Again,
    /// Decoder fully drained
    Eof,
}

/// Current converter and the source parameters it was built for
struct Scaler {
    context: ScalerContext,
    format: Pixel,
    width: u32,
    height: u32,
}

/// Sequential FFmpeg video reader
pub struct FfmpegDecoder {
    /// Input format context
    input: FormatContext,

    /// Video stream index
    video_stream_index: usize,

    /// Video decoder
    video_decoder: ffmpeg::decoder::Video,

    /// Converter to BGRA, built on the first frame
    scaler: Option<Scaler>,

    /// Whether the end of the packet stream has been signalled
    eof_sent: bool,

    /// Frame rate
    frame_rate: f64,

    /// Duration in seconds
    duration: f64,
}

// SAFETY: the FFmpeg contexts are only touched through `&mut self`, and a
// decoder is owned by exactly one frame source at a time.
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    /// Open the best video stream of `path`
    pub fn open(path: &Path, hint_vp9: bool) -> Result<Self> {
        // Safe to call multiple times
        ffmpeg::init().map_err(|e| Error::from_ffmpeg(i32::from(e)))?;

        let input = ffmpeg::format::input(&path).map_err(|e| {
            if e.to_string().contains("No such file") {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::InvalidFormat(e.to_string())
            }
        })?;

        let stream = input
            .streams()
            .best(MediaType::Video)
            .ok_or_else(|| Error::InvalidFormat(format!("No video stream in {:?}", path)))?;
        let video_stream_index = stream.index();
        let codec_params = stream.parameters();
        let time_base = stream.time_base();

        let duration = if stream.duration() > 0 {
            Self::pts_to_seconds(stream.duration(), time_base)
        } else {
            input.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        };

        let rate = stream.avg_frame_rate();
        let rate = if rate.denominator() > 0 && rate.numerator() > 0 {
            rate
        } else {
            stream.rate()
        };
        let frame_rate = if rate.denominator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let codec_id = codec_params.id();
        let codec = if hint_vp9 && codec_id == ffmpeg::codec::Id::VP9 {
            ffmpeg::decoder::find_by_name(LIBVPX_VP9).or_else(|| ffmpeg::decoder::find(codec_id))
        } else {
            ffmpeg::decoder::find(codec_id)
        }
        .ok_or_else(|| Error::CodecNotSupported(format!("No decoder for codec: {:?}", codec_id)))?;

        log::debug!("Using decoder {} for {:?}", codec.name(), path);

        let mut decoder_ctx = CodecContext::new_with_codec(codec);
        decoder_ctx.set_parameters(codec_params).map_err(|e| {
            Error::DecodeFailed(format!("Failed to set codec parameters: {}", e))
        })?;

        let video_decoder = decoder_ctx.decoder().video().map_err(|e| {
            Error::DecodeFailed(format!("Failed to open video decoder: {}", e))
        })?;

        log::debug!(
            "Video: {}x{} @ {:.2} fps, duration: {:.2}s",
            video_decoder.width(),
            video_decoder.height(),
            frame_rate,
            duration
        );

        Ok(Self {
            input,
            video_stream_index,
            video_decoder,
            scaler: None,
            eof_sent: false,
            frame_rate,
            duration,
        })
    }

    fn receive_frame(&mut self) -> Result<Received> {
        let mut decoded = VideoFrameFFmpeg::empty();

        match self.video_decoder.receive_frame(&mut decoded) {
            Ok(()) => self.convert_frame(&decoded).map(Received::Frame),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                Ok(Received::Again)
            }
            Err(ffmpeg::Error::Eof) => Ok(Received::Eof),
            Err(e) => Err(Error::DecodeFailed(format!("Failed to receive frame: {}", e))),
        }
    }

    fn convert_frame(&mut self, decoded: &VideoFrameFFmpeg) -> Result<SourceFrame> {
        let (format, width, height) = (decoded.format(), decoded.width(), decoded.height());

        let stale = match &self.scaler {
            Some(s) => s.format != format || s.width != width || s.height != height,
            None => true,
        };
        if stale {
            let context = ScalerContext::get(
                format,
                width,
                height,
                Pixel::BGRA,
                width,
                height,
                ScalerFlags::BILINEAR,
            )
            .map_err(|e| Error::DecodeFailed(format!("Failed to create scaler: {}", e)))?;
            log::debug!("Scaler initialized: {:?} -> BGRA", format);
            self.scaler = Some(Scaler {
                context,
                format,
                width,
                height,
            });
        }

        let mut converted = VideoFrameFFmpeg::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .context
                .run(decoded, &mut converted)
                .map_err(|e| Error::DecodeFailed(format!("Failed to convert frame: {}", e)))?;
        }

        let stride = converted.stride(0);
        let size = stride * height as usize;
        Ok(SourceFrame {
            data: converted.data(0)[..size].to_vec(),
            width: width as usize,
            height: height as usize,
            bytes_per_row: stride,
        })
    }

    fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
        if time_base.denominator() == 0 {
            return 0.0;
        }
        pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn read_next_frame(&mut self) -> ReadResult {
        let mut packet_count = 0;

        loop {
            match self.receive_frame() {
                Ok(Received::Frame(frame)) => return ReadResult::Frame(frame),
                Ok(Received::Again) => {}
                Ok(Received::Eof) => return ReadResult::EndOfStream,
                Err(e) => return ReadResult::Error(e),
            }

            if self.eof_sent {
                return ReadResult::EndOfStream;
            }
            if packet_count >= MAX_PACKETS_PER_READ {
                log::debug!("No frame after {} packets", packet_count);
                return ReadResult::NeedMoreInput;
            }

            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));

            match next {
                Some((index, packet)) => {
                    packet_count += 1;
                    if index != self.video_stream_index {
                        continue;
                    }
                    if let Err(e) = self.video_decoder.send_packet(&packet) {
                        return ReadResult::Error(Error::DecodeFailed(format!(
                            "Failed to send packet: {}",
                            e
                        )));
                    }
                }
                None => {
                    log::trace!("End of packets, flushing decoder");
                    if let Err(e) = self.video_decoder.send_eof() {
                        log::debug!("send_eof failed: {}", e);
                    }
                    self.eof_sent = true;
                }
            }
        }
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pts_conversion() {
        let time_base = Rational::new(1, 90000);
        assert_eq!(FfmpegDecoder::pts_to_seconds(90000, time_base), 1.0);
        assert_eq!(FfmpegDecoder::pts_to_seconds(45000, time_base), 0.5);
        assert_eq!(FfmpegDecoder::pts_to_seconds(10, Rational::new(1, 0)), 0.0);
    }

    #[test]
    fn test_missing_file() {
        let result = FfmpegDecoder::open(Path::new("/nonexistent/sticker.webm"), true);
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_carries_hint() {
        assert!(FfmpegBackend::new(true).hint_vp9);
        assert!(!FfmpegBackend::default().hint_vp9);
    }
}
