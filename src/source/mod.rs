//! Frame source
//!
//! Hands out one display-ready frame per call. The mode is picked when the
//! source is created:
//!
//! ```text
//!   finalized cache ──────────────► CacheReplay   (YUVA from disk)
//!   asset decodes as an image ────► StaticImage   (one ARGB frame)
//!   otherwise ────────────────────► LiveDecode    (ARGB, stored to the cache)
//!                                        │
//!                      pass finalized ───┘──► CacheReplay
//! ```
//!
//! Nothing that goes wrong while producing a frame is fatal: the call simply
//! returns no frame and the next tick tries again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::FrameCache;
use crate::convert::{self, FrameGeometry};
use crate::decoder::{
    ImageCrateDecoder, ReadResult, SourceFrame, StillImage, StillImageDecoder, VideoBackend,
    VideoDecoder,
};
use crate::error::{Error, Result};
use crate::threading::CompressionPool;

mod config;
mod frame;

pub use config::{FrameSourceConfig, DEFAULT_MAX_FRAME_RATE};
pub use frame::{DecodedFrame, FrameFormat};

/// Where frames currently come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameSourceState {
    StaticImage = 0,
    CacheReplay = 1,
    LiveDecode = 2,
}

enum Mode {
    StaticImage {
        argb: Vec<u8>,
    },
    CacheReplay,
    LiveDecode {
        decoder: Box<dyn VideoDecoder>,
        /// Frames read from `decoder` since it was opened
        position: usize,
    },
}

/// Produces frames for one sticker at one output size
pub struct FrameSource {
    path: PathBuf,
    width: usize,
    height: usize,
    config: FrameSourceConfig,
    backend: Box<dyn VideoBackend>,
    cache: Option<FrameCache>,
    mode: Mode,

    /// Capped frame rate
    frame_rate: u32,

    /// Frames per pass, 0 while unknown
    frame_count: usize,

    /// Seconds per pass
    duration: f64,

    /// Index of the next frame to hand out
    counter: usize,
}

impl FrameSource {
    /// Create a source decoding video with FFmpeg
    #[cfg(feature = "ffmpeg")]
    pub fn open(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        config: FrameSourceConfig,
    ) -> Result<Self> {
        let backend = crate::decoder::FfmpegBackend::new(config.hint_vp9);
        Self::with_backend(path, width, height, config, Box::new(backend))
    }

    /// Create a source with a custom video backend
    pub fn with_backend(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        config: FrameSourceConfig,
        backend: Box<dyn VideoBackend>,
    ) -> Result<Self> {
        let pool = match config.compression_threads {
            0 => CompressionPool::shared()?,
            n => CompressionPool::new(n)?,
        };
        Self::with_decoders(path, width, height, config, backend, &ImageCrateDecoder, pool)
    }

    /// Create a source with every collaborator supplied by the caller
    pub fn with_decoders(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        config: FrameSourceConfig,
        backend: Box<dyn VideoBackend>,
        still_decoder: &dyn StillImageDecoder,
        pool: Arc<CompressionPool>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        let path = path.as_ref().to_path_buf();

        let mut cache = match &config.cache_path_prefix {
            Some(prefix) => match FrameCache::open_with_retry(prefix, width, height, pool) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    log::warn!("Frame cache disabled for {}: {}", path.display(), e);
                    None
                }
            },
            None => None,
        };

        let target = FrameGeometry::argb(width as usize, height as usize);
        let (mode, frame_rate, frame_count, duration) = Self::initial_mode(
            &path,
            target,
            &config,
            backend.as_ref(),
            still_decoder,
            &mut cache,
        )?;

        let source = Self {
            path,
            width: width as usize,
            height: height as usize,
            config,
            backend,
            cache,
            mode,
            frame_rate,
            frame_count,
            duration,
            counter: 0,
        };
        log::debug!("Created {:?}", source);
        Ok(source)
    }

    fn initial_mode(
        path: &Path,
        target: FrameGeometry,
        config: &FrameSourceConfig,
        backend: &dyn VideoBackend,
        still_decoder: &dyn StillImageDecoder,
        cache: &mut Option<FrameCache>,
    ) -> Result<(Mode, u32, usize, f64)> {
        if config.use_cache {
            if let Some(cache) = cache.as_ref().filter(|c| c.is_finalized()) {
                let frame_rate = config.cap_frame_rate(cache.frame_rate() as f64);
                let frame_count = cache.frame_count();
                log::info!(
                    "Replaying {} from {} ({} frames)",
                    path.display(),
                    cache.path().display(),
                    frame_count
                );
                let duration = frame_count as f64 / frame_rate as f64;
                return Ok((Mode::CacheReplay, frame_rate, frame_count, duration));
            }
        }

        let data = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        match still_decoder.decode(&data) {
            Ok(still) => {
                let argb = Self::render_still(&still, target)?;
                // A still never needs the cache; an untouched file is removed on drop
                *cache = None;
                log::debug!(
                    "{} is a {}x{} still image",
                    path.display(),
                    still.width,
                    still.height
                );
                return Ok((Mode::StaticImage { argb }, 1, 1, 0.0));
            }
            Err(e) => log::trace!("{} is not a still image: {}", path.display(), e),
        }

        let decoder = backend.open(path)?;
        let frame_rate = config.cap_frame_rate(decoder.frame_rate());
        let duration = decoder.duration();
        Ok((
            Mode::LiveDecode {
                decoder,
                position: 0,
            },
            frame_rate,
            0,
            duration,
        ))
    }

    fn render_still(still: &StillImage, target: FrameGeometry) -> Result<Vec<u8>> {
        let geometry = FrameGeometry::argb(still.width, still.height);
        convert::rgba_to_argb(&still.rgba, geometry)
            .and_then(|argb| convert::scale_and_convert(&argb, geometry, target))
            .ok_or(Error::Memory)
    }

    /// Produce the next frame.
    ///
    /// With `draw == false` the position advances without producing pixels.
    pub fn take_frame(&mut self, draw: bool) -> Option<DecodedFrame> {
        if let Some(cache) = self.cache.as_mut() {
            cache.poll();
        }
        self.maybe_enter_cache_replay();

        match self.mode {
            Mode::StaticImage { .. } => self.take_static_frame(draw),
            Mode::CacheReplay => self.take_cached_frame(draw),
            Mode::LiveDecode { .. } => self.take_live_frame(draw),
        }
    }

    fn take_static_frame(&mut self, draw: bool) -> Option<DecodedFrame> {
        if !draw {
            return None;
        }
        let Mode::StaticImage { argb } = &self.mode else {
            return None;
        };
        Some(DecodedFrame::argb(
            argb.clone(),
            self.width,
            self.height,
            0,
            true,
            1,
        ))
    }

    fn take_cached_frame(&mut self, draw: bool) -> Option<DecodedFrame> {
        if self.frame_count == 0 {
            return None;
        }
        let index = self.counter % self.frame_count;
        self.counter = (index + 1) % self.frame_count;
        if !draw {
            return None;
        }

        let frame = self.read_cached(index);
        if frame.is_none() {
            self.recover_from_cache_loss(index);
        }
        frame
    }

    fn read_cached(&mut self, index: usize) -> Option<DecodedFrame> {
        let yuva = self.cache.as_mut()?.read_frame(index)?;
        let total = self.frame_count;
        Some(DecodedFrame::yuva(
            yuva,
            self.width,
            self.height,
            index,
            total > 0 && index + 1 == total,
            total,
        ))
    }

    /// Go back to decoding if the cache reset itself under a replay
    fn recover_from_cache_loss(&mut self, index: usize) {
        if self.cache.as_ref().is_some_and(|c| c.is_finalized()) {
            log::debug!("Cached frame {} of {} missing", index, self.path.display());
            return;
        }
        match self.backend.open(&self.path) {
            Ok(decoder) => {
                log::warn!(
                    "Frame cache for {} was reset, decoding live",
                    self.path.display()
                );
                self.duration = decoder.duration();
                self.counter = 0;
                self.mode = Mode::LiveDecode {
                    decoder,
                    position: 0,
                };
            }
            Err(e) => log::debug!("Cannot decode {}: {}", self.path.display(), e),
        }
    }

    fn maybe_enter_cache_replay(&mut self) {
        if !self.config.use_cache || !self.config.prefer_cache_after_first_pass {
            return;
        }
        if !matches!(self.mode, Mode::LiveDecode { .. }) {
            return;
        }
        let Some(cache) = self.cache.as_ref().filter(|c| c.is_finalized()) else {
            return;
        };

        self.frame_count = cache.frame_count();
        self.counter %= self.frame_count;
        self.duration = self.frame_count as f64 / self.frame_rate as f64;
        self.mode = Mode::CacheReplay;
        log::info!(
            "Frame cache for {} complete, switching to replay",
            self.path.display()
        );
    }

    fn take_live_frame(&mut self, draw: bool) -> Option<DecodedFrame> {
        if !draw {
            // The decoder catches up, or rewinds, on the next drawn frame
            self.counter = if self.frame_count > 0 {
                (self.counter + 1) % self.frame_count
            } else {
                self.counter + 1
            };
            return None;
        }

        let Mode::LiveDecode { decoder, position } = &mut self.mode else {
            return None;
        };
        if *position > self.counter {
            match self.backend.open(&self.path) {
                Ok(fresh) => {
                    *decoder = fresh;
                    *position = 0;
                }
                Err(e) => {
                    log::debug!("Failed to rewind {}: {}", self.path.display(), e);
                    return None;
                }
            }
        }

        loop {
            match decoder.read_next_frame() {
                ReadResult::Frame(frame) => {
                    let index = *position;
                    *position += 1;
                    if index < self.counter {
                        continue;
                    }
                    let estimate = estimate_frame_count(decoder.as_ref());
                    self.counter = index + 1;
                    return self.present_live_frame(index, frame, estimate);
                }
                ReadResult::EndOfStream => {
                    let produced = *position;
                    return self.end_of_pass(produced);
                }
                ReadResult::NeedMoreInput => return None,
                ReadResult::Error(e) => {
                    log::debug!("Decode error in {}: {}", self.path.display(), e);
                    return None;
                }
            }
        }
    }

    fn present_live_frame(
        &mut self,
        index: usize,
        frame: SourceFrame,
        estimate: usize,
    ) -> Option<DecodedFrame> {
        let target = FrameGeometry::argb(self.width, self.height);
        let Some(argb) = convert::scale_and_convert(&frame.data, frame.geometry(), target) else {
            log::debug!("Dropped frame {} of {}", index, self.path.display());
            return None;
        };

        if let Some(cache) = self.cache.as_mut().filter(|c| !c.is_finalized()) {
            cache.store_raw_frame(index, argb.clone(), target);
        }

        let total = if self.frame_count > 0 {
            self.frame_count
        } else {
            estimate
        };
        Some(DecodedFrame::argb(
            argb,
            self.width,
            self.height,
            index,
            total > 0 && index + 1 == total,
            total,
        ))
    }

    fn end_of_pass(&mut self, produced: usize) -> Option<DecodedFrame> {
        if self.frame_count == 0 {
            if produced == 0 {
                log::warn!("{} ended without producing a frame", self.path.display());
            } else {
                self.frame_count = produced;
                log::debug!("{} has {} frames", self.path.display(), produced);
            }
        }
        self.request_finalize();
        self.counter = 0;

        self.maybe_enter_cache_replay();
        if matches!(self.mode, Mode::LiveDecode { .. }) {
            self.restart_decoder();
        }

        let frame = self.read_cached(0)?;
        self.counter = 1;
        Some(frame)
    }

    fn request_finalize(&mut self) {
        if self.frame_count == 0 {
            return;
        }
        let Some(cache) = self.cache.as_mut().filter(|c| !c.is_finalized()) else {
            return;
        };

        let accounted = cache.accounted_frame_count();
        if accounted == self.frame_count {
            cache.finalize_when_settled(self.frame_rate, self.frame_count);
        } else {
            log::debug!(
                "Frame cache {} accounts for {} of {} frames",
                cache.path().display(),
                accounted,
                self.frame_count
            );
        }
    }

    fn restart_decoder(&mut self) {
        match self.backend.open(&self.path) {
            Ok(decoder) => {
                self.mode = Mode::LiveDecode {
                    decoder,
                    position: 0,
                }
            }
            Err(e) => log::warn!("Failed to reopen {}: {}", self.path.display(), e),
        }
    }

    /// Make the last frame of the pass the next one handed out
    pub fn skip_to_end(&mut self) {
        self.counter = self.frame_count.saturating_sub(1);
    }

    /// Make `index` the next frame handed out
    pub fn skip_to_frame_index(&mut self, index: usize) {
        self.counter = match self.frame_count {
            0 => index,
            count => index % count,
        };
    }

    /// Index of the next frame
    pub fn frame_index(&self) -> usize {
        match self.frame_count {
            0 => self.counter,
            count => self.counter % count,
        }
    }

    /// Frames per pass, 0 until a live pass completes
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Seconds per pass
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn state(&self) -> FrameSourceState {
        match self.mode {
            Mode::StaticImage { .. } => FrameSourceState::StaticImage,
            Mode::CacheReplay => FrameSourceState::CacheReplay,
            Mode::LiveDecode { .. } => FrameSourceState::LiveDecode,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cache file backing this source, if any
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache.as_ref().map(|c| c.path())
    }

    /// Wait for queued cache stores; see [`FrameCache::flush`]
    pub fn flush_cache(&mut self, timeout: Duration) -> bool {
        match self.cache.as_mut() {
            Some(cache) => cache.flush(timeout),
            None => true,
        }
    }
}

fn estimate_frame_count(decoder: &dyn VideoDecoder) -> usize {
    let estimate = (decoder.duration() * decoder.frame_rate()).round();
    if estimate.is_finite() && estimate > 0.0 {
        estimate as usize
    } else {
        0
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("state", &self.state())
            .field("frame_rate", &self.frame_rate)
            .field("frame_count", &self.frame_count)
            .field("counter", &self.counter)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Seek, SeekFrom};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::cache::{FrameIndexEntry, TABLE_SIZE};

    const WIDTH: u32 = 8;
    const HEIGHT: u32 = 6;
    const FLUSH: Duration = Duration::from_secs(10);

    fn seed(index: usize) -> u8 {
        (index * 20 + 5) as u8
    }

    /// Uniform grey frames at 16x12, one shade per index
    struct MockDecoder {
        frames: usize,
        frame_rate: f64,
        position: usize,
        stall_at: Option<usize>,
    }

    impl VideoDecoder for MockDecoder {
        fn read_next_frame(&mut self) -> ReadResult {
            if self.stall_at == Some(self.position) {
                self.stall_at = None;
                return ReadResult::NeedMoreInput;
            }
            if self.position >= self.frames {
                return ReadResult::EndOfStream;
            }
            let value = seed(self.position);
            self.position += 1;
            let mut data = Vec::with_capacity(16 * 12 * 4);
            for _ in 0..16 * 12 {
                data.extend_from_slice(&[value, value, value, 255]);
            }
            ReadResult::Frame(SourceFrame {
                data,
                width: 16,
                height: 12,
                bytes_per_row: 64,
            })
        }

        fn frame_rate(&self) -> f64 {
            self.frame_rate
        }

        fn duration(&self) -> f64 {
            self.frames as f64 / self.frame_rate
        }
    }

    struct MockBackend {
        frames: usize,
        frame_rate: f64,
        stall_at: Option<usize>,
        opens: Arc<AtomicUsize>,
    }

    impl VideoBackend for MockBackend {
        fn open(&self, _path: &Path) -> Result<Box<dyn VideoDecoder>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockDecoder {
                frames: self.frames,
                frame_rate: self.frame_rate,
                position: 0,
                stall_at: self.stall_at,
            }))
        }
    }

    struct FailingBackend;

    impl VideoBackend for FailingBackend {
        fn open(&self, _path: &Path) -> Result<Box<dyn VideoDecoder>> {
            Err(Error::CodecNotSupported("mock".to_string()))
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        asset: PathBuf,
        opens: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::TempDir::new().unwrap();
            let asset = dir.path().join("sticker.webm");
            fs::write(&asset, [0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x86, 0x81]).unwrap();
            Self {
                dir,
                asset,
                opens: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn prefix(&self) -> PathBuf {
            self.dir.path().join("sticker")
        }

        fn backend(&self, frames: usize, stall_at: Option<usize>) -> Box<dyn VideoBackend> {
            Box::new(MockBackend {
                frames,
                frame_rate: 10.0,
                stall_at,
                opens: self.opens.clone(),
            })
        }

        fn source(&self, config: FrameSourceConfig, frames: usize) -> Result<FrameSource> {
            self.source_with(config, self.backend(frames, None))
        }

        fn source_with(
            &self,
            config: FrameSourceConfig,
            backend: Box<dyn VideoBackend>,
        ) -> Result<FrameSource> {
            FrameSource::with_decoders(
                &self.asset,
                WIDTH,
                HEIGHT,
                config,
                backend,
                &ImageCrateDecoder,
                CompressionPool::new(2).unwrap(),
            )
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        /// Run one full live pass so the cache ends up finalized
        fn populate_cache(&self, frames: usize) {
            let mut source = self.source(FrameSourceConfig::cached(self.prefix()), frames).unwrap();
            for _ in 0..frames {
                assert!(source.take_frame(true).is_some());
            }
            assert!(source.flush_cache(FLUSH));
            assert!(source.take_frame(true).is_some());
            assert_eq!(source.state(), FrameSourceState::CacheReplay);
        }
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 100, 50, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_fresh_pass_finalizes_cache() {
        let fixture = Fixture::new();
        let mut source = fixture
            .source(FrameSourceConfig::cached(fixture.prefix()), 10)
            .unwrap();
        assert_eq!(source.state(), FrameSourceState::LiveDecode);
        assert_eq!(source.frame_rate(), 10);
        assert_eq!(source.frame_count(), 0);

        for i in 0..10 {
            let frame = source.take_frame(true).unwrap();
            assert_eq!(frame.index, i);
            assert_eq!(frame.format, FrameFormat::Argb);
            assert_eq!(frame.is_last_frame, i == 9);
            assert_eq!(frame.total_frames, 10);
            assert_eq!(frame.bytes_per_row, 64);
            assert!(frame.requires_alpha_premultiply);
            assert_eq!(&frame.data[..4], &[seed(i), seed(i), seed(i), 255]);
        }
        assert!(source.flush_cache(FLUSH));

        // End of stream: pass is complete, frame 0 comes back from disk
        let first = source.take_frame(true).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.format, FrameFormat::Yuva);
        assert_eq!(first.data[0], seed(0));
        assert_eq!(source.frame_count(), 10);
        assert_eq!(source.state(), FrameSourceState::CacheReplay);

        let cache_path = source.cache_path().unwrap().to_path_buf();
        let bytes = fs::read(&cache_path).unwrap();
        assert_eq!(&bytes[..8], &[10, 0, 0, 0, 10, 0, 0, 0]);
        assert!(bytes.len() as u64 > TABLE_SIZE);
    }

    #[test]
    fn test_pass_finalizes_cache_without_flush() {
        let fixture = Fixture::new();
        let mut source = fixture
            .source(FrameSourceConfig::cached(fixture.prefix()), 10)
            .unwrap();
        for i in 0..10 {
            assert_eq!(source.take_frame(true).unwrap().index, i);
        }

        // Stores may still be compressing; the header lands once they settle
        let mut ticks = 0;
        while source.state() != FrameSourceState::CacheReplay {
            assert!(ticks < 500, "cache never finalized");
            source.take_frame(true);
            std::thread::sleep(Duration::from_millis(10));
            ticks += 1;
        }
        assert_eq!(source.frame_count(), 10);

        let cache_path = source.cache_path().unwrap().to_path_buf();
        let bytes = fs::read(&cache_path).unwrap();
        assert_eq!(&bytes[..8], &[10, 0, 0, 0, 10, 0, 0, 0]);

        let frame = source.take_frame(true).unwrap();
        assert_eq!(frame.format, FrameFormat::Yuva);
    }

    #[test]
    fn test_reopen_replays_from_cache() {
        let fixture = Fixture::new();
        fixture.populate_cache(10);
        let opens_after_first_pass = fixture.opens();

        // The asset is no longer needed once the cache is complete
        fs::remove_file(&fixture.asset).unwrap();

        let mut source = fixture
            .source(FrameSourceConfig::cached(fixture.prefix()), 10)
            .unwrap();
        assert_eq!(source.state(), FrameSourceState::CacheReplay);
        assert_eq!(source.frame_count(), 10);
        assert_eq!(source.frame_rate(), 10);
        assert!((source.duration() - 1.0).abs() < f64::EPSILON);

        let frames: Vec<DecodedFrame> = (0..13).map(|_| source.take_frame(true).unwrap()).collect();
        assert_eq!(frames[12].index, 2);
        assert_eq!(frames[12].data, frames[2].data);
        assert_eq!(frames[2].data[0], seed(2));
        assert!(frames[9].is_last_frame);
        assert!(!frames[10].is_last_frame);
        assert_eq!(frames[0].bytes_per_row, 2 * WIDTH as usize);
        assert_eq!(fixture.opens(), opens_after_first_pass);
    }

    #[test]
    fn test_still_image() {
        let fixture = Fixture::new();
        let asset = fixture.dir.path().join("sticker.png");
        write_png(&asset, 4, 3);

        let mut source = FrameSource::with_decoders(
            &asset,
            WIDTH,
            HEIGHT,
            FrameSourceConfig::cached(fixture.prefix()),
            fixture.backend(10, None),
            &ImageCrateDecoder,
            CompressionPool::new(1).unwrap(),
        )
        .unwrap();
        assert_eq!(source.state(), FrameSourceState::StaticImage);
        assert_eq!(source.frame_count(), 1);
        assert_eq!(source.frame_rate(), 1);
        assert_eq!(source.duration(), 0.0);
        assert!(source.cache_path().is_none());
        assert!(!FrameCache::cache_path(&fixture.prefix(), WIDTH, HEIGHT).exists());

        let first = source.take_frame(true).unwrap();
        for _ in 0..3 {
            let frame = source.take_frame(true).unwrap();
            assert_eq!(frame.index, 0);
            assert!(frame.is_last_frame);
            assert_eq!(frame.total_frames, 1);
            assert_eq!(frame.data, first.data);
        }
        assert_eq!(&first.data[..4], &[50, 100, 200, 255]);
        assert_eq!(fixture.opens(), 0);
    }

    #[test]
    fn test_missing_asset() {
        let fixture = Fixture::new();
        fs::remove_file(&fixture.asset).unwrap();
        let result = fixture.source(FrameSourceConfig::uncached(), 10);
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_decoder_open_failure() {
        let fixture = Fixture::new();
        let result = fixture.source_with(FrameSourceConfig::uncached(), Box::new(FailingBackend));
        assert!(matches!(result, Err(Error::CodecNotSupported(_))));
    }

    #[test]
    fn test_zero_dimensions() {
        let fixture = Fixture::new();
        let result = FrameSource::with_decoders(
            &fixture.asset,
            0,
            HEIGHT,
            FrameSourceConfig::uncached(),
            fixture.backend(1, None),
            &ImageCrateDecoder,
            CompressionPool::new(1).unwrap(),
        );
        assert!(matches!(result, Err(Error::InvalidDimensions { .. })));
    }

    #[test]
    fn test_need_more_input_does_not_advance() {
        let fixture = Fixture::new();
        let backend = fixture.backend(5, Some(2));
        let mut source = fixture
            .source_with(FrameSourceConfig::uncached(), backend)
            .unwrap();

        assert_eq!(source.take_frame(true).unwrap().index, 0);
        assert_eq!(source.take_frame(true).unwrap().index, 1);
        assert!(source.take_frame(true).is_none());
        assert_eq!(source.frame_index(), 2);
        assert_eq!(source.take_frame(true).unwrap().index, 2);
    }

    #[test]
    fn test_skipped_frames_are_decoded_later() {
        let fixture = Fixture::new();
        let mut source = fixture.source(FrameSourceConfig::uncached(), 5).unwrap();

        assert!(source.take_frame(false).is_none());
        assert!(source.take_frame(false).is_none());
        let frame = source.take_frame(true).unwrap();
        assert_eq!(frame.index, 2);
        assert_eq!(frame.data[0], seed(2));
        assert_eq!(fixture.opens(), 1);
    }

    #[test]
    fn test_uncached_loop() {
        let fixture = Fixture::new();
        let mut source = fixture.source(FrameSourceConfig::uncached(), 3).unwrap();
        assert!(source.cache_path().is_none());

        for i in 0..3 {
            assert_eq!(source.take_frame(true).unwrap().index, i);
        }
        // End of stream with nothing cached
        assert!(source.take_frame(true).is_none());
        assert_eq!(source.frame_count(), 3);
        assert_eq!(source.state(), FrameSourceState::LiveDecode);

        let frame = source.take_frame(true).unwrap();
        assert_eq!(frame.index, 0);
        assert_eq!(frame.format, FrameFormat::Argb);
        assert_eq!(fixture.opens(), 2);
    }

    #[test]
    fn test_skip_past_end_in_live_decode() {
        let fixture = Fixture::new();
        let mut source = fixture.source(FrameSourceConfig::uncached(), 3).unwrap();
        for i in 0..3 {
            assert_eq!(source.take_frame(true).unwrap().index, i);
        }
        assert!(source.take_frame(true).is_none());
        assert_eq!(source.take_frame(true).unwrap().index, 0);
        assert_eq!(source.take_frame(true).unwrap().index, 1);

        // Two skipped ticks wrap past the end of the pass
        assert!(source.take_frame(false).is_none());
        assert!(source.take_frame(false).is_none());
        assert_eq!(source.frame_index(), 1);

        let frame = source.take_frame(true).unwrap();
        assert_eq!(frame.index, 1);
        assert_eq!(frame.data[0], seed(1));
        assert_eq!(source.frame_index(), 2);
    }

    #[test]
    fn test_first_frame_only_from_cache() {
        let fixture = Fixture::new();
        let config = FrameSourceConfig {
            prefer_cache_after_first_pass: false,
            ..FrameSourceConfig::cached(fixture.prefix())
        };
        let mut source = fixture.source(config, 4).unwrap();

        for _ in 0..4 {
            source.take_frame(true).unwrap();
        }
        assert!(source.flush_cache(FLUSH));

        let first = source.take_frame(true).unwrap();
        assert_eq!((first.index, first.format), (0, FrameFormat::Yuva));
        assert_eq!(source.state(), FrameSourceState::LiveDecode);

        let second = source.take_frame(true).unwrap();
        assert_eq!((second.index, second.format), (1, FrameFormat::Argb));
        assert_eq!(second.data[0], seed(1));
        assert!(!second.is_last_frame);
    }

    #[test]
    fn test_skip_in_replay() {
        let fixture = Fixture::new();
        fixture.populate_cache(10);
        let mut source = fixture
            .source(FrameSourceConfig::cached(fixture.prefix()), 10)
            .unwrap();

        source.skip_to_frame_index(17);
        assert_eq!(source.frame_index(), 7);
        assert_eq!(source.take_frame(true).unwrap().index, 7);

        source.skip_to_end();
        let last = source.take_frame(true).unwrap();
        assert_eq!(last.index, 9);
        assert!(last.is_last_frame);
        assert_eq!(source.take_frame(true).unwrap().index, 0);
    }

    #[test]
    fn test_corrupted_cache_falls_back_to_decoding() {
        let fixture = Fixture::new();
        fixture.populate_cache(6);

        let mut source = fixture
            .source(FrameSourceConfig::cached(fixture.prefix()), 6)
            .unwrap();
        assert_eq!(source.state(), FrameSourceState::CacheReplay);

        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .open(source.cache_path().unwrap())
                .unwrap();
            file.seek(SeekFrom::Start(FrameIndexEntry::position(0)))
                .unwrap();
            FrameIndexEntry {
                offset: TABLE_SIZE as i32,
                length: -1,
            }
            .write_to(&mut file)
            .unwrap();
        }

        assert!(source.take_frame(true).is_none());
        assert_eq!(source.state(), FrameSourceState::LiveDecode);

        let frame = source.take_frame(true).unwrap();
        assert_eq!((frame.index, frame.format), (0, FrameFormat::Argb));
        assert_eq!(source.frame_count(), 6);
    }

    #[test]
    fn test_use_cache_off_ignores_finalized_cache() {
        let fixture = Fixture::new();
        fixture.populate_cache(4);

        let config = FrameSourceConfig {
            use_cache: false,
            ..FrameSourceConfig::cached(fixture.prefix())
        };
        let mut source = fixture.source(config, 4).unwrap();
        assert_eq!(source.state(), FrameSourceState::LiveDecode);
        for i in 0..4 {
            let frame = source.take_frame(true).unwrap();
            assert_eq!((frame.index, frame.format), (i, FrameFormat::Argb));
        }

        // End of stream still takes frame 0 from the existing file
        let first = source.take_frame(true).unwrap();
        assert_eq!((first.index, first.format), (0, FrameFormat::Yuva));
        assert_eq!(source.state(), FrameSourceState::LiveDecode);

        let next = source.take_frame(true).unwrap();
        assert_eq!((next.index, next.format), (1, FrameFormat::Argb));
    }
}
