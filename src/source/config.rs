//! Frame source configuration

use std::path::PathBuf;

/// Default frame rate ceiling
pub const DEFAULT_MAX_FRAME_RATE: u32 = 30;

/// Frame source configuration
#[derive(Debug, Clone)]
pub struct FrameSourceConfig {
    /// Cache file prefix; `None` disables the frame cache entirely
    pub cache_path_prefix: Option<PathBuf>,

    /// Serve frames from a finalized cache
    pub use_cache: bool,

    /// Stop decoding and replay from the cache once a live pass finalizes it
    pub prefer_cache_after_first_pass: bool,

    /// Frame rates reported by the decoder are capped to this
    pub max_frame_rate: u32,

    /// Prefer the libvpx VP9 decoder, which keeps the alpha plane
    pub hint_vp9: bool,

    /// Compression workers (0 = shared process-wide pool)
    pub compression_threads: usize,
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self {
            cache_path_prefix: None,
            use_cache: true,
            prefer_cache_after_first_pass: true,
            max_frame_rate: DEFAULT_MAX_FRAME_RATE,
            hint_vp9: true,
            compression_threads: 0,
        }
    }
}

impl FrameSourceConfig {
    /// Cache decoded frames under `prefix`
    pub fn cached(prefix: impl Into<PathBuf>) -> Self {
        Self {
            cache_path_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Always decode live, never touch the disk
    pub fn uncached() -> Self {
        Self {
            cache_path_prefix: None,
            use_cache: false,
            prefer_cache_after_first_pass: false,
            ..Self::default()
        }
    }

    /// Decoder frame rate after capping, never below 1
    pub(crate) fn cap_frame_rate(&self, frame_rate: f64) -> u32 {
        let ceiling = self.max_frame_rate.max(1);
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return ceiling;
        }
        (frame_rate.round() as u32).clamp(1, ceiling)
    }
}
