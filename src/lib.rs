//! vsticker-core - frame decoding and caching for animated video stickers
//!
//! This crate turns a video sticker file into display-ready frames:
//! - FFmpeg decoding using ffmpeg-next (VP9 with alpha via libvpx)
//! - Still image stickers via the `image` crate
//! - A persistent per-sticker frame cache so loops and re-opens skip decoding
//! - Background compression of cached frames on worker threads
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           FFI Layer                  │
//! │  (C exports via #[no_mangle])        │
//! └─────────────────────────────────────┘
//!                  │
//!                  ▼
//! ┌─────────────────────────────────────┐
//! │         Source Module                │
//! │  (static / replay / live decode)     │
//! └─────────────────────────────────────┘
//!          │                │
//!          ▼                ▼
//! ┌────────────────┐ ┌─────────────────┐
//! │ Decoder Module │ │  Cache Module   │
//! │ (ffmpeg-next,  │ │ (file format,   │
//! │  image)        │ │  self-healing)  │
//! └────────────────┘ └─────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────┐
//! │        Threading Module              │
//! │  (YUVA conversion + LZ4 workers)     │
//! └─────────────────────────────────────┘
//! ```

pub mod cache;
pub mod codec;
pub mod convert;
pub mod decoder;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffi;
pub mod source;
pub mod threading;

// Re-export main types
pub use cache::FrameCache;
pub use convert::FrameGeometry;
pub use decoder::{StillImageDecoder, VideoBackend, VideoDecoder};
pub use error::{Error, Result};
pub use source::{DecodedFrame, FrameFormat, FrameSource, FrameSourceConfig, FrameSourceState};
pub use threading::CompressionPool;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library (call once at startup)
pub fn init() {
    // Initialize logging with info level by default if RUST_LOG is not set
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();

    log::info!("vsticker-core {} initialized", VERSION);
}
