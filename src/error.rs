//! Error types for vsticker-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vsticker-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sticker decoding and frame caching
#[derive(Error, Debug)]
pub enum Error {
    /// Sticker asset not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Cache file could not be opened or initialized
    #[error("Cannot open frame cache {path}: {source}")]
    CacheOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory entry failed validation
    #[error("Corrupted directory entry for frame {index}")]
    CorruptedDirectoryEntry { index: usize },

    /// Invalid or unsupported format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Codec not supported
    #[error("Codec not supported: {0}")]
    CodecNotSupported(String),

    /// Decode error
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Still image decode error
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// Frame compression error
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Frame decompression error
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// Target or source dimensions are unusable
    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Memory allocation error
    #[error("Memory allocation failed")]
    Memory,

    /// Invalid handle
    #[error("Invalid frame source handle")]
    InvalidHandle,

    /// FFmpeg error with code
    #[error("FFmpeg error {code}: {message}")]
    FFmpeg { code: i32, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel error
    #[error("Channel error: {0}")]
    Channel(String),
}

impl Error {
    /// Convert to FFI error code
    pub fn to_ffi_code(&self) -> i32 {
        match self {
            Error::FileNotFound(_) => 1,
            Error::InvalidFormat(_) => 2,
            Error::CodecNotSupported(_) => 3,
            Error::DecodeFailed(_) | Error::ImageDecode(_) => 4,
            Error::CacheOpen { .. } | Error::CorruptedDirectoryEntry { .. } => 5,
            Error::Memory => 6,
            Error::InvalidHandle => 7,
            Error::InvalidDimensions { .. } => 8,
            Error::FFmpeg { code, .. } => *code,
            Error::Io(_) => 1,
            Error::Compression(_) | Error::Decompression(_) | Error::Channel(_) => 99,
        }
    }

    /// Create from FFmpeg error code
    pub fn from_ffmpeg(code: i32) -> Self {
        let message = match code {
            -2 => "No such file or directory",
            -5 => "Input/output error",
            -11 => "Resource temporarily unavailable",
            -12 => "Cannot allocate memory",
            -22 => "Invalid argument",
            -1094995529 => "Invalid data found",
            -541478725 => "End of file",
            _ => "Unknown FFmpeg error",
        };

        Error::FFmpeg {
            code,
            message: message.to_string(),
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(e: crossbeam_channel::SendError<T>) -> Self {
        Error::Channel(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::FileNotFound(PathBuf::new()).to_ffi_code(), 1);
        assert_eq!(Error::Memory.to_ffi_code(), 6);
        assert_eq!(Error::CorruptedDirectoryEntry { index: 3 }.to_ffi_code(), 5);
    }

    #[test]
    fn test_ffmpeg_error() {
        let err = Error::from_ffmpeg(-2);
        assert!(matches!(err, Error::FFmpeg { code: -2, .. }));
    }

    #[test]
    fn test_channel_error_conversion() {
        let (tx, rx) = crossbeam_channel::unbounded::<u8>();
        drop(rx);
        let err: Error = tx.send(1).unwrap_err().into();
        assert!(matches!(err, Error::Channel(_)));
    }
}
