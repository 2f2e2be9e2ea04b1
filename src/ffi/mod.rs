//! FFI exports for C/Swift interop
//!
//! All functions in this module are exported with `#[no_mangle]`
//! and use C-compatible types for cross-language interop.

use std::ffi::{c_char, CStr, CString};
use std::path::PathBuf;
use std::ptr;

use parking_lot::Mutex;

use crate::error::Error;
use crate::source::{DecodedFrame, FrameSource, FrameSourceConfig};

// Thread-local error storage
thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = std::cell::RefCell::new(None);
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

// =============================================================================
// Result Type
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VsfResult {
    Success = 0,
    ErrorFileNotFound = 1,
    ErrorInvalidFormat = 2,
    ErrorCodecNotSupported = 3,
    ErrorDecodeFailed = 4,
    ErrorCache = 5,
    ErrorMemory = 6,
    ErrorInvalidHandle = 7,
    ErrorInvalidDimensions = 8,
    ErrorUnknown = 99,
}

impl From<Error> for VsfResult {
    fn from(e: Error) -> Self {
        set_last_error(&e.to_string());
        match e {
            Error::FileNotFound(_) | Error::Io(_) => VsfResult::ErrorFileNotFound,
            Error::InvalidFormat(_) => VsfResult::ErrorInvalidFormat,
            Error::CodecNotSupported(_) => VsfResult::ErrorCodecNotSupported,
            Error::DecodeFailed(_) | Error::ImageDecode(_) => VsfResult::ErrorDecodeFailed,
            Error::CacheOpen { .. } | Error::CorruptedDirectoryEntry { .. } => {
                VsfResult::ErrorCache
            }
            Error::Memory => VsfResult::ErrorMemory,
            Error::InvalidHandle => VsfResult::ErrorInvalidHandle,
            Error::InvalidDimensions { .. } => VsfResult::ErrorInvalidDimensions,
            _ => VsfResult::ErrorUnknown,
        }
    }
}

// =============================================================================
// Opaque Handles
// =============================================================================

/// Opaque frame source handle
pub struct VsfFrameSourceHandle {
    source: Mutex<FrameSource>,
}

/// Opaque frame handle (owns the data)
pub struct VsfFrameHandle {
    frame: DecodedFrame,
}

// =============================================================================
// Error Handling
// =============================================================================

/// Get last error message
#[no_mangle]
pub extern "C" fn vsf_get_last_error() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().as_ref().map(|s| s.as_ptr()).unwrap_or(ptr::null()))
}

/// Clear last error
#[no_mangle]
pub extern "C" fn vsf_clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Initialize the library (sets up logging).
/// Call once at application startup.
#[no_mangle]
pub extern "C" fn vsf_init() {
    crate::init();
}

static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Get library version
#[no_mangle]
pub extern "C" fn vsf_get_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

// =============================================================================
// Configuration (FFI)
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VsfFrameSourceConfig {
    /// Cache file prefix, null disables the frame cache
    pub cache_path_prefix: *const c_char,
    pub use_cache: bool,
    pub prefer_cache_after_first_pass: bool,
    pub max_frame_rate: u32,
    pub hint_vp9: bool,
    /// 0 = shared pool
    pub compression_threads: u32,
}

fn c_path(ptr: *const c_char, what: &str) -> Option<PathBuf> {
    let s = unsafe { CStr::from_ptr(ptr) };
    match s.to_str() {
        Ok(s) => Some(PathBuf::from(s)),
        Err(_) => {
            set_last_error(&format!("Invalid UTF-8 in {}", what));
            None
        }
    }
}

fn source_config(config: &VsfFrameSourceConfig) -> Option<FrameSourceConfig> {
    let cache_path_prefix = if config.cache_path_prefix.is_null() {
        None
    } else {
        Some(c_path(config.cache_path_prefix, "cache path prefix")?)
    };

    Some(FrameSourceConfig {
        cache_path_prefix,
        use_cache: config.use_cache,
        prefer_cache_after_first_pass: config.prefer_cache_after_first_pass,
        max_frame_rate: config.max_frame_rate,
        hint_vp9: config.hint_vp9,
        compression_threads: config.compression_threads as usize,
    })
}

// =============================================================================
// Frame Source Lifecycle
// =============================================================================

/// Create a frame source; returns null and sets the last error on failure
#[no_mangle]
pub extern "C" fn vsf_frame_source_create(
    path: *const c_char,
    width: u32,
    height: u32,
    config: *const VsfFrameSourceConfig,
) -> *mut VsfFrameSourceHandle {
    if path.is_null() {
        set_last_error("Path is null");
        return ptr::null_mut();
    }
    let Some(path) = c_path(path, "path") else {
        return ptr::null_mut();
    };

    let config = if config.is_null() {
        FrameSourceConfig::default()
    } else {
        match source_config(unsafe { &*config }) {
            Some(config) => config,
            None => return ptr::null_mut(),
        }
    };

    match FrameSource::open(&path, width, height, config) {
        Ok(source) => Box::into_raw(Box::new(VsfFrameSourceHandle {
            source: Mutex::new(source),
        })),
        Err(e) => {
            let message = e.to_string();
            let code = VsfResult::from(e);
            log::debug!(
                "vsf_frame_source_create({}) failed with {:?}: {}",
                path.display(),
                code,
                message
            );
            ptr::null_mut()
        }
    }
}

/// Destroy a frame source
#[no_mangle]
pub extern "C" fn vsf_frame_source_destroy(handle: *mut VsfFrameSourceHandle) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Frame data for FFI, valid until the frame handle is released
#[repr(C)]
pub struct VsfFrame {
    /// Pixel data pointer
    pub data: *const u8,
    /// Data size in bytes
    pub data_size: usize,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    /// Position in the animation
    pub index: u32,
    pub is_last_frame: bool,
    pub total_frames: u32,
    /// 0 = ARGB, 1 = YUVA
    pub format: u8,
    pub requires_alpha_premultiply: bool,
}

/// Produce the next frame.
///
/// On success `*out_frame` is a new frame handle, or null if there is no
/// frame this tick.
#[no_mangle]
pub extern "C" fn vsf_frame_source_take_frame(
    handle: *mut VsfFrameSourceHandle,
    draw: bool,
    out_frame: *mut *mut VsfFrameHandle,
) -> VsfResult {
    if handle.is_null() || out_frame.is_null() {
        return Error::InvalidHandle.into();
    }

    let handle = unsafe { &*handle };
    let frame = handle.source.lock().take_frame(draw);

    let frame_ptr = match frame {
        Some(frame) => Box::into_raw(Box::new(VsfFrameHandle { frame })),
        None => ptr::null_mut(),
    };
    unsafe {
        *out_frame = frame_ptr;
    }
    VsfResult::Success
}

/// Get frame data from handle
#[no_mangle]
pub extern "C" fn vsf_frame_get_data(frame_handle: *const VsfFrameHandle, out_frame: *mut VsfFrame) {
    if frame_handle.is_null() || out_frame.is_null() {
        return;
    }

    let frame_handle = unsafe { &*frame_handle };
    let frame = &frame_handle.frame;

    unsafe {
        (*out_frame).data = frame.data_ptr();
        (*out_frame).data_size = frame.data_size();
        (*out_frame).width = frame.width as u32;
        (*out_frame).height = frame.height as u32;
        (*out_frame).bytes_per_row = frame.bytes_per_row as u32;
        (*out_frame).index = frame.index as u32;
        (*out_frame).is_last_frame = frame.is_last_frame;
        (*out_frame).total_frames = frame.total_frames as u32;
        (*out_frame).format = frame.format as u8;
        (*out_frame).requires_alpha_premultiply = frame.requires_alpha_premultiply;
    }
}

/// Release frame handle
#[no_mangle]
pub extern "C" fn vsf_frame_release(frame_handle: *mut VsfFrameHandle) {
    if !frame_handle.is_null() {
        unsafe {
            drop(Box::from_raw(frame_handle));
        }
    }
}

// =============================================================================
// Playback Position
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VsfFrameSourceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// 0 until the first pass completes
    pub frame_count: u32,
    pub frame_index: u32,
    pub duration: f64,
    /// 0 = static image, 1 = cache replay, 2 = live decode
    pub state: u8,
}

/// Get playback parameters
#[no_mangle]
pub extern "C" fn vsf_frame_source_get_info(
    handle: *const VsfFrameSourceHandle,
    out_info: *mut VsfFrameSourceInfo,
) -> VsfResult {
    if handle.is_null() || out_info.is_null() {
        return Error::InvalidHandle.into();
    }

    let handle = unsafe { &*handle };
    let source = handle.source.lock();
    let info = VsfFrameSourceInfo {
        width: source.width() as u32,
        height: source.height() as u32,
        frame_rate: source.frame_rate(),
        frame_count: source.frame_count() as u32,
        frame_index: source.frame_index() as u32,
        duration: source.duration(),
        state: source.state() as u8,
    };

    unsafe {
        *out_info = info;
    }
    VsfResult::Success
}

/// Make the last frame of the pass the next one
#[no_mangle]
pub extern "C" fn vsf_frame_source_skip_to_end(handle: *mut VsfFrameSourceHandle) -> VsfResult {
    if handle.is_null() {
        return Error::InvalidHandle.into();
    }
    let handle = unsafe { &*handle };
    handle.source.lock().skip_to_end();
    VsfResult::Success
}

/// Make `index` the next frame
#[no_mangle]
pub extern "C" fn vsf_frame_source_skip_to_frame_index(
    handle: *mut VsfFrameSourceHandle,
    index: u32,
) -> VsfResult {
    if handle.is_null() {
        return Error::InvalidHandle.into();
    }
    let handle = unsafe { &*handle };
    handle.source.lock().skip_to_frame_index(index as usize);
    VsfResult::Success
}
