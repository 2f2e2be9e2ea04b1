//! Build script for vsticker-core
//!
//! This script:
//! 1. Locates FFmpeg libraries using pkg-config (`ffmpeg` feature only)
//! 2. Generates the C header using cbindgen

use std::env;
use std::path::{Path, PathBuf};

const HEADER_NAME: &str = "vsticker_core.h";

fn main() {
    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");

    // The C API only exists with the FFmpeg backend
    if env::var_os("CARGO_FEATURE_FFMPEG").is_some() {
        find_ffmpeg_libs();
        generate_header(&manifest_dir, &out_dir);
    }
}

/// Find FFmpeg libraries using pkg-config or fallback paths
fn find_ffmpeg_libs() {
    let libs = ["libavcodec", "libavformat", "libavutil", "libswscale"];

    let mut found_all = true;
    for lib in &libs {
        match pkg_config::Config::new()
            .atleast_version("58.0.0") // FFmpeg 6.0+
            .probe(lib)
        {
            Ok(library) => {
                println!("cargo:info=Found {} via pkg-config", lib);
                for path in &library.link_paths {
                    println!("cargo:rustc-link-search=native={}", path.display());
                }
            }
            Err(e) => {
                println!("cargo:warning=pkg-config failed for {}: {}", lib, e);
                found_all = false;
            }
        }
    }

    if !found_all {
        try_fallback_paths();
    }
}

/// Try common FFmpeg installation paths
fn try_fallback_paths() {
    let lib_paths = [
        // Apple Silicon Homebrew
        "/opt/homebrew/opt/ffmpeg/lib",
        "/opt/homebrew/lib",
        // Intel Homebrew, Linux distributions
        "/usr/local/opt/ffmpeg/lib",
        "/usr/local/lib",
        "/usr/lib/x86_64-linux-gnu",
        "/usr/lib/aarch64-linux-gnu",
    ];

    for path in &lib_paths {
        if Path::new(path).exists() {
            println!("cargo:rustc-link-search=native={}", path);
            println!("cargo:info=Added link path: {}", path);
        }
    }

    println!("cargo:rustc-link-lib=dylib=avcodec");
    println!("cargo:rustc-link-lib=dylib=avformat");
    println!("cargo:rustc-link-lib=dylib=avutil");
    println!("cargo:rustc-link-lib=dylib=swscale");
}

/// Generate C header using cbindgen
fn generate_header(manifest_dir: &str, out_dir: &str) {
    let crate_dir = PathBuf::from(manifest_dir);
    let config_path = crate_dir.join("cbindgen.toml");
    let header_out = PathBuf::from(out_dir).join(HEADER_NAME);

    let config = if config_path.exists() {
        cbindgen::Config::from_file(&config_path).unwrap_or_default()
    } else {
        cbindgen::Config::default()
    };

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(&header_out);
            println!("cargo:info=Generated header: {}", header_out.display());

            // Also copy next to the crate for host projects that vendor it
            let include_dir = crate_dir.join("include");
            if include_dir.exists() {
                bindings.write_to_file(include_dir.join(HEADER_NAME));
            }
        }
        Err(e) => {
            println!("cargo:warning=cbindgen failed: {}", e);
            create_fallback_header(out_dir);
        }
    }
}

/// Create a minimal fallback header if cbindgen fails
fn create_fallback_header(out_dir: &str) {
    let header_content = r#"
#ifndef VSTICKER_CORE_H
#define VSTICKER_CORE_H

#include <stdint.h>
#include <stdbool.h>
#include <stddef.h>

// Note: This is a fallback header. Build with cbindgen for full API.

typedef enum {
    VsfResultSuccess = 0,
    VsfResultErrorFileNotFound = 1,
    VsfResultErrorInvalidFormat = 2,
    VsfResultErrorCodecNotSupported = 3,
    VsfResultErrorDecodeFailed = 4,
    VsfResultErrorCache = 5,
    VsfResultErrorMemory = 6,
    VsfResultErrorInvalidHandle = 7,
    VsfResultErrorInvalidDimensions = 8,
    VsfResultErrorUnknown = 99,
} VsfResult;

typedef struct VsfFrameSourceHandle VsfFrameSourceHandle;
typedef struct VsfFrameHandle VsfFrameHandle;

typedef struct {
    const char* cache_path_prefix;
    bool use_cache;
    bool prefer_cache_after_first_pass;
    uint32_t max_frame_rate;
    bool hint_vp9;
    uint32_t compression_threads;
} VsfFrameSourceConfig;

typedef struct {
    const uint8_t* data;
    size_t data_size;
    uint32_t width;
    uint32_t height;
    uint32_t bytes_per_row;
    uint32_t index;
    bool is_last_frame;
    uint32_t total_frames;
    uint8_t format;
    bool requires_alpha_premultiply;
} VsfFrame;

typedef struct {
    uint32_t width;
    uint32_t height;
    uint32_t frame_rate;
    uint32_t frame_count;
    uint32_t frame_index;
    double duration;
    uint8_t state;
} VsfFrameSourceInfo;

// Library
void vsf_init(void);
const char* vsf_get_version(void);
const char* vsf_get_last_error(void);
void vsf_clear_last_error(void);

// Frame source lifecycle
VsfFrameSourceHandle* vsf_frame_source_create(const char* path, uint32_t width, uint32_t height,
                                              const VsfFrameSourceConfig* config);
void vsf_frame_source_destroy(VsfFrameSourceHandle* handle);

// Playback
VsfResult vsf_frame_source_take_frame(VsfFrameSourceHandle* handle, bool draw,
                                      VsfFrameHandle** out_frame);
VsfResult vsf_frame_source_get_info(const VsfFrameSourceHandle* handle,
                                    VsfFrameSourceInfo* out_info);
VsfResult vsf_frame_source_skip_to_end(VsfFrameSourceHandle* handle);
VsfResult vsf_frame_source_skip_to_frame_index(VsfFrameSourceHandle* handle, uint32_t index);

// Frames
void vsf_frame_get_data(const VsfFrameHandle* frame, VsfFrame* out_frame);
void vsf_frame_release(VsfFrameHandle* frame);

#endif // VSTICKER_CORE_H
"#;

    let header_path = PathBuf::from(out_dir).join(HEADER_NAME);
    std::fs::write(&header_path, header_content).expect("Failed to write fallback header");
    println!("cargo:info=Created fallback header: {}", header_path.display());
}
