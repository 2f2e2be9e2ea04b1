//! Persistent frame cache
//!
//! One file per sticker and output size: a fixed header, a fixed-slot frame
//! directory and an append-only region of compressed YUVA frames. See
//! [`format`] for the byte layout.
//!
//! The cache has exactly one owner. Stores are compressed on a
//! [`CompressionPool`] and the results come back over a channel that only
//! the owner drains, so every file mutation and every directory read happens
//! on the owner's thread.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::codec::Decompressor;
use crate::convert::{self, FrameGeometry};
use crate::error::{Error, Result};
use crate::threading::{CompressJob, CompressedFrame, CompressionPool};

pub mod format;

pub use format::{
    CacheHeader, EntryState, FrameIndexEntry, CACHE_EXTENSION, FORMAT_VERSION, MAX_FILE_SIZE,
    MAX_FRAME_COUNT, TABLE_SIZE,
};

/// Disk-backed cache of decoded sticker frames
pub struct FrameCache {
    path: PathBuf,
    file: File,
    width: usize,
    height: usize,

    /// Header as last read or written
    header: CacheHeader,

    /// Indices submitted for compression and not yet applied
    in_flight: HashSet<usize>,

    /// Indices with a directory entry written or confirmed by this instance
    stored: HashSet<usize>,

    /// Blobs appended by this instance, never reset
    frames_written: usize,

    /// Finalize request waiting for in-flight stores
    pending_finalize: Option<CacheHeader>,

    decompressor: Decompressor,
    pool: Arc<CompressionPool>,
    completed_tx: Sender<CompressedFrame>,
    completed_rx: Receiver<CompressedFrame>,
}

impl FrameCache {
    /// File path for a sticker's cache at the given output size
    pub fn cache_path(prefix: &Path, width: u32, height: u32) -> PathBuf {
        let mut name = OsString::from(prefix.as_os_str());
        name.push(format!(
            "_{}x{}-v{}.{}",
            width, height, FORMAT_VERSION, CACHE_EXTENSION
        ));
        PathBuf::from(name)
    }

    /// Open or create the cache file for `prefix` at `width`x`height`.
    ///
    /// The directory is kept only if the file already holds a finalized
    /// header; anything else is reinitialized to an empty table.
    pub fn open(
        prefix: &Path,
        width: u32,
        height: u32,
        pool: Arc<CompressionPool>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }

        let path = Self::cache_path(prefix, width, height);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| Error::CacheOpen {
                path: path.clone(),
                source,
            })?;

        let (width, height) = (width as usize, height as usize);
        let (completed_tx, completed_rx) = unbounded();

        let mut cache = Self {
            path,
            file,
            width,
            height,
            header: CacheHeader::default(),
            in_flight: HashSet::new(),
            stored: HashSet::new(),
            frames_written: 0,
            pending_finalize: None,
            decompressor: Decompressor::new(convert::yuva_len(width, height)),
            pool,
            completed_tx,
            completed_rx,
        };

        if let Err(source) = cache.initialize_frame_table() {
            return Err(Error::CacheOpen {
                path: cache.path.clone(),
                source,
            });
        }

        log::debug!(
            "Opened frame cache {} (finalized: {})",
            cache.path.display(),
            cache.header.is_finalized()
        );
        Ok(cache)
    }

    /// [`FrameCache::open`], deleting the file and retrying once on failure
    pub fn open_with_retry(
        prefix: &Path,
        width: u32,
        height: u32,
        pool: Arc<CompressionPool>,
    ) -> Result<Self> {
        match Self::open(prefix, width, height, pool.clone()) {
            Ok(cache) => Ok(cache),
            Err(e) => {
                log::warn!("Frame cache open failed, retrying: {}", e);
                let _ = fs::remove_file(Self::cache_path(prefix, width, height));
                Self::open(prefix, width, height, pool)
            }
        }
    }

    fn initialize_frame_table(&mut self) -> io::Result<()> {
        let size = self.file.metadata()?.len();
        if size >= TABLE_SIZE {
            if let Ok(header) = self.read_header() {
                if header.is_finalized() {
                    self.header = header;
                    return Ok(());
                }
            }
        }
        self.reset_table()
    }

    fn reset_table(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&vec![0u8; TABLE_SIZE as usize])?;
        self.header = CacheHeader::default();
        Ok(())
    }

    fn read_header(&mut self) -> io::Result<CacheHeader> {
        self.file.seek(SeekFrom::Start(0))?;
        CacheHeader::read_from(&mut self.file)
    }

    fn read_entry(&mut self, index: usize) -> io::Result<FrameIndexEntry> {
        self.file
            .seek(SeekFrom::Start(FrameIndexEntry::position(index)))?;
        FrameIndexEntry::read_from(&mut self.file)
    }

    /// Truncate and start over with an empty directory
    fn heal(&mut self) {
        if let Err(e) = self.reset_table() {
            log::error!("Failed to reset frame cache {}: {}", self.path.display(), e);
        }
        self.stored.clear();
        self.pending_finalize = None;
    }

    /// Queue a raw ARGB frame for compression and storage.
    ///
    /// Returns `false` without doing anything if `index` is out of range, is
    /// already stored or in flight, or the frame does not match the cache size.
    pub fn store_raw_frame(&mut self, index: usize, argb: Vec<u8>, geometry: FrameGeometry) -> bool {
        self.poll();

        if index >= MAX_FRAME_COUNT {
            return false;
        }
        if self.in_flight.contains(&index) || self.stored.contains(&index) {
            return false;
        }
        if geometry.width != self.width || geometry.height != self.height {
            log::debug!(
                "Frame {} is {}x{}, cache holds {}x{}",
                index,
                geometry.width,
                geometry.height,
                self.width,
                self.height
            );
            return false;
        }

        let job = CompressJob {
            index,
            argb,
            geometry,
            reply: self.completed_tx.clone(),
        };
        match self.pool.submit(job) {
            Ok(()) => {
                self.in_flight.insert(index);
                true
            }
            Err(e) => {
                log::warn!("Could not queue frame {} for compression: {}", index, e);
                false
            }
        }
    }

    /// Read and decompress frame `index` as YUVA.
    ///
    /// Returns `None` on any miss. A directory entry that fails validation
    /// resets the whole cache.
    pub fn read_frame(&mut self, index: usize) -> Option<Vec<u8>> {
        self.poll();

        if index >= MAX_FRAME_COUNT {
            return None;
        }
        if self.header.is_finalized() && index >= self.header.frame_count as usize {
            return None;
        }

        let state = match self.read_entry(index) {
            Ok(entry) => entry.state(),
            Err(e) => {
                log::debug!("Unreadable directory entry {}: {}", index, e);
                EntryState::Corrupted
            }
        };

        match state {
            EntryState::Empty => None,
            EntryState::Stored { offset, length } => self.read_blob(index, offset, length),
            EntryState::Corrupted => {
                log::warn!(
                    "{} in {}, resetting",
                    Error::CorruptedDirectoryEntry { index },
                    self.path.display()
                );
                self.heal();
                None
            }
        }
    }

    fn read_blob(&mut self, index: usize, offset: u64, length: usize) -> Option<Vec<u8>> {
        let mut compressed = vec![0u8; length];
        let read = self
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(&mut compressed));
        if let Err(e) = read {
            log::debug!("Short read for cached frame {}: {}", index, e);
            return None;
        }

        let frame_len = self.frame_len();
        match self.decompressor.decompress(&compressed, frame_len) {
            Ok(frame) => Some(frame.to_vec()),
            Err(e) => {
                log::debug!("Cached frame {} unusable: {}", index, e);
                None
            }
        }
    }

    /// Persist frame rate and frame count
    pub fn finalize(&mut self, frame_rate: u32, frame_count: usize) -> Result<()> {
        if frame_rate == 0 || frame_rate > i32::MAX as u32 {
            return Err(Error::InvalidFormat(format!("frame rate {}", frame_rate)));
        }
        if frame_count == 0 || frame_count > MAX_FRAME_COUNT {
            return Err(Error::InvalidFormat(format!("frame count {}", frame_count)));
        }

        let header = CacheHeader {
            frame_rate: frame_rate as i32,
            frame_count: frame_count as i32,
        };
        self.file.seek(SeekFrom::Start(0))?;
        header.write_to(&mut self.file)?;
        self.header = header;

        log::info!(
            "Finalized frame cache {}: {} frames @ {} fps",
            self.path.display(),
            frame_count,
            frame_rate
        );
        Ok(())
    }

    /// Finalize once in-flight stores land, if exactly `frame_count` frames
    /// ended up stored.
    pub fn finalize_when_settled(&mut self, frame_rate: u32, frame_count: usize) {
        self.pending_finalize = Some(CacheHeader {
            frame_rate: frame_rate.min(i32::MAX as u32) as i32,
            frame_count: frame_count.min(i32::MAX as usize) as i32,
        });
        self.poll();
    }

    /// Apply compression results that have arrived
    pub fn poll(&mut self) {
        while let Ok(done) = self.completed_rx.try_recv() {
            self.apply(done);
        }
        self.settle();
    }

    /// Wait up to `timeout` for every in-flight store to land.
    ///
    /// Returns `true` if nothing is left in flight.
    pub fn flush(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.in_flight.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completed_rx.recv_timeout(remaining) {
                Ok(done) => self.apply(done),
                Err(_) => break,
            }
        }
        self.poll();
        self.in_flight.is_empty()
    }

    fn apply(&mut self, done: CompressedFrame) {
        let CompressedFrame { index, result } = done;
        self.in_flight.remove(&index);

        let compressed = match result {
            Ok(compressed) => compressed,
            Err(e) => {
                log::debug!("Dropping frame {}: {}", index, e);
                return;
            }
        };

        match self.append_frame(index, &compressed) {
            Ok(true) => {
                self.stored.insert(index);
                self.frames_written += 1;
                log::trace!("Stored frame {} ({} bytes)", index, compressed.len());
            }
            Ok(false) => {
                self.stored.insert(index);
            }
            Err(e) => log::warn!("Failed to store frame {}: {}", index, e),
        }
    }

    /// Append a blob and point its directory entry at it.
    ///
    /// Returns `Ok(false)` if the slot was already populated.
    fn append_frame(&mut self, index: usize, compressed: &[u8]) -> io::Result<bool> {
        match self.read_entry(index)?.state() {
            EntryState::Empty => {}
            EntryState::Stored { .. } => return Ok(false),
            EntryState::Corrupted => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "corrupted directory entry",
                ))
            }
        }

        let end = self.file.seek(SeekFrom::End(0))?;
        if end as i64 + compressed.len() as i64 > MAX_FILE_SIZE {
            return Err(io::Error::new(io::ErrorKind::Other, "frame cache is full"));
        }

        // Blob before entry: an entry never points past the end of the file
        self.file.write_all(compressed)?;
        let entry = FrameIndexEntry {
            offset: end as i32,
            length: compressed.len() as i32,
        };
        self.file
            .seek(SeekFrom::Start(FrameIndexEntry::position(index)))?;
        entry.write_to(&mut self.file)?;
        Ok(true)
    }

    fn settle(&mut self) {
        if !self.in_flight.is_empty() {
            return;
        }
        let Some(target) = self.pending_finalize.take() else {
            return;
        };

        if self.stored.len() == target.frame_count as usize {
            if let Err(e) = self.finalize(target.frame_rate as u32, target.frame_count as usize) {
                log::warn!("Failed to finalize {}: {}", self.path.display(), e);
            }
        } else {
            log::warn!(
                "Frame cache {} holds {} frames, decoder produced {}; not finalizing",
                self.path.display(),
                self.stored.len(),
                target.frame_count
            );
        }
    }

    /// Whether a full pass has been persisted
    pub fn is_finalized(&self) -> bool {
        self.header.is_finalized()
    }

    /// Persisted frame rate, 0 until finalized
    pub fn frame_rate(&self) -> u32 {
        if self.is_finalized() {
            self.header.frame_rate as u32
        } else {
            0
        }
    }

    /// Persisted frame count, 0 until finalized
    pub fn frame_count(&self) -> usize {
        if self.is_finalized() {
            self.header.frame_count as usize
        } else {
            0
        }
    }

    /// Frames stored by this instance
    pub fn stored_frame_count(&self) -> usize {
        self.stored.len()
    }

    /// Frames submitted and still compressing
    pub fn pending_frame_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Frames stored or on their way
    pub fn accounted_frame_count(&self) -> usize {
        self.stored.len() + self.in_flight.len()
    }

    /// Length of one decoded YUVA frame
    pub fn frame_len(&self) -> usize {
        convert::yuva_len(self.width, self.height)
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
}

impl Drop for FrameCache {
    fn drop(&mut self) {
        if self.header.is_finalized() || self.frames_written > 0 {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed empty frame cache {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("header", &self.header)
            .field("stored", &self.stored.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
