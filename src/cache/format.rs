//! Binary layout of frame cache files.
//!
//! ```text
//! offset 0      i32 frame_rate
//! offset 4      i32 frame_count            0 = not finalized
//! offset 8      [MAX_FRAME_COUNT] x { i32 offset, i32 length }
//! TABLE_SIZE    compressed frames, append-only
//! ```
//!
//! All integers are little-endian.

use std::io::{self, Read, Write};

/// Slots in the frame directory (30 fps for 10 seconds)
pub const MAX_FRAME_COUNT: usize = 30 * 10;

/// Bumped whenever the stored frame encoding changes
pub const FORMAT_VERSION: u32 = 3;

/// File extension of cache files
pub const CACHE_EXTENSION: &str = "vstickerframecache";

/// Any `offset + length` past this is treated as corruption
pub const MAX_FILE_SIZE: i64 = 100 * 1024 * 1024;

/// Header plus directory
pub const TABLE_SIZE: u64 = (CacheHeader::SIZE + MAX_FRAME_COUNT * FrameIndexEntry::SIZE) as u64;

/// Playback parameters persisted once a full pass is stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheHeader {
    pub frame_rate: i32,
    pub frame_count: i32,
}

impl CacheHeader {
    pub const SIZE: usize = 8;

    /// Both fields are set and the frame count fits the directory
    pub fn is_finalized(&self) -> bool {
        self.frame_rate > 0 && self.frame_count > 0 && self.frame_count as usize <= MAX_FRAME_COUNT
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.frame_rate.to_le_bytes())?;
        w.write_all(&self.frame_count.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf4)?;
        let frame_rate = i32::from_le_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let frame_count = i32::from_le_bytes(buf4);

        Ok(Self {
            frame_rate,
            frame_count,
        })
    }
}

/// Location of one compressed frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameIndexEntry {
    pub offset: i32,
    pub length: i32,
}

/// What a directory entry says about its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Slot never written
    Empty,
    /// Blob at `offset .. offset + length`
    Stored { offset: u64, length: usize },
    /// Entry fails validation
    Corrupted,
}

impl FrameIndexEntry {
    pub const SIZE: usize = 8;

    /// File position of the entry for `index`
    pub fn position(index: usize) -> u64 {
        (CacheHeader::SIZE + index * Self::SIZE) as u64
    }

    pub fn state(&self) -> EntryState {
        if self.length == 0 {
            return EntryState::Empty;
        }
        if self.length < 0 || self.offset < 0 {
            return EntryState::Corrupted;
        }
        if self.offset as i64 + self.length as i64 > MAX_FILE_SIZE {
            return EntryState::Corrupted;
        }
        EntryState::Stored {
            offset: self.offset as u64,
            length: self.length as usize,
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.offset.to_le_bytes())?;
        w.write_all(&self.length.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf4)?;
        let offset = i32::from_le_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let length = i32::from_le_bytes(buf4);

        Ok(Self { offset, length })
    }
}
