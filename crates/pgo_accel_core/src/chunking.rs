use serde::{Deserialize, Serialize};

use crate::error::{PgoError, Result};

/// Largest slice requested per streamed read. Keeps each base64 response under
/// the synchronous invocation payload ceiling.
pub const DEFAULT_CHUNK_SIZE: u64 = 3 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub size: u64,
}

impl ChunkRange {
    pub fn end_exclusive(&self) -> u64 {
        self.start + self.size
    }
}

/// Upper bound on the size a remote function may report for its archive.
/// Larger replies are treated as garbage rather than planned.
pub const MAX_ARCHIVE_SIZE: u64 = 16 * 1024 * 1024 * 1024;

/// Lazily yields sequential reads of at most `chunk_size` covering
/// `total_size` bytes.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    cursor: u64,
}

impl ChunkPlan {
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of reads the whole plan issues.
    pub fn read_count(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size)
    }
}

impl Iterator for ChunkPlan {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        if self.cursor >= self.total_size {
            return None;
        }
        let size = (self.total_size - self.cursor).min(self.chunk_size);
        let range = ChunkRange {
            start: self.cursor,
            size,
        };
        self.cursor += size;
        Some(range)
    }
}

/// Checks the per-read cap shared by config validation and planning.
pub fn validate_chunk_size(chunk_size: u64) -> Result<()> {
    if chunk_size == 0 || chunk_size > DEFAULT_CHUNK_SIZE {
        return Err(PgoError::Config(format!(
            "chunk size {chunk_size} outside (0, {DEFAULT_CHUNK_SIZE}]"
        )));
    }
    Ok(())
}

/// Splits `total_size` bytes into sequential reads of at most `chunk_size`.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Result<ChunkPlan> {
    if chunk_size == 0 || chunk_size > DEFAULT_CHUNK_SIZE {
        return Err(PgoError::Transfer(format!(
            "chunk size {chunk_size} outside (0, {DEFAULT_CHUNK_SIZE}]"
        )));
    }
    if total_size > MAX_ARCHIVE_SIZE {
        return Err(PgoError::Transfer(format!(
            "remote archive size {total_size} exceeds the {MAX_ARCHIVE_SIZE} byte limit"
        )));
    }
    Ok(ChunkPlan {
        total_size,
        chunk_size,
        cursor: 0,
    })
}
