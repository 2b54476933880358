//! Chunk byte ranges and planning.

/// A single chunk: byte range [start, end) (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl ChunkRange {
    /// Length of this chunk in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of chunks for a file: `max(floor(size / chunk_size), 1)`.
pub fn chunk_count(total_size: u64, chunk_size: u64) -> usize {
    if chunk_size == 0 {
        return 1;
    }
    (total_size / chunk_size).max(1) as usize
}

/// Builds the chunk plan for a file.
///
/// Every chunk is `chunk_size` long except the last, which absorbs the
/// remainder and so lies in `[chunk_size, 2 * chunk_size)` whenever the file
/// spans more than one chunk. A file smaller than `chunk_size` (including an
/// empty one) is a single chunk.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    let count = chunk_count(total_size, chunk_size) as u64;
    let mut out = Vec::with_capacity(count as usize);

    for i in 0..count {
        let start = i * chunk_size;
        let mut end = ((i + 1) * chunk_size).min(total_size);
        if total_size - end < chunk_size {
            end = total_size;
        }
        out.push(ChunkRange { start, end });
    }

    out
}
