//! Parallel processing utilities.

use rayon::prelude::*;

/// Multiplier for number of chunks relative to CPU threads.
/// Using 3x threads provides good load balancing when some chunks finish faster.
const CHUNKS_PER_THREAD: usize = 3;

/// Compute chunk size for splitting `len` items across the rayon pool.
#[inline]
pub fn auto_chunk_size(len: usize) -> usize {
    let num_chunks = rayon::current_num_threads() * CHUNKS_PER_THREAD;
    (len / num_chunks).max(1)
}

/// Extension trait for slices split into automatically sized parallel chunks.
pub trait ParChunksAuto<T: Sync> {
    /// Split into parallel chunks sized by [`auto_chunk_size`].
    fn par_chunks_auto(&self) -> rayon::slice::Chunks<'_, T>;
}

impl<T: Sync> ParChunksAuto<T> for [T] {
    fn par_chunks_auto(&self) -> rayon::slice::Chunks<'_, T> {
        self.par_chunks(auto_chunk_size(self.len()))
    }
}
