use crate::raster::buffer::BufferSample;

/// Retention bounds of [`WorkingBuffers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchOpts {
    /// Maximum bytes retained across all element kinds.
    pub max_pool_bytes: usize,
    /// Maximum number of retained vectors per element kind.
    pub max_buffers_per_kind: usize,
}

impl Default for ScratchOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 64 * 1024 * 1024,
            max_buffers_per_kind: 4,
        }
    }
}

/// Allocation counters of a [`WorkingBuffers`] pool.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScratchStats {
    /// Vectors currently held by the pool.
    pub retained_buffers: usize,
    /// Bytes currently held by the pool.
    pub retained_bytes: usize,
    /// Fresh allocations made by `take`.
    pub alloc_buffers: u64,
    /// `take` calls served from a retained vector.
    pub reused_buffers: u64,
    /// Vectors dropped by `give` because a bound was hit.
    pub dropped_on_release: u64,
}

/// Scratch vectors reused across the nested reads of one composite operation.
///
/// Owned by a single read call and never shared between concurrent compositions. Borrow and
/// give back at source granularity, not per pixel.
#[derive(Debug, Default)]
pub struct WorkingBuffers {
    opts: ScratchOpts,
    stats: ScratchStats,
    f32s: Vec<Vec<f32>>,
    f64s: Vec<Vec<f64>>,
    bytes: Vec<Vec<u8>>,
}

/// Element kinds a [`WorkingBuffers`] pool keeps vectors of.
pub trait ScratchElem: BufferSample {
    #[doc(hidden)]
    fn shelf(pool: &mut WorkingBuffers) -> &mut Vec<Vec<Self>>;
}

impl ScratchElem for f32 {
    fn shelf(pool: &mut WorkingBuffers) -> &mut Vec<Vec<Self>> {
        &mut pool.f32s
    }
}

impl ScratchElem for f64 {
    fn shelf(pool: &mut WorkingBuffers) -> &mut Vec<Vec<Self>> {
        &mut pool.f64s
    }
}

impl ScratchElem for u8 {
    fn shelf(pool: &mut WorkingBuffers) -> &mut Vec<Vec<Self>> {
        &mut pool.bytes
    }
}

fn byte_len<T>(v: &Vec<T>) -> usize {
    v.capacity().saturating_mul(std::mem::size_of::<T>())
}

impl WorkingBuffers {
    /// Empty pool with the given bounds.
    pub fn new(opts: ScratchOpts) -> Self {
        Self {
            opts,
            ..Self::default()
        }
    }

    /// Current counters.
    pub fn stats(&self) -> ScratchStats {
        self.stats.clone()
    }

    /// Borrow a vector of `len` default-valued elements.
    pub fn take<T: ScratchElem>(&mut self, len: usize) -> Vec<T> {
        let shelf = T::shelf(self);
        let pos = shelf.iter().position(|v| v.capacity() >= len);
        match pos {
            Some(i) => {
                let mut v = shelf.swap_remove(i);
                let bytes = byte_len(&v);
                self.stats.retained_buffers = self.stats.retained_buffers.saturating_sub(1);
                self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(bytes);
                self.stats.reused_buffers = self.stats.reused_buffers.saturating_add(1);
                v.clear();
                v.resize(len, T::default());
                v
            }
            None => {
                self.stats.alloc_buffers = self.stats.alloc_buffers.saturating_add(1);
                vec![T::default(); len]
            }
        }
    }

    /// Give a vector back for later reuse, dropping it when a bound would be exceeded.
    pub fn give<T: ScratchElem>(&mut self, v: Vec<T>) {
        let bytes = byte_len(&v);
        if self.opts.max_buffers_per_kind == 0
            || self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes
        {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }
        let cap = self.opts.max_buffers_per_kind;
        let shelf = T::shelf(self);
        if shelf.len() >= cap {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }
        shelf.push(v);
        self.stats.retained_buffers = self.stats.retained_buffers.saturating_add(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
    }
}

#[cfg(test)]
#[path = "../tests/unit/scratch.rs"]
mod tests;
