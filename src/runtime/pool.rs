use std::collections::HashMap;

/// Retention limits for field buffers kept between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum number of retained buffers per length bucket.
    pub max_buffers_per_bucket: usize,
}

impl Default for BufferPoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 64 * 1024 * 1024,
            max_buffers_per_bucket: 16,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub retained_buffers: usize,
    pub retained_bytes: usize,
    pub alloc_buffers: u64,
    pub alloc_bytes: u64,
    pub reused_buffers: u64,
    pub dropped_on_release: u64,
}

struct Bucket {
    buffers: Vec<Vec<f64>>,
}

fn byte_len(len: usize) -> usize {
    len.saturating_mul(std::mem::size_of::<f64>())
}

/// Bounded pool of flat `f64` buffers for materialized fields.
///
/// Keyed by component count. Borrow and release happen once per materialized field, never
/// per element.
pub(crate) struct BufferPool {
    opts: BufferPoolOpts,
    stats: BufferPoolStats,
    bucket_idx_by_len: HashMap<usize, usize>,
    buckets: Vec<Bucket>,
}

impl BufferPool {
    pub(crate) fn new(opts: BufferPoolOpts) -> Self {
        Self {
            opts,
            stats: BufferPoolStats::default(),
            bucket_idx_by_len: HashMap::new(),
            buckets: Vec::new(),
        }
    }

    pub(crate) fn stats(&self) -> BufferPoolStats {
        self.stats.clone()
    }

    /// Zero-filled buffer of exactly `len` components.
    pub(crate) fn borrow(&mut self, len: usize) -> Vec<f64> {
        if let Some(&bi) = self.bucket_idx_by_len.get(&len)
            && let Some(mut buf) = self.buckets[bi].buffers.pop()
        {
            self.stats.retained_buffers = self.stats.retained_buffers.saturating_sub(1);
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(byte_len(len));
            self.stats.reused_buffers = self.stats.reused_buffers.saturating_add(1);
            buf.fill(0.0);
            return buf;
        }

        self.stats.alloc_buffers = self.stats.alloc_buffers.saturating_add(1);
        self.stats.alloc_bytes = self.stats.alloc_bytes.saturating_add(byte_len(len) as u64);
        vec![0.0; len]
    }

    pub(crate) fn release(&mut self, buf: Vec<f64>) {
        if self.opts.max_pool_bytes == 0 || self.opts.max_buffers_per_bucket == 0 {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }

        let len = buf.len();
        let bytes = byte_len(len);
        if self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }

        let bi = match self.bucket_idx_by_len.get(&len).copied() {
            Some(i) => i,
            None => {
                let i = self.buckets.len();
                self.buckets.push(Bucket {
                    buffers: Vec::new(),
                });
                self.bucket_idx_by_len.insert(len, i);
                i
            }
        };

        let bucket = &mut self.buckets[bi];
        if bucket.buffers.len() >= self.opts.max_buffers_per_bucket {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }

        bucket.buffers.push(buf);
        self.stats.retained_buffers = self.stats.retained_buffers.saturating_add(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
    }
}
