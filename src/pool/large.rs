//! Size-classed pool for buffers larger than one block.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use super::options::{LargeBufferStrategy, PoolOptions};
use super::segment::allocate_zeroed;
use crate::error::Result;
use crate::metrics::{saturating_sub, TierStats};

const RELAXED: Ordering = Ordering::Relaxed;

/// Mapping between requested sizes and bucket indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClasses {
    multiple: usize,
    strategy: LargeBufferStrategy,
    max_buffer_size: usize,
}

impl SizeClasses {
    pub fn new(options: &PoolOptions) -> Self {
        Self {
            multiple: options.large_buffer_multiple,
            strategy: options.large_buffer_strategy,
            max_buffer_size: options.max_buffer_size,
        }
    }

    /// Number of distinct classes up to and including `max_buffer_size`.
    pub fn count(&self) -> usize {
        let units = self.max_buffer_size / self.multiple;
        match self.strategy {
            LargeBufferStrategy::Exponential => units.trailing_zeros() as usize + 1,
            LargeBufferStrategy::Linear => units,
        }
    }

    /// Smallest class that fits `size`, or `None` above `max_buffer_size`.
    pub fn index_for(&self, size: usize) -> Option<usize> {
        if size > self.max_buffer_size {
            return None;
        }
        let units = size.div_ceil(self.multiple).max(1);
        let index = match self.strategy {
            LargeBufferStrategy::Exponential => units.next_power_of_two().trailing_zeros() as usize,
            LargeBufferStrategy::Linear => units - 1,
        };
        Some(index)
    }

    /// Byte size of class `index`.
    pub fn size_of(&self, index: usize) -> usize {
        match self.strategy {
            LargeBufferStrategy::Exponential => self.multiple << index,
            LargeBufferStrategy::Linear => self.multiple * (index + 1),
        }
    }

    /// Class index of a buffer whose length is exactly a class size.
    fn exact_index(&self, len: usize) -> Option<usize> {
        self.index_for(len).filter(|&i| self.size_of(i) == len)
    }
}

/// Free lists of large buffers, one per size class.
///
/// The aggregate idle byte count is reserved atomically before a buffer is
/// pushed, so concurrent releases can never push the tier past its cap.
pub struct LargeBufferPool {
    classes: SizeClasses,
    buckets: Vec<Mutex<Vec<Box<[u8]>>>>,
    max_free_bytes: usize,
    zero_on_return: bool,
    free_bytes: AtomicUsize,
    in_use_bytes: AtomicUsize,
    hits: AtomicU64,
    allocated: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
}

impl LargeBufferPool {
    pub fn new(options: &PoolOptions) -> Self {
        let classes = SizeClasses::new(options);
        let buckets = (0..classes.count()).map(|_| Mutex::new(Vec::new())).collect();
        Self {
            classes,
            buckets,
            max_free_bytes: options.max_large_pool_free_bytes,
            zero_on_return: options.zero_on_return,
            free_bytes: AtomicUsize::new(0),
            in_use_bytes: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            allocated: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn classes(&self) -> &SizeClasses {
        &self.classes
    }

    /// Take a buffer of the class fitting `size`.
    ///
    /// Returns `None` when `size` is above the largest class; the caller
    /// must fall back to unpooled memory.
    pub fn acquire(&self, size: usize) -> Option<Result<Box<[u8]>>> {
        let index = self.classes.index_for(size)?;
        let reused = self.buckets[index].lock().pop();

        let buffer = match reused {
            Some(buffer) => {
                self.free_bytes.fetch_sub(buffer.len(), RELAXED);
                self.hits.fetch_add(1, RELAXED);
                buffer
            }
            None => match allocate_zeroed(self.classes.size_of(index)) {
                Ok(buffer) => {
                    self.allocated.fetch_add(1, RELAXED);
                    debug!("Large pool miss, allocated {} byte buffer", buffer.len());
                    buffer
                }
                Err(e) => return Some(Err(e)),
            },
        };
        self.in_use_bytes.fetch_add(buffer.len(), RELAXED);
        Some(Ok(buffer))
    }

    /// Hand a buffer back. Returns false when it was freed instead.
    pub fn release(&self, mut buffer: Box<[u8]>) -> bool {
        let len = buffer.len();
        saturating_sub(&self.in_use_bytes, len);

        let Some(index) = self.classes.exact_index(len) else {
            self.discarded.fetch_add(1, RELAXED);
            return false;
        };

        let reserved = self
            .free_bytes
            .fetch_update(RELAXED, RELAXED, |current| {
                let next = current.checked_add(len)?;
                (next <= self.max_free_bytes).then_some(next)
            })
            .is_ok();

        if !reserved {
            self.discarded.fetch_add(1, RELAXED);
            return false;
        }

        if self.zero_on_return {
            buffer.fill(0);
        }
        self.buckets[index].lock().push(buffer);
        self.returned.fetch_add(1, RELAXED);
        true
    }

    /// Free every idle buffer. Returns the number of bytes reclaimed.
    pub fn trim(&self) -> usize {
        let mut reclaimed = 0;
        for bucket in &self.buckets {
            let drained: Vec<Box<[u8]>> = std::mem::take(&mut *bucket.lock());
            let bytes: usize = drained.iter().map(|b| b.len()).sum();
            self.free_bytes.fetch_sub(bytes, RELAXED);
            reclaimed += bytes;
        }
        reclaimed
    }

    pub fn free_bytes(&self) -> usize {
        self.free_bytes.load(RELAXED)
    }

    pub fn free_count(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().len()).sum()
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            free_bytes: self.free_bytes(),
            free_count: self.free_count(),
            in_use_bytes: self.in_use_bytes.load(RELAXED),
            hits: self.hits.load(RELAXED),
            allocated: self.allocated.load(RELAXED),
            returned: self.returned.load(RELAXED),
            discarded: self.discarded.load(RELAXED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(strategy: LargeBufferStrategy, max_free: usize) -> PoolOptions {
        PoolOptions::builder()
            .block_size(1024)
            .large_buffer_multiple(1024)
            .max_buffer_size(16 * 1024)
            .large_buffer_strategy(strategy)
            .max_large_pool_free_bytes(max_free)
            .build()
            .unwrap()
    }

    #[test]
    fn test_exponential_classes() {
        let classes = SizeClasses::new(&options(LargeBufferStrategy::Exponential, 0));
        assert_eq!(classes.count(), 5);
        assert_eq!(classes.index_for(0), Some(0));
        assert_eq!(classes.index_for(1024), Some(0));
        assert_eq!(classes.index_for(1025), Some(1));
        assert_eq!(classes.index_for(3000), Some(2));
        assert_eq!(classes.size_of(2), 4096);
        assert_eq!(classes.index_for(16 * 1024), Some(4));
        assert_eq!(classes.index_for(16 * 1024 + 1), None);
    }

    #[test]
    fn test_linear_classes() {
        let classes = SizeClasses::new(&options(LargeBufferStrategy::Linear, 0));
        assert_eq!(classes.count(), 16);
        assert_eq!(classes.index_for(3000), Some(2));
        assert_eq!(classes.size_of(2), 3072);
        assert_eq!(classes.index_for(16 * 1024), Some(15));
    }

    #[test]
    fn test_acquire_rounds_up_and_reuses() {
        let pool = LargeBufferPool::new(&options(LargeBufferStrategy::Exponential, 64 * 1024));

        let buffer = pool.acquire(5000).unwrap().unwrap();
        assert_eq!(buffer.len(), 8192);
        assert!(pool.release(buffer));
        assert_eq!(pool.free_bytes(), 8192);

        let again = pool.acquire(6000).unwrap().unwrap();
        assert_eq!(again.len(), 8192);
        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.allocated, 1);
        assert_eq!(pool.free_bytes(), 0);
    }

    #[test]
    fn test_oversized_request_is_not_pooled() {
        let pool = LargeBufferPool::new(&options(LargeBufferStrategy::Exponential, 64 * 1024));
        assert!(pool.acquire(32 * 1024).is_none());
    }

    #[test]
    fn test_release_respects_cap() {
        let pool = LargeBufferPool::new(&options(LargeBufferStrategy::Exponential, 10 * 1024));

        let a = pool.acquire(8192).unwrap().unwrap();
        let b = pool.acquire(8192).unwrap().unwrap();
        assert!(pool.release(a));
        assert!(!pool.release(b));
        assert_eq!(pool.free_bytes(), 8192);
        assert_eq!(pool.stats().discarded, 1);
    }

    #[test]
    fn test_foreign_length_is_discarded() {
        let pool = LargeBufferPool::new(&options(LargeBufferStrategy::Exponential, 64 * 1024));
        assert!(!pool.release(vec![0u8; 3000].into_boxed_slice()));
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_trim_releases_all_buckets() {
        let pool = LargeBufferPool::new(&options(LargeBufferStrategy::Exponential, 64 * 1024));
        let a = pool.acquire(1024).unwrap().unwrap();
        let b = pool.acquire(4096).unwrap().unwrap();
        pool.release(a);
        pool.release(b);

        assert_eq!(pool.trim(), 5120);
        assert_eq!(pool.free_bytes(), 0);
        assert_eq!(pool.free_count(), 0);
    }
}
