//! Lock-free pool of fixed-size blocks.
//!
//! Every block in this tier has exactly the configured block size, so a
//! request is satisfied by any free block (exact fit) and the byte cap
//! translates directly into a slot count on the queue.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use super::segment::allocate_zeroed;
use crate::error::Result;
use crate::metrics::{saturating_sub, TierStats};

/// Relaxed ordering for counters (eventual visibility is fine for stats).
const RELAXED: Ordering = Ordering::Relaxed;

/// Free list of uniform blocks.
pub struct SizeClassPool {
    /// Bytes per block.
    block_size: usize,
    /// Available blocks. `None` when the tier is configured not to pool.
    free: Option<ArrayQueue<Box<[u8]>>>,
    /// Scrub blocks before they are queued again.
    zero_on_return: bool,
    /// Bytes currently owned by streams.
    in_use_bytes: AtomicUsize,
    /// Statistics: blocks taken from the queue.
    hits: AtomicU64,
    /// Statistics: blocks allocated fresh (pool miss).
    allocated: AtomicU64,
    /// Statistics: blocks queued again on release.
    returned: AtomicU64,
    /// Statistics: blocks freed because the queue was full.
    discarded: AtomicU64,
}

impl SizeClassPool {
    /// Create a pool that idles at most `max_free_bytes` worth of blocks.
    pub fn new(block_size: usize, max_free_bytes: usize, zero_on_return: bool) -> Self {
        let slots = max_free_bytes / block_size;
        Self {
            block_size,
            free: (slots > 0).then(|| ArrayQueue::new(slots)),
            zero_on_return,
            in_use_bytes: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            allocated: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Size of every block in this pool.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Take a free block, or allocate a fresh zeroed one on a miss.
    ///
    /// Reused blocks are returned as-is and may carry a previous tenant's
    /// bytes.
    #[inline]
    pub fn acquire(&self) -> Result<Box<[u8]>> {
        let block = match self.free.as_ref().and_then(ArrayQueue::pop) {
            Some(block) => {
                self.hits.fetch_add(1, RELAXED);
                block
            }
            None => {
                let block = allocate_zeroed(self.block_size)?;
                self.allocated.fetch_add(1, RELAXED);
                debug!("Small pool miss, allocated {} byte block", self.block_size);
                block
            }
        };
        self.in_use_bytes.fetch_add(self.block_size, RELAXED);
        Ok(block)
    }

    /// Hand a block back.
    ///
    /// Returns false when the block was freed instead of queued, either
    /// because the tier is at its byte cap or pooling is disabled.
    #[inline]
    pub fn release(&self, mut block: Box<[u8]>) -> bool {
        debug_assert_eq!(block.len(), self.block_size);
        saturating_sub(&self.in_use_bytes, self.block_size);

        let Some(free) = self.free.as_ref() else {
            self.discarded.fetch_add(1, RELAXED);
            return false;
        };

        if self.zero_on_return {
            block.fill(0);
        }

        if free.push(block).is_ok() {
            self.returned.fetch_add(1, RELAXED);
            true
        } else {
            self.discarded.fetch_add(1, RELAXED);
            false
        }
    }

    /// Free every idle block. Returns the number of bytes reclaimed.
    pub fn trim(&self) -> usize {
        let Some(free) = self.free.as_ref() else {
            return 0;
        };
        let mut reclaimed = 0;
        while free.pop().is_some() {
            reclaimed += self.block_size;
        }
        reclaimed
    }

    /// Number of idle blocks.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.as_ref().map_or(0, ArrayQueue::len)
    }

    /// Idle bytes held by the pool.
    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.free_count() * self.block_size
    }

    /// Get pool statistics.
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
