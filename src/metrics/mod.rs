//! Pool and stream statistics.
//!
//! Counters are plain atomics updated with relaxed ordering on the hot path;
//! `PoolStatistics` is a read-only snapshot assembled on demand for capacity
//! tuning and never mutates pool state.

mod histogram;

pub use histogram::LifetimeHistogram;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Relaxed ordering for counters (eventual visibility is fine for metrics).
const RELAXED: Ordering = Ordering::Relaxed;

/// Subtract without wrapping below zero.
pub(crate) fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(RELAXED, RELAXED, |current| {
        Some(current.saturating_sub(value))
    });
}

/// Manager-level counters that do not belong to a single tier.
pub struct StreamMetrics {
    pub streams_created: AtomicU64,
    pub streams_released: AtomicU64,
    pub streams_leaked: AtomicU64,
    pub double_releases: AtomicU64,

    // Allocations above max_buffer_size
    pub unpooled_allocations: AtomicU64,
    pub unpooled_in_use_bytes: AtomicUsize,

    // Contiguous conversions (segments copied into one buffer)
    pub consolidations: AtomicU64,

    pub lifetimes: LifetimeHistogram,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            streams_created: AtomicU64::new(0),
            streams_released: AtomicU64::new(0),
            streams_leaked: AtomicU64::new(0),
            double_releases: AtomicU64::new(0),
            unpooled_allocations: AtomicU64::new(0),
            unpooled_in_use_bytes: AtomicUsize::new(0),
            consolidations: AtomicU64::new(0),
            lifetimes: LifetimeHistogram::new(),
        }
    }

    /// Increment a counter.
    #[inline]
    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, RELAXED);
    }

    /// Get counter value.
    #[inline]
    pub fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(RELAXED)
    }

    #[inline]
    pub fn unpooled_allocated(&self, bytes: usize) {
        self.unpooled_allocations.fetch_add(1, RELAXED);
        self.unpooled_in_use_bytes.fetch_add(bytes, RELAXED);
    }

    #[inline]
    pub fn unpooled_freed(&self, bytes: usize) {
        saturating_sub(&self.unpooled_in_use_bytes, bytes);
    }

    /// Record an explicit release with the stream's lifetime.
    #[inline]
    pub fn stream_released(&self, lifetime: Duration) {
        self.streams_released.fetch_add(1, RELAXED);
        self.lifetimes.record(lifetime);
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one pool tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    /// Idle bytes sitting in the free lists
    pub free_bytes: usize,
    /// Idle buffers sitting in the free lists
    pub free_count: usize,
    /// Bytes currently owned by streams
    pub in_use_bytes: usize,
    /// Acquisitions satisfied from the free lists
    pub hits: u64,
    /// Fresh allocations made on a miss
    pub allocated: u64,
    /// Buffers put back on a free list
    pub returned: u64,
    /// Buffers freed because the tier was at its cap
    pub discarded: u64,
}

impl TierStats {
    /// Fraction of acquisitions served from the pool (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.allocated;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Stream lifetime distribution in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifetimePercentiles {
    pub count: u64,
    pub mean_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

/// Point-in-time snapshot of a pool manager.
#[derive(Debug, Clone)]
pub struct PoolStatistics {
    pub block_size: usize,
    pub small: TierStats,
    pub large: TierStats,

    pub unpooled_allocations: u64,
    pub unpooled_in_use_bytes: usize,

    pub streams_created: u64,
    pub streams_released: u64,
    pub streams_leaked: u64,
    pub double_releases: u64,
    pub consolidations: u64,

    pub lifetimes: LifetimePercentiles,
}

impl PoolStatistics {
    /// Bytes idling in both tiers.
    pub fn free_bytes(&self) -> usize {
        self.small.free_bytes + self.large.free_bytes
    }

    /// Bytes owned by live streams, pooled or not.
    pub fn in_use_bytes(&self) -> usize {
        self.small.in_use_bytes + self.large.in_use_bytes + self.unpooled_in_use_bytes
    }

    /// Every allocation that went to the system allocator.
    pub fn fresh_allocations(&self) -> u64 {
        self.small.allocated + self.large.allocated + self.unpooled_allocations
    }

    /// Streams neither released nor reported as leaked.
    pub fn streams_outstanding(&self) -> u64 {
        self.streams_created
            .saturating_sub(self.streams_released)
            .saturating_sub(self.streams_leaked)
    }

    /// Format as INFO-style `key:value` lines grouped by section.
    pub fn to_info_string(&self, section: Option<&str>) -> String {
        let mut out = String::with_capacity(1024);

        let include_all = section.is_none();
        let section = section.unwrap_or("");

        if include_all || section.eq_ignore_ascii_case("small") {
            out.push_str("# Small pool\r\n");
            out.push_str(&format!("block_size:{}\r\n", self.block_size));
            push_tier(&mut out, "small", &self.small);
            out.push_str("\r\n");
        }

        if include_all || section.eq_ignore_ascii_case("large") {
            out.push_str("# Large pool\r\n");
            push_tier(&mut out, "large", &self.large);
            out.push_str(&format!(
                "unpooled_allocations:{}\r\n",
                self.unpooled_allocations
            ));
            out.push_str(&format!(
                "unpooled_in_use_bytes:{}\r\n",
                self.unpooled_in_use_bytes
            ));
            out.push_str("\r\n");
        }

        if include_all || section.eq_ignore_ascii_case("streams") {
            out.push_str("# Streams\r\n");
            out.push_str(&format!("streams_created:{}\r\n", self.streams_created));
            out.push_str(&format!("streams_released:{}\r\n", self.streams_released));
            out.push_str(&format!("streams_leaked:{}\r\n", self.streams_leaked));
            out.push_str(&format!(
                "streams_outstanding:{}\r\n",
                self.streams_outstanding()
            ));
            out.push_str(&format!("double_releases:{}\r\n", self.double_releases));
            out.push_str(&format!("consolidations:{}\r\n", self.consolidations));
            out.push_str(&format!("lifetime_mean_ms:{}\r\n", self.lifetimes.mean_ms));
            out.push_str(&format!("lifetime_p50_ms:{}\r\n", self.lifetimes.p50_ms));
            out.push_str(&format!("lifetime_p99_ms:{}\r\n", self.lifetimes.p99_ms));
            out.push_str(&format!("lifetime_max_ms:{}\r\n", self.lifetimes.max_ms));
            out.push_str("\r\n");
        }

        out
    }
}

fn push_tier(out: &mut String, prefix: &str, tier: &TierStats) {
    out.push_str(&format!("{}_free_bytes:{}\r\n", prefix, tier.free_bytes));
    out.push_str(&format!("{}_free_count:{}\r\n", prefix, tier.free_count));
    out.push_str(&format!("{}_in_use_bytes:{}\r\n", prefix, tier.in_use_bytes));
    out.push_str(&format!("{}_hits:{}\r\n", prefix, tier.hits));
    out.push_str(&format!("{}_allocated:{}\r\n", prefix, tier.allocated));
    out.push_str(&format!("{}_returned:{}\r\n", prefix, tier.returned));
    out.push_str(&format!("{}_discarded:{}\r\n", prefix, tier.discarded));
    out.push_str(&format!("{}_hit_rate:{:.2}\r\n", prefix, tier.hit_rate()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PoolStatistics {
        PoolStatistics {
            block_size: 4096,
            small: TierStats {
                free_bytes: 8192,
                in_use_bytes: 4096,
                allocated: 3,
                ..Default::default()
            },
            large: TierStats {
                free_bytes: 1 << 20,
                allocated: 1,
                ..Default::default()
            },
            unpooled_allocations: 2,
            unpooled_in_use_bytes: 100,
            streams_created: 10,
            streams_released: 7,
            streams_leaked: 1,
            double_releases: 0,
            consolidations: 0,
            lifetimes: LifetimePercentiles::default(),
        }
    }

    #[test]
    fn test_counter_operations() {
        let m = StreamMetrics::new();
        assert_eq!(m.get(&m.streams_created), 0);

        m.inc(&m.streams_created);
        m.stream_released(Duration::from_millis(4));
        assert_eq!(m.get(&m.streams_created), 1);
        assert_eq!(m.get(&m.streams_released), 1);
        assert_eq!(m.lifetimes.count(), 1);
    }

    #[test]
    fn test_unpooled_accounting_saturates() {
        let m = StreamMetrics::new();
        m.unpooled_allocated(100);
        m.unpooled_freed(150);
        assert_eq!(m.unpooled_in_use_bytes.load(RELAXED), 0);
        assert_eq!(m.get(&m.unpooled_allocations), 1);
    }

    #[test]
    fn test_snapshot_aggregates() {
        let snap = snapshot();
        assert_eq!(snap.free_bytes(), 8192 + (1 << 20));
        assert_eq!(snap.in_use_bytes(), 4196);
        assert_eq!(snap.fresh_allocations(), 6);
        assert_eq!(snap.streams_outstanding(), 2);
    }

    #[test]
    fn test_info_string() {
        let info = snapshot().to_info_string(None);
        assert!(info.contains("# Small pool"));
        assert!(info.contains("# Streams"));
        assert!(info.contains("small_allocated:3"));
        assert!(info.contains("streams_leaked:1"));
    }

    #[test]
    fn test_info_section_filter() {
        let info = snapshot().to_info_string(Some("large"));
        assert!(info.contains("# Large pool"));
        assert!(info.contains("unpooled_allocations:2"));
        assert!(!info.contains("# Small pool"));
        assert!(!info.contains("# Streams"));
    }
}
