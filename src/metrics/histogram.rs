//! Lock-free histogram of stream lifetimes for p50/p95/p99 tracking.
//!
//! Uses piecewise-linear buckets with coarser resolution for long-lived
//! streams, which are rare and need less precision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::LifetimePercentiles;

/// Number of buckets in the histogram.
/// Covers 0ms to ~65 seconds; anything longer lands in the overflow bucket.
const NUM_BUCKETS: usize = 64;

/// Buckets per resolution band.
const BAND: u64 = 16;

/// Stream lifetime histogram.
///
/// Bucket boundaries (in milliseconds):
/// - Buckets 0-15: 0, 1, 2, ..., 15 (1ms resolution)
/// - Buckets 16-31: 16, 32, ..., 255 (16ms resolution)
/// - Buckets 32-47: 256, 512, ..., 4095 (256ms resolution)
/// - Buckets 48-63: 4s, 8s, ..., 64s+ (4s resolution)
pub struct LifetimeHistogram {
    buckets: [AtomicU64; NUM_BUCKETS],
    count: AtomicU64,
    sum_ms: AtomicU64,
    max: AtomicU64,
}

impl LifetimeHistogram {
    /// Create a new empty histogram.
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum_ms: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record a lifetime.
    #[inline]
    pub fn record(&self, lifetime: Duration) {
        let value_ms = u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX);
        self.buckets[Self::value_to_bucket(value_ms)].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(value_ms, Ordering::Relaxed);
        self.max.fetch_max(value_ms, Ordering::Relaxed);
    }

    /// Map a lifetime in milliseconds to a bucket index.
    #[inline]
    fn value_to_bucket(value_ms: u64) -> usize {
        match value_ms {
            0..=15 => value_ms as usize,
            16..=255 => 16 + ((value_ms - 16) / 16) as usize,
            256..=4095 => 32 + ((value_ms - 256) / 256) as usize,
            4096..=65535 => 48 + ((value_ms - 4096) / 4096) as usize,
            _ => NUM_BUCKETS - 1,
        }
    }

    /// Lower bound of a bucket in milliseconds.
    #[inline]
    fn bucket_to_value(bucket: usize) -> u64 {
        let band = bucket as u64 / BAND;
        let offset = bucket as u64 % BAND;
        if band == 0 {
            offset
        } else {
            let width = BAND.pow(band as u32);
            width + offset * width
        }
    }

    /// Total number of recorded lifetimes.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Calculate the lifetime distribution.
    pub fn percentiles(&self) -> LifetimePercentiles {
        let total = self.count.load(Ordering::Relaxed);
        if total == 0 {
            return LifetimePercentiles::default();
        }

        let targets = [total / 2, total * 95 / 100, total * 99 / 100].map(|t| t.max(1));
        let mut found: [Option<u64>; 3] = [None; 3];
        let mut cumulative = 0u64;

        for (idx, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            for (slot, target) in found.iter_mut().zip(targets) {
                if slot.is_none() && cumulative >= target {
                    *slot = Some(Self::bucket_to_value(idx));
                }
            }
        }

        LifetimePercentiles {
            count: total,
            mean_ms: self.sum_ms.load(Ordering::Relaxed) / total,
            p50_ms: found[0].unwrap_or(0),
            p95_ms: found[1].unwrap_or(0),
            p99_ms: found[2].unwrap_or(0),
            max_ms: self.max.load(Ordering::Relaxed),
        }
    }

    /// Reset all buckets to zero.
    pub fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Relaxed);
        self.sum_ms.store(0, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }
}

impl Default for LifetimeHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_bucket_mapping() {
        assert_eq!(LifetimeHistogram::value_to_bucket(0), 0);
        assert_eq!(LifetimeHistogram::value_to_bucket(15), 15);

        assert_eq!(LifetimeHistogram::value_to_bucket(16), 16);
        assert_eq!(LifetimeHistogram::value_to_bucket(31), 16);
        assert_eq!(LifetimeHistogram::value_to_bucket(32), 17);

        assert_eq!(LifetimeHistogram::value_to_bucket(256), 32);
        assert_eq!(LifetimeHistogram::value_to_bucket(512), 33);

        assert_eq!(LifetimeHistogram::value_to_bucket(4096), 48);
        assert_eq!(LifetimeHistogram::value_to_bucket(8192), 49);

        assert_eq!(LifetimeHistogram::value_to_bucket(10_000_000), 63);
    }

    #[test]
    fn test_bucket_lower_bounds_map_back() {
        for bucket in (0..31).chain(32..47).chain(48..63) {
            let value = LifetimeHistogram::bucket_to_value(bucket);
            assert_eq!(
                LifetimeHistogram::value_to_bucket(value),
                bucket,
                "bucket {} -> {}ms",
                bucket,
                value
            );
        }
    }

    #[test]
    fn test_record_tracks_count_mean_and_max() {
        let h = LifetimeHistogram::new();
        h.record(ms(10));
        h.record(ms(30));
        h.record(ms(20));

        let p = h.percentiles();
        assert_eq!(h.count(), 3);
        assert_eq!(p.mean_ms, 20);
        assert_eq!(p.max_ms, 30);
    }

    #[test]
    fn test_short_lived_majority() {
        let h = LifetimeHistogram::new();
        for _ in 0..90 {
            h.record(ms(2));
        }
        for _ in 0..10 {
            h.record(ms(3_000));
        }

        let p = h.percentiles();
        assert_eq!(p.p50_ms, 2);
        assert!(p.p99_ms >= 2_816, "p99 was {}", p.p99_ms);
    }

    #[test]
    fn test_reset_and_empty() {
        let h = LifetimeHistogram::new();
        h.record(ms(5));
        h.reset();

        let p = h.percentiles();
        assert_eq!(p.count, 0);
        assert_eq!(p.max_ms, 0);
        assert_eq!(p.p50_ms, 0);
    }
}
