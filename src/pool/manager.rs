//! PoolManager - owns both tiers and hands out streams.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::backtrace::Backtrace;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::large::LargeBufferPool;
use super::options::PoolOptions;
use super::segment::{allocate_zeroed, Segment, Tier};
use super::small::SizeClassPool;
use super::stream::PooledStream;
use crate::error::{Error, Result};
use crate::metrics::{PoolStatistics, StreamMetrics};
use crate::monitor::{DiscardReason, LifecycleMonitor, OutstandingStream, StreamEvent};
use crate::types::StreamId;

/// State shared by a manager, its clones, and every stream it handed out.
pub(crate) struct PoolInner {
    options: PoolOptions,
    small: SizeClassPool,
    large: LargeBufferPool,
    metrics: StreamMetrics,
    monitor: LifecycleMonitor,
    /// Read once from the options; never changes for the pool's lifetime.
    capture_stacks: bool,
}

impl PoolInner {
    #[inline]
    pub(crate) fn max_stream_capacity(&self) -> Option<usize> {
        self.options.max_stream_capacity
    }

    pub(crate) fn take_block(&self) -> Result<Segment> {
        Ok(Segment::new(self.small.acquire()?, Tier::Small))
    }

    /// `count` blocks, or none at all if any allocation fails.
    fn take_blocks(&self, count: usize) -> Result<Vec<Segment>> {
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            match self.take_block() {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    blocks.into_iter().for_each(|b| self.return_segment(b));
                    return Err(e);
                }
            }
        }
        Ok(blocks)
    }

    /// One buffer of at least `size` bytes from the large tier, or an
    /// unpooled buffer above `max_buffer_size`.
    pub(crate) fn take_large(&self, size: usize) -> Result<Segment> {
        match self.large.acquire(size) {
            Some(buffer) => Ok(Segment::new(buffer?, Tier::Large)),
            None => self.take_unpooled(size),
        }
    }

    fn take_unpooled(&self, size: usize) -> Result<Segment> {
        let buffer = allocate_zeroed(size)?;
        self.metrics.unpooled_allocated(size);
        debug!("Unpooled allocation of {} bytes", size);
        Ok(Segment::new(buffer, Tier::Unpooled))
    }

    /// Route a segment back to its tier, or free it.
    fn return_segment(&self, segment: Segment) {
        let tier = segment.tier();
        let size = segment.len();
        let pooled = match tier {
            Tier::Small => self.small.release(segment.into_buf()),
            Tier::Large => self.large.release(segment.into_buf()),
            Tier::Unpooled => {
                self.metrics.unpooled_freed(size);
                false
            }
        };
        if pooled {
            return;
        }

        let reason = if tier == Tier::Unpooled {
            DiscardReason::Unpooled
        } else {
            debug!("Discarded {} byte {} buffer, tier at capacity", size, tier);
            DiscardReason::PoolFull
        };
        self.monitor
            .feed()
            .emit(|| StreamEvent::BufferDiscarded { tier, size, reason });
    }

    pub(crate) fn register(&self, id: StreamId, tag: Arc<str>, size: usize) {
        self.metrics.inc(&self.metrics.streams_created);
        let stacktrace = self.capture_stacks.then(Backtrace::force_capture);
        self.monitor.on_created(id, tag, size, stacktrace);
    }

    pub(crate) fn complete_release(&self, id: StreamId, segments: Vec<Segment>) {
        segments.into_iter().for_each(|s| self.return_segment(s));
        if let Some(lifetime) = self.monitor.on_released(id) {
            self.metrics.stream_released(lifetime);
        }
    }

    /// The stream was dropped. Reports the leak if it was never released,
    /// then reclaims its memory either way.
    pub(crate) fn finalize(&self, id: StreamId, segments: Vec<Segment>) {
        if self.monitor.on_finalized(id).is_some() {
            self.metrics.inc(&self.metrics.streams_leaked);
        }
        segments.into_iter().for_each(|s| self.return_segment(s));
    }

    pub(crate) fn double_release(&self, id: StreamId, tag: &Arc<str>) {
        self.metrics.inc(&self.metrics.double_releases);
        warn!("Stream {} (tag {}) released more than once", id, tag);
        self.monitor.feed().emit(|| StreamEvent::DoubleReleased {
            id,
            tag: tag.clone(),
        });
    }

    pub(crate) fn consolidated(&self, old: Vec<Segment>) {
        self.metrics.inc(&self.metrics.consolidations);
        old.into_iter().for_each(|s| self.return_segment(s));
    }

    fn trim(&self) -> usize {
        let reclaimed = self.small.trim() + self.large.trim();
        if reclaimed > 0 {
            debug!("Trimmed {} idle bytes", reclaimed);
        }
        reclaimed
    }

    fn stats(&self) -> PoolStatistics {
        let m = &self.metrics;
        PoolStatistics {
            block_size: self.small.block_size(),
            small: self.small.stats(),
            large: self.large.stats(),
            unpooled_allocations: m.get(&m.unpooled_allocations),
            unpooled_in_use_bytes: m
                .unpooled_in_use_bytes
                .load(std::sync::atomic::Ordering::Relaxed),
            streams_created: m.get(&m.streams_created),
            streams_released: m.get(&m.streams_released),
            streams_leaked: m.get(&m.streams_leaked),
            double_releases: m.get(&m.double_releases),
            consolidations: m.get(&m.consolidations),
            lifetimes: m.lifetimes.percentiles(),
        }
    }
}

/// Entry point for acquiring and releasing pooled streams.
///
/// Cheap to clone; clones share the same pools, counters, monitor and event
/// feed. Pass it explicitly to whatever needs streams.
#[derive(Clone)]
pub struct PoolManager {
    inner: Arc<PoolInner>,
}

impl PoolManager {
    /// Create a manager. Fails if the options are inconsistent.
    pub fn new(options: PoolOptions) -> Result<Self> {
        options.validate()?;

        let small = SizeClassPool::new(
            options.block_size,
            options.max_small_pool_free_bytes,
            options.zero_on_return,
        );
        let large = LargeBufferPool::new(&options);
        info!(
            "Pool manager: block_size={}, small_cap={}, large_cap={}, max_buffer={}",
            options.block_size,
            options.max_small_pool_free_bytes,
            options.max_large_pool_free_bytes,
            options.max_buffer_size,
        );
        info!(
            "Large tier: {} {:?} classes, stack_traces={}",
            large.classes().count(),
            options.large_buffer_strategy,
            options.generate_stack_traces,
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                capture_stacks: options.generate_stack_traces,
                options,
                small,
                large,
                metrics: StreamMetrics::new(),
                monitor: LifecycleMonitor::new(),
            }),
        })
    }

    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// Acquire a stream with room for at least `size_hint` bytes.
    ///
    /// Up to `max_buffer_size` the stream is built from blocks; above it the
    /// stream gets one unpooled buffer of exactly `size_hint` bytes.
    pub fn acquire(&self, size_hint: usize, tag: impl Into<Arc<str>>) -> Result<PooledStream> {
        self.check_stream_cap(size_hint)?;
        let inner = &self.inner;
        let segments = if size_hint > inner.options.max_buffer_size {
            vec![inner.take_unpooled(size_hint)?]
        } else {
            inner.take_blocks(size_hint.div_ceil(inner.options.block_size))?
        };
        Ok(PooledStream::new(inner.clone(), tag.into(), segments, size_hint))
    }

    /// Acquire a stream backed by a single buffer from the large tier.
    pub fn acquire_contiguous(
        &self,
        size: usize,
        tag: impl Into<Arc<str>>,
    ) -> Result<PooledStream> {
        self.check_stream_cap(size)?;
        let segment = self.inner.take_large(size)?;
        Ok(PooledStream::new(self.inner.clone(), tag.into(), vec![segment], size))
    }

    /// Acquire a stream holding a copy of `bytes`, positioned at the start.
    pub fn acquire_from(&self, bytes: &[u8], tag: impl Into<Arc<str>>) -> Result<PooledStream> {
        let mut stream = self.acquire(bytes.len(), tag)?;
        if let Err(e) = std::io::Write::write_all(&mut stream, bytes) {
            stream.release();
            return Err(e.into());
        }
        stream.set_position(0)?;
        Ok(stream)
    }

    /// Acquire a stream that is released when the guard goes out of scope,
    /// including during unwinding.
    pub fn acquire_scoped(
        &self,
        size_hint: usize,
        tag: impl Into<Arc<str>>,
    ) -> Result<ScopedStream> {
        self.acquire(size_hint, tag).map(ScopedStream::new)
    }

    /// Run `f` with a scoped stream. The stream is released however `f`
    /// exits.
    pub fn scoped<T, E, F>(
        &self,
        size_hint: usize,
        tag: impl Into<Arc<str>>,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut PooledStream) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut guard = self.acquire_scoped(size_hint, tag)?;
        f(&mut guard)
    }

    /// Release a stream, returning its memory to the pools.
    pub fn release(&self, mut stream: PooledStream) {
        if !stream.belongs_to(&self.inner) {
            warn!(
                "Stream {} released through a manager that did not create it",
                stream.id()
            );
        }
        stream.release();
    }

    /// Attach a consumer to this manager's event feed.
    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        self.inner.monitor.feed().subscribe()
    }

    pub fn monitor(&self) -> &LifecycleMonitor {
        &self.inner.monitor
    }

    /// Streams that have been acquired and not yet released or dropped.
    pub fn outstanding(&self) -> Vec<OutstandingStream> {
        self.inner.monitor.outstanding()
    }

    pub fn stats(&self) -> PoolStatistics {
        self.inner.stats()
    }

    /// Free every idle buffer in both tiers. Returns the bytes reclaimed.
    pub fn trim(&self) -> usize {
        self.inner.trim()
    }

    /// Trim both tiers every `interval` on a background thread until the
    /// returned handle is stopped or dropped.
    pub fn spawn_trimmer(&self, interval: Duration) -> Result<TrimmerHandle> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name("streampool-trimmer".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        inner.trim();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        debug!("Trimmer started, interval {:?}", interval);
        Ok(TrimmerHandle {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    fn check_stream_cap(&self, requested: usize) -> Result<()> {
        match self.inner.max_stream_capacity() {
            Some(maximum) if requested > maximum => {
                Err(Error::CapacityExceeded { requested, maximum })
            }
            _ => Ok(()),
        }
    }
}

/// Guard that releases its stream on drop.
#[derive(Debug)]
pub struct ScopedStream {
    stream: PooledStream,
}

impl ScopedStream {
    fn new(stream: PooledStream) -> Self {
        Self { stream }
    }
}

impl Deref for ScopedStream {
    type Target = PooledStream;

    fn deref(&self) -> &PooledStream {
        &self.stream
    }
}

impl DerefMut for ScopedStream {
    fn deref_mut(&mut self) -> &mut PooledStream {
        &mut self.stream
    }
}

impl Drop for ScopedStream {
    fn drop(&mut self) {
        if !self.stream.is_released() {
            self.stream.release();
        }
    }
}

/// Background trimming thread. Stops when dropped.
pub struct TrimmerHandle {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TrimmerHandle {
    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TrimmerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::LargeBufferStrategy;
    use std::io::{Read, Seek, SeekFrom, Write};

    const MIB: usize = 1024 * 1024;

    fn small_options() -> PoolOptions {
        PoolOptions::builder()
            .block_size(64)
            .large_buffer_multiple(64)
            .max_buffer_size(1024)
            .max_small_pool_free_bytes(64 * 8)
            .max_large_pool_free_bytes(2048)
            .build()
            .unwrap()
    }

    fn manager() -> PoolManager {
        PoolManager::new(small_options()).unwrap()
    }

    fn leaked_ids(events: &Receiver<StreamEvent>) -> Vec<StreamId> {
        events
            .try_iter()
            .filter(|e| matches!(e, StreamEvent::Leaked { .. }))
            .filter_map(|e| e.stream_id())
            .collect()
    }

    #[test]
    fn test_invalid_options_rejected() {
        let mut options = small_options();
        options.block_size = 0;
        assert!(matches!(
            PoolManager::new(options),
            Err(Error::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_reuse_without_fresh_allocation() {
        let options = PoolOptions::builder()
            .block_size(4096)
            .large_buffer_multiple(MIB)
            .max_buffer_size(MIB)
            .build()
            .unwrap();
        let pool = PoolManager::new(options).unwrap();

        let mut first = pool.acquire(10_000, "first").unwrap();
        first.write_all(&[7u8; 10_000]).unwrap();
        assert_eq!(first.segment_count(), 3);
        assert_eq!(first.capacity(), 12_288);
        pool.release(first);
        assert_eq!(pool.stats().small.free_bytes, 12_288);

        let before = pool.stats().small.allocated;
        let second = pool.acquire(10_000, "second").unwrap();
        let after = pool.stats();
        assert_eq!(after.small.allocated, before);
        assert_eq!(after.small.hits, 3);
        pool.release(second);
    }

    #[test]
    fn test_free_bytes_never_exceed_cap() {
        let pool = manager();
        let streams: Vec<_> = (0..6).map(|_| pool.acquire(256, "burst").unwrap()).collect();
        streams.into_iter().for_each(|s| pool.release(s));

        let stats = pool.stats();
        assert_eq!(stats.small.free_bytes, 64 * 8);
        assert_eq!(stats.small.discarded, 24 - 8);
        assert_eq!(stats.small.in_use_bytes, 0);
    }

    #[test]
    fn test_capacity_holds_under_concurrency() {
        let pool = manager();
        let events = pool.subscribe();

        let workers: Vec<_> = (0..8)
            .map(|t| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let mut stream = pool.acquire((t * 37 + i) % 700, "worker").unwrap();
                        stream.write_all(&[t as u8; 300]).unwrap();
                        if i % 5 == 0 {
                            stream.contiguous().unwrap();
                        }
                        pool.release(stream);
                        let stats = pool.stats();
                        assert!(stats.small.free_bytes <= 64 * 8);
                        assert!(stats.large.free_bytes <= 2048);
                    }
                })
            })
            .collect();
        workers.into_iter().for_each(|w| w.join().unwrap());

        let stats = pool.stats();
        assert!(stats.small.free_bytes <= 64 * 8);
        assert!(stats.large.free_bytes <= 2048);
        assert_eq!(stats.in_use_bytes(), 0);
        assert_eq!(stats.streams_released, 1600);
        assert!(leaked_ids(&events).is_empty());
    }

    #[test]
    fn test_no_stale_data_after_reuse() {
        let pool = manager();
        let mut dirty = pool.acquire(512, "dirty").unwrap();
        dirty.write_all(&[0xAB; 512]).unwrap();
        pool.release(dirty);

        let mut clean = pool.acquire(512, "clean").unwrap();
        assert_eq!(clean.len(), 0);
        let mut buf = [0u8; 16];
        assert_eq!(clean.read(&mut buf).unwrap(), 0);

        clean.seek(SeekFrom::Start(400)).unwrap();
        clean.write_all(b"end").unwrap();
        let contents = clean.to_vec().unwrap();
        assert!(contents[..400].iter().all(|&b| b == 0));
        pool.release(clean);
    }

    #[test]
    fn test_leak_reported_once_with_creation_id() {
        let pool = manager();
        let events = pool.subscribe();

        let stream = pool.acquire(100, "leaky").unwrap();
        let id = stream.id();
        drop(stream);

        assert_eq!(leaked_ids(&events), vec![id]);
        let stats = pool.stats();
        assert_eq!(stats.streams_leaked, 1);
        assert_eq!(stats.streams_outstanding(), 0);
        // Memory is reclaimed even though the stream leaked.
        assert_eq!(stats.small.in_use_bytes, 0);
        assert_eq!(stats.small.free_count, 2);
    }

    #[test]
    fn test_released_stream_is_not_a_leak() {
        let pool = manager();
        let events = pool.subscribe();

        let stream = pool.acquire(100, "tidy").unwrap();
        let id = stream.id();
        pool.release(stream);

        let names: Vec<_> = events.try_iter().map(|e| (e.name(), e.stream_id())).collect();
        assert_eq!(
            names,
            vec![("StreamCreated", Some(id)), ("StreamReleased", Some(id))]
        );
        assert_eq!(pool.stats().streams_leaked, 0);
    }

    #[test]
    fn test_leak_carries_stack_when_enabled() {
        let mut options = small_options();
        options.generate_stack_traces = true;
        let pool = PoolManager::new(options).unwrap();
        let events = pool.subscribe();

        drop(pool.acquire(10, "traced").unwrap());

        let leak = events
            .try_iter()
            .find(|e| matches!(e, StreamEvent::Leaked { .. }))
            .unwrap();
        match leak {
            StreamEvent::Leaked { stacktrace, .. } => assert!(stacktrace.is_some()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_leak_without_stack_by_default() {
        let pool = manager();
        let events = pool.subscribe();
        drop(pool.acquire(10, "plain").unwrap());

        assert!(events.try_iter().any(|e| matches!(
            e,
            StreamEvent::Leaked {
                stacktrace: None,
                ..
            }
        )));
    }

    #[test]
    fn test_double_release_is_reported_not_fatal() {
        let pool = manager();
        let events = pool.subscribe();

        let mut stream = pool.acquire(64, "twice").unwrap();
        let id = stream.id();
        stream.release();
        stream.release();
        drop(stream);

        let stats = pool.stats();
        assert_eq!(stats.double_releases, 1);
        assert_eq!(stats.streams_released, 1);
        assert_eq!(stats.small.free_count, 1);
        let expected = StreamEvent::DoubleReleased {
            id,
            tag: Arc::from("twice"),
        };
        assert!(events.try_iter().any(|e| e == expected));
    }

    #[test]
    fn test_oversized_request_is_unpooled() {
        let pool = manager();
        let events = pool.subscribe();

        let stream = pool.acquire(5000, "huge").unwrap();
        assert_eq!(stream.capacity(), 5000);
        assert_eq!(pool.stats().unpooled_in_use_bytes, 5000);
        pool.release(stream);

        let stats = pool.stats();
        assert_eq!(stats.unpooled_allocations, 1);
        assert_eq!(stats.unpooled_in_use_bytes, 0);
        assert_eq!(stats.free_bytes(), 0);
        assert!(events.try_iter().any(|e| matches!(
            e,
            StreamEvent::BufferDiscarded {
                tier: Tier::Unpooled,
                size: 5000,
                reason: DiscardReason::Unpooled,
            }
        )));
    }

    #[test]
    fn test_acquire_contiguous_uses_size_classes() {
        let options = PoolOptions::builder()
            .block_size(64)
            .large_buffer_multiple(256)
            .max_buffer_size(256 * 8)
            .large_buffer_strategy(LargeBufferStrategy::Linear)
            .build()
            .unwrap();
        let pool = PoolManager::new(options).unwrap();

        let stream = pool.acquire_contiguous(300, "contig").unwrap();
        assert_eq!(stream.capacity(), 512);
        assert_eq!(stream.segment_count(), 1);
        pool.release(stream);

        let again = pool.acquire_contiguous(400, "contig").unwrap();
        assert_eq!(pool.stats().large.hits, 1);
        assert_eq!(pool.stats().large.allocated, 1);
        pool.release(again);
    }

    #[test]
    fn test_acquire_from_copies_and_rewinds() {
        let pool = manager();
        let mut stream = pool.acquire_from(b"hello pooled world", "copy").unwrap();
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.len(), 18);

        let mut text = String::new();
        stream.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello pooled world");
        pool.release(stream);
    }

    #[test]
    fn test_scoped_releases_on_error() {
        let pool = manager();
        let events = pool.subscribe();

        let result: Result<()> = pool.scoped(10, "scoped", |stream| {
            stream.write_all(b"partial")?;
            stream.seek(SeekFrom::Current(-100))?;
            Ok(())
        });
        assert!(result.is_err());

        let stats = pool.stats();
        assert_eq!(stats.streams_released, 1);
        assert_eq!(stats.streams_leaked, 0);
        assert!(leaked_ids(&events).is_empty());
    }

    #[test]
    fn test_scoped_releases_on_panic() {
        let pool = manager();
        let inner = pool.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut guard = inner.acquire_scoped(10, "panicky").unwrap();
            guard.write_all(b"x").unwrap();
            panic!("boom");
        }));
        assert!(outcome.is_err());

        let stats = pool.stats();
        assert_eq!(stats.streams_released, 1);
        assert_eq!(stats.streams_leaked, 0);
    }

    #[test]
    fn test_scoped_guard_tolerates_manual_release() {
        let pool = manager();
        {
            let mut guard = pool.acquire_scoped(10, "manual").unwrap();
            guard.release();
        }
        assert_eq!(pool.stats().double_releases, 0);
    }

    #[test]
    fn test_stream_cap_on_acquire() {
        let mut options = small_options();
        options.max_stream_capacity = Some(128);
        let pool = PoolManager::new(options).unwrap();
        assert!(matches!(
            pool.acquire(129, "too big"),
            Err(Error::CapacityExceeded { requested: 129, maximum: 128 })
        ));
    }

    #[test]
    fn test_outstanding_audit() {
        let pool = manager();
        let a = pool.acquire(1, "a").unwrap();
        let b = pool.acquire(1, "b").unwrap();
        pool.release(a);

        let outstanding = pool.outstanding();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].id, b.id());
        assert_eq!(&*outstanding[0].tag, "b");
        pool.release(b);
        assert!(pool.outstanding().is_empty());
    }

    #[test]
    fn test_trim_reclaims_idle_memory() {
        let pool = manager();
        let stream = pool.acquire(256, "trim").unwrap();
        pool.release(stream);
        let mut contiguous = pool.acquire_contiguous(512, "trim").unwrap();
        contiguous.write_all(&[1; 10]).unwrap();
        pool.release(contiguous);

        assert_eq!(pool.trim(), 256 + 512);
        assert_eq!(pool.stats().free_bytes(), 0);
        assert_eq!(pool.trim(), 0);
    }

    #[test]
    fn test_background_trimmer() {
        let pool = manager();
        let trimmer = pool.spawn_trimmer(Duration::from_millis(5)).unwrap();
        pool.release(pool.acquire(128, "idle").unwrap());

        let mut trimmed = false;
        for _ in 0..200 {
            if pool.stats().small.free_bytes == 0 {
                trimmed = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        trimmer.stop();
        assert!(trimmed);
    }

    #[test]
    fn test_stats_snapshot_is_read_only() {
        let pool = manager();
        let stream = pool.acquire(192, "stats").unwrap();
        let first = pool.stats();
        let second = pool.stats();
        assert_eq!(first.small, second.small);
        assert_eq!(first.streams_created, second.streams_created);
        pool.release(stream);
    }
}
