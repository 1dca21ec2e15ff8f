//! Stream lifecycle monitoring and leak detection.
//!
//! The monitor keeps one record per live stream and correlates three
//! signals: creation, explicit release, and reclamation (the stream being
//! dropped). A stream reclaimed while still in `Created` state is a leak.
//! Records are removed as soon as their terminal event is reported, so the
//! table only ever holds live streams.

mod event;
mod listener;
mod record;

pub use event::{DiscardReason, EventFeed, StreamEvent, DEFAULT_FEED_CAPACITY};
pub use listener::EventLogger;
pub use record::{LeakReport, LifecycleRecord, LifecycleStatus};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::StreamId;

/// A live stream as seen by an audit.
#[derive(Debug, Clone)]
pub struct OutstandingStream {
    pub id: StreamId,
    pub tag: Arc<str>,
    pub size: usize,
    pub age: Duration,
    pub has_stacktrace: bool,
}

/// Correlates lifecycle signals per stream id.
///
/// All methods take a short lock on the record table and never block on
/// consumers: events go out through the [`EventFeed`].
pub struct LifecycleMonitor {
    records: Mutex<FxHashMap<StreamId, LifecycleRecord>>,
    feed: EventFeed,
}

impl LifecycleMonitor {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(FxHashMap::default()),
            feed: EventFeed::new(),
        }
    }

    /// Feed the monitor publishes on.
    pub fn feed(&self) -> &EventFeed {
        &self.feed
    }

    /// A stream was constructed.
    pub fn on_created(
        &self,
        id: StreamId,
        tag: Arc<str>,
        size: usize,
        stacktrace: Option<Backtrace>,
    ) {
        self.feed.emit(|| StreamEvent::Created {
            id,
            tag: tag.clone(),
            size,
        });
        self.records
            .lock()
            .insert(id, LifecycleRecord::new(tag, size, stacktrace));
    }

    /// A stream was explicitly released. Returns how long it lived.
    pub fn on_released(&self, id: StreamId) -> Option<Duration> {
        let Some(mut record) = self.records.lock().remove(&id) else {
            debug!("Release for untracked stream {}", id);
            return None;
        };

        if !record.transition(LifecycleStatus::Released) {
            return None;
        }
        self.feed.emit(|| StreamEvent::Released { id });
        Some(record.lifetime())
    }

    /// A stream was reclaimed. Returns a leak report if it was never released.
    pub fn on_finalized(&self, id: StreamId) -> Option<LeakReport> {
        let mut record = self.records.lock().remove(&id)?;
        if !record.transition(LifecycleStatus::Leaked) {
            return None;
        }

        let report = LeakReport::from_record(id, record);
        match &report.stacktrace {
            Some(stack) => warn!(
                "Stream {} (tag {}) dropped without release after {}ms, allocated at:\n{}",
                report.id,
                report.tag,
                report.lifetime_ms(),
                stack
            ),
            None => warn!(
                "Stream {} (tag {}) dropped without release after {}ms",
                report.id,
                report.tag,
                report.lifetime_ms()
            ),
        }

        self.feed.emit(|| StreamEvent::Leaked {
            id,
            tag: report.tag.clone(),
            lifetime_ms: report.lifetime_ms(),
            stacktrace: report.stacktrace.clone(),
        });
        Some(report)
    }

    /// Whether a stream is still awaiting its terminal event.
    pub fn is_tracked(&self, id: StreamId) -> bool {
        self.records.lock().contains_key(&id)
    }

    /// Number of live streams.
    pub fn tracked_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Every live stream, oldest first.
    pub fn outstanding(&self) -> Vec<OutstandingStream> {
        let mut streams: Vec<OutstandingStream> = self
            .records
            .lock()
            .iter()
            .map(|(id, record)| OutstandingStream {
                id: *id,
                tag: record.tag.clone(),
                size: record.size,
                age: record.lifetime(),
                has_stacktrace: record.stacktrace.is_some(),
            })
            .collect();
        streams.sort_by_key(|s| s.id);
        streams
    }
}

impl Default for LifecycleMonitor {
    fn default() -> Self {
        Self::new()
    }
}
