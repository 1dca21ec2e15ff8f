//! Diagnostic event feed.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::pool::Tier;
use crate::types::StreamId;

/// Why a buffer was freed instead of pooled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The tier already idles its maximum number of bytes
    PoolFull,
    /// The buffer came from an allocation above `max_buffer_size`
    Unpooled,
}

/// One lifecycle or pool event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Created {
        id: StreamId,
        tag: Arc<str>,
        size: usize,
    },
    Released {
        id: StreamId,
    },
    Leaked {
        id: StreamId,
        tag: Arc<str>,
        lifetime_ms: u64,
        stacktrace: Option<Arc<str>>,
    },
    DoubleReleased {
        id: StreamId,
        tag: Arc<str>,
    },
    BufferDiscarded {
        tier: Tier,
        size: usize,
        reason: DiscardReason,
    },
}

impl StreamEvent {
    /// Stable event name, used as the log prefix.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Created { .. } => "StreamCreated",
            StreamEvent::Released { .. } => "StreamReleased",
            StreamEvent::Leaked { .. } => "StreamLeaked",
            StreamEvent::DoubleReleased { .. } => "StreamDoubleReleased",
            StreamEvent::BufferDiscarded { .. } => "BufferDiscarded",
        }
    }

    /// Stream the event refers to, if any.
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            StreamEvent::Created { id, .. }
            | StreamEvent::Released { id }
            | StreamEvent::Leaked { id, .. }
            | StreamEvent::DoubleReleased { id, .. } => Some(*id),
            StreamEvent::BufferDiscarded { .. } => None,
        }
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.name())?;
        match self {
            StreamEvent::Created { id, tag, size } => {
                write!(f, "id={}, tag={}, size={}", id, tag, size)
            }
            StreamEvent::Released { id } => write!(f, "id={}", id),
            StreamEvent::Leaked {
                id,
                tag,
                lifetime_ms,
                stacktrace,
            } => {
                write!(f, "id={}, tag={}, lifetime={}ms", id, tag, lifetime_ms)?;
                if stacktrace.is_some() {
                    write!(f, ", stacktrace captured")?;
                }
                Ok(())
            }
            StreamEvent::DoubleReleased { id, tag } => write!(f, "id={}, tag={}", id, tag),
            StreamEvent::BufferDiscarded { tier, size, reason } => {
                write!(f, "tier={}, size={}, reason={:?}", tier, size, reason)
            }
        }
    }
}

/// Events a subscriber may hold unread before newer ones are dropped.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Broadcast channel fanning events out to every subscriber.
///
/// Each subscriber gets a bounded channel and publishing never blocks: an
/// event that does not fit in a subscriber's backlog is dropped for that
/// subscriber and counted. Events published while nobody is subscribed are
/// lost.
pub struct EventFeed {
    subscribers: Mutex<Vec<Sender<StreamEvent>>>,
    capacity: usize,
    active: AtomicBool,
    dropped: AtomicU64,
}

impl EventFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Feed whose subscribers each buffer at most `capacity` unread events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            active: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Attach a new consumer. It receives every event published from now on,
    /// as long as it keeps up.
    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        let (tx, rx) = channel::bounded(self.capacity);
        self.subscribers.lock().push(tx);
        self.active.store(true, Ordering::Release);
        rx
    }

    /// Whether anyone is listening.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Publish an event. The closure only runs when there is a subscriber.
    ///
    /// Subscribers whose receiver has been dropped are removed.
    #[inline]
    pub fn emit(&self, event: impl FnOnce() -> StreamEvent) {
        if !self.is_active() {
            return;
        }

        let event = event();
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        if subscribers.is_empty() {
            self.active.store(false, Ordering::Release);
        }
    }

    /// Number of attached consumers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Events dropped because a subscriber's backlog was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}
