use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter backing `StreamId::next`. Starts at 1 so that 0 never
/// names a live stream.
static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a pooled stream.
///
/// Ids increase monotonically for the lifetime of the process and are shared
/// across every pool manager, so lifecycle events from different managers can
/// be told apart when they end up in the same log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StreamId(u64);

impl StreamId {
    /// Create a StreamId from a raw u64 value
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocate the next unused id
    #[inline]
    pub fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the underlying u64 value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<StreamId> for u64 {
    fn from(id: StreamId) -> Self {
        id.0
    }
}
