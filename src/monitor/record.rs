use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::types::StreamId;

/// Where a stream is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    Created,
    /// Terminal: explicitly released
    Released,
    /// Terminal: reclaimed without a release
    Leaked,
}

impl LifecycleStatus {
    /// Only `Created` may move, and only to one of the terminal states.
    #[inline]
    pub fn can_transition_to(self, next: LifecycleStatus) -> bool {
        matches!(
            (self, next),
            (LifecycleStatus::Created, LifecycleStatus::Released)
                | (LifecycleStatus::Created, LifecycleStatus::Leaked)
        )
    }
}

/// Per-stream bookkeeping held by the monitor. Holds no buffer memory.
#[derive(Debug)]
pub struct LifecycleRecord {
    pub tag: Arc<str>,
    pub size: usize,
    pub created_at: Instant,
    pub stacktrace: Option<Backtrace>,
    status: LifecycleStatus,
}

impl LifecycleRecord {
    pub fn new(tag: Arc<str>, size: usize, stacktrace: Option<Backtrace>) -> Self {
        Self {
            tag,
            size,
            created_at: Instant::now(),
            stacktrace,
            status: LifecycleStatus::Created,
        }
    }

    #[inline]
    pub fn status(&self) -> LifecycleStatus {
        self.status
    }

    /// Apply a transition; returns false and leaves the record untouched if
    /// the transition is not legal.
    pub fn transition(&mut self, next: LifecycleStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    #[inline]
    pub fn lifetime(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Diagnostic produced for a stream reclaimed without an explicit release.
#[derive(Debug, Clone)]
pub struct LeakReport {
    pub id: StreamId,
    pub tag: Arc<str>,
    pub lifetime: Duration,
    /// Allocation-site backtrace, present only when capture was enabled.
    pub stacktrace: Option<Arc<str>>,
}

impl LeakReport {
    pub(crate) fn from_record(id: StreamId, record: LifecycleRecord) -> Self {
        Self {
            id,
            lifetime: record.lifetime(),
            stacktrace: record
                .stacktrace
                .map(|bt| Arc::from(bt.to_string().as_str())),
            tag: record.tag,
        }
    }

    #[inline]
    pub fn has_stacktrace(&self) -> bool {
        self.stacktrace.is_some()
    }

    pub fn lifetime_ms(&self) -> u64 {
        u64::try_from(self.lifetime.as_millis()).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream {} (tag {}) leaked after {}ms",
            self.id,
            self.tag,
            self.lifetime_ms()
        )?;
        if let Some(stack) = &self.stacktrace {
            write!(f, "\nallocated at:\n{}", stack)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        let mut record = LifecycleRecord::new(Arc::from("t"), 0, None);
        assert_eq!(record.status(), LifecycleStatus::Created);
        assert!(record.transition(LifecycleStatus::Released));
        assert_eq!(record.status(), LifecycleStatus::Released);
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        let mut record = LifecycleRecord::new(Arc::from("t"), 0, None);
        assert!(record.transition(LifecycleStatus::Leaked));
        assert!(!record.transition(LifecycleStatus::Released));
        assert!(!record.transition(LifecycleStatus::Created));
        assert_eq!(record.status(), LifecycleStatus::Leaked);
    }

    #[test]
    fn test_leak_report_carries_stacktrace() {
        let record =
            LifecycleRecord::new(Arc::from("report"), 8, Some(Backtrace::force_capture()));
        let report = LeakReport::from_record(StreamId::new(9), record);
        assert!(report.has_stacktrace());
        assert!(report.to_string().contains("allocated at:"));

        let bare = LeakReport::from_record(
            StreamId::new(10),
            LifecycleRecord::new(Arc::from("x"), 8, None),
        );
        assert!(!bare.has_stacktrace());
        assert!(bare.to_string().starts_with("stream 10 (tag x) leaked"));
    }
}
