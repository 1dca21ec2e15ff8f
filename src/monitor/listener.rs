//! Logging consumer for the event feed.

use crossbeam::channel::Receiver;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, Level};

use super::event::StreamEvent;
use crate::error::Result;

/// Writes every feed event to the `tracing` subscriber on its own thread.
///
/// The thread exits once every sender is gone, i.e. when the manager that
/// owns the feed has been dropped.
pub struct EventLogger {
    handle: JoinHandle<u64>,
}

impl EventLogger {
    /// Start logging events from `events`.
    pub fn spawn(events: Receiver<StreamEvent>) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("streampool-events".to_string())
            .spawn(move || {
                let mut logged = 0u64;
                for event in events.iter() {
                    Self::log(&event);
                    logged += 1;
                }
                logged
            })?;
        Ok(Self { handle })
    }

    /// Level an event is logged at.
    ///
    /// Leaks and double releases are already reported with `warn!` where
    /// they are detected, so the feed copy only goes to `debug`.
    pub fn level(event: &StreamEvent) -> Level {
        match event {
            StreamEvent::Created { .. } | StreamEvent::Released { .. } => Level::INFO,
            StreamEvent::Leaked { .. }
            | StreamEvent::DoubleReleased { .. }
            | StreamEvent::BufferDiscarded { .. } => Level::DEBUG,
        }
    }

    /// Log a single event.
    pub fn log(event: &StreamEvent) {
        if Self::level(event) == Level::INFO {
            info!("{}", event);
        } else {
            debug!("{}", event);
        }
    }

    /// Wait for the feed to close. Returns the number of events logged.
    pub fn join(self) -> u64 {
        self.handle.join().unwrap_or(0)
    }
}
