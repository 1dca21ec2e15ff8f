//! Pooled buffer management.
//!
//! Streams are assembled from fixed-size blocks held in a lock-free small
//! tier. Single large buffers come from a size-classed large tier, and
//! anything above `max_buffer_size` is allocated directly and never pooled.
//! Both tiers cap the bytes they keep idle.

mod large;
mod manager;
mod options;
mod segment;
mod small;
mod stream;

pub use large::{LargeBufferPool, SizeClasses};
pub use manager::{PoolManager, ScopedStream, TrimmerHandle};
pub use options::{LargeBufferStrategy, PoolOptions, PoolOptionsBuilder};
pub use segment::{Segment, Tier};
pub use small::SizeClassPool;
pub use stream::PooledStream;
