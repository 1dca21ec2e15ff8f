pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use metrics::PoolStatistics;
pub use monitor::{EventLogger, LeakReport, StreamEvent};
pub use pool::{PoolManager, PoolOptions, PooledStream, ScopedStream};
pub use types::StreamId;
