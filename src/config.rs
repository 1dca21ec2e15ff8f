use clap::Parser;

use crate::error::Result;
use crate::pool::{LargeBufferStrategy, PoolOptions};

/// streampool - pooled stream allocator with leak diagnostics
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // === Pool settings ===

    /// Size of every small-tier block in bytes
    #[arg(long, default_value = "131072")]
    pub block_size: usize,

    /// Maximum idle bytes kept by the small tier (0 disables pooling)
    #[arg(long, default_value = "67108864")]
    pub max_small_pool_free_bytes: usize,

    /// Maximum idle bytes kept by the large tier (0 disables pooling)
    #[arg(long, default_value = "268435456")]
    pub max_large_pool_free_bytes: usize,

    /// Requests above this size are allocated unpooled
    #[arg(long, default_value = "134217728")]
    pub max_buffer_size: usize,

    /// Base step of the large-tier size classes
    #[arg(long, default_value = "1048576")]
    pub large_buffer_multiple: usize,

    /// Use linear instead of exponential large-tier size classes
    #[arg(long)]
    pub linear_large_buffers: bool,

    /// Hard cap on a single stream's capacity in bytes
    #[arg(long)]
    pub max_stream_capacity: Option<usize>,

    /// Capture a stack trace for every stream so leaks show where they came from
    #[arg(long)]
    pub stack_traces: bool,

    /// Zero buffers before they return to a pool
    #[arg(long)]
    pub zero_on_return: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    // === Workload settings ===

    /// Streams acquired per worker thread
    #[arg(short, long, default_value = "100")]
    pub streams: usize,

    /// Bytes written to each stream
    #[arg(long, default_value = "10000")]
    pub stream_size: usize,

    /// Worker threads running the workload
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Drop one stream without releasing it to demonstrate leak reporting
    #[arg(long)]
    pub leak: bool,

    /// Trim idle pool memory every N milliseconds (0 disables)
    #[arg(long, default_value = "0")]
    pub trim_interval_ms: u64,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse_args() -> Self {
        Config::parse()
    }

    /// Build validated pool options from the command line settings.
    pub fn pool_options(&self) -> Result<PoolOptions> {
        let strategy = if self.linear_large_buffers {
            LargeBufferStrategy::Linear
        } else {
            LargeBufferStrategy::Exponential
        };

        let mut builder = PoolOptions::builder()
            .block_size(self.block_size)
            .max_small_pool_free_bytes(self.max_small_pool_free_bytes)
            .max_large_pool_free_bytes(self.max_large_pool_free_bytes)
            .max_buffer_size(self.max_buffer_size)
            .large_buffer_multiple(self.large_buffer_multiple)
            .large_buffer_strategy(strategy)
            .generate_stack_traces(self.stack_traces)
            .zero_on_return(self.zero_on_return);
        if let Some(capacity) = self.max_stream_capacity {
            builder = builder.max_stream_capacity(capacity);
        }
        builder.build()
    }
}

impl Default for Config {
    fn default() -> Self {
        let pool = PoolOptions::default();
        Self {
            block_size: pool.block_size,
            max_small_pool_free_bytes: pool.max_small_pool_free_bytes,
            max_large_pool_free_bytes: pool.max_large_pool_free_bytes,
            max_buffer_size: pool.max_buffer_size,
            large_buffer_multiple: pool.large_buffer_multiple,
            linear_large_buffers: false,
            max_stream_capacity: None,
            stack_traces: false,
            zero_on_return: false,
            log_level: "info".to_string(),
            streams: 100,
            stream_size: 10_000,
            threads: 4,
            leak: false,
            trim_interval_ms: 0,
        }
    }
}
