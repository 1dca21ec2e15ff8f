//! Pool configuration.

use crate::error::{Error, Result};

/// How large buffers are bucketed into size classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LargeBufferStrategy {
    /// Classes are `multiple * 2^k`. Bounds fragmentation to under half a
    /// buffer and keeps the number of free lists logarithmic.
    Exponential,
    /// Classes are `multiple * k`.
    Linear,
}

/// Construction-time options for a `PoolManager`.
///
/// A free-byte limit of 0 disables pooling for that tier; there is no
/// "unbounded" setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Size of every small block (default: 128KB)
    pub block_size: usize,

    /// Maximum idle bytes held by the small-block tier (default: 64MB)
    pub max_small_pool_free_bytes: usize,

    /// Maximum idle bytes held by the large-buffer tier (default: 256MB)
    pub max_large_pool_free_bytes: usize,

    /// Largest pooled buffer; bigger requests bypass the pools (default: 128MB)
    pub max_buffer_size: usize,

    /// Step of the large-buffer size classes (default: 1MB)
    pub large_buffer_multiple: usize,

    /// Size-class progression for large buffers (default: exponential)
    pub large_buffer_strategy: LargeBufferStrategy,

    /// Hard cap on the capacity of a single stream (default: none)
    pub max_stream_capacity: Option<usize>,

    /// Capture a backtrace for every acquisition (default: false)
    pub generate_stack_traces: bool,

    /// Zero segments before they go back on a free list (default: false)
    pub zero_on_return: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            block_size: 128 * 1024,
            max_small_pool_free_bytes: 64 * 1024 * 1024,
            max_large_pool_free_bytes: 256 * 1024 * 1024,
            max_buffer_size: 128 * 1024 * 1024,
            large_buffer_multiple: 1024 * 1024,
            large_buffer_strategy: LargeBufferStrategy::Exponential,
            max_stream_capacity: None,
            generate_stack_traces: false,
            zero_on_return: false,
        }
    }
}

impl PoolOptions {
    /// Start a builder from the defaults.
    pub fn builder() -> PoolOptionsBuilder {
        PoolOptionsBuilder::default()
    }

    /// Check every invariant the pools rely on.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::invalid_option(
                "block_size",
                "must be greater than zero",
            ));
        }

        if self.large_buffer_multiple == 0 {
            return Err(Error::invalid_option(
                "large_buffer_multiple",
                "must be greater than zero",
            ));
        }

        if self.max_buffer_size < self.block_size {
            return Err(Error::invalid_option(
                "max_buffer_size",
                format!(
                    "{} is smaller than block_size {}",
                    self.max_buffer_size, self.block_size
                ),
            ));
        }

        if self.max_buffer_size % self.large_buffer_multiple != 0 {
            return Err(Error::invalid_option(
                "max_buffer_size",
                format!(
                    "{} is not a multiple of large_buffer_multiple {}",
                    self.max_buffer_size, self.large_buffer_multiple
                ),
            ));
        }

        if self.large_buffer_strategy == LargeBufferStrategy::Exponential
            && !(self.max_buffer_size / self.large_buffer_multiple).is_power_of_two()
        {
            return Err(Error::invalid_option(
                "max_buffer_size",
                format!(
                    "{} is not large_buffer_multiple {} times a power of two",
                    self.max_buffer_size, self.large_buffer_multiple
                ),
            ));
        }

        if self.max_stream_capacity == Some(0) {
            return Err(Error::invalid_option(
                "max_stream_capacity",
                "must be greater than zero when set",
            ));
        }

        Ok(())
    }
}

/// Builder for `PoolOptions`; `build` validates.
#[derive(Debug, Default)]
pub struct PoolOptionsBuilder {
    options: PoolOptions,
}

impl PoolOptionsBuilder {
    pub fn block_size(mut self, size: usize) -> Self {
        self.options.block_size = size;
        self
    }

    pub fn max_small_pool_free_bytes(mut self, bytes: usize) -> Self {
        self.options.max_small_pool_free_bytes = bytes;
        self
    }

    pub fn max_large_pool_free_bytes(mut self, bytes: usize) -> Self {
        self.options.max_large_pool_free_bytes = bytes;
        self
    }

    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.options.max_buffer_size = size;
        self
    }

    pub fn large_buffer_multiple(mut self, size: usize) -> Self {
        self.options.large_buffer_multiple = size;
        self
    }

    pub fn large_buffer_strategy(mut self, strategy: LargeBufferStrategy) -> Self {
        self.options.large_buffer_strategy = strategy;
        self
    }

    pub fn max_stream_capacity(mut self, capacity: usize) -> Self {
        self.options.max_stream_capacity = Some(capacity);
        self
    }

    pub fn generate_stack_traces(mut self, enable: bool) -> Self {
        self.options.generate_stack_traces = enable;
        self
    }

    pub fn zero_on_return(mut self, enable: bool) -> Self {
        self.options.zero_on_return = enable;
        self
    }

    /// Build the options
    pub fn build(self) -> Result<PoolOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
