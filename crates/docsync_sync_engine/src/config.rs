//! Configuration for the sync engine.

/// Default number of per-item storage operations in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;

/// Default upper bound on the encoded size of one array element.
pub const DEFAULT_MAX_ITEM_BYTES: usize = 16 * 1024 * 1024;

/// Default read buffer size for the input stream.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for bulk synchronization.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of per-item storage operations in flight.
    pub max_concurrency: usize,
    /// Maximum encoded size of a single array element, in bytes.
    pub max_item_bytes: usize,
    /// Capacity of the buffered reader over the input stream.
    pub read_buffer_size: usize,
}

impl SyncConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Sets the concurrency limit. Zero is treated as one.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Sets the per-element size limit.
    pub fn with_max_item_bytes(mut self, bytes: usize) -> Self {
        self.max_item_bytes = bytes;
        self
    }

    /// Sets the read buffer size. Zero is treated as one.
    pub fn with_read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
