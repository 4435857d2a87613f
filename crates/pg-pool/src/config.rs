//! Pool configuration.

use pg_client::config::DEFAULT_COMPLETION_SLOT_CACHE;

use crate::error::PoolError;

/// Default number of commands that may wait for a worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Commands that may wait for a worker before submission is refused.
    pub queue_capacity: usize,

    /// Idle completion slots kept for reuse.
    pub completion_slot_cache: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            completion_slot_cache: DEFAULT_COMPLETION_SLOT_CACHE,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the command queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set how many idle completion slots are kept.
    #[must_use]
    pub fn completion_slot_cache(mut self, count: usize) -> Self {
        self.completion_slot_cache = count;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.queue_capacity == 0 {
            return Err(PoolError::Configuration(
                "queue_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
