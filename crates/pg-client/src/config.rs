//! Client configuration.

use pg_codec::{CodecConfig, DEFAULT_MAX_FRAME_SIZE};

use crate::error::{Error, Result};

/// Default number of idle completion slots kept for reuse.
pub const DEFAULT_COMPLETION_SLOT_CACHE: usize = 64;

/// Configuration for a client connection.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Largest backend frame accepted, including the header.
    pub max_frame_size: usize,

    /// Idle completion slots kept for reuse by command pools.
    pub completion_slot_cache: usize,

    /// Application name reported in logs.
    pub application_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            completion_slot_cache: DEFAULT_COMPLETION_SLOT_CACHE,
            application_name: None,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum accepted frame size.
    #[must_use]
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set how many idle completion slots to keep.
    #[must_use]
    pub fn completion_slot_cache(mut self, count: usize) -> Self {
        self.completion_slot_cache = count;
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size < pg_protocol::FRAME_HEADER_SIZE {
            return Err(Error::Config(format!(
                "max_frame_size ({}) is smaller than a frame header",
                self.max_frame_size
            )));
        }
        if self.max_frame_size > DEFAULT_MAX_FRAME_SIZE {
            return Err(Error::Config(format!(
                "max_frame_size ({}) exceeds the protocol limit ({DEFAULT_MAX_FRAME_SIZE})",
                self.max_frame_size
            )));
        }
        Ok(())
    }

    /// Codec settings derived from this configuration.
    #[must_use]
    pub fn codec(&self) -> CodecConfig {
        CodecConfig::new().max_frame_size(self.max_frame_size)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.completion_slot_cache, DEFAULT_COMPLETION_SLOT_CACHE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .max_frame_size(4096)
            .completion_slot_cache(8)
            .application_name("reports");
        assert_eq!(config.codec().max_frame_size, 4096);
        assert_eq!(config.completion_slot_cache, 8);
        assert_eq!(config.application_name.as_deref(), Some("reports"));
    }

    #[test]
    fn test_validate_rejects_tiny_frames() {
        let err = Config::new().max_frame_size(2).validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_oversized_frames() {
        let err = Config::new()
            .max_frame_size(DEFAULT_MAX_FRAME_SIZE + 1)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
