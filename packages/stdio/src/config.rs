//! Configuration for the stream service.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StdioError};

/// Default size of a library-owned buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default registry capacity.
pub const DEFAULT_MAX_STREAMS: usize = 1024;

/// How streams opened for both reading and writing cache their I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DualDirection {
    /// Buffer both directions and apply the direction-switch rule.
    #[default]
    Buffered,
    /// Cache neither direction; every call reaches the descriptor.
    Unbuffered,
}

/// Configuration for a [`Stdio`](crate::Stdio) service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdioConfig {
    /// Size used when a library-owned buffer is requested with size 0.
    pub buffer_size: usize,

    /// Maximum number of simultaneously registered streams.
    pub max_streams: usize,

    /// Direction class given to read-write descriptor streams.
    pub dual_direction: DualDirection,
}

impl StdioConfig {
    /// Reject configurations no stream could be opened under.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(StdioError::InvalidArgument("buffer_size must be non-zero"));
        }
        if self.max_streams == 0 {
            return Err(StdioError::InvalidArgument("max_streams must be non-zero"));
        }
        Ok(())
    }
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_streams: DEFAULT_MAX_STREAMS,
            dual_direction: DualDirection::Buffered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StdioConfig::default();
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.max_streams, DEFAULT_MAX_STREAMS);
        assert_eq!(config.dual_direction, DualDirection::Buffered);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserialize_partial_config() {
        let config: StdioConfig =
            serde_json::from_str(r#"{"buffer_size": 64, "dual_direction": "unbuffered"}"#)
                .unwrap();
        assert_eq!(config.buffer_size, 64);
        assert_eq!(config.max_streams, DEFAULT_MAX_STREAMS);
        assert_eq!(config.dual_direction, DualDirection::Unbuffered);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let config = StdioConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StdioConfig {
            max_streams: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
