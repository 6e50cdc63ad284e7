//! Configuration types for stream sessions.

use std::time::Duration;

use crate::StreamAppAudioError;

/// Configuration for session behavior.
///
/// Use [`StreamConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use stream_app_audio::StreamConfig;
/// use std::time::Duration;
///
/// let config = StreamConfig {
///     poll_interval: Duration::from_millis(500),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// How often the route watcher takes a fresh snapshot.
    ///
    /// Route changes are noticed no faster than this.
    /// Default: 250ms
    pub poll_interval: Duration,

    /// Capacity of the watcher → supervisor route channel.
    ///
    /// Default: 8
    pub route_channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            route_channel_capacity: 8,
        }
    }
}

impl StreamConfig {
    /// Checks that the configuration can drive a session.
    pub(crate) fn validate(&self) -> Result<(), StreamAppAudioError> {
        if self.poll_interval.is_zero() {
            return Err(StreamAppAudioError::InvalidConfig {
                reason: "poll_interval must be non-zero".to_string(),
            });
        }
        if self.route_channel_capacity == 0 {
            return Err(StreamAppAudioError::InvalidConfig {
                reason: "route_channel_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
