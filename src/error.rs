//! Error types for stream-app-audio.
//!
//! Errors are split by how far they travel:
//! - **Fatal errors** ([`StreamAppAudioError`]): returned from a call and stop it
//! - **Absorbed errors** ([`SnapshotError`], [`CapabilityError`]): logged and
//!   reported through the [`EventCallback`](crate::EventCallback); the session
//!   keeps running and recovers on the next observed route change
//!
//! Read-time failures on the active pipeline are plain [`std::io::Error`]s.

use std::process::ExitStatus;

/// Fatal errors returned by the public API.
#[derive(Debug, thiserror::Error)]
pub enum StreamAppAudioError {
    /// No route belonging to the target application is currently listed.
    #[error("no audio route found for application '{app_name}'")]
    RouteNotFound {
        /// Application name that was searched for.
        app_name: String,
    },

    /// The route listing could not be obtained or parsed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The session ended before the requested operation could complete.
    #[error("stream session closed")]
    SessionClosed,

    /// Reading the stream or writing it out failed.
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The builder was given a configuration it cannot run with.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },
}

/// Failures while taking one snapshot of the route listing.
///
/// These are transient: the watcher logs them and retries on its next tick.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The listing command could not be run at all.
    #[error("snapshot command '{command}' unavailable: {source}")]
    Unavailable {
        /// Program that was invoked.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The listing command ran but reported failure.
    #[error("snapshot command '{command}' failed ({status}): {stderr}")]
    CommandFailed {
        /// Program that was invoked.
        command: String,
        /// Exit status of the command.
        status: ExitStatus,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The listing text did not follow the expected grammar.
    #[error("malformed snapshot at line {line}: {reason}")]
    Malformed {
        /// 1-based line number of the offending line.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
}

impl SnapshotError {
    /// Creates a malformed-snapshot error for the given line.
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

/// Failures while starting a capture or encode capability.
///
/// A capability either hands back a live stream or fails with one of these
/// before producing any bytes.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// The collaborator process could not be spawned.
    #[error("failed to start {name}: {source}")]
    Spawn {
        /// Capability name.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The process started but one of its standard pipes was not available.
    #[error("{name} has no {pipe} pipe")]
    MissingPipe {
        /// Capability name.
        name: String,
        /// Which pipe was missing (`stdin` or `stdout`).
        pipe: &'static str,
    },

    /// The input stream could not be handed to the process as its stdin.
    #[error("failed to attach input to {name}: {source}")]
    Stdin {
        /// Capability name.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Custom error for user-implemented capabilities.
    #[error("{0}")]
    Custom(String),
}

impl CapabilityError {
    /// Creates a custom capability error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a spawn error for the named capability.
    pub fn spawn(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            name: name.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_not_found_display() {
        let err = StreamAppAudioError::RouteNotFound {
            app_name: "firefox".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no audio route found for application 'firefox'"
        );
    }

    #[test]
    fn test_snapshot_error_is_transparent() {
        let err: StreamAppAudioError = SnapshotError::malformed(3, "bad id").into();
        assert_eq!(err.to_string(), "malformed snapshot at line 3: bad id");
    }

    #[test]
    fn test_capability_error_custom() {
        let err = CapabilityError::custom("device busy");
        assert_eq!(err.to_string(), "device busy");
    }

    #[test]
    fn test_capability_error_spawn() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = CapabilityError::spawn("parec", io_err);
        assert!(err.to_string().starts_with("failed to start parec"));
    }
}
