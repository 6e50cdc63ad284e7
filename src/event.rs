//! Runtime events for monitoring session health.
//!
//! Events are non-fatal notifications about session behavior. The session
//! continues running after events are emitted - they're for logging/metrics,
//! not error handling.

use std::sync::Arc;

/// Which capability a failed pipeline start belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Starting the capture capability for the route.
    Capture,
    /// Starting the encode capability on top of the capture output.
    Encode,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capture => f.write_str("capture"),
            Self::Encode => f.write_str("encode"),
        }
    }
}

/// Runtime events emitted while a session runs.
///
/// # Example
///
/// ```
/// use stream_app_audio::StreamEvent;
///
/// fn handle_event(event: StreamEvent) {
///     match event {
///         StreamEvent::RouteChanged { previous, current } => {
///             eprintln!("route {:?} -> {}", previous, current);
///         }
///         StreamEvent::PipelineStartFailed { route_id, stage, error, .. } => {
///             eprintln!("route {} {} failed: {}", route_id, stage, error);
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The watcher handed a new route id to the supervisor.
    RouteChanged {
        /// Previously emitted route id, `None` for the bootstrap emission.
        previous: Option<u32>,
        /// Newly emitted route id.
        current: u32,
    },

    /// A snapshot could not be taken; the watcher retries next tick.
    SnapshotFailed {
        /// Description of the failure.
        error: String,
    },

    /// A pipeline became the session's current reader.
    PipelineStarted {
        /// Route the pipeline is bound to.
        route_id: u32,
        /// Start attempt number within the session.
        iteration: u64,
    },

    /// A pipeline could not be started; the session waits for the next route.
    PipelineStartFailed {
        /// Route the pipeline was being bound to.
        route_id: u32,
        /// Start attempt number within the session.
        iteration: u64,
        /// Which step failed.
        stage: PipelineStage,
        /// Description of the failure.
        error: String,
    },

    /// A pipeline's lifecycle was cancelled because a newer route arrived.
    PipelineSuperseded {
        /// Route the cancelled pipeline was bound to.
        route_id: u32,
        /// Start attempt number of the cancelled pipeline.
        iteration: u64,
    },

    /// The first pipeline became active. Emitted at most once per session.
    StreamReady {
        /// Route of the first active pipeline.
        route_id: u32,
    },

    /// The session lifecycle ended and the supervisor stopped.
    SessionClosed,
}

/// Callback type for receiving runtime events.
///
/// Register an event callback via [`SessionBuilder::on_event()`].
///
/// [`SessionBuilder::on_event()`]: crate::SessionBuilder::on_event
pub type EventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use stream_app_audio::{event_callback, StreamEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(StreamEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Sends an event to the callback if one is registered.
pub(crate) fn emit(callback: Option<&EventCallback>, event: StreamEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_event_debug() {
        let event = StreamEvent::RouteChanged {
            previous: Some(5),
            current: 9,
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("RouteChanged"));
        assert!(debug.contains('9'));
    }

    #[test]
    fn test_pipeline_stage_display() {
        assert_eq!(PipelineStage::Capture.to_string(), "capture");
        assert_eq!(PipelineStage::Encode.to_string(), "encode");
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        emit(Some(&callback), StreamEvent::SessionClosed);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_emit_without_callback_is_noop() {
        emit(None, StreamEvent::SessionClosed);
    }
}
