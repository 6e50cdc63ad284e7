//! Builder pattern for `StreamAppAudio`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::capability::{Capture, Encode, ProcessCapture, ProcessEncoder};
use crate::pipeline::{PipelineSlot, Readiness, Supervisor};
use crate::session::{Session, SessionState};
use crate::snapshot::{find_route, PactlSnapshot, Route, SnapshotSource};
use crate::watcher::RouteWatcher;
use crate::{event_callback, EventCallback, StreamAppAudioError, StreamConfig, StreamEvent};

/// Length of the session id used in logs.
const SESSION_ID_LEN: usize = 8;

/// Builder for configuring and starting a stream session.
///
/// Use [`StreamAppAudio::builder()`] to create a new builder. Defaults:
/// routes are listed with `pactl`, captured with `parec`, and encoded to MP3
/// with `lame`.
///
/// # Example
///
/// ```ignore
/// use stream_app_audio::{ProcessEncoder, StreamAppAudio};
///
/// let session = StreamAppAudio::builder("firefox")
///     .encode(ProcessEncoder::lame().with_resample_khz(22.05))
///     .on_event(|e| tracing::debug!(?e, "stream event"))
///     .start()
///     .await?;
///
/// session.ready().await?;
/// ```
///
/// [`StreamAppAudio::builder()`]: crate::StreamAppAudio::builder
#[must_use]
pub struct SessionBuilder {
    /// Application whose audio is streamed.
    app_name: String,
    /// Route listing source.
    snapshot_source: Arc<dyn SnapshotSource>,
    /// Raw audio capability.
    capture: Arc<dyn Capture>,
    /// Encoding capability.
    encode: Arc<dyn Encode>,
    /// Route to bootstrap from instead of looking one up.
    initial_route: Option<Route>,
    /// Lifecycle the session is nested under.
    parent: Option<CancellationToken>,
    /// Event callback.
    event_callback: Option<EventCallback>,
    /// Stream configuration.
    config: StreamConfig,
}

impl SessionBuilder {
    /// Creates a builder for `app_name` with default collaborators.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            snapshot_source: Arc::new(PactlSnapshot::new()),
            capture: Arc::new(ProcessCapture::parec()),
            encode: Arc::new(ProcessEncoder::lame()),
            initial_route: None,
            parent: None,
            event_callback: None,
            config: StreamConfig::default(),
        }
    }

    /// Set the source the watcher takes snapshots from.
    ///
    /// Default: [`PactlSnapshot`]
    pub fn snapshot_source<S: SnapshotSource + 'static>(mut self, source: S) -> Self {
        self.snapshot_source = Arc::new(source);
        self
    }

    /// Set the capture capability.
    ///
    /// Default: [`ProcessCapture::parec()`]
    pub fn capture<C: Capture + 'static>(mut self, capture: C) -> Self {
        self.capture = Arc::new(capture);
        self
    }

    /// Set the encode capability.
    ///
    /// Default: [`ProcessEncoder::lame()`]
    pub fn encode<E: Encode + 'static>(mut self, encode: E) -> Self {
        self.encode = Arc::new(encode);
        self
    }

    /// Bootstrap from a known route instead of looking one up at start.
    pub fn initial_route(mut self, route: Route) -> Self {
        self.initial_route = Some(route);
        self
    }

    /// Nest the session lifecycle under `parent`.
    ///
    /// Cancelling the parent ends the session.
    pub fn parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include route changes, pipeline starts and failures, and
    /// snapshot errors.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Set custom stream configuration.
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), StreamAppAudioError> {
        if self.app_name.trim().is_empty() {
            return Err(StreamAppAudioError::InvalidConfig {
                reason: "application name must not be empty".to_string(),
            });
        }
        self.config.validate()
    }

    /// Start streaming.
    ///
    /// Looks up the application's current route (unless one was given with
    /// [`initial_route()`](Self::initial_route)), then spawns the route
    /// watcher and the pipeline supervisor. The first pipeline starts in the
    /// background; wait for it with [`Session::ready()`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The application name is empty or the configuration is invalid
    /// - The initial snapshot cannot be taken
    /// - The application has no route
    pub async fn start(self) -> Result<Session, StreamAppAudioError> {
        self.validate()?;

        let initial = match self.initial_route {
            Some(route) => route,
            None => find_route(self.snapshot_source.as_ref(), &self.app_name).await?,
        };

        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(SESSION_ID_LEN);

        let lifecycle = self
            .parent
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let state = Arc::new(SessionState::new());
        let slot = Arc::new(PipelineSlot::new());
        let readiness = Arc::new(Readiness::new());

        let span = info_span!("session", id = %id, app = %self.app_name);
        info!(
            parent: &span,
            route_id = initial.id,
            capture = self.capture.name(),
            encode = self.encode.name(),
            "session starting"
        );

        let (route_tx, route_rx) = mpsc::channel(self.config.route_channel_capacity);

        let watcher = RouteWatcher::new(
            self.app_name.clone(),
            self.snapshot_source.clone(),
            self.config.poll_interval,
        )
        .with_event_callback(self.event_callback.clone());
        let watcher_handle = tokio::spawn(
            watcher
                .run(initial, route_tx, lifecycle.clone())
                .instrument(span.clone()),
        );

        let supervisor = Supervisor::new(
            self.capture,
            self.encode,
            slot.clone(),
            readiness.clone(),
            state.clone(),
        )
        .with_event_callback(self.event_callback);
        let supervisor_handle = supervisor.spawn(route_rx, lifecycle.clone(), span);

        Ok(Session::new(
            id,
            state,
            lifecycle,
            slot,
            readiness,
            watcher_handle,
            supervisor_handle,
        ))
    }
}

/// Main entry point for stream-app-audio.
///
/// Use [`StreamAppAudio::builder()`] to start configuring a session.
pub struct StreamAppAudio;

impl StreamAppAudio {
    /// Creates a new builder for streaming `app_name`'s audio.
    pub fn builder(app_name: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(app_name)
    }
}
