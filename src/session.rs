//! Stream session management.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::pipeline::{PipelineSlot, Readiness, StableReader, SupervisorState};
use crate::StreamAppAudioError;

/// Statistics about a stream session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Route ids received from the watcher, including the initial one.
    pub route_changes: u64,
    /// Pipelines that became the current reader.
    pub pipelines_started: u64,
    /// Pipeline start attempts that failed.
    pub start_failures: u64,
    /// Bytes handed out by the stable reader.
    pub bytes_read: u64,
}

/// Supervisor position as seen from outside.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SupervisorStatus {
    pub state: SupervisorState,
    pub route_id: Option<u32>,
    pub iteration: u64,
}

/// Internal state shared between Session and background tasks.
pub(crate) struct SessionState {
    pub running: AtomicBool,
    pub route_changes: AtomicU64,
    pub pipelines_started: AtomicU64,
    pub start_failures: AtomicU64,
    pub bytes_read: AtomicU64,
    pub supervisor: Mutex<SupervisorStatus>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            route_changes: AtomicU64::new(0),
            pipelines_started: AtomicU64::new(0),
            start_failures: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            supervisor: Mutex::new(SupervisorStatus {
                state: SupervisorState::Idle,
                route_id: None,
                iteration: 0,
            }),
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            route_changes: self.route_changes.load(Ordering::SeqCst),
            pipelines_started: self.pipelines_started.load(Ordering::SeqCst),
            start_failures: self.start_failures.load(Ordering::SeqCst),
            bytes_read: self.bytes_read.load(Ordering::SeqCst),
        }
    }

    /// Moves to `state` for a new attempt.
    pub fn begin(&self, state: SupervisorState, route_id: u32, iteration: u64) {
        *self.supervisor.lock() = SupervisorStatus {
            state,
            route_id: Some(route_id),
            iteration,
        };
    }

    /// Moves to `state` only if `iteration` is still the latest attempt.
    pub fn settle(&self, iteration: u64, state: SupervisorState) {
        let mut status = self.supervisor.lock();
        if status.iteration == iteration {
            status.state = state;
        }
    }

    pub fn set_state(&self, state: SupervisorState) {
        self.supervisor.lock().state = state;
    }
}

/// Handle to a running stream session.
///
/// The `Session` is returned by [`SessionBuilder::start()`] and owns the
/// route watcher, the pipeline supervisor, and whatever pipeline is current.
/// Everything runs in background tasks until [`stop()`](Session::stop) is
/// called, the parent token is cancelled, or the `Session` is dropped.
///
/// # Lifecycle
///
/// 1. Created by [`SessionBuilder::start()`]
/// 2. Wait for [`ready()`](Session::ready), then read from
///    [`reader()`](Session::reader) or [`copy_to()`](Session::copy_to)
/// 3. Call [`stop()`](Session::stop) for graceful shutdown
/// 4. Dropping the `Session` also cancels everything (but prefer explicit `stop()`)
///
/// # Example
///
/// ```ignore
/// let session = StreamAppAudio::builder("firefox").start().await?;
///
/// session.ready().await?;
/// let mut stdout = tokio::io::stdout();
/// session.copy_to(&mut stdout).await?;
///
/// session.stop().await;
/// ```
///
/// [`SessionBuilder::start()`]: crate::SessionBuilder::start
pub struct Session {
    id: String,
    state: Arc<SessionState>,
    lifecycle: CancellationToken,
    slot: Arc<PipelineSlot>,
    readiness: Arc<Readiness>,
    watcher_handle: Option<JoinHandle<()>>,
    supervisor_handle: Option<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        state: Arc<SessionState>,
        lifecycle: CancellationToken,
        slot: Arc<PipelineSlot>,
        readiness: Arc<Readiness>,
        watcher_handle: JoinHandle<()>,
        supervisor_handle: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            state,
            lifecycle,
            slot,
            readiness,
            watcher_handle: Some(watcher_handle),
            supervisor_handle: Some(supervisor_handle),
        }
    }

    /// Short random id used in this session's log lines.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns `true` until the session is stopped or its lifecycle ends.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst) && !self.lifecycle.is_cancelled()
    }

    /// Returns current session statistics.
    pub fn stats(&self) -> SessionStats {
        self.state.stats()
    }

    /// Current supervisor state.
    pub fn state(&self) -> SupervisorState {
        self.state.supervisor.lock().state
    }

    /// Route id the supervisor most recently bound a pipeline to.
    pub fn route_id(&self) -> Option<u32> {
        self.state.supervisor.lock().route_id
    }

    /// Route id of the pipeline currently serving reads.
    pub async fn active_route_id(&self) -> Option<u32> {
        self.slot.route_id().await
    }

    /// Returns `true` once the first pipeline has become active.
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Waits until the first pipeline becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`StreamAppAudioError::SessionClosed`] if the session ends
    /// before any pipeline starts.
    pub async fn ready(&self) -> Result<(), StreamAppAudioError> {
        self.readiness.wait().await
    }

    /// The session's read endpoint.
    pub fn reader(&self) -> StableReader {
        StableReader::new(self.slot.clone(), self.lifecycle.clone(), self.state.clone())
    }

    /// Waits for readiness, then copies the stream into `writer` until it
    /// ends.
    ///
    /// # Errors
    ///
    /// Returns [`StreamAppAudioError::SessionClosed`] if the session ends
    /// before becoming ready, or [`StreamAppAudioError::Io`] if reading or
    /// writing fails.
    pub async fn copy_to<W>(&self, writer: &mut W) -> Result<u64, StreamAppAudioError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.ready().await?;
        Ok(self.reader().copy_to(writer).await?)
    }

    /// The session's lifecycle token.
    ///
    /// Cancelling it has the same effect as [`stop()`](Session::stop)
    /// without waiting for the background tasks.
    pub fn lifecycle(&self) -> &CancellationToken {
        &self.lifecycle
    }

    /// Stops the session.
    ///
    /// This will:
    /// 1. Cancel the session lifecycle, which kills the active pipeline
    /// 2. Wait for the route watcher to stop polling
    /// 3. Wait for the supervisor to close the session
    pub async fn stop(mut self) {
        self.stop_internal().await;
    }

    async fn stop_internal(&mut self) {
        self.state.running.store(false, Ordering::SeqCst);
        self.lifecycle.cancel();

        if let Some(handle) = self.watcher_handle.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.supervisor_handle.take() {
            let _ = handle.await;
        }
        debug!(session = %self.id, "session stopped");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state.running.swap(false, Ordering::SeqCst) {
            // Dropped without stop(); background tasks wind down on their own.
            self.lifecycle.cancel();
        }
    }
}
