//! Pipeline supervisor: swaps the capture → encode chain on route changes.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use super::reader::{ActivePipeline, PipelineSlot};
use super::readiness::Readiness;
use crate::capability::{ByteStream, Capture, Encode};
use crate::event::{emit, PipelineStage};
use crate::session::SessionState;
use crate::snapshot::Route;
use crate::{CapabilityError, EventCallback, StreamEvent};

/// Where the supervisor is in its pipeline cycle.
///
/// ```text
/// Idle → Starting → Active
///            ↑        │ new route
///            └── Superseded
/// ```
///
/// `Closed` is terminal for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No pipeline has been requested, or the last attempt failed.
    Idle,
    /// A start attempt for the latest route is in flight.
    Starting,
    /// The latest route's pipeline is serving reads.
    Active,
    /// The previous pipeline was cancelled for a newer route.
    Superseded,
    /// The session lifecycle ended.
    Closed,
}

/// Lifecycle of the newest pipeline, started or still starting.
struct Current {
    route_id: u32,
    iteration: u64,
    lifecycle: CancellationToken,
}

/// Reacts to watcher routes by cancelling the current pipeline and starting
/// a new one.
///
/// Each start runs in its own task so a slow start never delays the next
/// route. Every pipeline lifecycle is a child of the session lifecycle.
pub(crate) struct Supervisor {
    capture: Arc<dyn Capture>,
    encode: Arc<dyn Encode>,
    slot: Arc<PipelineSlot>,
    readiness: Arc<Readiness>,
    state: Arc<SessionState>,
    event_callback: Option<EventCallback>,
}

impl Supervisor {
    pub fn new(
        capture: Arc<dyn Capture>,
        encode: Arc<dyn Encode>,
        slot: Arc<PipelineSlot>,
        readiness: Arc<Readiness>,
        state: Arc<SessionState>,
    ) -> Self {
        Self {
            capture,
            encode,
            slot,
            readiness,
            state,
            event_callback: None,
        }
    }

    /// Sets the event callback.
    pub fn with_event_callback(mut self, callback: Option<EventCallback>) -> Self {
        self.event_callback = callback;
        self
    }

    fn emit(&self, event: StreamEvent) {
        emit(self.event_callback.as_ref(), event);
    }

    /// Spawns the coordination loop inside `span`.
    pub fn spawn(
        self,
        routes: mpsc::Receiver<Route>,
        session: CancellationToken,
        span: Span,
    ) -> JoinHandle<()> {
        tokio::spawn(Arc::new(self).run(routes, session).instrument(span))
    }

    /// Coordination loop. Returns once the session lifecycle ends or the
    /// route channel closes.
    async fn run(self: Arc<Self>, mut routes: mpsc::Receiver<Route>, session: CancellationToken) {
        let mut current: Option<Current> = None;
        let mut iteration = 0u64;
        let mut attempts = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = session.cancelled() => break,
                Some(joined) = attempts.join_next() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "pipeline start task failed");
                    }
                }
                route = routes.recv() => {
                    let Some(route) = route else { break };
                    iteration += 1;
                    let next = self.supersede(current.take(), route.id, iteration, &session);
                    attempts.spawn(
                        Arc::clone(&self)
                            .start(next.route_id, next.iteration, next.lifecycle.clone())
                            .in_current_span(),
                    );
                    current = Some(next);
                }
            }
        }

        self.close(current, attempts).await;
    }

    /// Cancels the previous pipeline and creates the lifecycle for the next.
    fn supersede(
        &self,
        previous: Option<Current>,
        route_id: u32,
        iteration: u64,
        session: &CancellationToken,
    ) -> Current {
        self.state.route_changes.fetch_add(1, Ordering::SeqCst);

        if let Some(previous) = previous {
            previous.lifecycle.cancel();
            self.state.set_state(SupervisorState::Superseded);
            info!(
                route_id = previous.route_id,
                iteration = previous.iteration,
                "pipeline superseded"
            );
            self.emit(StreamEvent::PipelineSuperseded {
                route_id: previous.route_id,
                iteration: previous.iteration,
            });
        }

        self.state.begin(SupervisorState::Starting, route_id, iteration);
        debug!(route_id, iteration, "starting pipeline");

        Current {
            route_id,
            iteration,
            lifecycle: session.child_token(),
        }
    }

    /// One start attempt: capture, then encode, then install.
    async fn start(self: Arc<Self>, route_id: u32, iteration: u64, lifecycle: CancellationToken) {
        if lifecycle.is_cancelled() {
            debug!(route_id, iteration, "superseded before start");
            return;
        }

        let stream = match self.start_chain(route_id, &lifecycle) {
            Ok(stream) => stream,
            Err((stage, e)) => {
                self.fail(route_id, iteration, &lifecycle, stage, &e).await;
                return;
            }
        };

        let pipeline = ActivePipeline::new(route_id, iteration, lifecycle, stream);
        if self.slot.install(pipeline).await.is_err() {
            debug!(route_id, iteration, "start attempt superseded, discarding pipeline");
            return;
        }

        self.state.pipelines_started.fetch_add(1, Ordering::SeqCst);
        self.state.settle(iteration, SupervisorState::Active);
        info!(route_id, iteration, "pipeline started");
        self.emit(StreamEvent::PipelineStarted {
            route_id,
            iteration,
        });

        if self.readiness.fire() {
            info!(route_id, "stream ready");
            self.emit(StreamEvent::StreamReady { route_id });
        }
    }

    fn start_chain(
        &self,
        route_id: u32,
        lifecycle: &CancellationToken,
    ) -> Result<ByteStream, (PipelineStage, CapabilityError)> {
        let raw = self
            .capture
            .start(route_id, lifecycle)
            .map_err(|e| (PipelineStage::Capture, e))?;
        self.encode
            .start(raw, lifecycle)
            .map_err(|e| (PipelineStage::Encode, e))
    }

    async fn fail(
        &self,
        route_id: u32,
        iteration: u64,
        lifecycle: &CancellationToken,
        stage: PipelineStage,
        error: &CapabilityError,
    ) {
        // Releases whatever the capture side already spawned.
        lifecycle.cancel();

        self.state.start_failures.fetch_add(1, Ordering::SeqCst);
        let capability = match stage {
            PipelineStage::Capture => self.capture.name(),
            PipelineStage::Encode => self.encode.name(),
        };
        warn!(route_id, iteration, %stage, capability, error = %error, "pipeline start failed");
        self.emit(StreamEvent::PipelineStartFailed {
            route_id,
            iteration,
            stage,
            error: error.to_string(),
        });

        if self.slot.clear_older_than(iteration).await {
            debug!(route_id, iteration, "cleared stale pipeline");
        }
        self.state.settle(iteration, SupervisorState::Idle);
    }

    async fn close(&self, current: Option<Current>, mut attempts: JoinSet<()>) {
        if let Some(current) = current {
            current.lifecycle.cancel();
        }
        while attempts.join_next().await.is_some() {}

        self.slot.clear().await;
        self.readiness.close();
        self.state.set_state(SupervisorState::Closed);
        info!("session closed");
        self.emit(StreamEvent::SessionClosed);
    }
}
