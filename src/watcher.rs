//! Route watcher: polls snapshots and reports route changes for one app.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::emit;
use crate::snapshot::{Route, SnapshotSource};
use crate::{EventCallback, StreamEvent};

/// Picks the route to emit from one snapshot.
///
/// Returns the first route belonging to `app_name` whose id differs from
/// `last_id`.
pub(crate) fn next_emission(
    routes: Vec<Route>,
    app_name: &str,
    last_id: Option<u32>,
) -> Option<Route> {
    routes
        .into_iter()
        .find(|route| route.belongs_to(app_name) && Some(route.id) != last_id)
}

/// Polls a [`SnapshotSource`] and emits the target application's route
/// whenever its id changes.
///
/// The watcher never emits the same id twice in a row. It stops, and closes
/// its output channel, once its lifecycle token is cancelled.
pub struct RouteWatcher {
    app_name: String,
    source: Arc<dyn SnapshotSource>,
    poll_interval: Duration,
    event_callback: Option<EventCallback>,
}

impl RouteWatcher {
    /// Creates a watcher for `app_name` (matched ignoring case).
    pub fn new(
        app_name: impl Into<String>,
        source: Arc<dyn SnapshotSource>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            source,
            poll_interval,
            event_callback: None,
        }
    }

    /// Sets the event callback.
    #[must_use]
    pub fn with_event_callback(mut self, callback: Option<EventCallback>) -> Self {
        self.event_callback = callback;
        self
    }

    /// Spawns the poll loop.
    ///
    /// `initial` is emitted first, before any snapshot is taken.
    pub fn spawn(
        self,
        initial: Route,
        capacity: usize,
        lifecycle: CancellationToken,
    ) -> (mpsc::Receiver<Route>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(self.run(initial, tx, lifecycle));
        (rx, handle)
    }

    /// Runs the poll loop until `lifecycle` is cancelled or the receiver
    /// goes away.
    pub async fn run(self, initial: Route, tx: mpsc::Sender<Route>, lifecycle: CancellationToken) {
        let mut last_id = None;

        if self.send(&tx, &lifecycle, initial, &mut last_id).await {
            self.poll(&tx, &lifecycle, &mut last_id).await;
        }

        debug!(app = %self.app_name, "route watcher stopped");
    }

    async fn poll(
        &self,
        tx: &mpsc::Sender<Route>,
        lifecycle: &CancellationToken,
        last_id: &mut Option<u32>,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = lifecycle.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let snapshot = tokio::select! {
                biased;
                () = lifecycle.cancelled() => return,
                snapshot = self.source.snapshot() => snapshot,
            };

            let routes = match snapshot {
                Ok(routes) => routes,
                Err(e) => {
                    warn!(app = %self.app_name, error = %e, "snapshot failed, retrying next tick");
                    emit(
                        self.event_callback.as_ref(),
                        StreamEvent::SnapshotFailed {
                            error: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            if let Some(route) = next_emission(routes, &self.app_name, *last_id) {
                if !self.send(tx, lifecycle, route, last_id).await {
                    return;
                }
            }
        }
    }

    /// Sends one route downstream. Returns `false` if the watcher should stop.
    async fn send(
        &self,
        tx: &mpsc::Sender<Route>,
        lifecycle: &CancellationToken,
        route: Route,
        last_id: &mut Option<u32>,
    ) -> bool {
        let current = route.id;
        let previous = *last_id;

        tokio::select! {
            biased;
            () = lifecycle.cancelled() => return false,
            sent = tx.send(route) => {
                if sent.is_err() {
                    debug!(app = %self.app_name, "route receiver dropped");
                    return false;
                }
            }
        }

        *last_id = Some(current);
        info!(app = %self.app_name, route_id = current, ?previous, "route changed");
        emit(
            self.event_callback.as_ref(),
            StreamEvent::RouteChanged { previous, current },
        );
        true
    }
}
