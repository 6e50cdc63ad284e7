//! The current-pipeline slot and the stable reader in front of it.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::capability::ByteStream;
use crate::session::SessionState;

const COPY_BUF_SIZE: usize = 8 * 1024;

/// A started capture → encode chain bound to one route.
///
/// Dropping the last handle cancels the pipeline's lifecycle.
pub(crate) struct ActivePipeline {
    pub route_id: u32,
    pub iteration: u64,
    lifecycle: CancellationToken,
    stream: Mutex<ByteStream>,
    _guard: DropGuard,
}

impl ActivePipeline {
    pub fn new(
        route_id: u32,
        iteration: u64,
        lifecycle: CancellationToken,
        stream: ByteStream,
    ) -> Self {
        Self {
            route_id,
            iteration,
            _guard: lifecycle.clone().drop_guard(),
            lifecycle,
            stream: Mutex::new(stream),
        }
    }
}

/// Holds at most one active pipeline.
///
/// Readers take the shared lock for the duration of a read; installing or
/// clearing a pipeline takes the exclusive lock.
pub(crate) struct PipelineSlot {
    current: RwLock<Option<Arc<ActivePipeline>>>,
    installed: watch::Sender<Option<u64>>,
}

impl PipelineSlot {
    pub fn new() -> Self {
        let (installed, _rx) = watch::channel(None);
        Self {
            current: RwLock::new(None),
            installed,
        }
    }

    /// Installs `pipeline` unless its lifecycle was cancelled in the meantime.
    ///
    /// The cancellation check happens under the exclusive lock, so a
    /// superseded attempt can never overwrite a newer pipeline. On refusal the
    /// pipeline is handed back for the caller to drop.
    pub async fn install(&self, pipeline: ActivePipeline) -> Result<(), ActivePipeline> {
        // A queued writer blocks new readers, so stale attempts never queue.
        if pipeline.lifecycle.is_cancelled() {
            return Err(pipeline);
        }
        let mut current = self.current.write().await;
        if pipeline.lifecycle.is_cancelled() {
            return Err(pipeline);
        }
        let iteration = pipeline.iteration;
        *current = Some(Arc::new(pipeline));
        self.installed.send_replace(Some(iteration));
        Ok(())
    }

    /// Empties the slot if it holds a pipeline from before `iteration`.
    pub async fn clear_older_than(&self, iteration: u64) -> bool {
        let mut current = self.current.write().await;
        if current.as_ref().is_some_and(|p| p.iteration < iteration) {
            *current = None;
            self.installed.send_replace(None);
            return true;
        }
        false
    }

    /// Empties the slot.
    pub async fn clear(&self) {
        let mut current = self.current.write().await;
        if current.take().is_some() {
            self.installed.send_replace(None);
        }
    }

    /// Route id of the installed pipeline.
    pub async fn route_id(&self) -> Option<u32> {
        self.current.read().await.as_ref().map(|p| p.route_id)
    }
}

/// Outcome of one delegated read.
enum ReadOutcome {
    Bytes(usize),
    /// The pipeline with this iteration was cancelled mid-read.
    Cancelled(u64),
}

/// A single read endpoint that outlives the pipelines behind it.
///
/// Every [`read`](StableReader::read) goes to whichever pipeline is current
/// at that moment. Clones share the same slot.
#[derive(Clone)]
pub struct StableReader {
    slot: Arc<PipelineSlot>,
    session: CancellationToken,
    state: Arc<SessionState>,
}

impl StableReader {
    pub(crate) fn new(
        slot: Arc<PipelineSlot>,
        session: CancellationToken,
        state: Arc<SessionState>,
    ) -> Self {
        Self {
            slot,
            session,
            state,
        }
    }

    /// Reads from the current pipeline.
    ///
    /// Returns `Ok(0)` when no pipeline is installed or the session has
    /// ended.
    ///
    /// # Errors
    ///
    /// Returns an [`io::ErrorKind::Interrupted`] error if the pipeline being
    /// read is superseded mid-read, or whatever error the pipeline's stream
    /// reports.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_current(buf).await? {
            ReadOutcome::Bytes(n) => Ok(n),
            ReadOutcome::Cancelled(_) => Err(cancelled()),
        }
    }

    async fn read_current(&self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        if self.session.is_cancelled() {
            return Ok(ReadOutcome::Bytes(0));
        }

        let current = self.slot.current.read().await;
        let Some(pipeline) = current.as_ref() else {
            return Ok(ReadOutcome::Bytes(0));
        };

        let mut stream = pipeline.stream.lock().await;
        let n = tokio::select! {
            biased;
            () = pipeline.lifecycle.cancelled() => {
                if self.session.is_cancelled() {
                    return Ok(ReadOutcome::Bytes(0));
                }
                return Ok(ReadOutcome::Cancelled(pipeline.iteration));
            }
            n = stream.read(buf) => n?,
        };

        self.state.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(ReadOutcome::Bytes(n))
    }

    /// Copies everything the session produces into `writer`.
    ///
    /// A read cut short by a route change is resumed on the pipeline that
    /// replaces it. A pipeline that ends on its own, such as a recorder
    /// exiting because its route vanished before the next one was seen, ends
    /// the copy. Returns the number of bytes written once the stream ends.
    ///
    /// # Errors
    ///
    /// Returns the first read or write error other than a superseded read.
    pub async fn copy_to<W>(&self, writer: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut total = 0u64;

        loop {
            match self.read_current(&mut buf).await? {
                ReadOutcome::Bytes(0) => break,
                ReadOutcome::Bytes(n) => {
                    writer.write_all(&buf[..n]).await?;
                    total += n as u64;
                }
                ReadOutcome::Cancelled(iteration) => {
                    debug!(iteration, "read superseded, waiting for next pipeline");
                    if !self.wait_for_replacement(iteration).await {
                        break;
                    }
                }
            }
        }

        writer.flush().await?;
        Ok(total)
    }

    /// Waits until a pipeline newer than `iteration` is installed. Returns
    /// `false` if the session ended first.
    async fn wait_for_replacement(&self, iteration: u64) -> bool {
        let mut installed = self.slot.installed.subscribe();
        let newer = installed.wait_for(|current| matches!(*current, Some(i) if i > iteration));
        tokio::select! {
            biased;
            () = self.session.cancelled() => false,
            changed = newer => changed.is_ok(),
        }
    }
}

impl std::fmt::Debug for StableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StableReader")
            .field("installed", &*self.slot.installed.borrow())
            .field("session_cancelled", &self.session.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "pipeline cancelled")
}
