//! Capture and encode capabilities.
//!
//! A capability turns a lifecycle (and, for capture, a route id) into a
//! readable [`ByteStream`]. Starting is synchronous: it either hands back a
//! live stream or fails before any bytes are produced. Everything a
//! capability spawns is tied to the lifecycle token it was started with and
//! is released when that token is cancelled.
//!
//! The crate ships process-backed implementations:
//!
//! - [`ProcessCapture`]: raw audio from a recorder process (`parec` by default)
//! - [`ProcessEncoder`]: compressed audio from an encoder process (`lame` by default)
//!
//! Implement [`Capture`] or [`Encode`] for other collaborators.

mod capture;
mod encode;
mod process;

pub use capture::ProcessCapture;
pub use encode::ProcessEncoder;

use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::ChildStdout;
use tokio_util::sync::CancellationToken;

use crate::CapabilityError;

/// Produces raw audio bytes for one route.
///
/// # Example
///
/// ```
/// use stream_app_audio::{ByteStream, CapabilityError, Capture};
/// use tokio_util::sync::CancellationToken;
///
/// struct Silence;
///
/// impl Capture for Silence {
///     fn name(&self) -> &str {
///         "silence"
///     }
///
///     fn start(
///         &self,
///         _route_id: u32,
///         _lifecycle: &CancellationToken,
///     ) -> Result<ByteStream, CapabilityError> {
///         Ok(ByteStream::from_reader(tokio::io::repeat(0)))
///     }
/// }
/// ```
pub trait Capture: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Starts capturing the given route.
    ///
    /// Resources backing the stream must be released once `lifecycle` is
    /// cancelled.
    fn start(
        &self,
        route_id: u32,
        lifecycle: &CancellationToken,
    ) -> Result<ByteStream, CapabilityError>;
}

/// Transforms a raw audio stream into a compressed one.
pub trait Encode: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Starts encoding `input`.
    ///
    /// Resources backing the stream must be released once `lifecycle` is
    /// cancelled.
    fn start(
        &self,
        input: ByteStream,
        lifecycle: &CancellationToken,
    ) -> Result<ByteStream, CapabilityError>;
}

impl<T: Capture + ?Sized> Capture for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn start(
        &self,
        route_id: u32,
        lifecycle: &CancellationToken,
    ) -> Result<ByteStream, CapabilityError> {
        (**self).start(route_id, lifecycle)
    }
}

impl<T: Encode + ?Sized> Encode for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn start(
        &self,
        input: ByteStream,
        lifecycle: &CancellationToken,
    ) -> Result<ByteStream, CapabilityError> {
        (**self).start(input, lifecycle)
    }
}

/// A readable byte stream handed between capabilities.
///
/// Streams backed by a child process's stdout can be passed straight to the
/// next process as its stdin; any other reader is pumped by a task.
pub struct ByteStream {
    inner: Inner,
}

enum Inner {
    Child(ChildStdout),
    Reader(Pin<Box<dyn AsyncRead + Send>>),
}

/// How a [`ByteStream`] gets into a child process.
pub(crate) enum StdinSource {
    /// Hand the descriptor over directly.
    Direct(Stdio),
    /// Copy bytes into a piped stdin.
    Pump(Pin<Box<dyn AsyncRead + Send>>),
}

impl ByteStream {
    /// Wraps any async reader.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            inner: Inner::Reader(Box::pin(reader)),
        }
    }

    /// Wraps a child process's stdout.
    pub fn from_child(stdout: ChildStdout) -> Self {
        Self {
            inner: Inner::Child(stdout),
        }
    }

    /// Returns `true` if the stream is a child process's stdout.
    pub fn is_process_output(&self) -> bool {
        matches!(self.inner, Inner::Child(_))
    }

    pub(crate) fn into_stdin(self) -> io::Result<StdinSource> {
        match self.inner {
            Inner::Child(stdout) => {
                let stdio: Stdio = stdout.try_into()?;
                Ok(StdinSource::Direct(stdio))
            }
            Inner::Reader(reader) => Ok(StdinSource::Pump(reader)),
        }
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            Inner::Child(_) => "child",
            Inner::Reader(_) => "reader",
        };
        f.debug_struct("ByteStream").field("kind", &kind).finish()
    }
}

impl AsyncRead for ByteStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Inner::Child(stdout) => Pin::new(stdout).poll_read(cx, buf),
            Inner::Reader(reader) => reader.as_mut().poll_read(cx, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_reader_stream_reads_through() {
        let mut stream = ByteStream::from_reader(&b"abc"[..]);
        assert!(!stream.is_process_output());

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_reader_stream_is_pumped() {
        let stream = ByteStream::from_reader(&b""[..]);
        assert!(matches!(stream.into_stdin(), Ok(StdinSource::Pump(_))));
    }

    #[test]
    fn test_debug_names_kind() {
        let stream = ByteStream::from_reader(&b""[..]);
        assert_eq!(format!("{stream:?}"), "ByteStream { kind: \"reader\" }");
    }

    #[test]
    fn test_capabilities_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<Arc<dyn Capture>>();
        assert_send_sync::<Arc<dyn Encode>>();
    }

    #[test]
    fn test_byte_stream_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ByteStream>();
    }
}
