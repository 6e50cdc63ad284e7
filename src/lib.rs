//! # stream-app-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Stream one desktop application's audio as a continuous encoded byte stream.
//!
//! `stream-app-audio` finds the playback route (PulseAudio/PipeWire "sink
//! input") of a named application, captures it with an external recorder,
//! pipes it through an external encoder, and hands the result out through a
//! single reader that keeps working while the application's route comes and
//! goes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stream_app_audio::StreamAppAudio;
//!
//! let session = StreamAppAudio::builder("firefox")
//!     .on_event(|e| tracing::debug!(?e, "stream event"))
//!     .start()
//!     .await?;
//!
//! // Wait for the first pipeline, then copy MP3 bytes to a client
//! let mut client = tokio::io::stdout();
//! session.copy_to(&mut client).await?;
//!
//! session.stop().await;
//! ```
//!
//! ## Architecture
//!
//! Each session runs two tasks plus one task per pipeline start:
//!
//! - **Route Watcher**: polls `pactl list sink-inputs` and emits the app's
//!   route id whenever it changes
//! - **Supervisor**: cancels the running capture → encode chain and starts a
//!   new one for every emitted route
//! - **Stable Reader**: reads from whichever chain is current, under a
//!   read/write lock
//!
//! Every chain's lifecycle is a child of the session's, so cancelling the
//! session kills every process it spawned.

#![warn(missing_docs)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
pub mod capability;
mod config;
mod error;
mod event;
mod pipeline;
mod session;
pub mod snapshot;
mod watcher;

pub use builder::{SessionBuilder, StreamAppAudio};
pub use capability::{ByteStream, Capture, Encode, ProcessCapture, ProcessEncoder};
pub use config::StreamConfig;
pub use error::{CapabilityError, SnapshotError, StreamAppAudioError};
pub use event::{event_callback, EventCallback, PipelineStage, StreamEvent};
pub use pipeline::{StableReader, SupervisorState};
pub use session::{Session, SessionStats};
pub use snapshot::{
    find_route, parse_snapshot, render_snapshot, PactlSnapshot, Properties, Route, SnapshotSource,
};
pub use watcher::RouteWatcher;
