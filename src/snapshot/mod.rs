//! Route snapshots: the data model, the listing parser, and snapshot sources.
//!
//! A snapshot is the audio server's full listing of playback routes at one
//! point in time. Each call parses the listing from scratch, so records from
//! different snapshots never share state.

mod parser;
mod route;
mod source;

pub use parser::parse_snapshot;
pub use route::{render_snapshot, Properties, Route};
pub use source::{find_route, PactlSnapshot, SnapshotSource};
