//! Pipeline supervision and the stable read endpoint.
//!
//! ```text
//! RouteWatcher → route channel → Supervisor → start attempt (capture → encode)
//!                                                   │
//!                                     PipelineSlot (RwLock) ← StableReader
//! ```
//!
//! - **Supervisor**: cancels the current pipeline on every new route and
//!   starts the next one in its own task
//! - **PipelineSlot**: holds at most one active pipeline behind a read/write lock
//! - **StableReader**: delegates each read to whatever the slot holds
//! - **Readiness**: fires once, when the first pipeline is installed

mod reader;
mod readiness;
mod supervisor;

pub use reader::StableReader;
pub use supervisor::SupervisorState;

pub(crate) use reader::PipelineSlot;
pub(crate) use readiness::Readiness;
pub(crate) use supervisor::Supervisor;
