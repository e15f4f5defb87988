//! Shared domain types for the partsmith tutorial pipeline.
//!
//! Nothing in this crate performs I/O. The service crate builds requests,
//! runs stages and serializes events; the types it passes around live here
//! so that other consumers (a CLI, a client, a test harness) can decode the
//! event stream without pulling in the runtime.

pub mod event;
pub mod ideas;
pub mod request;
pub mod stage;

pub use event::PipelineEvent;
pub use ideas::IdeasReport;
pub use request::{ImageRef, ProjectRequest};
pub use stage::{StageResult, StageState};
