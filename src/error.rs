//! Error conditions that cross the embedding boundary.
//!
//! Per the design, nothing in the steady-state data path returns a `Result`:
//! end-of-stream, a skipped transform, and callback panics are all observed
//! through stage-active flags and the stats stream instead. [`PipelineError`]
//! only covers setup-time mistakes and the one place a worker thread can
//! still surprise its caller — having panicked straight through the
//! `catch_unwind` boundary (e.g. because the panic hook itself panicked).

use std::fmt;

/// Errors surfaced by [`crate::PipelineSystem`] setup and shutdown.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A queue was requested with capacity zero.
    #[error("queue capacity must be non-zero")]
    ZeroCapacity,

    /// A `spawn_*` call arrived after [`crate::PipelineSystem::start`] had
    /// already been called. The graph cannot be reshaped once running.
    #[error("cannot spawn a new stage after the pipeline has started")]
    AlreadyStarted,

    /// One or more worker threads panicked past their `catch_unwind`
    /// boundary and could not be joined cleanly.
    #[error("{0} worker thread(s) panicked: {1}")]
    JoinPanicked(usize, JoinPanics),
}

/// The names of the stages whose threads panicked, for display in
/// [`PipelineError::JoinPanicked`].
#[derive(Debug)]
pub struct JoinPanics(pub Vec<String>);

impl fmt::Display for JoinPanics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}
