//! Error types for seqplex.

use thiserror::Error;

/// Result type for seqplex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Contract violations reported by the multiplexers and the slicer.
///
/// Every variant is raised synchronously, before any value is pulled from the
/// underlying source, and is never recovered internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// A slice was requested with a step of zero
    #[error("argument 'step' should be an integer different from 0")]
    ZeroStep,

    /// A value was supplied when resuming a fork
    #[error("a fork cannot be resumed with a value")]
    InjectedValue,
}
