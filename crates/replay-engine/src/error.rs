use alloy_primitives::B256;

use crate::replay::Phase;

/// Error types for the replay engine.
///
/// Every failure is scoped to the session that raised it; callers decide
/// whether to retry the whole pair.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Remote state fetch failed (node unreachable, timeout, malformed
    /// response). Fatal to the current session, never retried internally.
    #[error("remote state fetch failed: {0}")]
    RemoteFetch(String),

    /// No fork rule covers the requested block height.
    #[error("no fork rule covers block height {0}")]
    UnsupportedHeight(u64),

    /// A fork schedule failed validation.
    #[error("invalid fork schedule: {0}")]
    InvalidSchedule(String),

    /// A checkpoint was restored into an overlay that did not create it.
    #[error("checkpoint does not belong to this overlay session")]
    InvalidCheckpointUse,

    /// A session operation was invoked out of order.
    #[error("`{operation}` is not permitted in session phase {phase:?}")]
    InvalidPhase {
        /// The operation that was attempted.
        operation: &'static str,
        /// The phase the session was in.
        phase: Phase,
    },

    /// A code hash was requested that neither tier holds.
    #[error("no bytecode cached for code hash {0}")]
    MissingCode(B256),

    /// The execution backend rejected the transaction outright.
    ///
    /// Reverts and halts are not errors; they land in the trace as its
    /// outcome.
    #[error("execution error: {0}")]
    Execution(String),
}

// Allow ReplayError to be used as the overlay's Database error type.
impl revm::database::DBErrorMarker for ReplayError {}

/// Result type for the replay engine.
pub type Result<T> = std::result::Result<T, ReplayError>;
