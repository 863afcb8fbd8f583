//! Error types for the WarpGrid auto-rebalance strategy.

use thiserror::Error;

/// Result type alias for driver-level rebalance operations.
pub type RebalanceResult<T> = Result<T, RebalanceError>;

/// Errors surfaced by the driver layer (§4.5).
///
/// The placement algorithm itself never fails — `compute_partition_assignment`
/// returns a plain [`crate::algorithm::PartitionAssignment`] and degrades via
/// log warnings instead (unplaceable orphans, undrainable donors). Only the
/// driver, which must resolve a state-model definition and sanitize caller
/// input before invoking the algorithm, has real failure modes.
#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error("state model not found: {0}")]
    StateModelNotFound(String),

    #[error("state model '{0}' defines no positive-count states")]
    EmptyStateModel(String),

    #[error("more than one state uses the 'R' (remainder) count specifier in state model '{0}'")]
    MultipleRemainderStates(String),
}
