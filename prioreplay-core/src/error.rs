//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrioError {
    /// The requested capacity cannot hold any slot.
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(usize),

    /// Slot index outside of `[0, capacity)`.
    #[error("Slot {slot} is out of range for capacity {capacity}")]
    IndexOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Capacity of the tree.
        capacity: usize,
    },

    /// Priorities must be non-negative.
    #[error("Negative weight: {0}")]
    NegativeWeight(f64),

    /// Priorities must be finite.
    #[error("Non-finite weight: {0}")]
    NonFiniteWeight(f64),

    /// Search target is NaN.
    #[error("Invalid search target: {0}")]
    InvalidTarget(f64),

    /// All stored weights are zero, nothing can be sampled.
    #[error("Cannot sample from an empty distribution")]
    EmptyDistribution,

    /// Slot indices and priorities have different lengths.
    #[error("Length mismatch: {0} indices, {1} priorities")]
    LengthMismatch(usize, usize),

    /// Invalid configuration value.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
