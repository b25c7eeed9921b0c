#![warn(missing_docs)]
//! Sum tree and prioritized sampling for experience replay.
//!
//! [`PrioritySumTree`] stores a non-negative weight per slot of a fixed-size
//! ring buffer and samples slots in proportion to their weights.
//! [`sampler::PerSampler`] builds prioritized experience replay on top of it,
//! and [`record`] carries numeric summaries to recorders.
pub mod error;
pub mod record;
pub mod sampler;

mod sum_tree;
pub use error::PrioError;
pub use sum_tree::PrioritySumTree;
