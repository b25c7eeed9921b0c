//! Prioritized experience replay (PER) on top of [`PrioritySumTree`](crate::PrioritySumTree).
//!
//! [`PerSampler`] keeps the priorities of the transitions stored in a ring
//! buffer owned by the caller, samples slots in proportion to the priorities
//! and computes the importance sampling weights that correct the resulting
//! bias. The exponent of the weights is scheduled by [`IwScheduler`].
//!
//! ```rust
//! use prioreplay_core::sampler::{PerConfig, PerSampler};
//!
//! let config = PerConfig::default().capacity(1000).seed(42);
//! let mut sampler = PerSampler::build(&config).unwrap();
//!
//! // Register 64 transitions stored in the replay buffer.
//! sampler.push(64).unwrap();
//!
//! let batch = sampler.sample(32).unwrap();
//! let td_errs = vec![0.5f32; batch.ixs.len()];
//! sampler.update_priority(&batch.ixs, &td_errs).unwrap();
//! ```
mod base;
mod config;
mod iw_scheduler;
pub use base::{PerBatch, PerSampler, WeightNormalizer};
pub use config::PerConfig;
pub use iw_scheduler::IwScheduler;
