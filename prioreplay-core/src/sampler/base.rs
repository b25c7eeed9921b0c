//! Prioritized sampler over the slots of a replay buffer.
use super::{IwScheduler, PerConfig};
use crate::{
    error::PrioError,
    record::{Record, RecordValue},
    PrioritySumTree,
};
use log::{debug, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};
use segment_tree::{ops::MinIgnoreNaN, SegmentPoint};
use serde::{Deserialize, Serialize};

/// How importance weights are normalized.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum WeightNormalizer {
    /// Normalize by the largest weight among all stored slots.
    All,

    /// Normalize by the largest weight in the sampled batch.
    Batch,
}

/// Slots drawn by [`PerSampler::sample`] with their importance weights.
#[derive(Debug, Clone, PartialEq)]
pub struct PerBatch {
    /// Sampled slots.
    pub ixs: Vec<usize>,

    /// Normalized importance weights, one per slot, in `(0, 1]`.
    pub weight: Vec<f32>,
}

/// Prioritized experience replay over the slots of a ring buffer.
///
/// The sampler does not own transitions. It mirrors the ring buffer of
/// the caller: [`push`](Self::push) registers newly stored transitions,
/// [`sample`](Self::sample) picks slots in proportion to their priorities
/// and [`update_priority`](Self::update_priority) feeds back TD errors.
///
/// Priorities are stored as $p_i = (|\delta_i| + \epsilon)^\alpha$ and the
/// importance weight of a sampled slot is $w_i = (N P(i))^{-\beta}$,
/// normalized by the largest weight according to [`WeightNormalizer`].
pub struct PerSampler {
    sum_tree: PrioritySumTree,

    /// Smallest stored priority, used by [`WeightNormalizer::All`].
    min_tree: SegmentPoint<f64, MinIgnoreNaN>,

    alpha: f64,
    eps: f64,
    normalize: WeightNormalizer,
    iw_scheduler: IwScheduler,
    rng: StdRng,
}

fn check_config(config: &PerConfig) -> Result<(), PrioError> {
    let non_negative = [
        ("alpha", config.alpha),
        ("beta_0", config.beta_0),
        ("beta_final", config.beta_final),
    ];
    for &(name, v) in non_negative.iter() {
        if !(v >= 0.0 && v.is_finite()) {
            return Err(PrioError::InvalidConfig(format!(
                "{} must be a non-negative number, got {}",
                name, v
            )));
        }
    }
    if !(config.eps > 0.0 && config.eps.is_finite()) {
        return Err(PrioError::InvalidConfig(format!(
            "eps must be positive, got {}",
            config.eps
        )));
    }
    Ok(())
}

impl PerSampler {
    /// Builds a sampler with no stored slot.
    pub fn build(config: &PerConfig) -> Result<Self, PrioError> {
        check_config(config)?;
        let sum_tree = PrioritySumTree::new(config.capacity)?;
        let min_tree = SegmentPoint::build(vec![f64::MAX; config.capacity], MinIgnoreNaN);
        debug!(
            "PER sampler: capacity = {}, alpha = {}, beta = {} -> {}, normalize = {:?}",
            config.capacity, config.alpha, config.beta_0, config.beta_final, config.normalize
        );

        Ok(Self {
            sum_tree,
            min_tree,
            alpha: f64::from(config.alpha),
            eps: f64::from(config.eps),
            normalize: config.normalize,
            iw_scheduler: IwScheduler::new(
                config.beta_0,
                config.beta_final,
                config.n_opts_final,
            ),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Number of stored slots.
    pub fn len(&self) -> usize {
        self.sum_tree.len()
    }

    /// Returns `true` if no slot has been pushed.
    pub fn is_empty(&self) -> bool {
        self.sum_tree.is_empty()
    }

    /// The underlying sum tree.
    pub fn sum_tree(&self) -> &PrioritySumTree {
        &self.sum_tree
    }

    /// Current exponent of importance weights.
    pub fn beta(&self) -> f32 {
        self.iw_scheduler.beta()
    }

    /// Registers `n` newly stored transitions and returns their slots.
    ///
    /// New transitions get the largest priority stored so far, `1` for the
    /// first ones, so that each is sampled at least once with high probability.
    pub fn push(&mut self, n: usize) -> Result<Vec<usize>, PrioError> {
        let p = match self.sum_tree.max() {
            p if p > 0.0 => p,
            _ => 1.0,
        };

        let mut slots = Vec::with_capacity(n);
        for _ in 0..n {
            let slot = self.sum_tree.cursor();
            self.sum_tree.append(p)?;
            self.min_tree.modify(slot, p);
            slots.push(slot);
        }

        Ok(slots)
    }

    /// Samples `batch_size` slots in proportion to their priorities.
    pub fn sample(&mut self, batch_size: usize) -> Result<PerBatch, PrioError> {
        if batch_size == 0 {
            return Err(PrioError::InvalidConfig("batch size must be positive".to_string()));
        }
        if self.sum_tree.is_empty() {
            return Err(PrioError::EmptyDistribution);
        }

        let mut ixs = Vec::with_capacity(batch_size);
        let mut ps = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let u: f64 = self.rng.gen();
            let (ix, p) = self.sum_tree.find_with_weight(u, true)?;
            ixs.push(ix);
            ps.push(p);
        }

        // (N P(i))^-beta divided by its maximum is (p_min / p_i)^beta.
        let p_min = match self.normalize {
            WeightNormalizer::All => self.min_tree.query(0, self.sum_tree.len()),
            WeightNormalizer::Batch => ps.iter().fold(f64::MAX, |m, &p| m.min(p)),
        };
        let beta = f64::from(self.iw_scheduler.beta());
        let weight = ps
            .iter()
            .map(|&p| (p_min / p).powf(beta) as f32)
            .collect();

        Ok(PerBatch { ixs, weight })
    }

    /// Sets priorities of stored slots from TD errors and advances the schedule of beta.
    ///
    /// Nothing is modified when any input is rejected.
    pub fn update_priority(&mut self, ixs: &[usize], td_errs: &[f32]) -> Result<(), PrioError> {
        if ixs.len() != td_errs.len() {
            return Err(PrioError::LengthMismatch(ixs.len(), td_errs.len()));
        }

        let len = self.sum_tree.len();
        let mut ps = Vec::with_capacity(ixs.len());
        for (&ix, &td_err) in ixs.iter().zip(td_errs.iter()) {
            if ix >= len {
                return Err(PrioError::IndexOutOfRange {
                    slot: ix,
                    capacity: len,
                });
            }
            let p = (f64::from(td_err.abs()) + self.eps).powf(self.alpha);
            if !p.is_finite() {
                return Err(PrioError::NonFiniteWeight(f64::from(td_err)));
            }
            ps.push(p);
        }

        for (&ix, &p) in ixs.iter().zip(ps.iter()) {
            self.sum_tree.update(ix, p)?;
            self.min_tree.modify(ix, p);
        }
        self.iw_scheduler.add_n_opts();
        trace!("PER sampler: updated {} priorities", ixs.len());

        Ok(())
    }

    /// Summary of the sampler state.
    pub fn record(&self) -> Record {
        Record::from_slice(&[
            ("per_total", RecordValue::Scalar(self.sum_tree.total() as f32)),
            ("per_max", RecordValue::Scalar(self.sum_tree.max() as f32)),
            ("per_len", RecordValue::Scalar(self.sum_tree.len() as f32)),
            ("per_beta", RecordValue::Scalar(self.beta())),
        ])
    }
}
