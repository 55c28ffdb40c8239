//! Mini-batch construction and hard-negative mining for online training.

use crate::classifier::{forward_feature_scores, StepParams, TrainableHead};
use crate::ranking::top_k_indices;
use hilltrack_core::{TrackResult, TrackerOptions};
use ndarray::{ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Endless sequence of row indices drawn without replacement.
///
/// Indices come from a random permutation of `0..pool`; when a draw would run
/// past its end a fresh permutation is appended, so every index is visited
/// once per permutation before any repeats.
#[derive(Debug, Clone)]
pub struct IndexCycle {
    pool: usize,
    order: Vec<usize>,
    cursor: usize,
}

impl IndexCycle {
    pub fn new<R: Rng>(pool: usize, rng: &mut R) -> Self {
        let mut cycle = Self {
            pool,
            order: Vec::new(),
            cursor: 0,
        };
        cycle.refill(rng);
        cycle
    }

    #[inline]
    pub fn pool(&self) -> usize {
        self.pool
    }

    /// Next `k` indices. Empty when the pool is empty.
    pub fn take<R: Rng>(&mut self, k: usize, rng: &mut R) -> Vec<usize> {
        if self.pool == 0 {
            return Vec::new();
        }
        while self.order.len() - self.cursor < k {
            self.refill(rng);
        }
        let next = self.order[self.cursor..self.cursor + k].to_vec();
        self.cursor += k;
        next
    }

    fn refill<R: Rng>(&mut self, rng: &mut R) {
        self.order.drain(..self.cursor);
        self.cursor = 0;
        let mut fresh: Vec<usize> = (0..self.pool).collect();
        fresh.shuffle(rng);
        self.order.extend(fresh);
    }
}

/// Batch sizes and optimizer settings for one training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    pub batch_pos: usize,
    pub batch_neg: usize,
    /// Negative candidates drawn before mining; never below `batch_neg`.
    pub batch_neg_cand: usize,
    pub batch_test: usize,
    pub step: StepParams,
}

impl TrainingConfig {
    pub fn from_options(opts: &TrackerOptions, learning_rate: f32) -> Self {
        Self {
            batch_pos: opts.batch_pos,
            batch_neg: opts.batch_neg,
            batch_neg_cand: opts.batch_neg_cand(),
            batch_test: opts.batch_test,
            step: StepParams {
                learning_rate,
                grad_clip: opts.grad_clip,
            },
        }
    }
}

/// What a training run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainingReport {
    pub iterations: usize,
    pub pos_rows: usize,
    pub neg_rows: usize,
    /// Whether negatives were mined from a larger candidate set.
    pub mined: bool,
}

/// Positions of the `keep` highest candidate scores.
pub fn select_hardest(scores: &[f32], keep: usize) -> Vec<usize> {
    top_k_indices(scores, keep)
}

/// Run `iterations` optimizer steps on cycled mini-batches.
///
/// Each step draws `batch_pos` positives and `batch_neg_cand` negative
/// candidates; when there are more candidates than `batch_neg`, only the
/// highest-scoring ones are trained on. Empty pools make this a no-op.
pub fn run_training<H, R>(
    head: &mut H,
    positives: ArrayView2<'_, f32>,
    negatives: ArrayView2<'_, f32>,
    iterations: usize,
    config: &TrainingConfig,
    rng: &mut R,
) -> TrackResult<TrainingReport>
where
    H: TrainableHead + ?Sized,
    R: Rng,
{
    let mut report = TrainingReport {
        pos_rows: positives.nrows(),
        neg_rows: negatives.nrows(),
        ..Default::default()
    };
    if positives.nrows() == 0 || negatives.nrows() == 0 || iterations == 0 {
        debug!(
            pos = positives.nrows(),
            neg = negatives.nrows(),
            "Skipping training on an empty pool"
        );
        return Ok(report);
    }

    let batch_neg_cand = config.batch_neg_cand.max(config.batch_neg);
    let mut pos_cycle = IndexCycle::new(positives.nrows(), rng);
    let mut neg_cycle = IndexCycle::new(negatives.nrows(), rng);

    for _ in 0..iterations {
        let pos_idx = pos_cycle.take(config.batch_pos, rng);
        let neg_idx = neg_cycle.take(batch_neg_cand, rng);

        let pos_batch = positives.select(Axis(0), &pos_idx);
        let mut neg_batch = negatives.select(Axis(0), &neg_idx);

        if batch_neg_cand > config.batch_neg {
            let scores = forward_feature_scores(head, neg_batch.view(), config.batch_test)?;
            let hardest = select_hardest(&scores, config.batch_neg);
            neg_batch = neg_batch.select(Axis(0), &hardest);
            report.mined = true;
        }

        head.train_step(pos_batch.view(), neg_batch.view(), &config.step)?;
        report.iterations += 1;
    }

    debug!(
        iterations = report.iterations,
        pos = report.pos_rows,
        neg = report.neg_rows,
        mined = report.mined,
        "Training run complete"
    );
    Ok(report)
}
