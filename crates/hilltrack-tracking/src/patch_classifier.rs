//! Grey-patch classifier used by the command-line tracker.
//!
//! Each box is resampled (with context padding) to a small square patch that
//! is normalized to zero mean and unit variance. A logistic head on top of the
//! flattened patch produces the positive-class logit, and is trained with
//! binary cross-entropy and momentum SGD.

use crate::classifier::{Classifier, StepParams, TrainableHead};
use crate::frame::GrayImage;
use hilltrack_core::{BBox, TrackError, TrackResult};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Default side length of the resampled patch.
pub const PATCH_SIZE: usize = 24;

/// Context added around each box, as a fraction of its size per side.
pub const PATCH_PADDING: f32 = 16.0 / 107.0;

const MOMENTUM: f32 = 0.9;
const WEIGHT_DECAY: f32 = 0.0005;
const INIT_STD: f32 = 0.01;

/// Logistic classifier over normalized grey patches.
#[derive(Debug, Clone)]
pub struct PatchClassifier {
    patch_size: usize,
    padding: f32,
    weights: Array1<f32>,
    bias: f32,
    velocity: Array1<f32>,
    bias_velocity: f32,
}

impl PatchClassifier {
    pub fn new(patch_size: usize, seed: u64) -> Self {
        let dim = patch_size * patch_size;
        let mut rng = StdRng::seed_from_u64(seed);
        let weights = Array1::from_shape_fn(dim, |_| rng.gen_range(-INIT_STD..INIT_STD));
        Self {
            patch_size,
            padding: PATCH_PADDING,
            weights,
            bias: 0.0,
            velocity: Array1::zeros(dim),
            bias_velocity: 0.0,
        }
    }

    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding;
        self
    }

    #[inline]
    pub fn feature_dim(&self) -> usize {
        self.weights.len()
    }

    fn embed_one(&self, frame: &GrayImage, bbox: BBox) -> Vec<f32> {
        let mut patch = frame.extract_patch(bbox, self.padding, self.patch_size);
        normalize(&mut patch);
        patch
    }

    fn check_width(&self, features: ArrayView2<'_, f32>) -> TrackResult<()> {
        if features.ncols() != self.feature_dim() {
            return Err(TrackError::Classifier(format!(
                "expected {} feature columns, got {}",
                self.feature_dim(),
                features.ncols()
            )));
        }
        Ok(())
    }

    fn logits(&self, features: ArrayView2<'_, f32>) -> Array1<f32> {
        features.dot(&self.weights) + self.bias
    }
}

/// Zero mean, unit variance. Flat patches become all zeros.
fn normalize(patch: &mut [f32]) {
    if patch.is_empty() {
        return;
    }
    let n = patch.len() as f32;
    let mean = patch.iter().sum::<f32>() / n;
    let var = patch.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    let inv_std = 1.0 / (var.sqrt() + 1e-6);
    for v in patch.iter_mut() {
        *v = (*v - mean) * inv_std;
    }
}

#[inline]
fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Factor that brings a gradient of norm `norm` within `clip`.
fn clip_factor(norm: f32, clip: Option<f32>) -> f32 {
    match clip {
        Some(c) if norm > c => c / norm,
        _ => 1.0,
    }
}

impl TrainableHead for PatchClassifier {
    fn score_features(&mut self, features: ArrayView2<'_, f32>) -> TrackResult<Vec<f32>> {
        self.check_width(features)?;
        Ok(self.logits(features).to_vec())
    }

    fn train_step(
        &mut self,
        pos: ArrayView2<'_, f32>,
        neg: ArrayView2<'_, f32>,
        params: &StepParams,
    ) -> TrackResult<()> {
        self.check_width(pos)?;
        self.check_width(neg)?;
        let n = (pos.nrows() + neg.nrows()) as f32;
        if n == 0.0 {
            return Ok(());
        }

        // d(BCE)/dz = sigmoid(z) - label
        let pos_err = self.logits(pos).mapv(|z| sigmoid(z) - 1.0);
        let neg_err = self.logits(neg).mapv(sigmoid);

        let mut grad = pos.t().dot(&pos_err) + neg.t().dot(&neg_err);
        grad /= n;
        grad.scaled_add(WEIGHT_DECAY, &self.weights);
        let mut grad_bias = (pos_err.sum() + neg_err.sum()) / n;

        let norm = (grad.iter().map(|g| g * g).sum::<f32>() + grad_bias * grad_bias).sqrt();
        if !norm.is_finite() {
            return Err(TrackError::Classifier("non-finite gradient".into()));
        }
        let scale = clip_factor(norm, params.grad_clip);
        grad *= scale;
        grad_bias *= scale;

        self.velocity *= MOMENTUM;
        self.velocity += &grad;
        self.bias_velocity = MOMENTUM * self.bias_velocity + grad_bias;

        self.weights.scaled_add(-params.learning_rate, &self.velocity);
        self.bias -= params.learning_rate * self.bias_velocity;
        Ok(())
    }
}

impl Classifier<GrayImage> for PatchClassifier {
    fn embed(&mut self, frame: &GrayImage, boxes: &[BBox]) -> TrackResult<Array2<f32>> {
        let this = &*self;
        let rows: Vec<Vec<f32>> = boxes
            .par_iter()
            .map(|b| this.embed_one(frame, *b))
            .collect();

        let dim = self.feature_dim();
        let mut features = Array2::zeros((boxes.len(), dim));
        for (mut row, patch) in features.axis_iter_mut(Axis(0)).zip(rows) {
            row.assign(&Array1::from(patch));
        }
        Ok(features)
    }

    fn score(&mut self, frame: &GrayImage, boxes: &[BBox]) -> TrackResult<Vec<f32>> {
        let features = self.embed(frame, boxes)?;
        self.score_features(features.view())
    }
}
