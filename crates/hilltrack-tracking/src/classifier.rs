//! Classifier capability consumed by the tracking loop.
//!
//! The loop never inspects the model. It needs boxes turned into a feature
//! matrix, boxes and feature rows turned into positive-class scores, and a
//! single optimizer step on a positive/negative pair of feature batches.

use hilltrack_core::{BBox, TrackError, TrackResult};
use ndarray::{concatenate, Array2, ArrayView2, Axis};

/// Per-step optimizer settings handed to [`TrainableHead::train_step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub learning_rate: f32,
    /// Clip the global gradient norm to this value before stepping.
    pub grad_clip: Option<f32>,
}

/// The trainable part of the classifier, which works on feature rows.
pub trait TrainableHead {
    /// Score precomputed feature rows, one score per row.
    fn score_features(&mut self, features: ArrayView2<'_, f32>) -> TrackResult<Vec<f32>>;

    /// One optimizer step pushing `pos` rows toward the positive class and
    /// `neg` rows toward the negative class.
    fn train_step(
        &mut self,
        pos: ArrayView2<'_, f32>,
        neg: ArrayView2<'_, f32>,
        params: &StepParams,
    ) -> TrackResult<()>;
}

/// Full classifier over frames of type `F`.
pub trait Classifier<F: ?Sized>: TrainableHead {
    /// Feature rows for `boxes`, in order.
    fn embed(&mut self, frame: &F, boxes: &[BBox]) -> TrackResult<Array2<f32>>;

    /// Positive-class scores for `boxes`, in order.
    fn score(&mut self, frame: &F, boxes: &[BBox]) -> TrackResult<Vec<f32>>;
}

fn check_boxes(boxes: &[BBox]) -> TrackResult<()> {
    match boxes.iter().find(|b| !b.is_valid()) {
        Some(b) => Err(TrackError::invalid_box(*b)),
        None => Ok(()),
    }
}

/// Score `boxes` in sub-batches of at most `batch_test`, concatenated in
/// request order.
pub fn forward_scores<F, C>(
    classifier: &mut C,
    frame: &F,
    boxes: &[BBox],
    batch_test: usize,
) -> TrackResult<Vec<f32>>
where
    F: ?Sized,
    C: Classifier<F> + ?Sized,
{
    check_boxes(boxes)?;
    let mut scores = Vec::with_capacity(boxes.len());
    for chunk in boxes.chunks(batch_test.max(1)) {
        let part = classifier.score(frame, chunk)?;
        if part.len() != chunk.len() {
            return Err(TrackError::Classifier(format!(
                "returned {} scores for {} boxes",
                part.len(),
                chunk.len()
            )));
        }
        scores.extend(part);
    }
    Ok(scores)
}

/// Extract features for `boxes` in sub-batches of at most `batch_test`.
pub fn forward_features<F, C>(
    classifier: &mut C,
    frame: &F,
    boxes: &[BBox],
    batch_test: usize,
) -> TrackResult<Array2<f32>>
where
    F: ?Sized,
    C: Classifier<F> + ?Sized,
{
    check_boxes(boxes)?;
    let mut parts = Vec::new();
    for chunk in boxes.chunks(batch_test.max(1)) {
        let part = classifier.embed(frame, chunk)?;
        if part.nrows() != chunk.len() {
            return Err(TrackError::Classifier(format!(
                "returned {} feature rows for {} boxes",
                part.nrows(),
                chunk.len()
            )));
        }
        parts.push(part);
    }
    stack_rows(&parts)
}

/// Score feature rows in sub-batches of at most `batch_test`.
pub fn forward_feature_scores<H>(
    head: &mut H,
    features: ArrayView2<'_, f32>,
    batch_test: usize,
) -> TrackResult<Vec<f32>>
where
    H: TrainableHead + ?Sized,
{
    let mut scores = Vec::with_capacity(features.nrows());
    for chunk in features.axis_chunks_iter(Axis(0), batch_test.max(1)) {
        let part = head.score_features(chunk)?;
        if part.len() != chunk.nrows() {
            return Err(TrackError::Classifier(format!(
                "returned {} scores for {} feature rows",
                part.len(),
                chunk.nrows()
            )));
        }
        scores.extend(part);
    }
    Ok(scores)
}

/// Concatenate feature batches row-wise, skipping empty ones.
pub fn stack_rows(batches: &[Array2<f32>]) -> TrackResult<Array2<f32>> {
    let views: Vec<ArrayView2<'_, f32>> = batches
        .iter()
        .filter(|b| b.nrows() > 0)
        .map(|b| b.view())
        .collect();
    if views.is_empty() {
        let width = batches.first().map_or(0, |b| b.ncols());
        return Ok(Array2::zeros((0, width)));
    }
    concatenate(Axis(0), &views)
        .map_err(|e| TrackError::Classifier(format!("feature batches disagree in width: {e}")))
}

/// Deterministic classifier driven by a closure over boxes.
///
/// Features are the raw `[x, y, w, h]` of each box, so feature rows score
/// exactly like the boxes they came from. Training steps are only counted.
pub struct FnClassifier<S> {
    score_fn: S,
    /// Number of `train_step` calls so far.
    pub steps: usize,
    /// Row counts of the most recent `(pos, neg)` training batch.
    pub last_batch: Option<(usize, usize)>,
}

impl<S> FnClassifier<S>
where
    S: FnMut(&BBox) -> f32,
{
    pub fn new(score_fn: S) -> Self {
        Self {
            score_fn,
            steps: 0,
            last_batch: None,
        }
    }
}

impl<S> TrainableHead for FnClassifier<S>
where
    S: FnMut(&BBox) -> f32,
{
    fn score_features(&mut self, features: ArrayView2<'_, f32>) -> TrackResult<Vec<f32>> {
        if features.ncols() != 4 {
            return Err(TrackError::Classifier(format!(
                "expected 4 feature columns, got {}",
                features.ncols()
            )));
        }
        Ok(features
            .rows()
            .into_iter()
            .map(|r| (self.score_fn)(&BBox::new(r[0], r[1], r[2], r[3])))
            .collect())
    }

    fn train_step(
        &mut self,
        pos: ArrayView2<'_, f32>,
        neg: ArrayView2<'_, f32>,
        _params: &StepParams,
    ) -> TrackResult<()> {
        self.steps += 1;
        self.last_batch = Some((pos.nrows(), neg.nrows()));
        Ok(())
    }
}

impl<F, S> Classifier<F> for FnClassifier<S>
where
    F: ?Sized,
    S: FnMut(&BBox) -> f32,
{
    fn embed(&mut self, _frame: &F, boxes: &[BBox]) -> TrackResult<Array2<f32>> {
        let flat: Vec<f32> = boxes.iter().flat_map(|b| b.to_array()).collect();
        Array2::from_shape_vec((boxes.len(), 4), flat)
            .map_err(|e| TrackError::Classifier(e.to_string()))
    }

    fn score(&mut self, _frame: &F, boxes: &[BBox]) -> TrackResult<Vec<f32>> {
        Ok(boxes.iter().map(|b| (self.score_fn)(b)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the size of every scoring call.
    struct Recorder {
        calls: Vec<usize>,
    }

    impl TrainableHead for Recorder {
        fn score_features(&mut self, features: ArrayView2<'_, f32>) -> TrackResult<Vec<f32>> {
            self.calls.push(features.nrows());
            Ok(features.column(0).to_vec())
        }

        fn train_step(
            &mut self,
            _pos: ArrayView2<'_, f32>,
            _neg: ArrayView2<'_, f32>,
            _params: &StepParams,
        ) -> TrackResult<()> {
            Ok(())
        }
    }

    impl Classifier<()> for Recorder {
        fn embed(&mut self, _frame: &(), boxes: &[BBox]) -> TrackResult<Array2<f32>> {
            self.calls.push(boxes.len());
            Ok(Array2::from_shape_fn((boxes.len(), 2), |(i, j)| {
                boxes[i].x + j as f32
            }))
        }

        fn score(&mut self, _frame: &(), boxes: &[BBox]) -> TrackResult<Vec<f32>> {
            self.calls.push(boxes.len());
            Ok(boxes.iter().map(|b| b.x).collect())
        }
    }

    fn boxes(n: usize) -> Vec<BBox> {
        (0..n).map(|i| BBox::new(i as f32, 0.0, 5.0, 5.0)).collect()
    }

    #[test]
    fn test_forward_scores_splits_and_keeps_order() {
        let mut rec = Recorder {
            calls: Vec::new(),
        };
        let scores = forward_scores(&mut rec, &(), &boxes(10), 4).unwrap();
        assert_eq!(rec.calls, vec![4, 4, 2]);
        assert_eq!(scores, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_forward_features_stacks_rows() {
        let mut rec = Recorder {
            calls: Vec::new(),
        };
        let feats = forward_features(&mut rec, &(), &boxes(5), 2).unwrap();
        assert_eq!(feats.dim(), (5, 2));
        assert_eq!(feats[[4, 0]], 4.0);
        assert_eq!(feats[[3, 1]], 4.0);
    }

    #[test]
    fn test_forward_feature_scores_batches() {
        let mut rec = Recorder {
            calls: Vec::new(),
        };
        let feats = Array2::from_shape_fn((7, 3), |(i, _)| i as f32);
        let scores = forward_feature_scores(&mut rec, feats.view(), 3).unwrap();
        assert_eq!(rec.calls, vec![3, 3, 1]);
        assert_eq!(scores.len(), 7);
        assert_eq!(scores[6], 6.0);
    }

    #[test]
    fn test_invalid_box_is_rejected_before_scoring() {
        let mut rec = Recorder {
            calls: Vec::new(),
        };
        let bad = [BBox::new(0.0, 0.0, 0.0, 5.0)];
        let err = forward_scores(&mut rec, &(), &bad, 4);
        assert!(matches!(err, Err(TrackError::InvalidBox { .. })));
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn test_stack_rows_skips_empty() {
        let a = Array2::<f32>::ones((2, 3));
        let empty = Array2::<f32>::zeros((0, 3));
        let stacked = stack_rows(&[empty.clone(), a.clone(), a]).unwrap();
        assert_eq!(stacked.dim(), (4, 3));
        assert_eq!(stack_rows(&[empty]).unwrap().dim(), (0, 3));
    }

    #[test]
    fn test_fn_classifier_features_score_like_boxes() {
        let mut clf = FnClassifier::new(|b: &BBox| b.x - b.width);
        let bx = [BBox::new(10.0, 0.0, 4.0, 4.0), BBox::new(3.0, 1.0, 5.0, 2.0)];
        let direct = Classifier::<()>::score(&mut clf, &(), &bx).unwrap();
        let feats = Classifier::<()>::embed(&mut clf, &(), &bx).unwrap();
        let via_features = clf.score_features(feats.view()).unwrap();
        assert_eq!(direct, via_features);
    }
}
