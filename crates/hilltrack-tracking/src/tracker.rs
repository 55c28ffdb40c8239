//! The per-frame tracking controller.
//!
//! [`Tracker::initialize`] trains the classifier and the box regressor on the
//! first frame. Each call to [`Tracker::track`] then proposes candidates,
//! hill-climbs the best of them, falls back to re-detection when confidence
//! collapses, regresses the final box and decides on an online update.

use crate::batch::{run_training, TrainingConfig, TrainingReport};
use crate::bbreg::BBoxRegressor;
use crate::classifier::{forward_features, forward_scores, Classifier, TrainableHead};
use crate::frame::Frame;
use crate::hill_climb::refine_box;
use crate::memory::FeatureMemory;
use crate::ranking::top_k_mean;
use crate::redetect::recover_with;
use crate::sample_generator::{Distribution, SampleGenerator};
use crate::schedule::{UpdateKind, UpdateSchedule};
use hilltrack_core::limits::TOP_K;
use hilltrack_core::{BBox, ImageSize, TrackError, TrackResult, TrackerOptions};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Summary of a re-detection attempt on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub accepted: bool,
    pub levels: usize,
}

/// Everything the tracker decided for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub index: usize,
    /// Mean of the top-scoring candidates.
    pub target: BBox,
    /// `target` after box regression; equal to it on failed frames.
    pub regressed: BBox,
    /// Mean of the top-5 candidate scores.
    pub score: f32,
    pub success: bool,
    pub recovery: Option<RecoveryOutcome>,
    pub update: UpdateKind,
    pub elapsed: Duration,
}

/// Online single-object tracker over a classifier `C`.
pub struct Tracker<C> {
    classifier: C,
    options: TrackerOptions,
    image: ImageSize,
    rng: StdRng,
    sample_generator: SampleGenerator,
    pos_generator: SampleGenerator,
    neg_generator: SampleGenerator,
    regressor: BBoxRegressor,
    schedule: UpdateSchedule,
    pos_memory: FeatureMemory,
    neg_memory: FeatureMemory,
    target: BBox,
    results: Vec<FrameResult>,
    init_report: TrainingReport,
}

impl<C> Tracker<C> {
    /// Set up the tracker on the first frame.
    ///
    /// Draws the initial positive and negative sets, runs the initial
    /// training, fits the box regressor and seeds both feature memories.
    pub fn initialize<F>(
        mut classifier: C,
        options: TrackerOptions,
        frame: &F,
        init_bbox: BBox,
    ) -> TrackResult<Self>
    where
        F: Frame + ?Sized,
        C: Classifier<F>,
    {
        let start = Instant::now();
        options.validate()?;
        if !init_bbox.is_valid() {
            return Err(TrackError::invalid_box(init_bbox));
        }
        let image = frame.size();
        let opts = &options;
        let mut rng = StdRng::seed_from_u64(opts.seed);

        let pos =
            SampleGenerator::new(Distribution::Gaussian, image, opts.trans_pos, opts.scale_pos)
                .generate(&mut rng, init_bbox, opts.n_pos_init, Some(opts.overlap_pos_init));
        if pos.boxes.is_empty() {
            return Err(TrackError::EmptySampleSet(
                "no initial positives around the target".into(),
            ));
        }

        let half = opts.n_neg_init / 2;
        let mut neg_boxes = SampleGenerator::new(
            Distribution::Uniform,
            image,
            opts.trans_neg_init,
            opts.scale_neg_init,
        )
        .generate(&mut rng, init_bbox, half, Some(opts.overlap_neg_init))
        .boxes;
        neg_boxes.extend(
            SampleGenerator::new(Distribution::Whole, image, 0.0, 1.0)
                .generate(&mut rng, init_bbox, half, Some(opts.overlap_neg_init))
                .boxes,
        );
        neg_boxes.shuffle(&mut rng);

        let pos_feats = forward_features(&mut classifier, frame, &pos.boxes, opts.batch_test)?;
        let neg_feats = forward_features(&mut classifier, frame, &neg_boxes, opts.batch_test)?;

        let init_report = run_training(
            &mut classifier,
            pos_feats.view(),
            neg_feats.view(),
            opts.maxiter_init,
            &TrainingConfig::from_options(opts, opts.lr_init),
            &mut rng,
        )?;

        let bbreg_boxes = SampleGenerator::new(
            Distribution::Uniform,
            image,
            opts.trans_bbreg,
            opts.scale_bbreg,
        )
        .with_aspect(opts.aspect_bbreg)
        .generate(&mut rng, init_bbox, opts.n_bbreg, Some(opts.overlap_bbreg))
        .boxes;
        let bbreg_feats = forward_features(&mut classifier, frame, &bbreg_boxes, opts.batch_test)?;
        let mut regressor = BBoxRegressor::new(image).with_overlap(opts.overlap_bbreg);
        regressor.fit(bbreg_feats.view(), &bbreg_boxes, init_bbox)?;

        let neg_generator =
            SampleGenerator::new(Distribution::Uniform, image, opts.trans_neg, opts.scale_neg);
        let update_neg = neg_generator
            .generate(&mut rng, init_bbox, opts.n_neg_update, Some(opts.overlap_neg_init))
            .boxes;
        let update_neg_feats =
            forward_features(&mut classifier, frame, &update_neg, opts.batch_test)?;

        let mut pos_memory = FeatureMemory::new(opts.n_frames_long);
        let mut neg_memory = FeatureMemory::new(opts.n_frames_short);
        pos_memory.push(pos_feats);
        neg_memory.push(update_neg_feats);

        let init_score = forward_scores(&mut classifier, frame, &[init_bbox], opts.batch_test)?
            .first()
            .copied()
            .unwrap_or(f32::NEG_INFINITY);

        let first = FrameResult {
            index: 0,
            target: init_bbox,
            regressed: init_bbox,
            score: init_score,
            success: true,
            recovery: None,
            update: UpdateKind::None,
            elapsed: start.elapsed(),
        };
        info!(
            pos = pos.boxes.len(),
            neg = neg_boxes.len(),
            iterations = init_report.iterations,
            regressor = regressor.is_fitted(),
            score = init_score,
            elapsed_ms = first.elapsed.as_millis() as u64,
            "Tracker initialized"
        );

        Ok(Self {
            sample_generator: SampleGenerator::new(
                Distribution::Gaussian,
                image,
                opts.trans,
                opts.scale,
            ),
            pos_generator: SampleGenerator::new(
                Distribution::Gaussian,
                image,
                opts.trans_pos,
                opts.scale_pos,
            ),
            neg_generator,
            schedule: UpdateSchedule::new(opts.long_interval),
            classifier,
            image,
            rng,
            regressor,
            pos_memory,
            neg_memory,
            target: init_bbox,
            results: vec![first],
            init_report,
            options,
        })
    }

    /// Locate the target in the next frame.
    ///
    /// A classifier failure aborts the frame; the frame is not recorded.
    pub fn track<F>(&mut self, frame: &F) -> TrackResult<FrameResult>
    where
        F: Frame + ?Sized,
        C: Classifier<F>,
    {
        let start = Instant::now();
        if frame.size() != self.image {
            return Err(TrackError::InvalidParameter(format!(
                "frame is {}x{}, expected {}x{}",
                frame.size().width,
                frame.size().height,
                self.image.width,
                self.image.height
            )));
        }
        let index = self.results.len();
        let batch_test = self.options.batch_test;
        let max_steps = self.options.max_climb_steps;

        let mut samples =
            self.sample_generator
                .generate_unfiltered(&mut self.rng, self.target, self.options.n_samples);
        let scores = forward_scores(&mut self.classifier, frame, &samples, batch_test)?;

        let (top, _) = top_k_mean(&scores, TOP_K);
        for i in top {
            samples[i] =
                refine_box(&mut self.classifier, frame, samples[i], batch_test, max_steps)?.bbox;
        }
        let mut scores = forward_scores(&mut self.classifier, frame, &samples, batch_test)?;
        let (_, mut mean) = top_k_mean(&scores, TOP_K);

        let mut recovery = None;
        if mean <= 0.0 {
            let rec = recover_with(
                &mut self.classifier,
                frame,
                self.target,
                &samples,
                batch_test,
                max_steps,
            )?;
            recovery = Some(RecoveryOutcome {
                accepted: rec.accepted,
                levels: rec.levels,
            });
            if rec.accepted {
                samples = rec.samples;
                scores = forward_scores(&mut self.classifier, frame, &samples, batch_test)?;
                mean = top_k_mean(&scores, TOP_K).1;
            }
        }

        let (top, _) = top_k_mean(&scores, TOP_K);
        let top_boxes: Vec<BBox> = top.iter().map(|&i| samples[i]).collect();
        let target = BBox::mean(&top_boxes)
            .ok_or_else(|| TrackError::EmptySampleSet(format!("no candidates on frame {index}")))?;
        let success = mean > 0.0;

        if success {
            self.sample_generator.set_trans(self.options.trans);
        } else {
            self.sample_generator.expand_trans(self.options.trans_limit);
        }

        let regressed = if success {
            let feats = forward_features(&mut self.classifier, frame, &top_boxes, batch_test)?;
            let predicted = self.regressor.predict(feats.view(), &top_boxes)?;
            BBox::mean(&predicted)
                .filter(|b| b.is_valid())
                .unwrap_or(target)
        } else {
            target
        };

        let pending = if success {
            Some(self.collect(frame, target)?)
        } else {
            None
        };

        let update = self.schedule.decide(index, success);
        self.update(update, pending.as_ref())?;
        if let Some((pos, neg)) = pending {
            self.pos_memory.push(pos);
            self.neg_memory.push(neg);
        }

        self.target = target;
        let result = FrameResult {
            index,
            target,
            regressed,
            score: mean,
            success,
            recovery,
            update,
            elapsed: start.elapsed(),
        };
        info!(
            frame = index,
            score = mean,
            success,
            update = ?update,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Frame tracked"
        );
        self.results.push(result.clone());
        Ok(result)
    }

    /// Sample training features around a confident target.
    ///
    /// Returns `(positives, negatives)`; the caller admits them to memory.
    fn collect<F>(&mut self, frame: &F, target: BBox) -> TrackResult<(Array2<f32>, Array2<f32>)>
    where
        F: Frame + ?Sized,
        C: Classifier<F>,
    {
        let opts = &self.options;
        let pos = self.pos_generator.generate(
            &mut self.rng,
            target,
            opts.n_pos_update,
            Some(opts.overlap_pos_update),
        );
        let neg = self.neg_generator.generate(
            &mut self.rng,
            target,
            opts.n_neg_update,
            Some(opts.overlap_neg_update),
        );
        let pos_feats = forward_features(&mut self.classifier, frame, &pos.boxes, opts.batch_test)?;
        let neg_feats = forward_features(&mut self.classifier, frame, &neg.boxes, opts.batch_test)?;
        Ok((pos_feats, neg_feats))
    }

    /// Retrain on the memories as they stand once `pending` is admitted.
    fn update(
        &mut self,
        kind: UpdateKind,
        pending: Option<&(Array2<f32>, Array2<f32>)>,
    ) -> TrackResult<()>
    where
        C: TrainableHead,
    {
        let pending_pos = pending.map(|(p, _)| p);
        let pending_neg = pending.map(|(_, n)| n);
        let pos_window = match kind {
            UpdateKind::None => return Ok(()),
            UpdateKind::ShortTerm => self.options.n_frames_short,
            UpdateKind::LongTerm => usize::MAX,
        };
        let pos = self.pos_memory.concat_recent_with(pending_pos, pos_window)?;
        let neg = self.neg_memory.concat_recent_with(pending_neg, usize::MAX)?;
        let report = run_training(
            &mut self.classifier,
            pos.view(),
            neg.view(),
            self.options.maxiter_update,
            &TrainingConfig::from_options(&self.options, self.options.lr_update),
            &mut self.rng,
        )?;
        debug!(kind = ?kind, iterations = report.iterations, "Online update");
        Ok(())
    }

    #[inline]
    pub fn target(&self) -> BBox {
        self.target
    }

    /// Per-frame results, starting with the initialization frame.
    pub fn results(&self) -> &[FrameResult] {
        &self.results
    }

    #[inline]
    pub fn image_size(&self) -> ImageSize {
        self.image
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    pub fn positive_memory(&self) -> &FeatureMemory {
        &self.pos_memory
    }

    pub fn negative_memory(&self) -> &FeatureMemory {
        &self.neg_memory
    }

    pub fn regressor(&self) -> &BBoxRegressor {
        &self.regressor
    }

    /// Current translation range of the candidate generator.
    pub fn search_trans(&self) -> f32 {
        self.sample_generator.trans()
    }

    pub fn init_report(&self) -> TrainingReport {
        self.init_report
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn into_classifier(self) -> C {
        self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{FnClassifier, StepParams};
    use ndarray::ArrayView2;
    use std::cell::Cell;
    use std::rc::Rc;

    const IMAGE: ImageSize = ImageSize::new(240, 240);
    const INIT: BBox = BBox::new(100.0, 100.0, 40.0, 40.0);

    fn small_options() -> TrackerOptions {
        TrackerOptions {
            n_samples: 64,
            n_bbreg: 100,
            n_pos_init: 50,
            n_neg_init: 100,
            maxiter_init: 3,
            n_pos_update: 10,
            n_neg_update: 20,
            maxiter_update: 2,
            batch_pos: 8,
            batch_neg: 16,
            batch_neg_cand: 32,
            batch_test: 64,
            max_climb_steps: 200,
            ..Default::default()
        }
    }

    /// Peaks at `INIT`, positive within a few pixels of it.
    fn peaked(b: &BBox) -> f32 {
        let d = (b.x - INIT.x).abs()
            + (b.y - INIT.y).abs()
            + (b.max().x - INIT.max().x).abs()
            + (b.max().y - INIT.max().y).abs();
        10.0 - d
    }

    #[test]
    fn test_single_frame_run() {
        let clf = FnClassifier::new(|_: &BBox| 1.0);
        let tracker = Tracker::initialize(clf, small_options(), &IMAGE, INIT).unwrap();

        let first = &tracker.results()[0];
        assert_eq!(first.target, INIT);
        assert_eq!(first.regressed, INIT);
        assert!(first.success);
        assert!(first.recovery.is_none());
        assert_eq!(tracker.positive_memory().len(), 1);
        assert_eq!(tracker.negative_memory().len(), 1);
        assert_eq!(tracker.classifier().steps, 3);
    }

    #[test]
    fn test_invalid_init_box_is_rejected() {
        let clf = FnClassifier::new(|_: &BBox| 1.0);
        let bad = BBox::new(0.0, 0.0, 0.0, 10.0);
        assert!(matches!(
            Tracker::initialize(clf, small_options(), &IMAGE, bad),
            Err(TrackError::InvalidBox { .. })
        ));
    }

    #[test]
    fn test_confident_frame_collects_and_stays_on_target() {
        let clf = FnClassifier::new(peaked);
        let mut tracker = Tracker::initialize(clf, small_options(), &IMAGE, INIT).unwrap();
        let r = tracker.track(&IMAGE).unwrap();

        assert_eq!(r.index, 1);
        assert!(r.success);
        assert!(r.recovery.is_none());
        assert_eq!(r.update, UpdateKind::None);
        assert!(r.target.overlap_ratio(INIT) > 0.8, "{:?}", r.target);
        assert_eq!(tracker.positive_memory().len(), 2);
        assert_eq!(tracker.negative_memory().len(), 2);
        assert_eq!(tracker.search_trans(), 0.6);
    }

    #[test]
    fn test_failed_frame_reverts_and_updates_short_term() {
        let bias = Rc::new(Cell::new(0.0f32));
        let shift = Rc::clone(&bias);
        let clf = FnClassifier::new(move |b: &BBox| peaked(b) + shift.get());
        let mut tracker = Tracker::initialize(clf, small_options(), &IMAGE, INIT).unwrap();

        let first = tracker.track(&IMAGE).unwrap();
        assert!(first.success);
        let steps_before = tracker.classifier().steps;

        // Everything scores negative from here on.
        bias.set(-1000.0);
        let second = tracker.track(&IMAGE).unwrap();

        assert!(!second.success);
        assert_eq!(
            second.recovery,
            Some(RecoveryOutcome {
                accepted: false,
                levels: 2
            })
        );
        assert_eq!(second.regressed, second.target);
        assert_eq!(second.update, UpdateKind::ShortTerm);
        assert_eq!(tracker.classifier().steps, steps_before + 2);
        assert_eq!(tracker.positive_memory().len(), 2);
        assert_eq!(tracker.negative_memory().len(), 2);
        assert!((tracker.search_trans() - 0.66).abs() < 1e-6);
    }

    #[test]
    fn test_long_term_update_on_interval() {
        let opts = TrackerOptions {
            long_interval: 2,
            ..small_options()
        };
        let clf = FnClassifier::new(peaked);
        let mut tracker = Tracker::initialize(clf, opts, &IMAGE, INIT).unwrap();
        let kinds: Vec<UpdateKind> = (0..4).map(|_| tracker.track(&IMAGE).unwrap().update).collect();
        assert_eq!(
            kinds,
            vec![
                UpdateKind::None,
                UpdateKind::LongTerm,
                UpdateKind::None,
                UpdateKind::LongTerm
            ]
        );
        assert_eq!(tracker.results().len(), 5);
    }

    #[test]
    fn test_frame_size_mismatch() {
        let clf = FnClassifier::new(peaked);
        let mut tracker = Tracker::initialize(clf, small_options(), &IMAGE, INIT).unwrap();
        assert!(matches!(
            tracker.track(&ImageSize::new(100, 100)),
            Err(TrackError::InvalidParameter(_))
        ));
    }

    /// Box classifier whose scoring or training can be switched off
    /// mid-sequence.
    #[derive(Default)]
    struct Flaky {
        down: Rc<Cell<bool>>,
        train_down: Rc<Cell<bool>>,
    }

    impl TrainableHead for Flaky {
        fn score_features(&mut self, features: ArrayView2<'_, f32>) -> TrackResult<Vec<f32>> {
            Ok(vec![1.0; features.nrows()])
        }

        fn train_step(
            &mut self,
            _: ArrayView2<'_, f32>,
            _: ArrayView2<'_, f32>,
            _: &StepParams,
        ) -> TrackResult<()> {
            if self.train_down.get() {
                return Err(TrackError::Classifier("optimizer diverged".into()));
            }
            Ok(())
        }
    }

    impl Classifier<ImageSize> for Flaky {
        fn embed(&mut self, _: &ImageSize, boxes: &[BBox]) -> TrackResult<Array2<f32>> {
            Ok(Array2::ones((boxes.len(), 2)))
        }

        fn score(&mut self, _: &ImageSize, boxes: &[BBox]) -> TrackResult<Vec<f32>> {
            if self.down.get() {
                return Err(TrackError::Classifier("model unavailable".into()));
            }
            Ok(vec![1.0; boxes.len()])
        }
    }

    #[test]
    fn test_classifier_failure_aborts_frame() {
        let down = Rc::new(Cell::new(false));
        let clf = Flaky {
            down: Rc::clone(&down),
            ..Default::default()
        };
        let mut tracker = Tracker::initialize(clf, small_options(), &IMAGE, INIT).unwrap();
        down.set(true);
        assert!(matches!(
            tracker.track(&IMAGE),
            Err(TrackError::Classifier(_))
        ));
        assert_eq!(tracker.results().len(), 1);
        assert_eq!(tracker.target(), INIT);
    }

    #[test]
    fn test_failed_update_leaves_memories_untouched() {
        let train_down = Rc::new(Cell::new(false));
        let clf = Flaky {
            train_down: Rc::clone(&train_down),
            ..Default::default()
        };
        let opts = TrackerOptions {
            long_interval: 1,
            ..small_options()
        };
        let mut tracker = Tracker::initialize(clf, opts, &IMAGE, INIT).unwrap();
        let (pos_rows, neg_rows) = (
            tracker.positive_memory().rows(),
            tracker.negative_memory().rows(),
        );

        train_down.set(true);
        assert!(matches!(
            tracker.track(&IMAGE),
            Err(TrackError::Classifier(_))
        ));
        assert_eq!(tracker.results().len(), 1);
        assert_eq!(tracker.positive_memory().len(), 1);
        assert_eq!(tracker.negative_memory().len(), 1);
        assert_eq!(tracker.positive_memory().rows(), pos_rows);
        assert_eq!(tracker.negative_memory().rows(), neg_rows);

        train_down.set(false);
        let frame = tracker.track(&IMAGE).unwrap();
        assert_eq!(frame.index, 1);
        assert_eq!(frame.update, UpdateKind::LongTerm);
        assert_eq!(tracker.positive_memory().len(), 2);
    }
}
