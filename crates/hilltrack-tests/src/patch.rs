//! The grey-patch classifier tracking synthetic frames.

use hilltrack_core::{BBox, TrackerOptions};
use hilltrack_tracking::{
    forward_features, Classifier, GrayImage, PatchClassifier, Tracker, TrainableHead,
};
use ndarray::Array2;

const SIDE: u32 = 24;

// ── Helpers ────────────────────────────────────────────────────

/// Dark frame with a bright, striped square whose top-left is `at`.
fn frame_with_square(at: (u32, u32)) -> GrayImage {
    let mut img = GrayImage::new(160, 120);
    for y in 0..img.height {
        for x in 0..img.width {
            img.set(x, y, 0.1);
        }
    }
    for y in at.1..at.1 + SIDE {
        for x in at.0..at.0 + SIDE {
            let stripe = if (x - at.0) / 4 % 2 == 0 { 0.9 } else { 0.7 };
            img.set(x, y, stripe);
        }
    }
    img
}

fn square(at: (u32, u32)) -> BBox {
    BBox::new(at.0 as f32, at.1 as f32, SIDE as f32, SIDE as f32)
}

fn options() -> TrackerOptions {
    TrackerOptions {
        n_samples: 96,
        n_bbreg: 200,
        n_pos_init: 100,
        n_neg_init: 400,
        maxiter_init: 30,
        lr_init: 0.01,
        n_pos_update: 20,
        n_neg_update: 60,
        maxiter_update: 5,
        lr_update: 0.01,
        batch_pos: 16,
        batch_neg: 48,
        batch_neg_cand: 128,
        batch_test: 64,
        max_climb_steps: 30,
        seed: 11,
        ..Default::default()
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[test]
fn initial_training_ranks_target_above_background() {
    let at = (40, 40);
    let frame = frame_with_square(at);
    let tracker =
        Tracker::initialize(PatchClassifier::new(12, 0), options(), &frame, square(at)).unwrap();

    let mut clf = tracker.into_classifier();
    let scores = clf
        .score(&frame, &[square(at), BBox::new(110.0, 80.0, 24.0, 24.0)])
        .unwrap();
    assert!(scores[0] > 0.0, "{scores:?}");
    assert!(scores[1] < 0.0, "{scores:?}");
}

#[test]
fn features_and_head_agree() {
    let frame = frame_with_square((40, 40));
    let mut clf = PatchClassifier::new(10, 4);
    let boxes = [square((40, 40)), square((90, 60)), BBox::new(5.5, 7.25, 30.0, 18.0)];

    let direct = clf.score(&frame, &boxes).unwrap();
    let feats: Array2<f32> = forward_features(&mut clf, &frame, &boxes, 2).unwrap();
    let via_head = clf.score_features(feats.view()).unwrap();
    for (a, b) in direct.iter().zip(&via_head) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn tracks_a_sliding_square() {
    let path: Vec<(u32, u32)> = (0..6).map(|i| (40 + 3 * i, 40 + i)).collect();
    let first = frame_with_square(path[0]);
    let mut tracker =
        Tracker::initialize(PatchClassifier::new(12, 0), options(), &first, square(path[0]))
            .unwrap();

    let mut overlaps = Vec::new();
    for &at in &path[1..] {
        let r = tracker.track(&frame_with_square(at)).unwrap();
        assert!(r.target.is_valid());
        overlaps.push(r.target.overlap_ratio(square(at)));
    }
    let mean = overlaps.iter().sum::<f32>() / overlaps.len() as f32;
    assert!(mean > 0.4, "{overlaps:?}");
}
