//! End-to-end runs of the tracking loop with closure-driven classifiers.

use hilltrack_core::{BBox, ImageSize, TrackerOptions};
use hilltrack_tracking::{FnClassifier, Tracker, UpdateKind};
use std::cell::Cell;
use std::rc::Rc;

const IMAGE: ImageSize = ImageSize::new(320, 240);
const START: BBox = BBox::new(100.0, 80.0, 40.0, 40.0);

// ── Helpers ────────────────────────────────────────────────────

fn options() -> TrackerOptions {
    TrackerOptions {
        n_samples: 64,
        n_bbreg: 100,
        n_pos_init: 50,
        n_neg_init: 100,
        maxiter_init: 4,
        n_pos_update: 10,
        n_neg_update: 20,
        maxiter_update: 2,
        batch_pos: 8,
        batch_neg: 16,
        batch_neg_cand: 48,
        batch_test: 32,
        max_climb_steps: 200,
        ..Default::default()
    }
}

/// Score that peaks at `truth` and is positive within 10 px of edge error.
fn edge_score(b: &BBox, truth: BBox) -> f32 {
    let d = (b.x - truth.x).abs()
        + (b.y - truth.y).abs()
        + (b.max().x - truth.max().x).abs()
        + (b.max().y - truth.max().y).abs();
    10.0 - d
}

/// Classifier following a target the test moves; `None` hides it and every
/// box scores -1.
fn moving_target(truth: &Rc<Cell<Option<BBox>>>) -> FnClassifier<impl FnMut(&BBox) -> f32> {
    let truth = Rc::clone(truth);
    FnClassifier::new(move |b: &BBox| truth.get().map_or(-1.0, |t| edge_score(b, t)))
}

// ── Initialization ─────────────────────────────────────────────

#[test]
fn single_frame_returns_the_initial_box() {
    let clf = FnClassifier::new(|_: &BBox| 0.5);
    let tracker = Tracker::initialize(clf, options(), &IMAGE, START).unwrap();

    let results = tracker.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].target, START);
    assert_eq!(results[0].regressed, START);
    assert!(results[0].success);
    assert!(results[0].recovery.is_none());
    assert_eq!(tracker.positive_memory().len(), 1);
    assert_eq!(tracker.negative_memory().len(), 1);
    assert_eq!(tracker.init_report().iterations, 4);
    assert!(tracker.init_report().mined);
}

#[test]
fn invalid_options_are_rejected() {
    let clf = FnClassifier::new(|_: &BBox| 0.5);
    let opts = TrackerOptions {
        batch_test: 0,
        ..options()
    };
    assert!(Tracker::initialize(clf, opts, &IMAGE, START).is_err());
}

// ── Scheduling ─────────────────────────────────────────────────

#[test]
fn long_term_updates_fire_on_the_interval() {
    let truth = Rc::new(Cell::new(Some(START)));
    let opts = TrackerOptions {
        long_interval: 5,
        ..options()
    };
    let mut tracker = Tracker::initialize(moving_target(&truth), opts, &IMAGE, START).unwrap();

    let mut long = Vec::new();
    for _ in 1..12 {
        let r = tracker.track(&IMAGE).unwrap();
        assert!(r.success, "frame {} failed", r.index);
        assert_ne!(r.update, UpdateKind::ShortTerm);
        if r.update == UpdateKind::LongTerm {
            long.push(r.index);
        }
    }
    assert_eq!(long, vec![5, 10]);
    assert_eq!(tracker.results().len(), 12);
}

#[test]
fn memories_stay_within_capacity() {
    let truth = Rc::new(Cell::new(Some(START)));
    let opts = TrackerOptions {
        n_frames_long: 4,
        n_frames_short: 2,
        ..options()
    };
    let mut tracker = Tracker::initialize(moving_target(&truth), opts, &IMAGE, START).unwrap();
    for _ in 0..6 {
        tracker.track(&IMAGE).unwrap();
    }
    assert_eq!(tracker.positive_memory().len(), 4);
    assert_eq!(tracker.negative_memory().len(), 2);
}

// ── Following and recovery ─────────────────────────────────────

#[test]
fn follows_a_drifting_target() {
    let truth = Rc::new(Cell::new(Some(START)));
    let mut tracker = Tracker::initialize(moving_target(&truth), options(), &IMAGE, START).unwrap();

    for step in 1..=8 {
        let moved = BBox::new(START.x + 3.0 * step as f32, START.y + step as f32, 40.0, 40.0);
        truth.set(Some(moved));
        let r = tracker.track(&IMAGE).unwrap();
        assert!(r.success);
        assert!(
            r.target.overlap_ratio(moved) > 0.7,
            "frame {step}: {:?} vs {moved:?}",
            r.target
        );
    }
}

#[test]
fn lost_target_reverts_then_search_area_expands() {
    let truth = Rc::new(Cell::new(Some(START)));
    let mut tracker = Tracker::initialize(moving_target(&truth), options(), &IMAGE, START).unwrap();
    assert!(tracker.track(&IMAGE).unwrap().success);

    truth.set(None);
    let mut trans = Vec::new();
    for _ in 0..3 {
        let r = tracker.track(&IMAGE).unwrap();
        assert!(!r.success);
        assert_eq!(r.update, UpdateKind::ShortTerm);
        let rec = r.recovery.expect("recovery should run on a failed frame");
        assert!(!rec.accepted);
        assert_eq!(rec.levels, 2);
        assert_eq!(r.regressed, r.target);
        trans.push(tracker.search_trans());
    }
    assert!(trans.windows(2).all(|w| w[1] > w[0]));
    assert!(trans.iter().all(|&t| t <= tracker.options().trans_limit));
}

#[test]
fn redetection_recovers_a_jump() {
    let truth = Rc::new(Cell::new(Some(START)));
    // Short climbs cannot cover the jump from the sampled candidates.
    let opts = TrackerOptions {
        max_climb_steps: 20,
        ..options()
    };
    let mut tracker = Tracker::initialize(moving_target(&truth), opts, &IMAGE, START).unwrap();
    assert!(tracker.track(&IMAGE).unwrap().success);

    // Beyond the coarse grid, inside the wide one.
    let jumped = BBox::new(START.x - 60.0, START.y, 40.0, 40.0);
    truth.set(Some(jumped));
    let r = tracker.track(&IMAGE).unwrap();
    let rec = r.recovery.expect("a 60 px jump should trigger re-detection");
    assert!(rec.accepted);
    assert_eq!(rec.levels, 2);
    assert!(r.success);
    assert!(r.target.overlap_ratio(jumped) > 0.5, "{:?}", r.target);
}
