//! Greedy edge-wise refinement of a single box.
//!
//! Each move shifts exactly one edge by one pixel while the opposite edge
//! stays fixed. The first move is always taken; after that the climb keeps
//! going while the best neighbor scores at least as high as the last accepted
//! box, so plateaus are crossed. A step cap bounds flat landscapes.

use crate::classifier::{forward_scores, Classifier};
use crate::ranking::arg_max;
use hilltrack_core::limits::MIN_CLIMB_SIZE;
use hilltrack_core::{BBox, TrackError, TrackResult};
use tracing::trace;

/// Edge deltas `(left, top, right, bottom)` of the eight moves, in scoring order.
pub const MOVES: [[f32; 4]; 8] = [
    [1.0, 0.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, -1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, -1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
    [0.0, 0.0, 0.0, -1.0],
];

/// The eight one-edge neighbors of `b`, in [`MOVES`] order.
pub fn neighbors(b: BBox) -> [BBox; 8] {
    MOVES.map(|[dl, dt, dr, db]| b.with_edges(dl, dt, dr, db))
}

/// Result of one climb.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climb {
    pub bbox: BBox,
    /// Score of the last accepted box; `None` if no move was accepted.
    pub score: Option<f32>,
    /// Accepted moves.
    pub steps: usize,
    /// The climb stopped at the step cap rather than at a local maximum.
    pub capped: bool,
}

/// Climb from `start` using a batched score function.
pub fn refine<S>(start: BBox, mut score_fn: S, max_steps: usize) -> TrackResult<Climb>
where
    S: FnMut(&[BBox]) -> TrackResult<Vec<f32>>,
{
    let mut climb = Climb {
        bbox: start,
        score: None,
        steps: 0,
        capped: false,
    };

    loop {
        if climb.steps >= max_steps {
            climb.capped = true;
            break;
        }

        let candidates: Vec<BBox> = neighbors(climb.bbox)
            .into_iter()
            .filter(|b| b.is_valid() && b.width >= MIN_CLIMB_SIZE && b.height >= MIN_CLIMB_SIZE)
            .collect();
        if candidates.is_empty() {
            break;
        }

        let scores = score_fn(&candidates)?;
        if scores.len() != candidates.len() {
            return Err(TrackError::Classifier(format!(
                "returned {} scores for {} climb moves",
                scores.len(),
                candidates.len()
            )));
        }
        let Some(best) = arg_max(&scores) else {
            break;
        };

        let best_score = scores[best];
        if matches!(climb.score, Some(last) if best_score < last) {
            break;
        }
        climb.bbox = candidates[best];
        climb.score = Some(best_score);
        climb.steps += 1;
    }

    trace!(steps = climb.steps, capped = climb.capped, "Climb finished");
    Ok(climb)
}

/// Climb from `start` scoring moves with `classifier` on `frame`.
pub fn refine_box<F, C>(
    classifier: &mut C,
    frame: &F,
    start: BBox,
    batch_test: usize,
    max_steps: usize,
) -> TrackResult<Climb>
where
    F: ?Sized,
    C: Classifier<F> + ?Sized,
{
    refine(
        start,
        |moves: &[BBox]| forward_scores(&mut *classifier, frame, moves, batch_test),
        max_steps,
    )
}
