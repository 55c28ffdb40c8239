//! Coarse-to-fine re-detection after a confidence collapse.
//!
//! Each level lays a 32x32 grid of mean-sized boxes around the top-left corner
//! of the previous target, hill-climbs the five best grid boxes and merges
//! them into the candidate set. The first level whose merged top-5 mean turns
//! positive is accepted; if none does, the candidate set is restored.

use crate::classifier::{forward_scores, Classifier};
use crate::hill_climb::refine;
use crate::ranking::{top_k_indices, top_k_mean};
use hilltrack_core::limits::TOP_K;
use hilltrack_core::{BBox, TrackResult, Vec2};
use tracing::{debug, warn};

/// Grid resolutions, coarse first. A lower value spreads the grid wider.
pub const RESOLUTIONS: [f32; 2] = [32.0, 16.0];

/// Boxes per grid side.
pub const GRID_SIDE: usize = 32;

/// Outcome of a recovery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    /// Candidate set after recovery, or the untouched input when rejected.
    pub samples: Vec<BBox>,
    pub accepted: bool,
    /// Resolution levels searched.
    pub levels: usize,
}

/// Grid of `size` boxes offset from `anchor`'s top-left corner by
/// `(31 - 2j) * w / resolution, (31 - 2k) * h / resolution`.
pub fn search_grid(anchor: BBox, size: Vec2, resolution: f32) -> Vec<BBox> {
    let last = (GRID_SIDE - 1) as f32;
    let mut grid = Vec::with_capacity(GRID_SIDE * GRID_SIDE);
    for j in 0..GRID_SIDE {
        for k in 0..GRID_SIDE {
            let dx = (last - 2.0 * j as f32) * size.x / resolution;
            let dy = (last - 2.0 * k as f32) * size.y / resolution;
            grid.push(BBox::new(anchor.x + dx, anchor.y + dy, size.x, size.y));
        }
    }
    grid
}

/// Search around `last_box` for candidates that restore a positive top-5 mean.
pub fn recover<S>(
    last_box: BBox,
    samples: &[BBox],
    scorer: &mut S,
    max_climb_steps: usize,
) -> TrackResult<Recovery>
where
    S: FnMut(&[BBox]) -> TrackResult<Vec<f32>>,
{
    let mut merged = samples.to_vec();
    let mut levels = 0;

    for resolution in RESOLUTIONS {
        let Some(mean_box) = BBox::mean(&merged) else {
            break;
        };
        levels += 1;

        let mut grid = search_grid(last_box, mean_box.size(), resolution);
        let scores = scorer(&grid)?;
        for i in top_k_indices(&scores, TOP_K) {
            grid[i] = refine(grid[i], &mut *scorer, max_climb_steps)?.bbox;
        }

        let scores = scorer(&grid)?;
        merged.extend(top_k_indices(&scores, TOP_K).into_iter().map(|i| grid[i]));

        let merged_scores = scorer(&merged)?;
        let (_, mean) = top_k_mean(&merged_scores, TOP_K);
        debug!(resolution, mean, candidates = merged.len(), "Re-detection level scored");
        if mean > 0.0 {
            return Ok(Recovery {
                samples: merged,
                accepted: true,
                levels,
            });
        }
    }

    warn!(levels, "Re-detection found no confident candidate; keeping prior samples");
    Ok(Recovery {
        samples: samples.to_vec(),
        accepted: false,
        levels,
    })
}

/// [`recover`] scoring with `classifier` on `frame`.
pub fn recover_with<F, C>(
    classifier: &mut C,
    frame: &F,
    last_box: BBox,
    samples: &[BBox],
    batch_test: usize,
    max_climb_steps: usize,
) -> TrackResult<Recovery>
where
    F: ?Sized,
    C: Classifier<F> + ?Sized,
{
    let mut scorer = |boxes: &[BBox]| forward_scores(&mut *classifier, frame, boxes, batch_test);
    recover(last_box, samples, &mut scorer, max_climb_steps)
}
