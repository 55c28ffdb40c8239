//! Linear box regressor fitted once on the first frame.
//!
//! Ridge regression from feature rows to center-normalized box deltas
//! `((gx - bx) / bw, (gy - by) / bh, ln(gw / bw), ln(gh / bh))`. The model is
//! frozen after [`BBoxRegressor::fit`]; an unfitted regressor is the identity.

use hilltrack_core::{BBox, ImageSize, OverlapRange, TrackError, TrackResult};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use tracing::{debug, warn};

const DEFAULT_ALPHA: f64 = 1000.0;

#[derive(Debug, Clone)]
struct RidgeModel {
    /// `features x 4`
    weights: Array2<f64>,
    intercept: Array1<f64>,
}

impl RidgeModel {
    fn predict(&self, features: &Array2<f64>) -> Array2<f64> {
        features.dot(&self.weights) + &self.intercept
    }
}

/// Feature-to-delta box corrector.
#[derive(Debug, Clone)]
pub struct BBoxRegressor {
    image: ImageSize,
    alpha: f64,
    overlap: OverlapRange,
    /// Accepted input-to-reference area ratios.
    scale: OverlapRange,
    model: Option<RidgeModel>,
}

impl BBoxRegressor {
    pub fn new(image: ImageSize) -> Self {
        Self {
            image,
            alpha: DEFAULT_ALPHA,
            overlap: OverlapRange::new(0.6, 1.0),
            scale: OverlapRange::new(1.0, 2.0),
            model: None,
        }
    }

    pub fn with_overlap(mut self, overlap: OverlapRange) -> Self {
        self.overlap = overlap;
        self
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    fn in_range(&self, input: BBox, reference: BBox) -> bool {
        let ratio = input.area() / reference.area();
        self.overlap.contains(input.overlap_ratio(reference)) && self.scale.contains(ratio)
    }

    /// Fit on samples drawn around `target`, keeping only rows whose box is
    /// close enough to the target. Returns the number of rows used.
    ///
    /// Fails if the regressor was already fitted.
    pub fn fit(
        &mut self,
        features: ArrayView2<'_, f32>,
        boxes: &[BBox],
        target: BBox,
    ) -> TrackResult<usize> {
        if self.model.is_some() {
            return Err(TrackError::InvalidParameter(
                "box regressor is frozen after its first fit".into(),
            ));
        }
        if features.nrows() != boxes.len() {
            return Err(TrackError::InvalidParameter(format!(
                "{} feature rows for {} boxes",
                features.nrows(),
                boxes.len()
            )));
        }

        let keep: Vec<usize> = (0..boxes.len())
            .filter(|&i| self.in_range(boxes[i], target))
            .collect();
        if keep.is_empty() {
            warn!("No regression samples near the target; box regression disabled");
            return Ok(0);
        }

        let x = features.select(Axis(0), &keep).mapv(f64::from);
        let mut y = Array2::zeros((keep.len(), 4));
        for (row, &i) in keep.iter().enumerate() {
            let d = deltas(boxes[i], target);
            for (c, v) in d.into_iter().enumerate() {
                y[[row, c]] = v;
            }
        }

        match solve_ridge(&x, &y, self.alpha) {
            Some(model) => {
                debug!(rows = keep.len(), dims = x.ncols(), "Box regressor fitted");
                self.model = Some(model);
                Ok(keep.len())
            }
            None => {
                warn!("Ridge system is singular; box regression disabled");
                Ok(0)
            }
        }
    }

    /// Apply the learned deltas to each box.
    ///
    /// Predictions that drift outside the training overlap/scale ranges fall
    /// back to their input box.
    pub fn predict(
        &self,
        features: ArrayView2<'_, f32>,
        boxes: &[BBox],
    ) -> TrackResult<Vec<BBox>> {
        let Some(model) = &self.model else {
            return Ok(boxes.to_vec());
        };
        if features.nrows() != boxes.len() || features.ncols() != model.weights.nrows() {
            return Err(TrackError::InvalidParameter(format!(
                "regressor expects {} feature columns per box, got {}x{} for {} boxes",
                model.weights.nrows(),
                features.nrows(),
                features.ncols(),
                boxes.len()
            )));
        }

        let y = model.predict(&features.mapv(f64::from));
        let dims = self.image.as_vec2();
        Ok(boxes
            .iter()
            .enumerate()
            .map(|(i, &input)| {
                let c = input.center();
                let cx = y[[i, 0]] as f32 * input.width + c.x;
                let cy = y[[i, 1]] as f32 * input.height + c.y;
                let w = (y[[i, 2]] as f32).exp() * input.width;
                let h = (y[[i, 3]] as f32).exp() * input.height;
                let mut out = BBox::new(cx - w * 0.5, cy - h * 0.5, w, h);

                if !out.is_valid() || !self.in_range(input, out) {
                    out = input;
                }
                out.x = out.x.max(0.0);
                out.y = out.y.max(0.0);
                out.width = out.width.min(dims.x - input.x);
                out.height = out.height.min(dims.y - input.y);
                // An input past the right or bottom border clamps to nothing.
                if out.is_valid() {
                    out
                } else {
                    input
                }
            })
            .collect())
    }
}

/// Center-normalized deltas taking `b` onto `gt`.
fn deltas(b: BBox, gt: BBox) -> [f64; 4] {
    let (bc, gc) = (b.center(), gt.center());
    [
        f64::from((gc.x - bc.x) / b.width),
        f64::from((gc.y - bc.y) / b.height),
        f64::from(gt.width / b.width).ln(),
        f64::from(gt.height / b.height).ln(),
    ]
}

/// Ridge regression with an unpenalized intercept.
fn solve_ridge(x: &Array2<f64>, y: &Array2<f64>, alpha: f64) -> Option<RidgeModel> {
    let x_mean = x.mean_axis(Axis(0))?;
    let y_mean = y.mean_axis(Axis(0))?;
    let xc = x - &x_mean;
    let yc = y - &y_mean;

    let mut gram = xc.t().dot(&xc);
    for i in 0..gram.nrows() {
        gram[[i, i]] += alpha;
    }
    let rhs = xc.t().dot(&yc);
    let weights = cholesky_solve(gram, rhs)?;
    let intercept = &y_mean - &x_mean.dot(&weights);
    Some(RidgeModel { weights, intercept })
}

/// Solve `a * x = b` for symmetric positive-definite `a`.
fn cholesky_solve(a: Array2<f64>, b: Array2<f64>) -> Option<Array2<f64>> {
    let a = DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]]);
    let b = DMatrix::from_fn(b.nrows(), b.ncols(), |i, j| b[[i, j]]);
    let x = a.cholesky()?.solve(&b);
    Some(Array2::from_shape_fn(x.shape(), |(i, j)| x[(i, j)]))
}
