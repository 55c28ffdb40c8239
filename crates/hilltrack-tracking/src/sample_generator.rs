//! Candidate box generation around a target.

use hilltrack_core::limits::MIN_SAMPLE_SIZE;
use hilltrack_core::{BBox, ImageSize, OverlapRange, Vec2};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Box sizes used by [`Distribution::Whole`], as fractions of the image size.
pub const WHOLE_SCALES: [f32; 4] = [0.5, 0.35, 0.25, 0.15];

/// Oversampling factors tried before a shortfall is reported.
const RETRY_FACTORS: [usize; 3] = [2, 4, 8];

/// Spatial distribution of generated boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    /// Clipped normal noise around the target.
    Gaussian,
    /// Uniform noise over a wider range around the target.
    Uniform,
    /// Deterministic tiling of the whole image; the target only filters.
    Whole,
}

/// Output of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub boxes: Vec<BBox>,
    /// How many boxes the caller asked for.
    pub requested: usize,
}

impl Generated {
    /// Fewer boxes than requested survived the overlap filter.
    #[inline]
    pub fn is_short(&self) -> bool {
        self.boxes.len() < self.requested
    }

    #[inline]
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.boxes.len())
    }
}

/// Draws candidate boxes under one distribution.
#[derive(Debug, Clone)]
pub struct SampleGenerator {
    kind: Distribution,
    image: ImageSize,
    trans: f32,
    scale: f32,
    aspect: Option<f32>,
}

impl SampleGenerator {
    pub fn new(kind: Distribution, image: ImageSize, trans: f32, scale: f32) -> Self {
        Self {
            kind,
            image,
            trans,
            scale,
            aspect: None,
        }
    }

    /// Perturb width and height independently by `aspect^U(-1, 1)`.
    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = Some(aspect);
        self
    }

    #[inline]
    pub fn kind(&self) -> Distribution {
        self.kind
    }

    #[inline]
    pub fn trans(&self) -> f32 {
        self.trans
    }

    pub fn set_trans(&mut self, trans: f32) {
        self.trans = trans;
    }

    /// Widen the translation range by 10%, up to `limit`.
    pub fn expand_trans(&mut self, limit: f32) {
        self.trans = (self.trans * 1.1).min(limit);
    }

    /// Draw `n` boxes without any overlap filter.
    pub fn generate_unfiltered<R: Rng>(&self, rng: &mut R, target: BBox, n: usize) -> Vec<BBox> {
        match self.kind {
            Distribution::Whole => whole_tiles(self.image, n),
            Distribution::Gaussian | Distribution::Uniform => (0..n)
                .map(|_| self.jitter(rng, target))
                .collect(),
        }
    }

    /// Draw up to `count` boxes whose overlap with `target` lies in `overlap`.
    ///
    /// Oversamples by growing factors until `count` boxes pass the filter or
    /// the retry budget is spent; a shortfall is logged and reported through
    /// [`Generated::is_short`].
    pub fn generate<R: Rng>(
        &self,
        rng: &mut R,
        target: BBox,
        count: usize,
        overlap: Option<OverlapRange>,
    ) -> Generated {
        let Some(range) = overlap else {
            return Generated {
                boxes: self.generate_unfiltered(rng, target, count),
                requested: count,
            };
        };

        let mut boxes = Vec::with_capacity(count);
        for factor in RETRY_FACTORS {
            let remain = count - boxes.len();
            if remain == 0 {
                break;
            }
            let accepted = self
                .generate_unfiltered(rng, target, remain * factor)
                .into_iter()
                .filter(|b| range.contains(b.overlap_ratio(target)))
                .take(remain);
            boxes.extend(accepted);
        }

        let generated = Generated {
            boxes,
            requested: count,
        };
        if generated.is_short() {
            warn!(
                distribution = ?self.kind,
                requested = count,
                found = generated.boxes.len(),
                lo = range.lo,
                hi = range.hi,
                "Sample generation fell short of the requested count"
            );
        }
        generated
    }

    fn jitter<R: Rng>(&self, rng: &mut R, target: BBox) -> BBox {
        let mut size = target.size();
        if let Some(aspect) = self.aspect {
            let rx: f32 = rng.gen_range(-1.0..1.0);
            let ry: f32 = rng.gen_range(-1.0..1.0);
            size *= Vec2::new(aspect.powf(rx), aspect.powf(ry));
        }

        let reach = self.trans * (target.width + target.height) * 0.5;
        let (offset, exponent) = match self.kind {
            Distribution::Gaussian => {
                let mut clipped_normal =
                    || (0.5 * rng.sample::<f32, _>(StandardNormal)).clamp(-1.0, 1.0);
                (
                    Vec2::new(clipped_normal(), clipped_normal()),
                    clipped_normal(),
                )
            }
            _ => (
                Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)),
                rng.gen_range(-1.0..1.0),
            ),
        };

        let center = target.center() + offset * reach;
        size *= self.scale.powf(exponent);
        BBox::from_center_size(center, size).clamp_to_image(self.image, MIN_SAMPLE_SIZE)
    }
}

/// Deterministic tiling of the image at [`WHOLE_SCALES`], evenly thinned to `n`.
fn whole_tiles(image: ImageSize, n: usize) -> Vec<BBox> {
    if n == 0 {
        return Vec::new();
    }
    let per_scale = n.div_ceil(WHOLE_SCALES.len());
    let side = ((per_scale as f32).sqrt().ceil() as usize).max(2);
    let dims = image.as_vec2();

    let mut tiles = Vec::with_capacity(side * side * WHOLE_SCALES.len());
    for gy in 0..side {
        for gx in 0..side {
            let t = Vec2::new(gx as f32, gy as f32) / (side - 1) as f32;
            for s in WHOLE_SCALES {
                let size = dims * s;
                let min = (dims - size) * t;
                tiles.push(
                    BBox::from_center_size(min + size * 0.5, size)
                        .clamp_to_image(image, MIN_SAMPLE_SIZE),
                );
            }
        }
    }

    let total = tiles.len();
    (0..n).map(|i| tiles[i * total / n]).collect()
}
