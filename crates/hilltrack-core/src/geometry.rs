//! Geometric primitives for axis-aligned target boxes.

use bytemuck::{Pod, Zeroable};
use glam::Vec2 as GlamVec2;
use serde::{Deserialize, Serialize};

/// 2D vector.
pub type Vec2 = GlamVec2;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions as a float vector.
    #[inline]
    pub fn as_vec2(self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

/// Axis-aligned box in image pixel coordinates, top-left anchored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    /// Create a new box.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a box from `[x, y, w, h]`.
    #[inline]
    pub fn from_array(a: [f32; 4]) -> Self {
        Self::new(a[0], a[1], a[2], a[3])
    }

    /// The box as `[x, y, w, h]`.
    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Create a box from center and size.
    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        Self {
            x: center.x - size.x * 0.5,
            y: center.y - size.y * 0.5,
            width: size.x,
            height: size.y,
        }
    }

    /// Minimum corner (top-left).
    #[inline]
    pub fn min(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Maximum corner (bottom-right).
    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    /// Center point.
    #[inline]
    pub fn center(self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Size as a vector.
    #[inline]
    pub fn size(self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Area of the box.
    #[inline]
    pub fn area(self) -> f32 {
        self.width * self.height
    }

    /// Finite coordinates and a strictly positive size.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Compute intersection with another box.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x1 < x2 && y1 < y2 {
            Some(Self::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    /// Intersection area over union area.
    ///
    /// Areas are measured from edge coordinates on both sides so that
    /// `a.overlap_ratio(a)` is exactly 1 and the ratio is symmetric.
    pub fn overlap_ratio(self, other: Self) -> f32 {
        let edge_area = |b: Self| ((b.x + b.width) - b.x) * ((b.y + b.height) - b.y);
        let inter = self.intersection(other).map_or(0.0, |i| i.area());
        let union = edge_area(self) + edge_area(other) - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Shift one edge and resize so the opposite edge stays put.
    #[inline]
    pub fn with_edges(self, dl: f32, dt: f32, dr: f32, db: f32) -> Self {
        Self::new(
            self.x + dl,
            self.y + dt,
            self.width - dl + dr,
            self.height - dt + db,
        )
    }

    /// Clamp the size to `[min_size, dim - min_size]` and the center to the image.
    ///
    /// For images smaller than `2 * min_size` the upper bound wins.
    pub fn clamp_to_image(self, image: ImageSize, min_size: f32) -> Self {
        let dims = image.as_vec2();
        let upper = (dims - Vec2::splat(min_size)).max(Vec2::ONE);
        let lower = Vec2::splat(min_size).min(upper);
        let size = self.size().clamp(lower, upper);
        let center = self.center().clamp(Vec2::ZERO, dims);
        Self::from_center_size(center, size)
    }

    /// Element-wise mean of a set of boxes.
    pub fn mean(boxes: &[BBox]) -> Option<Self> {
        if boxes.is_empty() {
            return None;
        }
        let n = boxes.len() as f32;
        let (sx, sy, sw, sh) = boxes.iter().fold((0.0, 0.0, 0.0, 0.0), |acc, b| {
            (acc.0 + b.x, acc.1 + b.y, acc.2 + b.width, acc.3 + b.height)
        });
        Some(Self::new(sx / n, sy / n, sw / n, sh / n))
    }

    /// Round every coordinate to the nearest integer.
    pub fn round(self) -> Self {
        Self::new(
            self.x.round(),
            self.y.round(),
            self.width.round(),
            self.height.round(),
        )
    }
}
