//! Grey-level frames and region resampling.

use hilltrack_core::{BBox, ImageSize, TrackError, TrackResult};

/// Anything the tracker can be fed as a frame.
pub trait Frame {
    fn size(&self) -> ImageSize;
}

/// A bare size stands in for frames whose pixels the classifier ignores.
impl Frame for ImageSize {
    fn size(&self) -> ImageSize {
        *self
    }
}

impl Frame for GrayImage {
    fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }
}

/// A grayscale image stored as f32 values [0, 1].
#[derive(Debug, Clone)]
pub struct GrayImage {
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl GrayImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0.0; (width * height) as usize],
            width,
            height,
        }
    }

    /// Wrap row-major luminance data.
    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> TrackResult<Self> {
        if width == 0 || height == 0 || data.len() != (width * height) as usize {
            return Err(TrackError::InvalidParameter(format!(
                "{} samples do not form a {width}x{height} image",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        let x = x.clamp(0, self.width as i32 - 1) as u32;
        let y = y.clamp(0, self.height as i32 - 1) as u32;
        self.data[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, val: f32) {
        if x < self.width && y < self.height {
            self.data[(y * self.width + x) as usize] = val;
        }
    }

    /// Bilinear sample at a sub-pixel position, replicating the border.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as i32, y0 as i32);
        let top = self.get(xi, yi) * (1.0 - fx) + self.get(xi + 1, yi) * fx;
        let bottom = self.get(xi, yi + 1) * (1.0 - fx) + self.get(xi + 1, yi + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Resample `bbox`, grown by `padding` of its size on every side, to a
    /// `size x size` patch in row-major order.
    pub fn extract_patch(&self, bbox: BBox, padding: f32, size: usize) -> Vec<f32> {
        let pad_w = bbox.width * padding;
        let pad_h = bbox.height * padding;
        let x0 = bbox.x - pad_w;
        let y0 = bbox.y - pad_h;
        let step_x = (bbox.width + 2.0 * pad_w) / size as f32;
        let step_y = (bbox.height + 2.0 * pad_h) / size as f32;

        let mut patch = Vec::with_capacity(size * size);
        for py in 0..size {
            let sy = y0 + (py as f32 + 0.5) * step_y - 0.5;
            for px in 0..size {
                let sx = x0 + (px as f32 + 0.5) * step_x - 0.5;
                patch.push(self.sample(sx, sy));
            }
        }
        patch
    }
}
