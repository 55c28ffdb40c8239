//! Hilltrack Core - Foundation types for single-object tracking
//!
//! This crate provides the fundamental types used throughout hilltrack:
//! - Target boxes and overlap geometry
//! - Tracker options and their JSON form
//! - The shared error type

pub mod error;
pub mod geometry;
pub mod options;

pub use error::{TrackError, TrackResult};
pub use geometry::{BBox, ImageSize, Vec2};
pub use options::{OverlapRange, TrackerOptions};

/// Constants shared by the sampling and search stages.
pub mod limits {
    /// Smallest width/height, in pixels, a generated sample may have.
    pub const MIN_SAMPLE_SIZE: f32 = 10.0;

    /// Smallest width/height, in pixels, a hill-climbing move may produce.
    pub const MIN_CLIMB_SIZE: f32 = 1.0;

    /// Number of top-scoring candidates averaged into the target box.
    pub const TOP_K: usize = 5;
}
