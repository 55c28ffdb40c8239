//! Error types for hilltrack.

use thiserror::Error;

/// Main error type for tracking operations.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external classifier failed; the frame cannot be processed.
    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A box with non-finite or non-positive geometry reached a scoring call.
    #[error("Invalid box: [{x}, {y}, {width}, {height}]")]
    InvalidBox {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },

    #[error("Empty sample set: {0}")]
    EmptySampleSet(String),

    #[error("Sequence error: {0}")]
    Sequence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TrackError {
    /// Build an [`TrackError::InvalidBox`] from the offending box.
    pub fn invalid_box(b: crate::BBox) -> Self {
        Self::InvalidBox {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
        }
    }
}

/// Result type alias for tracking operations.
pub type TrackResult<T> = std::result::Result<T, TrackError>;
