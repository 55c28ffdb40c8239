//! Tracker tunables.
//!
//! Every field has a default, so an options file only needs the values it
//! overrides:
//!
//! ```json
//! { "n_samples": 128, "long_interval": 5, "grad_clip": null }
//! ```

use crate::error::{TrackError, TrackResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Closed overlap-ratio interval `[lo, hi]`, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct OverlapRange {
    pub lo: f32,
    pub hi: f32,
}

impl OverlapRange {
    pub const fn new(lo: f32, hi: f32) -> Self {
        Self { lo, hi }
    }

    #[inline]
    pub fn contains(self, ratio: f32) -> bool {
        ratio >= self.lo && ratio <= self.hi
    }
}

impl From<[f32; 2]> for OverlapRange {
    fn from(a: [f32; 2]) -> Self {
        Self::new(a[0], a[1])
    }
}

impl From<OverlapRange> for [f32; 2] {
    fn from(r: OverlapRange) -> Self {
        [r.lo, r.hi]
    }
}

/// All parameters consumed by the tracking loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerOptions {
    /// Candidates drawn per frame.
    pub n_samples: usize,
    pub trans: f32,
    pub scale: f32,
    /// Upper bound for `trans` while the search area expands after failures.
    pub trans_limit: f32,

    pub trans_pos: f32,
    pub scale_pos: f32,
    pub trans_neg_init: f32,
    pub scale_neg_init: f32,
    pub trans_neg: f32,
    pub scale_neg: f32,

    pub n_bbreg: usize,
    pub overlap_bbreg: OverlapRange,
    pub trans_bbreg: f32,
    pub scale_bbreg: f32,
    pub aspect_bbreg: f32,

    pub n_pos_init: usize,
    pub n_neg_init: usize,
    pub overlap_pos_init: OverlapRange,
    pub overlap_neg_init: OverlapRange,
    pub maxiter_init: usize,
    pub lr_init: f32,

    pub n_pos_update: usize,
    pub n_neg_update: usize,
    pub overlap_pos_update: OverlapRange,
    pub overlap_neg_update: OverlapRange,
    pub maxiter_update: usize,
    pub lr_update: f32,

    /// Capacity of the positive feature memory, in frames.
    pub n_frames_long: usize,
    /// Capacity of the negative feature memory, in frames.
    pub n_frames_short: usize,
    /// Frame period of long-term updates.
    pub long_interval: usize,

    pub batch_pos: usize,
    pub batch_neg: usize,
    pub batch_neg_cand: usize,
    /// Largest number of boxes sent to the classifier in one call.
    pub batch_test: usize,
    pub grad_clip: Option<f32>,

    /// Safety cap on hill-climbing iterations per box.
    pub max_climb_steps: usize,
    pub seed: u64,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            n_samples: 256,
            trans: 0.6,
            scale: 1.05,
            trans_limit: 1.5,

            trans_pos: 0.1,
            scale_pos: 1.3,
            trans_neg_init: 1.0,
            scale_neg_init: 1.6,
            trans_neg: 2.0,
            scale_neg: 1.3,

            n_bbreg: 1000,
            overlap_bbreg: OverlapRange::new(0.6, 1.0),
            trans_bbreg: 0.3,
            scale_bbreg: 1.6,
            aspect_bbreg: 1.1,

            n_pos_init: 500,
            n_neg_init: 5000,
            overlap_pos_init: OverlapRange::new(0.7, 1.0),
            overlap_neg_init: OverlapRange::new(0.0, 0.5),
            maxiter_init: 50,
            lr_init: 0.0005,

            n_pos_update: 50,
            n_neg_update: 200,
            overlap_pos_update: OverlapRange::new(0.7, 1.0),
            overlap_neg_update: OverlapRange::new(0.0, 0.3),
            maxiter_update: 15,
            lr_update: 0.001,

            n_frames_long: 100,
            n_frames_short: 30,
            long_interval: 10,

            batch_pos: 32,
            batch_neg: 96,
            batch_neg_cand: 1024,
            batch_test: 256,
            grad_clip: Some(10.0),

            max_climb_steps: 100,
            seed: 0,
        }
    }
}

impl TrackerOptions {
    /// Load options from a JSON file, filling missing fields with defaults.
    pub fn from_json_file(path: &Path) -> TrackResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&json).map_err(|e| {
            TrackError::Serialization(format!("Failed to parse options {}: {e}", path.display()))
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Write options as pretty JSON.
    pub fn save_json_file(&self, path: &Path) -> TrackResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TrackError::Serialization(format!("Failed to serialize options: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject settings the tracking loop cannot run with.
    pub fn validate(&self) -> TrackResult<()> {
        let positive = [
            ("n_samples", self.n_samples),
            ("n_pos_init", self.n_pos_init),
            ("n_neg_init", self.n_neg_init),
            ("n_frames_long", self.n_frames_long),
            ("n_frames_short", self.n_frames_short),
            ("long_interval", self.long_interval),
            ("batch_pos", self.batch_pos),
            ("batch_neg", self.batch_neg),
            ("batch_test", self.batch_test),
            ("max_climb_steps", self.max_climb_steps),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(TrackError::InvalidParameter(format!("{name} must be > 0")));
            }
        }

        let ranges = [
            ("overlap_bbreg", self.overlap_bbreg),
            ("overlap_pos_init", self.overlap_pos_init),
            ("overlap_neg_init", self.overlap_neg_init),
            ("overlap_pos_update", self.overlap_pos_update),
            ("overlap_neg_update", self.overlap_neg_update),
        ];
        for (name, range) in ranges {
            if range.lo > range.hi {
                return Err(TrackError::InvalidParameter(format!(
                    "{name} is inverted: [{}, {}]",
                    range.lo, range.hi
                )));
            }
        }

        if self.trans_limit < self.trans {
            return Err(TrackError::InvalidParameter(format!(
                "trans_limit ({}) is below trans ({})",
                self.trans_limit, self.trans
            )));
        }
        if matches!(self.grad_clip, Some(c) if c <= 0.0) {
            return Err(TrackError::InvalidParameter(
                "grad_clip must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Negative candidates drawn per training iteration before mining.
    #[inline]
    pub fn batch_neg_cand(&self) -> usize {
        self.batch_neg_cand.max(self.batch_neg)
    }
}
