//! Per-frame choice of classifier update.

use serde::{Deserialize, Serialize};

/// Which memory window, if any, a frame retrains on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    #[default]
    None,
    /// Recent positives only, after a failed frame.
    ShortTerm,
    /// Every retained frame, on the periodic beat.
    LongTerm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSchedule {
    long_interval: usize,
}

impl UpdateSchedule {
    pub fn new(long_interval: usize) -> Self {
        Self {
            long_interval: long_interval.max(1),
        }
    }

    /// Failure takes precedence over the periodic beat.
    pub fn decide(&self, frame_index: usize, success: bool) -> UpdateKind {
        if !success {
            UpdateKind::ShortTerm
        } else if frame_index % self.long_interval == 0 {
            UpdateKind::LongTerm
        } else {
            UpdateKind::None
        }
    }
}
