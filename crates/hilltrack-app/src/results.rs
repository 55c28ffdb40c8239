//! Result file written after a run.

use hilltrack_core::{BBox, TrackError, TrackResult};
use hilltrack_tracking::FrameResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// `{ "res": [[x, y, w, h], ...], "type": "rect", "fps": ..., "overlap": [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Regressed box per frame, rounded to whole pixels.
    pub res: Vec<[f32; 4]>,
    #[serde(rename = "type")]
    pub kind: String,
    pub fps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_overlap: Option<f32>,
}

impl RunReport {
    /// Summarize a run. Overlaps are measured against `ground_truth` for as
    /// many frames as both cover.
    pub fn new(results: &[FrameResult], ground_truth: Option<&[BBox]>) -> Self {
        let total: Duration = results.iter().map(|r| r.elapsed).sum();
        let secs = total.as_secs_f64();
        let fps = if secs > 0.0 {
            results.len() as f64 / secs
        } else {
            0.0
        };

        let overlap: Option<Vec<f32>> = ground_truth.map(|gt| {
            results
                .iter()
                .zip(gt)
                .map(|(r, g)| r.regressed.overlap_ratio(*g))
                .collect()
        });
        let mean_overlap = overlap
            .as_ref()
            .filter(|o| !o.is_empty())
            .map(|o| o.iter().sum::<f32>() / o.len() as f32);

        Self {
            res: results.iter().map(|r| r.regressed.round().to_array()).collect(),
            kind: "rect".to_string(),
            fps,
            overlap,
            mean_overlap,
        }
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> TrackResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TrackError::Serialization(format!("Failed to serialize results: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
