//! Sequence loading: JSON sequence files and OTB-style directories.

use hilltrack_core::{BBox, TrackError, TrackResult};
use hilltrack_tracking::GrayImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Image extensions picked up from a sequence directory.
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Ground-truth file name inside an OTB-style sequence directory.
pub const GROUND_TRUTH_FILE: &str = "groundtruth_rect.txt";

/// Frames to track plus the box to start from.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub name: String,
    pub frames: Vec<PathBuf>,
    pub init_bbox: BBox,
    pub ground_truth: Option<Vec<BBox>>,
}

#[derive(Debug, Deserialize)]
struct SequenceFile {
    img_list: Vec<PathBuf>,
    init_bbox: [f32; 4],
    #[serde(default)]
    gt: Option<Vec<[f32; 4]>>,
}

impl Sequence {
    /// Load `{ "img_list": [...], "init_bbox": [x, y, w, h], "gt": [...] }`.
    ///
    /// Relative image paths are resolved against the file's directory.
    pub fn from_json(path: &Path) -> TrackResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let file: SequenceFile = serde_json::from_str(&json).map_err(|e| {
            TrackError::Serialization(format!("Failed to parse sequence {}: {e}", path.display()))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let frames = file
            .img_list
            .into_iter()
            .map(|p| if p.is_relative() { base.join(p) } else { p })
            .collect();

        let seq = Self {
            name: stem_name(path),
            frames,
            init_bbox: BBox::from_array(file.init_bbox),
            ground_truth: file.gt.map(|rows| rows.into_iter().map(BBox::from_array).collect()),
        };
        seq.check()?;
        Ok(seq)
    }

    /// Load `dir/img/*` with an optional `dir/groundtruth_rect.txt`.
    ///
    /// `init` overrides the first ground-truth row and is required when the
    /// directory has no ground truth.
    pub fn from_dir(dir: &Path, init: Option<BBox>) -> TrackResult<Self> {
        let img_dir = dir.join("img");
        let img_dir = if img_dir.is_dir() { img_dir } else { dir.to_path_buf() };

        let mut frames: Vec<PathBuf> = std::fs::read_dir(&img_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .collect();
        frames.sort();

        let gt_path = dir.join(GROUND_TRUTH_FILE);
        let ground_truth = if gt_path.is_file() {
            Some(parse_ground_truth(&std::fs::read_to_string(&gt_path)?)?)
        } else {
            None
        };

        let init_bbox = init
            .or_else(|| ground_truth.as_ref().and_then(|gt| gt.first().copied()))
            .ok_or_else(|| {
                TrackError::Sequence(format!(
                    "{} has no {GROUND_TRUTH_FILE}; an initial box is required",
                    dir.display()
                ))
            })?;

        let seq = Self {
            name: stem_name(dir),
            frames,
            init_bbox,
            ground_truth,
        };
        seq.check()?;
        Ok(seq)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn check(&self) -> TrackResult<()> {
        if self.frames.is_empty() {
            return Err(TrackError::Sequence(format!("{} has no frames", self.name)));
        }
        if !self.init_bbox.is_valid() {
            return Err(TrackError::invalid_box(self.init_bbox));
        }
        Ok(())
    }
}

fn stem_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sequence".to_string())
}

/// Parse one `x,y,w,h` row; commas, tabs and spaces all separate values.
pub fn parse_box(line: &str) -> TrackResult<BBox> {
    let values: Vec<f32> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f32>()
                .map_err(|e| TrackError::Sequence(format!("bad box value {t:?}: {e}")))
        })
        .collect::<TrackResult<_>>()?;
    match values.as_slice() {
        [x, y, w, h] => Ok(BBox::new(*x, *y, *w, *h)),
        _ => Err(TrackError::Sequence(format!(
            "expected 4 values per box, got {} in {line:?}",
            values.len()
        ))),
    }
}

/// One box per non-empty line.
pub fn parse_ground_truth(text: &str) -> TrackResult<Vec<BBox>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(parse_box)
        .collect()
}

/// Decode an image file into a grey frame with values in `[0, 1]`.
pub fn load_gray(path: &Path) -> TrackResult<GrayImage> {
    let img = image::open(path)
        .map_err(|e| TrackError::Sequence(format!("Failed to decode {}: {e}", path.display())))?;
    let luma = img.to_luma32f();
    let (width, height) = luma.dimensions();
    GrayImage::from_raw(width, height, luma.into_raw())
}
