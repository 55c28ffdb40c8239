//! Hilltrack - online single-object tracker.
//!
//! Tracks the box given for the first frame through an image sequence and
//! writes the per-frame boxes as JSON.

mod results;
mod sequence;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hilltrack_core::{BBox, TrackerOptions};
use hilltrack_tracking::{PatchClassifier, Tracker};
use results::RunReport;
use sequence::{load_gray, parse_box, Sequence};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(author, version, about = "Online single-object tracker", long_about = None)]
struct Args {
    /// Sequence directory holding `img/` and optionally `groundtruth_rect.txt`
    #[arg(short, long, conflicts_with = "json")]
    seq: Option<PathBuf>,

    /// Sequence JSON file with `img_list`, `init_bbox` and optional `gt`
    #[arg(short, long)]
    json: Option<PathBuf>,

    /// Initial box as `x,y,w,h`, overriding the sequence's own
    #[arg(long, value_parser = parse_init)]
    init: Option<BBox>,

    /// Tracker options JSON; missing fields use defaults
    #[arg(short, long)]
    options: Option<PathBuf>,

    /// Where to write the result JSON
    #[arg(short, long, default_value = "result.json")]
    result: PathBuf,

    /// Seed for sampling and classifier initialization
    #[arg(long)]
    seed: Option<u64>,

    /// Side length of the classifier's grey patches
    #[arg(long, default_value_t = hilltrack_tracking::patch_classifier::PATCH_SIZE)]
    patch_size: usize,
}

fn parse_init(s: &str) -> std::result::Result<BBox, String> {
    parse_box(s).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let report = run(&args)?;
    report
        .save(&args.result)
        .with_context(|| format!("writing {}", args.result.display()))?;
    info!(path = %args.result.display(), fps = report.fps, "Results saved");
    Ok(())
}

fn load_sequence(args: &Args) -> Result<Sequence> {
    let mut seq = match (&args.seq, &args.json) {
        (Some(dir), _) => Sequence::from_dir(dir, args.init)?,
        (None, Some(json)) => Sequence::from_json(json)?,
        (None, None) => bail!("either --seq or --json is required"),
    };
    if let Some(init) = args.init {
        seq.init_bbox = init;
    }
    Ok(seq)
}

fn run(args: &Args) -> Result<RunReport> {
    let seq = load_sequence(args)?;
    let mut options = match &args.options {
        Some(path) => TrackerOptions::from_json_file(path)?,
        None => TrackerOptions::default(),
    };
    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    info!(
        sequence = %seq.name,
        frames = seq.len(),
        init = ?seq.init_bbox,
        "Starting tracker"
    );

    let first = load_gray(&seq.frames[0])?;
    let classifier = PatchClassifier::new(args.patch_size, options.seed);
    let mut tracker = Tracker::initialize(classifier, options, &first, seq.init_bbox)?;

    let total = seq.len();
    for (i, path) in seq.frames.iter().enumerate().skip(1) {
        let frame = load_gray(path).with_context(|| format!("frame {i}"))?;
        let r = tracker.track(&frame)?;
        match seq.ground_truth.as_ref().and_then(|gt| gt.get(i)) {
            Some(gt) => info!(
                "Frame {i}/{total}, Overlap {:.3}, Score {:.3}, Time {:.3}",
                r.regressed.overlap_ratio(*gt),
                r.score,
                r.elapsed.as_secs_f64()
            ),
            None => info!(
                "Frame {i}/{total}, Score {:.3}, Time {:.3}",
                r.score,
                r.elapsed.as_secs_f64()
            ),
        }
    }

    let report = RunReport::new(tracker.results(), seq.ground_truth.as_deref());
    if let Some(mean) = report.mean_overlap {
        info!("Mean IoU: {mean:.3}");
    }
    Ok(report)
}
