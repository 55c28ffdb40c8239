//! Hilltrack Tracking - The online single-object tracking loop.
//!
//! Candidate sampling, hill-climbing refinement, grid re-detection, box
//! regression and the memory-driven classifier updates, all written against
//! the [`Classifier`] capability so any model can be plugged in.

pub mod batch;
pub mod bbreg;
pub mod classifier;
pub mod frame;
pub mod hill_climb;
pub mod memory;
pub mod patch_classifier;
pub mod ranking;
pub mod redetect;
pub mod sample_generator;
pub mod schedule;
pub mod tracker;

pub use batch::{run_training, select_hardest, IndexCycle, TrainingConfig, TrainingReport};
pub use bbreg::BBoxRegressor;
pub use classifier::{
    forward_features, forward_scores, Classifier, FnClassifier, StepParams, TrainableHead,
};
pub use frame::{Frame, GrayImage};
pub use hill_climb::{refine, refine_box, Climb};
pub use memory::FeatureMemory;
pub use patch_classifier::PatchClassifier;
pub use redetect::{recover, recover_with, Recovery};
pub use sample_generator::{Distribution, Generated, SampleGenerator};
pub use schedule::{UpdateKind, UpdateSchedule};
pub use tracker::{FrameResult, RecoveryOutcome, Tracker};
